//! Tunable defaults for the layer stack, surface extraction and picking.

/// RGBA colour, 0-255 per channel.
pub type Rgba = [u8; 4];

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ViewerConfig {
    pub default_isovalue: i32,
    pub default_window_center: i32,
    pub default_window_width: i32,
    pub default_color: Rgba,
    pub smoothing_iterations: usize,
    pub relaxation_factor: f64,
    /// Squared physical distance under which a voxel is claimed.
    pub max_picking_distance: f64,
    /// Squared physical distance under which a voxel is released.
    pub max_unpicking_distance: f64,
    /// Value written into mask voxels that were picked.
    pub picked_value: i16,
    /// Isovalue used to re-triangulate a mask after a pick.
    pub mask_isovalue: i32,
    pub slice_resolution: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_isovalue: 200,
            default_window_center: 200,
            default_window_width: 800,
            default_color: [255, 255, 255, 255],
            smoothing_iterations: 15,
            relaxation_factor: 0.1,
            max_picking_distance: 100.0,
            max_unpicking_distance: 25.0,
            picked_value: 10_000,
            mask_isovalue: 200,
            slice_resolution: 512,
        }
    }
}

impl ViewerConfig {
    /// Smoothing parameters consumed by the surface extractor
    pub fn smoothing(&self) -> crate::surface::Smoothing {
        crate::surface::Smoothing {
            iterations: self.smoothing_iterations,
            relaxation: self.relaxation_factor,
        }
    }
}
