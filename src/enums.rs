/// Orthogonal slice planes, named after the axis they cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    /// Fixed X, spans Y (width) and Z (height).
    Sagittal,
    /// Fixed Y, spans X (width) and Z (height).
    Coronal,
    /// Fixed Z, spans X (width) and Y (height).
    Transverse,
}

impl Plane {
    pub const ALL: [Plane; 3] = [Plane::Sagittal, Plane::Coronal, Plane::Transverse];

    /// Axis held constant by this plane (0 = X, 1 = Y, 2 = Z)
    pub fn normal_axis(self) -> usize {
        match self {
            Plane::Sagittal => 0,
            Plane::Coronal => 1,
            Plane::Transverse => 2,
        }
    }

    /// Axes mapped to image columns and rows
    pub fn in_plane_axes(self) -> (usize, usize) {
        match self {
            Plane::Sagittal => (1, 2),
            Plane::Coronal => (0, 2),
            Plane::Transverse => (0, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RenderMode {
    VolumeRendering,
    #[default]
    MeshRendering,
}

/// Picking mode, carrying the squared distance threshold that applies to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PickMode {
    /// Claim source voxels near picked cells of the source mesh.
    SelectAdd { max_distance: f64 },
    /// Release target voxels near picked cells of the target mesh.
    SelectRemove { max_distance: f64 },
}

impl PickMode {
    pub fn max_distance(&self) -> f64 {
        match self {
            PickMode::SelectAdd { max_distance } | PickMode::SelectRemove { max_distance } => {
                *max_distance
            }
        }
    }
}

#[derive(Default, Clone, Copy)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_axes_cover_all_three() {
        for plane in Plane::ALL {
            let (u, v) = plane.in_plane_axes();
            let mut axes = [plane.normal_axis(), u, v];
            axes.sort_unstable();
            assert_eq!(axes, [0, 1, 2]);
        }
        assert_eq!(Plane::Coronal.in_plane_axes(), (0, 2));
    }
}
