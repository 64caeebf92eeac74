//! Scene description handed to an external 3D renderer.

use image::{GrayImage, RgbImage};

use crate::compositor::Compositor;
use crate::config::Rgba;
use crate::dsa::DsaStack;
use crate::enums::{Plane, RenderMode};
use crate::layers::{LayerId, LayerStack, Lighting};
use crate::mesh::Mesh;
use crate::volume::VoxelVolume;

/// Geometry to draw for one visible layer.
#[derive(Debug)]
pub enum Geometry<'a> {
    Volume(&'a VoxelVolume),
    Mesh(&'a Mesh),
}

#[derive(Debug)]
pub struct RenderItem<'a> {
    pub layer: LayerId,
    pub geometry: Geometry<'a>,
    pub color: Rgba,
    pub opacity: f64,
}

#[derive(Debug)]
pub struct SliceTexture {
    pub plane: Plane,
    pub position: f64,
    pub image: RgbImage,
}

#[derive(Debug)]
pub struct DsaOverlay {
    pub title: String,
    pub image: GrayImage,
    pub opacity: f64,
}

#[derive(Debug)]
pub struct RenderScene<'a> {
    pub items: Vec<RenderItem<'a>>,
    pub lighting: Lighting,
    /// Length of each axis arrow, when axes are shown
    pub axes_length: Option<f64>,
    pub slices: Vec<SliceTexture>,
    pub overlays: Vec<DsaOverlay>,
}

const DSA_OVERLAY_OPACITY: f64 = 0.1;

impl LayerStack {
    /// Describe everything a renderer should draw for the current state.
    ///
    /// The camera reset is not part of the scene; renderers poll
    /// [`LayerStack::take_camera_reset`] before drawing.
    pub fn render_scene<'a>(&'a self, dsa: &DsaStack) -> RenderScene<'a> {
        let items = self
            .visible_layers()
            .map(|layer| RenderItem {
                layer: layer.id(),
                geometry: match self.render_mode() {
                    RenderMode::VolumeRendering => Geometry::Volume(layer.volume()),
                    RenderMode::MeshRendering => Geometry::Mesh(layer.mesh()),
                },
                color: layer.color(),
                opacity: layer.opacity(),
            })
            .collect();

        let axes_length = (self.show_axes() && !self.is_empty()).then(|| {
            let (x, y, z) = self.extent();
            x.max(y).max(z) / 10.0
        });

        let slices = if self.show_slices() && !self.is_empty() {
            Plane::ALL
                .iter()
                .map(|&plane| {
                    let position = self.slice_position(plane);
                    SliceTexture {
                        plane,
                        position,
                        image: Compositor::compose_plane_physical(self, plane, position),
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        let overlays = dsa
            .layers()
            .iter()
            .filter(|layer| layer.visible)
            .filter_map(|layer| {
                Some(DsaOverlay {
                    title: layer.title.clone(),
                    image: layer.frame_image()?,
                    opacity: DSA_OVERLAY_OPACITY,
                })
            })
            .collect();

        RenderScene {
            items,
            lighting: self.lighting(),
            axes_length,
            slices,
            overlays,
        }
    }
}
