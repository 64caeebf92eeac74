//! Ordered stack of volume layers with their display parameters and cached meshes.

use tracing::{debug, info};

use crate::config::{Rgba, ViewerConfig};
use crate::enums::{Plane, RenderMode};
use crate::error::{Result, ViewerError};
use crate::mesh::Mesh;
use crate::surface::SurfaceExtractor;
use crate::volume::VoxelVolume;

/// Stable handle to a layer, unaffected by deletion of other layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

#[derive(Debug, Clone)]
pub struct Layer {
    id: LayerId,
    title: String,
    color: Rgba,
    window_center: i32,
    window_width: i32,
    isovalue: i32,
    visible: bool,
    mesh: Mesh,
    volume: VoxelVolume,
}

impl Layer {
    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn color(&self) -> Rgba {
        self.color
    }

    pub fn window(&self) -> (i32, i32) {
        (self.window_center, self.window_width)
    }

    pub fn isovalue(&self) -> i32 {
        self.isovalue
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn volume(&self) -> &VoxelVolume {
        &self.volume
    }

    /// Opacity in `[0, 1]` taken from the alpha channel
    pub fn opacity(&self) -> f64 {
        f64::from(self.color[3]) / 255.0
    }
}

/// Material coefficients shared by every rendered layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lighting {
    pub ambient: f64,
    pub diffuse: f64,
    pub specular: f64,
}

impl Lighting {
    /// Build from slider percentages (0-100)
    pub fn from_percent(ambient: u32, diffuse: u32, specular: u32) -> Self {
        Self {
            ambient: f64::from(ambient) / 100.0,
            diffuse: f64::from(diffuse) / 100.0,
            specular: f64::from(specular) / 100.0,
        }
    }
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: 0.1,
            diffuse: 0.7,
            specular: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayerStack {
    layers: Vec<Layer>,
    next_id: u64,
    /// Physical bounding box shared by all layers; only grows until the stack empties
    extent: (f64, f64, f64),
    camera_reset_pending: bool,
    slice_positions: [f64; 3],
    lighting: Lighting,
    render_mode: RenderMode,
    show_axes: bool,
    show_slices: bool,
    extractor: SurfaceExtractor,
    config: ViewerConfig,
}

impl Default for LayerStack {
    fn default() -> Self {
        Self::new(ViewerConfig::default())
    }
}

impl LayerStack {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            layers: Vec::new(),
            next_id: 0,
            extent: (0.0, 0.0, 0.0),
            camera_reset_pending: false,
            slice_positions: [0.0; 3],
            lighting: Lighting::default(),
            render_mode: RenderMode::default(),
            show_axes: false,
            show_slices: false,
            extractor: SurfaceExtractor::new(config.smoothing()),
            config,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn extractor(&self) -> &SurfaceExtractor {
        &self.extractor
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn visible_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|layer| layer.visible)
    }

    /// Append a volume with default display parameters and extract its mesh.
    pub fn add(&mut self, volume: VoxelVolume, title: impl Into<String>) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;

        let title = title.into();
        let isovalue = self.config.default_isovalue;
        let mesh = self.extractor.extract(&volume, isovalue, false);

        let was_empty = self.layers.is_empty();
        let (lx, ly, lz) = volume.physical_extent();
        self.extent = (
            self.extent.0.max(lx),
            self.extent.1.max(ly),
            self.extent.2.max(lz),
        );

        info!(
            ?id,
            title = %title,
            dim = ?volume.dim(),
            cells = mesh.cell_count(),
            "Added layer"
        );

        self.layers.push(Layer {
            id,
            title,
            color: self.config.default_color,
            window_center: self.config.default_window_center,
            window_width: self.config.default_window_width,
            isovalue,
            visible: true,
            mesh,
            volume,
        });

        if was_empty {
            self.camera_reset_pending = true;
            self.slice_positions = [self.extent.0 / 2.0, self.extent.1 / 2.0, self.extent.2 / 2.0];
        }
        id
    }

    pub fn index_of(&self, id: LayerId) -> Result<usize> {
        self.layers
            .iter()
            .position(|layer| layer.id == id)
            .ok_or(ViewerError::UnknownLayer(id))
    }

    pub fn id_at(&self, index: usize) -> Result<LayerId> {
        self.layer_at(index).map(Layer::id)
    }

    pub fn layer_at(&self, index: usize) -> Result<&Layer> {
        self.layers.get(index).ok_or(ViewerError::IndexOutOfRange {
            index,
            len: self.layers.len(),
        })
    }

    pub fn get(&self, id: LayerId) -> Result<&Layer> {
        self.index_of(id).map(|index| &self.layers[index])
    }

    fn get_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        let index = self.index_of(id)?;
        Ok(&mut self.layers[index])
    }

    /// Remove the layer at `index`; later layers move down by one.
    pub fn remove(&mut self, index: usize) -> Result<Layer> {
        if index >= self.layers.len() {
            return Err(ViewerError::IndexOutOfRange {
                index,
                len: self.layers.len(),
            });
        }
        let layer = self.layers.remove(index);
        info!(id = ?layer.id, title = %layer.title, "Removed layer");

        if self.layers.is_empty() {
            self.extent = (0.0, 0.0, 0.0);
            self.slice_positions = [0.0; 3];
            self.camera_reset_pending = false;
        }
        Ok(layer)
    }

    pub fn remove_layer(&mut self, id: LayerId) -> Result<Layer> {
        let index = self.index_of(id)?;
        self.remove(index)
    }

    /// Change the isovalue and re-extract the mesh before returning.
    pub fn set_isovalue(&mut self, id: LayerId, isovalue: i32) -> Result<()> {
        let index = self.index_of(id)?;
        self.layers[index].isovalue = isovalue;
        self.refresh_mesh(index, false);
        Ok(())
    }

    pub fn set_title(&mut self, id: LayerId, title: impl Into<String>) -> Result<()> {
        self.get_mut(id)?.title = title.into();
        Ok(())
    }

    pub fn set_color(&mut self, id: LayerId, color: Rgba) -> Result<()> {
        self.get_mut(id)?.color = color;
        Ok(())
    }

    pub fn set_window_center(&mut self, id: LayerId, center: i32) -> Result<()> {
        self.get_mut(id)?.window_center = center;
        Ok(())
    }

    pub fn set_window_width(&mut self, id: LayerId, width: i32) -> Result<()> {
        if width < 1 {
            return Err(ViewerError::InvalidWindowWidth(width));
        }
        self.get_mut(id)?.window_width = width;
        Ok(())
    }

    pub fn set_visible(&mut self, id: LayerId, visible: bool) -> Result<()> {
        self.get_mut(id)?.visible = visible;
        Ok(())
    }

    pub fn toggle_visible(&mut self, id: LayerId) -> Result<bool> {
        let layer = self.get_mut(id)?;
        layer.visible = !layer.visible;
        Ok(layer.visible)
    }

    /// Show the listed layers and hide every other one
    pub fn show_only(&mut self, ids: &[LayerId]) {
        for layer in &mut self.layers {
            layer.visible = ids.contains(&layer.id);
        }
    }

    /// Mutate a layer's voxels, then re-extract its mesh.
    pub fn edit_volume<R>(
        &mut self,
        id: LayerId,
        edit: impl FnOnce(&mut VoxelVolume) -> R,
    ) -> Result<R> {
        let index = self.index_of(id)?;
        let result = edit(&mut self.layers[index].volume);
        self.refresh_mesh(index, false);
        Ok(result)
    }

    /// Edit `target`'s voxels while reading `source`, then re-triangulate
    /// `target` as a mask: at the mask isovalue, keeping every fragment.
    ///
    /// Only this re-extraction skips the component filter; later isovalue
    /// changes or edits on the same layer filter as usual.
    pub(crate) fn edit_mask<R>(
        &mut self,
        source: LayerId,
        target: LayerId,
        edit: impl FnOnce(&Layer, &mut VoxelVolume) -> R,
    ) -> Result<R> {
        let si = self.index_of(source)?;
        let ti = self.index_of(target)?;
        if si == ti {
            return Err(ViewerError::SameLayer);
        }

        let (source_layer, target_layer) = if si < ti {
            let (head, tail) = self.layers.split_at_mut(ti);
            (&head[si], &mut tail[0])
        } else {
            let (head, tail) = self.layers.split_at_mut(si);
            (&tail[0], &mut head[ti])
        };
        let result = edit(source_layer, &mut target_layer.volume);

        target_layer.isovalue = self.config.mask_isovalue;
        self.refresh_mesh(ti, true);
        Ok(result)
    }

    fn refresh_mesh(&mut self, index: usize, skip_largest_component_filter: bool) {
        let extractor = self.extractor;
        let layer = &mut self.layers[index];
        layer.mesh = extractor.extract(&layer.volume, layer.isovalue, skip_largest_component_filter);
        debug!(
            id = ?layer.id,
            isovalue = layer.isovalue,
            skip_largest_component_filter,
            cells = layer.mesh.cell_count(),
            "Refreshed layer mesh"
        );
    }

    /// Physical size (lenX, lenY, lenZ) of the shared frame
    pub fn extent(&self) -> (f64, f64, f64) {
        self.extent
    }

    /// Returns true once after the first volume lands in an empty stack.
    pub fn take_camera_reset(&mut self) -> bool {
        std::mem::take(&mut self.camera_reset_pending)
    }

    pub fn slice_position(&self, plane: Plane) -> f64 {
        self.slice_positions[plane.normal_axis()]
    }

    pub fn set_slice_position(&mut self, plane: Plane, position: f64) {
        self.slice_positions[plane.normal_axis()] = position;
    }

    pub fn lighting(&self) -> Lighting {
        self.lighting
    }

    pub fn set_lighting(&mut self, lighting: Lighting) {
        self.lighting = lighting;
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.render_mode = mode;
    }

    pub fn show_axes(&self) -> bool {
        self.show_axes
    }

    pub fn set_show_axes(&mut self, show: bool) {
        self.show_axes = show;
    }

    pub fn show_slices(&self) -> bool {
        self.show_slices
    }

    pub fn set_show_slices(&mut self, show: bool) {
        self.show_slices = show;
    }
}
