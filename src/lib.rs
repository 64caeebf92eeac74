//! # DICOM viewer core
//!
//! This crate holds the non-UI core of a layered medical volume viewer:
//! volumes are stacked as layers, turned into isosurface meshes, composited
//! into orthogonal slice images and segmented by brush-picking mesh cells
//! that are mapped back onto a voxel mask.
//!
//! The pieces, leaves first:
//!  - [`VoxelVolume`]: dense `i16` grid with spacing, trilinear sampling and
//!    index conversions
//!  - [`SurfaceExtractor`]: marching tetrahedra, largest-component filter and
//!    Laplacian smoothing
//!  - [`Compositor`]: additive window/level compositing of every visible layer
//!    into sagittal, coronal and transverse images
//!  - [`LayerStack`]: layers with colour, window, isovalue, visibility and a
//!    cached mesh that is re-extracted whenever its inputs change
//!  - [`PickingEngine`]: picking sessions that claim or release mask voxels
//!    close to the picked cells
//!
//! File decoding, drawing and input handling live outside this crate; the
//! [`volume_loader`] module is a thin adapter over the dicom-rs ecosystem that
//! produces [`VoxelVolume`]s.
//!
//! # Examples
//!
//! ## Segmenting a region by picking
//!
//! ```no_run
//! # use dicom_viewer::{LayerStack, PickingEngine, VolumeLoader, Compositor, Plane, SortBy};
//! let volume = VolumeLoader::load_from_directory("dicom", SortBy::InstanceNumber)
//!     .expect("should have loaded files from directory");
//!
//! let mut stack = LayerStack::default();
//! let source = stack.add(volume, "Image 1");
//!
//! let mut picking = PickingEngine::new(stack.config());
//! picking.create_mask_layer(&mut stack, source).expect("source layer exists");
//! picking.enter(&mut stack, picking.select_add()).expect("layers are bound");
//!
//! // Cell ids come from a ray pick against the displayed source mesh
//! picking.begin_stroke();
//! picking.pick_cell(42);
//! picking.commit(&mut stack).expect("volumes have matching sizes");
//!
//! let position = stack.slice_position(Plane::Coronal);
//! let image = Compositor::compose_plane(&stack, Plane::Coronal, position, 512);
//! image.save("coronal.png").expect("should have written image");
//! ```

pub mod compositor;
pub mod config;
pub mod dsa;
pub mod enums;
pub mod error;
mod interpolator;
pub mod layers;
pub mod mesh;
pub mod picking;
pub mod render;
pub mod surface;
pub mod volume;
pub mod volume_loader;

pub use compositor::Compositor;
pub use config::ViewerConfig;
pub use dsa::{DsaLayer, DsaStack};
pub use enums::{PickMode, Plane, RenderMode, SortBy};
pub use error::{Result, ViewerError};
pub use layers::{Layer, LayerId, LayerStack, Lighting};
pub use mesh::Mesh;
pub use picking::{CommitSummary, PickingEngine};
pub use render::RenderScene;
pub use surface::SurfaceExtractor;
pub use volume::{DecodedVolume, VoxelVolume};
pub use volume_loader::VolumeLoader;
