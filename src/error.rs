//! Error types for the viewer core

use thiserror::Error;

use crate::layers::LayerId;

#[derive(Debug, Error, PartialEq)]
pub enum ViewerError {
    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown layer {0:?}")]
    UnknownLayer(LayerId),

    #[error("Sample at ({x}, {y}, {z}) lies outside the volume")]
    OutOfBounds { x: f64, y: f64, z: f64 },

    #[error("Voxel count mismatch: source has {source_count}, target has {target_count}")]
    SizeMismatch {
        source_count: usize,
        target_count: usize,
    },

    #[error("Buffer of {len} values does not match dimensions {dim:?}")]
    InvalidDimensions {
        dim: (usize, usize, usize),
        len: usize,
    },

    #[error("Spacing must be strictly positive, got {0:?}")]
    InvalidSpacing((f64, f64, f64)),

    #[error("Window width must be at least 1, got {0}")]
    InvalidWindowWidth(i32),

    #[error("No picking target has been set up")]
    NoPickingTarget,

    #[error("No picking session is active")]
    NotPicking,

    #[error("Source and target refer to the same layer")]
    SameLayer,

    #[error("Cell {cell} does not exist in a mesh of {cells} cells")]
    CellOutOfRange { cell: usize, cells: usize },
}

pub type Result<T> = std::result::Result<T, ViewerError>;
