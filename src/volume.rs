use crate::error::{Result, ViewerError};
use crate::interpolator::Interpolator;

use ndarray::Array3;
use ndarray::ArrayView3;

/// Decoded volume as handed over by a file-format loader.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVolume {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    /// Row-major intensities, x fastest
    pub data: Vec<i16>,
}

/// Dense scalar grid with physical spacing.
///
/// Data is stored as `[z, y, x]`, so the flat memory order has x fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelVolume {
    data: Array3<i16>,
    spacing: (f64, f64, f64),
}

impl VoxelVolume {
    pub fn new(data: Array3<i16>, spacing: (f64, f64, f64)) -> Result<Self> {
        let (dx, dy, dz) = spacing;
        // NaN fails the comparison as well
        if !(dx > 0.0 && dy > 0.0 && dz > 0.0) {
            return Err(ViewerError::InvalidSpacing(spacing));
        }
        let (depth, height, width) = data.dim();
        if depth == 0 || height == 0 || width == 0 {
            return Err(ViewerError::InvalidDimensions {
                dim: (width, height, depth),
                len: data.len(),
            });
        }
        // Owned arrays may carry a permuted layout; normalise to x fastest.
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Ok(Self { data, spacing })
    }

    /// Take ownership of a decoded buffer.
    pub fn from_decoded(decoded: DecodedVolume) -> Result<Self> {
        let DecodedVolume {
            nx,
            ny,
            nz,
            dx,
            dy,
            dz,
            data,
        } = decoded;
        let len = data.len();
        if nx.checked_mul(ny).and_then(|n| n.checked_mul(nz)) != Some(len) {
            return Err(ViewerError::InvalidDimensions {
                dim: (nx, ny, nz),
                len,
            });
        }
        let data = Array3::from_shape_vec((nz, ny, nx), data).map_err(|_| {
            ViewerError::InvalidDimensions {
                dim: (nx, ny, nz),
                len,
            }
        })?;
        Self::new(data, (dx, dy, dz))
    }

    /// Zero-filled volume with the same dimensions and spacing as `other`
    pub fn zeros_like(other: &VoxelVolume) -> Self {
        Self {
            data: Array3::zeros(other.data.dim()),
            spacing: other.spacing,
        }
    }

    /// Get the dimensions of the volume (nx, ny, nz)
    pub fn dim(&self) -> (usize, usize, usize) {
        let (depth, height, width) = self.data.dim();
        (width, height, depth)
    }

    pub fn spacing(&self) -> (f64, f64, f64) {
        self.spacing
    }

    pub fn voxel_count(&self) -> usize {
        self.data.len()
    }

    /// Get a reference to the underlying data, indexed `[z, y, x]`
    pub fn data(&self) -> &Array3<i16> {
        &self.data
    }

    pub fn view(&self) -> ArrayView3<'_, i16> {
        self.data.view()
    }

    /// Mutable access to the voxel values.
    ///
    /// Only reachable through [`crate::layers::LayerStack::edit_volume`] once the
    /// volume belongs to a layer, which re-extracts the mesh afterwards.
    pub(crate) fn data_mut(&mut self) -> &mut Array3<i16> {
        &mut self.data
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<i16> {
        self.data.get([k, j, i]).copied()
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, value: i16) -> Result<()> {
        let len = self.voxel_count();
        match self.data.get_mut([k, j, i]) {
            Some(voxel) => {
                *voxel = value;
                Ok(())
            }
            None => Err(ViewerError::IndexOutOfRange {
                index: self.flat_index_unchecked(i, j, k),
                len,
            }),
        }
    }

    /// Value at a flat (x fastest) offset
    pub fn value_at(&self, index: usize) -> Option<i16> {
        let (i, j, k) = self.coord(index).ok()?;
        self.get(i, j, k)
    }

    fn flat_index_unchecked(&self, i: usize, j: usize, k: usize) -> usize {
        let (nx, ny, _) = self.dim();
        (k * ny + j) * nx + i
    }

    pub fn flat_index(&self, i: usize, j: usize, k: usize) -> Result<usize> {
        let (nx, ny, nz) = self.dim();
        if i >= nx || j >= ny || k >= nz {
            return Err(ViewerError::IndexOutOfRange {
                index: self.flat_index_unchecked(i, j, k),
                len: self.voxel_count(),
            });
        }
        Ok(self.flat_index_unchecked(i, j, k))
    }

    pub fn coord(&self, index: usize) -> Result<(usize, usize, usize)> {
        let len = self.voxel_count();
        if index >= len {
            return Err(ViewerError::IndexOutOfRange { index, len });
        }
        let (nx, ny, _) = self.dim();
        Ok((index % nx, (index / nx) % ny, index / (nx * ny)))
    }

    pub fn voxel_to_physical(&self, i: usize, j: usize, k: usize) -> (f64, f64, f64) {
        let (dx, dy, dz) = self.spacing;
        (i as f64 * dx, j as f64 * dy, k as f64 * dz)
    }

    /// Physical size along each axis (dimension times spacing)
    pub fn physical_extent(&self) -> (f64, f64, f64) {
        let (nx, ny, nz) = self.dim();
        let (dx, dy, dz) = self.spacing;
        (nx as f64 * dx, ny as f64 * dy, nz as f64 * dz)
    }

    /// Smallest and largest stored value
    pub fn value_range(&self) -> (i16, i16) {
        self.data
            .iter()
            .fold((i16::MAX, i16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Sample at continuous voxel coordinates.
    ///
    /// Every coordinate must lie in `[0, dim)`.
    pub fn sample_trilinear(&self, x: f64, y: f64, z: f64) -> Result<f64> {
        let (nx, ny, nz) = self.dim();
        let inside = |c: f64, n: usize| c >= 0.0 && c < n as f64;
        if !(inside(x, nx) && inside(y, ny) && inside(z, nz)) {
            return Err(ViewerError::OutOfBounds { x, y, z });
        }
        Ok(Interpolator::trilinear_interpolate(&self.data.view(), x, y, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(nx: usize, ny: usize, nz: usize) -> VoxelVolume {
        let data = (0..nx * ny * nz).map(|v| v as i16).collect();
        VoxelVolume::from_decoded(DecodedVolume {
            nx,
            ny,
            nz,
            dx: 0.5,
            dy: 1.0,
            dz: 2.0,
            data,
        })
        .unwrap()
    }

    #[test]
    fn test_flat_index_round_trip() {
        let volume = ramp(4, 3, 5);
        for k in 0..5 {
            for j in 0..3 {
                for i in 0..4 {
                    let index = volume.flat_index(i, j, k).unwrap();
                    assert_eq!(volume.coord(index).unwrap(), (i, j, k));
                }
            }
        }
        assert!(volume.flat_index(4, 0, 0).is_err());
        assert!(volume.coord(60).is_err());
    }

    #[test]
    fn test_decoded_buffer_is_x_fastest() {
        let volume = ramp(4, 3, 5);
        assert_eq!(volume.get(1, 0, 0), Some(1));
        assert_eq!(volume.get(0, 1, 0), Some(4));
        assert_eq!(volume.get(0, 0, 1), Some(12));
        assert_eq!(volume.value_at(17), Some(17));
    }

    #[test]
    fn test_trilinear_exact_at_lattice_points() {
        let volume = ramp(4, 3, 5);
        for k in 0..5 {
            for j in 0..3 {
                for i in 0..4 {
                    let expected = f64::from(volume.get(i, j, k).unwrap());
                    let sampled = volume
                        .sample_trilinear(i as f64, j as f64, k as f64)
                        .unwrap();
                    assert_relative_eq!(sampled, expected);
                }
            }
        }
    }

    #[test]
    fn test_sample_outside_fails() {
        let volume = ramp(4, 3, 5);
        assert!(matches!(
            volume.sample_trilinear(4.0, 0.0, 0.0),
            Err(ViewerError::OutOfBounds { .. })
        ));
        assert!(volume.sample_trilinear(-0.1, 0.0, 0.0).is_err());
        assert!(volume.sample_trilinear(3.9, 2.9, 4.9).is_ok());
    }

    #[test]
    fn test_physical_conversions() {
        let volume = ramp(4, 3, 5);
        assert_eq!(volume.voxel_to_physical(2, 2, 2), (1.0, 2.0, 4.0));
        assert_eq!(volume.physical_extent(), (2.0, 3.0, 10.0));
    }

    #[test]
    fn test_rejects_bad_input() {
        let short = DecodedVolume {
            nx: 2,
            ny: 2,
            nz: 2,
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
            data: vec![0; 7],
        };
        assert!(matches!(
            VoxelVolume::from_decoded(short),
            Err(ViewerError::InvalidDimensions { .. })
        ));
        let flat = DecodedVolume {
            nx: 1,
            ny: 1,
            nz: 1,
            dx: 0.0,
            dy: 1.0,
            dz: 1.0,
            data: vec![0],
        };
        assert!(matches!(
            VoxelVolume::from_decoded(flat),
            Err(ViewerError::InvalidSpacing(_))
        ));
    }

    #[test]
    fn test_zeros_like_does_not_alias() {
        let volume = ramp(2, 2, 2);
        let mut mask = VoxelVolume::zeros_like(&volume);
        mask.set(1, 1, 1, 42).unwrap();
        assert_eq!(mask.dim(), volume.dim());
        assert_eq!(mask.spacing(), volume.spacing());
        assert_eq!(volume.get(1, 1, 1), Some(7));
        assert_eq!(mask.value_range(), (0, 42));
    }
}
