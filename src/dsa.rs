//! Digital subtraction angiography sequences, kept as lightweight 2D layers.

use image::{GrayImage, ImageBuffer};
use tracing::info;

use crate::error::{Result, ViewerError};
use crate::volume::VoxelVolume;

/// A time series of 2D frames; frame `t` is slice `z = t` of `frames`.
#[derive(Debug, Clone)]
pub struct DsaLayer {
    pub title: String,
    pub frames: VoxelVolume,
    pub frame: usize,
    pub visible: bool,
}

impl DsaLayer {
    pub fn frame_count(&self) -> usize {
        self.frames.dim().2
    }

    /// Current frame as 8-bit grey, bottom row first.
    ///
    /// Returns `None` when the frame index is past the end of the sequence.
    pub fn frame_image(&self) -> Option<GrayImage> {
        let (nx, ny, nz) = self.frames.dim();
        if self.frame >= nz {
            return None;
        }
        let data = self.frames.data();
        let pixel_data: Vec<u8> = (0..ny)
            .rev()
            .flat_map(|y| (0..nx).map(move |x| (y, x)))
            .map(|(y, x)| data[[self.frame, y, x]].clamp(0, 255) as u8)
            .collect();
        ImageBuffer::from_raw(nx as u32, ny as u32, pixel_data)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DsaStack {
    layers: Vec<DsaLayer>,
}

impl DsaStack {
    pub fn add(&mut self, frames: VoxelVolume, title: impl Into<String>) -> usize {
        let title = title.into();
        info!(title = %title, frames = frames.dim().2, "Added DSA sequence");
        self.layers.push(DsaLayer {
            title,
            frames,
            frame: 0,
            visible: true,
        });
        self.layers.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Result<DsaLayer> {
        self.check(index)?;
        Ok(self.layers.remove(index))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[DsaLayer] {
        &self.layers
    }

    pub fn get(&self, index: usize) -> Result<&DsaLayer> {
        self.check(index)?;
        Ok(&self.layers[index])
    }

    pub fn set_frame(&mut self, index: usize, frame: usize) -> Result<()> {
        self.check(index)?;
        self.layers[index].frame = frame;
        Ok(())
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.check(index)?;
        self.layers[index].visible = visible;
        Ok(())
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.layers.len() {
            Ok(())
        } else {
            Err(ViewerError::IndexOutOfRange {
                index,
                len: self.layers.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::DecodedVolume;

    fn sequence() -> VoxelVolume {
        // 3 x 2 frames, 2 frames; value = 100 * frame + 10 * y + x
        let mut data = Vec::new();
        for t in 0..2i16 {
            for y in 0..2i16 {
                for x in 0..3i16 {
                    data.push(100 * t + 10 * y + x);
                }
            }
        }
        VoxelVolume::from_decoded(DecodedVolume {
            nx: 3,
            ny: 2,
            nz: 2,
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
            data,
        })
        .unwrap()
    }

    #[test]
    fn test_frame_image_is_flipped() {
        let mut stack = DsaStack::default();
        let index = stack.add(sequence(), "run 1");
        stack.set_frame(index, 1).unwrap();

        let image = stack.get(index).unwrap().frame_image().unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(0, 0).0, [110]);
        assert_eq!(image.get_pixel(2, 1).0, [102]);
    }

    #[test]
    fn test_frame_past_end_yields_nothing() {
        let mut stack = DsaStack::default();
        stack.add(sequence(), "run 1");
        stack.set_frame(0, 2).unwrap();
        assert!(stack.get(0).unwrap().frame_image().is_none());
        assert_eq!(stack.get(0).unwrap().frame_count(), 2);
    }

    #[test]
    fn test_remove_checks_index() {
        let mut stack = DsaStack::default();
        stack.add(sequence(), "run 1");
        assert!(stack.remove(1).is_err());
        assert_eq!(stack.remove(0).unwrap().title, "run 1");
        assert!(stack.is_empty());
    }
}
