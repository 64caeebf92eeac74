//! Slice compositing across every visible layer.
//!
//! All layers are resampled in the stack's shared physical frame, so volumes
//! with different resolutions overlay consistently. Layer contributions are
//! summed (not alpha-blended) and clamped per channel, which lets bright
//! overlapping layers saturate to white.

use image::{ImageBuffer, Rgb, RgbImage};
use rayon::prelude::*;
use tracing::debug;

use crate::enums::Plane;
use crate::interpolator::Interpolator;
use crate::layers::{Layer, LayerStack};

pub struct Compositor;

impl Compositor {
    /// Composite the plane at `position` into an image fitting a
    /// `resolution` x `resolution` square.
    ///
    /// Transverse images start at the voxel minimum on row 0; sagittal and
    /// coronal images are flipped so the patient's head points up.
    pub fn compose_plane(stack: &LayerStack, plane: Plane, position: f64, resolution: u32) -> RgbImage {
        let (len_x, len_y, len_z) = stack.extent();
        if len_x <= 0.0 || len_y <= 0.0 || len_z <= 0.0 {
            return RgbImage::new(resolution, resolution);
        }

        let extent = [len_x, len_y, len_z];
        let (u_axis, v_axis) = plane.in_plane_axes();
        let (len_w, len_h) = (extent[u_axis], extent[v_axis]);
        let scale = f64::from(resolution);
        let (width, height, spacing) = if len_h > len_w {
            ((scale * len_w / len_h) as u32, resolution, len_h / scale)
        } else {
            (resolution, (scale * len_h / len_w) as u32, len_w / scale)
        };
        let flip = !matches!(plane, Plane::Transverse);

        debug!(?plane, position, width, height, spacing, "Compositing plane");
        Self::render(stack, plane, position, width, height, spacing, flip)
    }

    /// Slice texture for the 3D scene: one pixel per physical unit, rows in
    /// ascending physical order.
    pub fn compose_plane_physical(stack: &LayerStack, plane: Plane, position: f64) -> RgbImage {
        let (len_x, len_y, len_z) = stack.extent();
        let extent = [len_x, len_y, len_z];
        let (u_axis, v_axis) = plane.in_plane_axes();
        let (width, height) = (extent[u_axis], extent[v_axis]);
        Self::render(stack, plane, position, width as u32, height as u32, 1.0, false)
    }

    fn render(
        stack: &LayerStack,
        plane: Plane,
        position: f64,
        width: u32,
        height: u32,
        spacing: f64,
        flip: bool,
    ) -> RgbImage {
        let layers: Vec<&Layer> = stack.visible_layers().collect();
        let normal_axis = plane.normal_axis();
        let (u_axis, v_axis) = plane.in_plane_axes();

        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map_iter(|row| {
                // Output row `row` shows physical row `y`
                let y = if flip { height - row - 1 } else { row };
                let layers = &layers;
                (0..width).flat_map(move |x| {
                    let mut physical = [0.0; 3];
                    physical[normal_axis] = position;
                    physical[u_axis] = spacing * f64::from(x);
                    physical[v_axis] = spacing * f64::from(y);
                    Self::composite_pixel(layers, physical)
                })
            })
            .collect();

        ImageBuffer::from_raw(width, height, pixel_data)
            .unwrap_or_else(|| RgbImage::new(width, height))
    }

    /// Sum of windowed layer colours at a physical point, clamped to 255.
    fn composite_pixel(layers: &[&Layer], [px, py, pz]: [f64; 3]) -> [u8; 3] {
        let mut rgb = [0.0f64; 3];
        for layer in layers {
            let (dx, dy, dz) = layer.volume().spacing();
            // Partial coverage is expected with mixed volume sizes
            let Ok(sample) = layer.volume().sample_trilinear(px / dx, py / dy, pz / dz) else {
                continue;
            };
            // Stored scalars are integral
            let value = sample.trunc();
            let (center, width) = layer.window();
            let opacity = Interpolator::window_opacity(value, center, width);
            let color = layer.color();
            for (channel, &c) in rgb.iter_mut().zip(&color[..3]) {
                *channel = (*channel + opacity * f64::from(c)).trunc();
            }
        }
        rgb.map(|c| c.clamp(0.0, 255.0) as u8)
    }
}

/// Convenience accessor for a composited pixel
pub fn pixel(image: &RgbImage, x: u32, y: u32) -> Option<[u8; 3]> {
    (x < image.width() && y < image.height()).then(|| {
        let Rgb(rgb) = *image.get_pixel(x, y);
        rgb
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{DecodedVolume, VoxelVolume};

    fn uniform(dim: (usize, usize, usize), spacing: f64, value: i16) -> VoxelVolume {
        let (nx, ny, nz) = dim;
        VoxelVolume::from_decoded(DecodedVolume {
            nx,
            ny,
            nz,
            dx: spacing,
            dy: spacing,
            dz: spacing,
            data: vec![value; nx * ny * nz],
        })
        .unwrap()
    }

    #[test]
    fn test_empty_stack_gives_black_square() {
        let stack = LayerStack::default();
        let image = Compositor::compose_plane(&stack, Plane::Coronal, 10.0, 64);
        assert_eq!(image.dimensions(), (64, 64));
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_overlapping_layers_saturate() {
        let mut stack = LayerStack::default();
        let red = stack.add(uniform((4, 4, 4), 1.0, 1000), "red");
        let dark = stack.add(uniform((4, 4, 4), 1.0, 1000), "dark red");
        stack.set_color(red, [200, 0, 0, 255]).unwrap();
        stack.set_color(dark, [100, 0, 0, 255]).unwrap();

        let image = Compositor::compose_plane(&stack, Plane::Transverse, 1.0, 8);
        assert_eq!(pixel(&image, 2, 2), Some([255, 0, 0]));
    }

    #[test]
    fn test_window_scales_colour() {
        let mut stack = LayerStack::default();
        let id = stack.add(uniform((4, 4, 4), 1.0, 200), "mid");
        stack.set_color(id, [0, 200, 100, 255]).unwrap();

        // (200 - 200 + 400) / 800 = 0.5
        let image = Compositor::compose_plane(&stack, Plane::Transverse, 1.0, 4);
        assert_eq!(pixel(&image, 0, 0), Some([0, 100, 50]));

        stack.set_visible(id, false).unwrap();
        let image = Compositor::compose_plane(&stack, Plane::Transverse, 1.0, 4);
        assert_eq!(pixel(&image, 0, 0), Some([0, 0, 0]));
    }

    #[test]
    fn test_aspect_ratio_follows_physical_extent() {
        let mut stack = LayerStack::default();
        stack.add(uniform((10, 5, 20), 1.0, 1000), "tall");

        let sagittal = Compositor::compose_plane(&stack, Plane::Sagittal, 1.0, 100);
        assert_eq!(sagittal.dimensions(), (25, 100));
        let transverse = Compositor::compose_plane(&stack, Plane::Transverse, 1.0, 100);
        assert_eq!(transverse.dimensions(), (100, 50));
    }

    #[test]
    fn test_partial_coverage_and_row_order() {
        let mut stack = LayerStack::default();
        // Full frame, dim everywhere
        let base = stack.add(uniform((8, 8, 8), 1.0, -1000), "base");
        stack.set_color(base, [0, 0, 255, 255]).unwrap();
        // Covers only the low corner
        let small = stack.add(uniform((4, 4, 4), 1.0, 1000), "small");
        stack.set_color(small, [255, 0, 0, 255]).unwrap();

        let transverse = Compositor::compose_plane(&stack, Plane::Transverse, 1.0, 8);
        assert_eq!(pixel(&transverse, 1, 1), Some([255, 0, 0]));
        assert_eq!(pixel(&transverse, 6, 6), Some([0, 0, 0]));

        // Flipped: low z lands at the bottom rows
        let coronal = Compositor::compose_plane(&stack, Plane::Coronal, 1.0, 8);
        assert_eq!(pixel(&coronal, 1, 7), Some([255, 0, 0]));
        assert_eq!(pixel(&coronal, 1, 0), Some([0, 0, 0]));

        let sagittal = Compositor::compose_plane(&stack, Plane::Sagittal, 1.0, 8);
        assert_eq!(pixel(&sagittal, 1, 7), Some([255, 0, 0]));
        assert_eq!(pixel(&sagittal, 1, 0), Some([0, 0, 0]));
        assert_eq!(pixel(&sagittal, 6, 7), Some([0, 0, 0]));

        // Outside every volume along the fixed axis
        let outside = Compositor::compose_plane(&stack, Plane::Sagittal, 50.0, 8);
        assert!(outside.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_physical_slice_uses_unit_pixels() {
        let mut stack = LayerStack::default();
        stack.add(uniform((4, 6, 2), 2.0, 1000), "A");
        let image = Compositor::compose_plane_physical(&stack, Plane::Coronal, 3.0);
        assert_eq!(image.dimensions(), (8, 4));
        assert_eq!(pixel(&image, 7, 3), Some([255, 255, 255]));
    }
}
