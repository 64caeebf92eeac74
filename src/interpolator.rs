use ndarray::ArrayView3;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Weighted average of the 8 lattice points around `(x, y, z)`.
    ///
    /// `data` is indexed `[z, y, x]`. Callers guarantee every coordinate lies in
    /// `[0, dim)`; the upper neighbour is clamped to the last lattice index.
    #[inline]
    pub(crate) fn trilinear_interpolate(data: &ArrayView3<i16>, x: f64, y: f64, z: f64) -> f64 {
        let (depth, height, width) = data.dim();

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let z0 = z.floor() as usize;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let z1 = (z0 + 1).min(depth - 1);

        let dx = x - x0 as f64;
        let dy = y - y0 as f64;
        let dz = z - z0 as f64;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;
        let one_minus_dz = 1.0 - dz;

        let v = |k: usize, j: usize, i: usize| f64::from(data[[k, j, i]]);

        let c00 = v(z0, y0, x0).mul_add(one_minus_dx, v(z0, y0, x1) * dx);
        let c01 = v(z0, y1, x0).mul_add(one_minus_dx, v(z0, y1, x1) * dx);
        let c10 = v(z1, y0, x0).mul_add(one_minus_dx, v(z1, y0, x1) * dx);
        let c11 = v(z1, y1, x0).mul_add(one_minus_dx, v(z1, y1, x1) * dx);

        let c0 = c00.mul_add(one_minus_dy, c01 * dy);
        let c1 = c10.mul_add(one_minus_dy, c11 * dy);

        c0.mul_add(one_minus_dz, c1 * dz)
    }

    /// Linear window/level transfer, clamped to `[0, 1]`.
    #[inline]
    pub(crate) fn window_opacity(value: f64, center: i32, width: i32) -> f64 {
        let width = f64::from(width);
        ((value - f64::from(center) + width / 2.0) / width).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    #[test]
    fn test_trilinear_midpoint_is_mean_of_corners() {
        let data = Array3::from_shape_fn((2, 2, 2), |(k, j, i)| (i + 2 * j + 4 * k) as i16);
        let value = Interpolator::trilinear_interpolate(&data.view(), 0.5, 0.5, 0.5);
        assert_relative_eq!(value, 3.5);
    }

    #[test]
    fn test_trilinear_clamps_upper_neighbour() {
        let data = Array3::from_shape_fn((1, 1, 3), |(_, _, i)| (10 * i) as i16);
        let value = Interpolator::trilinear_interpolate(&data.view(), 2.5, 0.0, 0.0);
        assert_relative_eq!(value, 20.0);
    }

    #[test]
    fn test_window_opacity_is_monotonic_and_saturates() {
        let mut last = 0.0;
        for value in (-1000..2000).step_by(25) {
            let opacity = Interpolator::window_opacity(f64::from(value), 200, 800);
            assert!(opacity >= last);
            assert!((0.0..=1.0).contains(&opacity));
            last = opacity;
        }
        assert_relative_eq!(Interpolator::window_opacity(600.0, 200, 800), 1.0);
        assert_relative_eq!(Interpolator::window_opacity(5000.0, 200, 800), 1.0);
        assert_relative_eq!(Interpolator::window_opacity(-200.0, 200, 800), 0.0);
        assert_relative_eq!(Interpolator::window_opacity(200.0, 200, 800), 0.5);
    }
}
