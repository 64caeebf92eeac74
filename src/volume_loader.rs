use crate::{enums::SortBy, error::ViewerError, volume::VoxelVolume};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, Array4, s};
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Invalid volume: {0}")]
    Volume(#[from] ViewerError),
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found or dimensions are inconsistent
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<VoxelVolume, VolumeLoaderError> {
        let mut images_with_order: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_image_with_order(dicom_object, &sort_by))
            .collect();

        if images_with_order.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_images(&mut images_with_order, sort_by);

        let images: Vec<_> = images_with_order
            .into_iter()
            .map(|(_, image)| image)
            .collect();

        Self::validate_dimensions(&images)?;

        let volume_array = Self::build_volume_array(&images);
        let spacing = Self::get_spacing(dicom_objects).ok_or(VolumeLoaderError::MissingSpacing)?;
        info!(dim = ?volume_array.dim(), ?spacing, "Loaded DICOM series");

        Ok(VoxelVolume::new(volume_array, spacing)?)
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<VoxelVolume, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<VoxelVolume, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by)
    }

    /// Load a multi-frame angiography run; frame `t` becomes slice `z = t`.
    pub fn load_dsa_file(path: impl AsRef<Path>) -> Result<VoxelVolume, VolumeLoaderError> {
        let dicom_object = open_file(path.as_ref())?;
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|_| VolumeLoaderError::NoValidImages)?;
        let frames = pixel_data
            .to_ndarray_with_options::<i16>(&Self::convert_options())
            .map_err(|_| VolumeLoaderError::NoValidImages)?;
        let spacing = Self::get_pixel_spacing(&dicom_object).unwrap_or((1.0, 1.0));

        Self::build_frame_volume(frames, spacing)
    }

    /// `(frames, rows, columns, samples)` to a volume with frame `t` at `z = t`,
    /// keeping the first sample of each pixel.
    fn build_frame_volume(
        frames: Array4<i16>,
        (dx, dy): (f64, f64),
    ) -> Result<VoxelVolume, VolumeLoaderError> {
        let frames: Array3<i16> = frames.slice_move(s![.., .., .., 0]);
        debug!(frames = frames.dim().0, "Decoded DSA sequence");

        Ok(VoxelVolume::new(frames, (dx, dy, 1.0))?)
    }

    fn convert_options() -> ConvertOptions {
        // Keep stored intensities; windowing happens per layer
        ConvertOptions::new().with_voi_lut(VoiLutOption::Identity)
    }

    fn extract_image_with_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<(Option<f32>, Array2<i16>)> {
        let order = Self::get_sort_order(dicom_object, sort_by)?;
        let image_2d = Self::decode_image(dicom_object)?;
        Some((order, image_2d))
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some(pos.get(2).copied())
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<i16>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        pixel_data
            .to_ndarray_with_options::<i16>(&Self::convert_options())
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn sort_images(images_with_order: &mut [(Option<f32>, Array2<i16>)], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            images_with_order
                .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        }

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            images_with_order.reverse();
        }
    }

    fn validate_dimensions(images: &[Array2<i16>]) -> Result<(), VolumeLoaderError> {
        let first_dim = images[0].dim();
        if images.iter().any(|img| img.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(images: &[Array2<i16>]) -> Array3<i16> {
        let (height, width) = images[0].dim();
        let depth = images.len();
        let mut volume = Array3::<i16>::zeros((depth, height, width));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(image);
        }

        volume
    }

    /// Column and row spacing (dx, dy)
    fn get_pixel_spacing(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<(f64, f64)> {
        let pixel_spacing = dicom_object
            .element(tags::PIXEL_SPACING)
            .ok()?
            .to_multi_float64()
            .ok()?;
        // PixelSpacing is stored as (row spacing, column spacing)
        Some((*pixel_spacing.get(1)?, *pixel_spacing.first()?))
    }

    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<(f64, f64, f64)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let (dx, dy) = Self::get_pixel_spacing(dicom_object)?;

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float64()
                .ok()?;

            Some((dx, dy, slice_thickness))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_sort_images_by_position_is_descending() {
        let mut images = vec![
            (Some(1.0), Array2::<i16>::zeros((2, 2))),
            (Some(3.0), Array2::<i16>::ones((2, 2))),
            (Some(2.0), Array2::<i16>::zeros((2, 2))),
        ];
        VolumeLoader::sort_images(&mut images, SortBy::ImagePositionPatient);
        let order: Vec<_> = images.iter().map(|(o, _)| *o).collect();
        assert_eq!(order, vec![Some(3.0), Some(2.0), Some(1.0)]);

        VolumeLoader::sort_images(&mut images, SortBy::InstanceNumber);
        let order: Vec<_> = images.iter().map(|(o, _)| *o).collect();
        assert_eq!(order, vec![Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_build_volume_stacks_slices() {
        let images = vec![
            Array2::from_elem((2, 3), 1i16),
            Array2::from_elem((2, 3), 2i16),
        ];
        VolumeLoader::validate_dimensions(&images).unwrap();
        let volume = VolumeLoader::build_volume_array(&images);
        assert_eq!(volume.dim(), (2, 2, 3));
        assert_eq!(volume[[1, 1, 2]], 2);
    }

    #[test]
    fn test_inconsistent_dimensions_rejected() {
        let images = vec![Array2::<i16>::zeros((2, 3)), Array2::<i16>::zeros((3, 2))];
        assert!(matches!(
            VolumeLoader::validate_dimensions(&images),
            Err(VolumeLoaderError::InconsistentDimensions)
        ));
    }

    #[test]
    fn test_frames_map_to_slices() {
        // 2 frames of 2 x 3 pixels with 2 samples; value = 100 * t + 10 * y + x
        let frames = Array4::from_shape_fn((2, 2, 3, 2), |(t, y, x, sample)| {
            (100 * t + 10 * y + x + 1000 * sample) as i16
        });
        let volume = VolumeLoader::build_frame_volume(frames, (0.5, 0.25)).unwrap();

        assert_eq!(volume.dim(), (3, 2, 2));
        assert_eq!(volume.spacing(), (0.5, 0.25, 1.0));
        assert_eq!(volume.get(0, 0, 0), Some(0));
        assert_eq!(volume.get(2, 1, 0), Some(12));
        assert_eq!(volume.get(1, 0, 1), Some(101));
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        assert!(matches!(
            VolumeLoader::load_from_directory("/nonexistent/dicom", SortBy::None),
            Err(VolumeLoaderError::Io(_))
        ));
    }
}
