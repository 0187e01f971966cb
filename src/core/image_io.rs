//! Purpose: Image decoding collaborator for the inference pipeline.
//! Exports: `ImageLoader`, `FileImageLoader`, `image_to_array`.
//! Role: Turn a file path into an `H x W x C` u8 pixel array.
//! Invariants: Output channel count is 1 (gray), 2 (gray+alpha), 3 (RGB) or 4 (RGBA).
//! Invariants: Missing, unreadable or undecodable files surface as `ErrorKind::Io`.
use std::path::Path;

use image::{DynamicImage, GenericImageView};
use ndarray::Array3;

use crate::core::error::{Error, ErrorKind, io_error_kind};

pub trait ImageLoader {
    fn load(&self, path: &Path) -> Result<Array3<u8>, Error>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FileImageLoader;

impl ImageLoader for FileImageLoader {
    fn load(&self, path: &Path) -> Result<Array3<u8>, Error> {
        let bytes = std::fs::read(path).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to read image")
                .with_path(path)
                .with_source(err)
        })?;
        let image = image::load_from_memory(&bytes).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to decode image")
                .with_path(path)
                .with_hint("Supported formats: PNG, JPEG, BMP, GIF, TIFF, WebP.")
                .with_source(err)
        })?;
        image_to_array(image).map_err(|err| err.with_path(path))
    }
}

pub fn image_to_array(image: DynamicImage) -> Result<Array3<u8>, Error> {
    let (width, height) = image.dimensions();
    let (width, height) = (width as usize, height as usize);
    let (channels, raw) = match image {
        DynamicImage::ImageLuma8(buffer) => (1, buffer.into_raw()),
        DynamicImage::ImageLumaA8(buffer) => (2, buffer.into_raw()),
        DynamicImage::ImageRgb8(buffer) => (3, buffer.into_raw()),
        DynamicImage::ImageRgba8(buffer) => (4, buffer.into_raw()),
        other @ DynamicImage::ImageLuma16(_) => (1, other.to_luma8().into_raw()),
        other @ DynamicImage::ImageLumaA16(_) => (2, other.to_luma_alpha8().into_raw()),
        other if other.color().has_alpha() => (4, other.to_rgba8().into_raw()),
        other => (3, other.to_rgb8().into_raw()),
    };
    Array3::from_shape_vec((height, width, channels), raw).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("decoded image has an unexpected buffer length")
            .with_source(err)
    })
}
