//! Purpose: Binary segmentation result and its transport encoding.
//! Exports: `Mask`, `decode_mask_b64`.
//! Role: Last pipeline stage; turns a boolean grid into base64 PNG text.
//! Invariants: Serialized masks are 8-bit grayscale with values {0, 255} only.
//! Invariants: Mask height/width always equal the source image height/width.
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::png::PngEncoder;
use image::{ColorType, GrayImage, ImageEncoder};
use ndarray::Array2;

use crate::core::error::{Error, ErrorKind};

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    pixels: Array2<bool>,
}

impl Mask {
    pub fn new(pixels: Array2<bool>) -> Self {
        Self { pixels }
    }

    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }

    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }

    pub fn pixels(&self) -> &Array2<bool> {
        &self.pixels
    }

    pub fn foreground_count(&self) -> usize {
        self.pixels.iter().filter(|&&on| on).count()
    }

    pub fn to_gray_bytes(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .map(|&on| if on { FOREGROUND } else { BACKGROUND })
            .collect()
    }

    pub fn to_png(&self) -> Result<Vec<u8>, Error> {
        let width = u32::try_from(self.width()).map_err(|_| oversized())?;
        let height = u32::try_from(self.height()).map_err(|_| oversized())?;
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(&self.to_gray_bytes(), width, height, ColorType::L8)
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode mask png")
                    .with_source(err)
            })?;
        Ok(png)
    }

    /// Base64 (standard alphabet, padded) of the PNG encoding.
    pub fn to_b64(&self) -> Result<String, Error> {
        Ok(STANDARD.encode(self.to_png()?))
    }
}

/// Inverse of `Mask::to_b64`, for callers that want pixels back.
pub fn decode_mask_b64(data: &str) -> Result<GrayImage, Error> {
    let png = STANDARD.decode(data.trim()).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("mask is not valid base64")
            .with_source(err)
    })?;
    let image = image::load_from_memory(&png).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("mask is not a decodable image")
            .with_source(err)
    })?;
    Ok(image.to_luma8())
}

fn oversized() -> Error {
    Error::new(ErrorKind::Inference).with_message("mask dimensions exceed png limits")
}
