//! Purpose: Intermediate image representation passed from encoder to decoder.
//! Exports: `ImageEmbedding`.
//! Role: Carries the feature grid plus the geometry needed to map it back to pixels.
//! Invariants: `features` is `(channels, grid_h, grid_w)` with `grid_* = ceil(image_* / stride)`.
//! Invariants: Decoders check structure via `expect_layout`; they never trust it blindly.
use ndarray::{Array3, ArrayView1};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, PartialEq)]
pub struct ImageEmbedding {
    features: Array3<f32>,
    stride: usize,
    image_size: (usize, usize),
}

impl ImageEmbedding {
    pub fn new(features: Array3<f32>, stride: usize, image_size: (usize, usize)) -> Self {
        Self {
            features,
            stride,
            image_size,
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.features.shape()
    }

    pub fn dtype(&self) -> &'static str {
        "f32"
    }

    /// `(height, width)` of the encoded image.
    pub fn image_size(&self) -> (usize, usize) {
        self.image_size
    }

    pub fn grid_size(&self) -> (usize, usize) {
        let (_, grid_h, grid_w) = self.features.dim();
        (grid_h, grid_w)
    }

    pub fn cell(&self, row: usize, col: usize) -> ArrayView1<'_, f32> {
        self.features.slice(ndarray::s![.., row, col])
    }

    /// Rejects embeddings whose layout does not match what a decoder was built for.
    pub fn expect_layout(&self, channels: usize, stride: usize) -> Result<(), Error> {
        let (height, width) = self.image_size;
        let (actual_channels, grid_h, grid_w) = self.features.dim();
        let expected_grid = (height.div_ceil(stride.max(1)), width.div_ceil(stride.max(1)));
        if actual_channels != channels
            || self.stride != stride
            || height == 0
            || width == 0
            || (grid_h, grid_w) != expected_grid
        {
            return Err(Error::new(ErrorKind::Validation)
                .with_message(format!(
                    "image embedding {:?} (stride {}) does not match decoder layout [{channels}, {}, {}] (stride {stride})",
                    self.shape(),
                    self.stride,
                    expected_grid.0,
                    expected_grid.1,
                ))
                .with_hint("Decode an embedding with the same model that encoded it."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ImageEmbedding;
    use crate::core::error::ErrorKind;
    use ndarray::Array3;

    #[test]
    fn layout_check_accepts_matching_grid() {
        let embedding = ImageEmbedding::new(Array3::zeros((4, 3, 2)), 8, (20, 16));
        embedding.expect_layout(4, 8).expect("layout");
        assert_eq!(embedding.grid_size(), (3, 2));
        assert_eq!(embedding.shape(), &[4, 3, 2]);
        assert_eq!(embedding.dtype(), "f32");
    }

    #[test]
    fn layout_check_rejects_wrong_channels_or_stride() {
        let embedding = ImageEmbedding::new(Array3::zeros((3, 5, 4)), 4, (20, 16));
        let err = embedding.expect_layout(4, 4).expect_err("channels");
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = embedding.expect_layout(3, 8).expect_err("stride");
        assert_eq!(err.kind(), ErrorKind::Validation);
        embedding.expect_layout(3, 4).expect("layout");
    }

    #[test]
    fn cell_reads_channel_vector() {
        let mut features = Array3::zeros((2, 1, 1));
        features[[0, 0, 0]] = 0.25;
        features[[1, 0, 0]] = 0.75;
        let embedding = ImageEmbedding::new(features, 1, (1, 1));
        assert_eq!(embedding.cell(0, 0).to_vec(), vec![0.25, 0.75]);
    }
}
