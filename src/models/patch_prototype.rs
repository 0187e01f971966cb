//! Purpose: `patch-prototype` architecture (`patchproto:16`, `patchproto:8`).
//! Exports: `PatchPrototypeModel`.
//! Role: Encoder summarizes square patches (mean R, G, B + texture); decoder labels
//!       patches by nearest prompt prototype and keeps the part connected to a foreground seed.
//! Invariants: Embedding is `(4, ceil(H / patch), ceil(W / patch))`.
//! Invariants: A prompt without foreground points yields an all-background mask.
use std::time::Instant;

use ndarray::{Array2, Array3, ArrayView1, ArrayView3, s};
use serde::Deserialize;

use crate::core::embedding::ImageEmbedding;
use crate::core::error::Error;
use crate::core::mask::Mask;
use crate::core::model::{Model, Segmenter};
use crate::core::prompt::Prompt;
use crate::models::grid::{
    flood_from, luminance, normalized_rgb, point_to_cell, upsample, weighted_distance,
};
use crate::models::{load_error, parse_weights};

const CHANNELS: usize = 4;
const MAX_PATCH_SIZE: usize = 256;

pub struct PatchPrototypeModel {
    name: &'static str,
    artifact: &'static [u8],
}

impl PatchPrototypeModel {
    pub const fn new(name: &'static str, artifact: &'static [u8]) -> Self {
        Self { name, artifact }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    patch_size: usize,
    channel_weights: [f32; CHANNELS],
    max_distance: f32,
}

impl Model for PatchPrototypeModel {
    fn name(&self) -> &'static str {
        self.name
    }

    fn architecture(&self) -> &'static str {
        "patch-prototype"
    }

    fn bundled_artifact(&self) -> &'static [u8] {
        self.artifact
    }

    fn load(&self, weights: &[u8]) -> Result<Box<dyn Segmenter>, Error> {
        let params: Params = parse_weights(self, weights)?;
        if params.patch_size == 0 || params.patch_size > MAX_PATCH_SIZE {
            return Err(load_error(
                self,
                format!("patch_size must be in 1..={MAX_PATCH_SIZE}"),
            ));
        }
        if params
            .channel_weights
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
            || params.channel_weights.iter().sum::<f32>() <= 0.0
        {
            return Err(load_error(
                self,
                "channel_weights must be finite, non-negative and not all zero",
            ));
        }
        if !params.max_distance.is_finite() || params.max_distance <= 0.0 {
            return Err(load_error(self, "max_distance must be a positive number"));
        }
        Ok(Box::new(PatchPrototype { params }))
    }
}

struct PatchPrototype {
    params: Params,
}

impl PatchPrototype {
    fn distance(&self, a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
        weighted_distance(a, b, &self.params.channel_weights)
    }

    fn nearest(&self, cell: ArrayView1<'_, f32>, prototypes: &[ArrayView1<'_, f32>]) -> f32 {
        prototypes
            .iter()
            .map(|proto| self.distance(cell, proto.view()))
            .fold(f32::INFINITY, f32::min)
    }
}

impl Segmenter for PatchPrototype {
    fn encode_image(&self, image: ArrayView3<'_, u8>) -> Result<ImageEmbedding, Error> {
        let started = Instant::now();
        let rgb = normalized_rgb(image)?;
        let (height, width, _) = rgb.dim();
        let patch = self.params.patch_size;
        let (grid_h, grid_w) = (height.div_ceil(patch), width.div_ceil(patch));

        let mut features = Array3::<f32>::zeros((CHANNELS, grid_h, grid_w));
        for row in 0..grid_h {
            for col in 0..grid_w {
                let rows = row * patch..((row + 1) * patch).min(height);
                let cols = col * patch..((col + 1) * patch).min(width);
                let block = rgb.slice(s![rows, cols, ..]);
                let count = (block.len() / 3) as f32;

                let mut mean = [0.0f32; 3];
                for pixel in block.rows() {
                    for (acc, value) in mean.iter_mut().zip(pixel.iter()) {
                        *acc += value;
                    }
                }
                mean.iter_mut().for_each(|acc| *acc /= count);

                let mean_luma = luminance(ndarray::aview1(&mean));
                let texture = block
                    .rows()
                    .into_iter()
                    .map(|pixel| (luminance(pixel) - mean_luma).abs())
                    .sum::<f32>()
                    / count;

                features[[0, row, col]] = mean[0];
                features[[1, row, col]] = mean[1];
                features[[2, row, col]] = mean[2];
                features[[3, row, col]] = texture;
            }
        }
        tracing::debug!(
            grid = ?(grid_h, grid_w),
            patch,
            elapsed_us = started.elapsed().as_micros() as u64,
            "patch features computed"
        );
        Ok(ImageEmbedding::new(features, patch, (height, width)))
    }

    fn generate_mask(&self, embedding: &ImageEmbedding, prompt: &Prompt) -> Result<Mask, Error> {
        let patch = self.params.patch_size;
        embedding.expect_layout(CHANNELS, patch)?;
        let image_size = embedding.image_size();
        let grid = embedding.grid_size();

        let fg_cells: Vec<(usize, usize)> = prompt
            .foreground()
            .map(|point| point_to_cell(point, image_size, patch))
            .collect();
        let bg_cells: Vec<(usize, usize)> = prompt
            .background()
            .map(|point| point_to_cell(point, image_size, patch))
            .collect();
        if fg_cells.is_empty() {
            return Ok(Mask::new(Array2::from_elem(image_size, false)));
        }

        let fg_protos: Vec<_> = fg_cells.iter().map(|&(r, c)| embedding.cell(r, c)).collect();
        let bg_protos: Vec<_> = bg_cells.iter().map(|&(r, c)| embedding.cell(r, c)).collect();

        let mut allowed = Array2::from_shape_fn(grid, |(row, col)| {
            let cell = embedding.cell(row, col);
            let d_fg = self.nearest(cell.view(), &fg_protos);
            let d_bg = self.nearest(cell, &bg_protos);
            d_fg <= self.params.max_distance && d_fg <= d_bg
        });
        for &cell in &fg_cells {
            allowed[cell] = true;
        }
        for &cell in &bg_cells {
            allowed[cell] = false;
        }

        let cells = flood_from(&allowed, &fg_cells);
        Ok(Mask::new(upsample(&cells, patch, image_size)))
    }
}
