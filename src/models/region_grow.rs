//! Purpose: `region-grow` architecture (`regiongrow:4`).
//! Exports: `RegionGrowModel`.
//! Role: Encoder averages color per stride cell; decoder floods outward from each
//!       foreground seed while colors stay close to both the previous cell and the seed.
//! Invariants: Background seed cells never enter the mask.
//! Invariants: A cell strictly closer to a background seed color than to its own seed
//!             color stops growth.
use std::collections::VecDeque;

use ndarray::{Array2, Array3, ArrayView1, ArrayView3, s};
use serde::Deserialize;

use crate::core::embedding::ImageEmbedding;
use crate::core::error::Error;
use crate::core::mask::Mask;
use crate::core::model::{Model, Segmenter};
use crate::core::prompt::Prompt;
use crate::models::grid::{neighbors, normalized_rgb, point_to_cell, upsample, weighted_distance};
use crate::models::{load_error, parse_weights};

const CHANNELS: usize = 3;
const COLOR_WEIGHTS: [f32; CHANNELS] = [1.0, 1.0, 1.0];

pub struct RegionGrowModel {
    name: &'static str,
    artifact: &'static [u8],
}

impl RegionGrowModel {
    pub const fn new(name: &'static str, artifact: &'static [u8]) -> Self {
        Self { name, artifact }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    stride: usize,
    edge_tolerance: f32,
    seed_tolerance: f32,
}

impl Model for RegionGrowModel {
    fn name(&self) -> &'static str {
        self.name
    }

    fn architecture(&self) -> &'static str {
        "region-grow"
    }

    fn bundled_artifact(&self) -> &'static [u8] {
        self.artifact
    }

    fn load(&self, weights: &[u8]) -> Result<Box<dyn Segmenter>, Error> {
        let params: Params = parse_weights(self, weights)?;
        if params.stride == 0 {
            return Err(load_error(self, "stride must be positive"));
        }
        for (field, value) in [
            ("edge_tolerance", params.edge_tolerance),
            ("seed_tolerance", params.seed_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(load_error(self, format!("{field} must be a non-negative number")));
            }
        }
        Ok(Box::new(RegionGrow { params }))
    }
}

struct RegionGrow {
    params: Params,
}

fn color_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    weighted_distance(a, b, &COLOR_WEIGHTS)
}

impl Segmenter for RegionGrow {
    fn encode_image(&self, image: ArrayView3<'_, u8>) -> Result<ImageEmbedding, Error> {
        let rgb = normalized_rgb(image)?;
        let (height, width, _) = rgb.dim();
        let stride = self.params.stride;
        let grid = (height.div_ceil(stride), width.div_ceil(stride));

        let mut features = Array3::<f32>::zeros((CHANNELS, grid.0, grid.1));
        for (row, col) in ndarray::indices(grid) {
            let block = rgb.slice(s![
                row * stride..((row + 1) * stride).min(height),
                col * stride..((col + 1) * stride).min(width),
                ..
            ]);
            let count = (block.len() / CHANNELS) as f32;
            for channel in 0..CHANNELS {
                features[[channel, row, col]] = block.slice(s![.., .., channel]).sum() / count;
            }
        }
        Ok(ImageEmbedding::new(features, stride, (height, width)))
    }

    fn generate_mask(&self, embedding: &ImageEmbedding, prompt: &Prompt) -> Result<Mask, Error> {
        let stride = self.params.stride;
        embedding.expect_layout(CHANNELS, stride)?;
        let image_size = embedding.image_size();
        let grid = embedding.grid_size();

        let seeds: Vec<(usize, usize)> = prompt
            .foreground()
            .map(|point| point_to_cell(point, image_size, stride))
            .collect();
        let background: Vec<(usize, usize)> = prompt
            .background()
            .map(|point| point_to_cell(point, image_size, stride))
            .collect();
        let bg_colors: Vec<_> = background.iter().map(|&(r, c)| embedding.cell(r, c)).collect();

        let mut blocked = Array2::from_elem(grid, false);
        for &cell in &background {
            blocked[cell] = true;
        }

        let mut reached = Array2::from_elem(grid, false);
        let mut queue = VecDeque::new();
        for (idx, &seed) in seeds.iter().enumerate() {
            if !blocked[seed] && !reached[seed] {
                reached[seed] = true;
                queue.push_back((seed, idx));
            }
        }

        while let Some((cell, seed_idx)) = queue.pop_front() {
            let (seed_row, seed_col) = seeds[seed_idx];
            let seed_color = embedding.cell(seed_row, seed_col);
            let current = embedding.cell(cell.0, cell.1);
            for next in neighbors(cell, grid) {
                if reached[next] || blocked[next] {
                    continue;
                }
                let color = embedding.cell(next.0, next.1);
                let to_seed = color_distance(color, seed_color);
                let step = color_distance(color, current);
                let to_background = bg_colors
                    .iter()
                    .map(|bg| color_distance(color, bg.view()))
                    .fold(f32::INFINITY, f32::min);
                if step <= self.params.edge_tolerance
                    && to_seed <= self.params.seed_tolerance
                    && to_background >= to_seed
                {
                    reached[next] = true;
                    queue.push_back((next, seed_idx));
                }
            }
        }
        tracing::debug!(
            seeds = seeds.len(),
            cells = reached.iter().filter(|&&on| on).count(),
            "region grown"
        );
        Ok(Mask::new(upsample(&reached, stride, image_size)))
    }
}
