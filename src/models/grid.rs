//! Purpose: Grid geometry shared by the built-in segmenters.
//! Exports: `normalized_rgb`, `point_to_cell`, `flood_from`, `upsample`, `weighted_distance`.
//! Role: Pixel <-> cell mapping and connectivity; no model parameters live here.
//! Invariants: Out-of-image points clamp to the nearest edge pixel before cell lookup.
//! Invariants: Upsampled masks always have exactly the embedding's image size.
use std::collections::VecDeque;

use ndarray::{Array2, Array3, ArrayView1, ArrayView3};

use crate::core::error::{Error, ErrorKind};

/// `H x W x 3` colors in `[0, 1]`. Gray inputs replicate luminance; alpha is ignored.
pub(crate) fn normalized_rgb(image: ArrayView3<'_, u8>) -> Result<Array3<f32>, Error> {
    let (height, width, channels) = image.dim();
    if height == 0 || width == 0 {
        return Err(Error::new(ErrorKind::Inference)
            .with_message(format!("image has no pixels ({width}x{height})")));
    }
    let rgb_channels: [usize; 3] = match channels {
        1 | 2 => [0, 0, 0],
        3 | 4 => [0, 1, 2],
        other => {
            return Err(Error::new(ErrorKind::Inference)
                .with_message(format!("unsupported channel count {other}")));
        }
    };
    Ok(Array3::from_shape_fn((height, width, 3), |(row, col, c)| {
        f32::from(image[[row, col, rgb_channels[c]]]) / 255.0
    }))
}

pub(crate) fn luminance(rgb: ArrayView1<'_, f32>) -> f32 {
    0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2]
}

/// Maps an `(x, y)` prompt point to `(row, col)` in a grid of `stride`-sized cells.
pub(crate) fn point_to_cell(point: [f64; 2], image_size: (usize, usize), stride: usize) -> (usize, usize) {
    let (height, width) = image_size;
    let clamp = |value: f64, len: usize| -> usize {
        let max = len.saturating_sub(1) as f64;
        value.floor().clamp(0.0, max) as usize
    };
    let x = clamp(point[0], width);
    let y = clamp(point[1], height);
    (y / stride, x / stride)
}

/// 4-connected region reachable from `seeds` through `allowed` cells.
pub(crate) fn flood_from(allowed: &Array2<bool>, seeds: &[(usize, usize)]) -> Array2<bool> {
    let mut reached = Array2::from_elem(allowed.dim(), false);
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    for &seed in seeds {
        if allowed[seed] && !reached[seed] {
            reached[seed] = true;
            queue.push_back(seed);
        }
    }
    while let Some(cell) = queue.pop_front() {
        for next in neighbors(cell, allowed.dim()) {
            if allowed[next] && !reached[next] {
                reached[next] = true;
                queue.push_back(next);
            }
        }
    }
    reached
}

pub(crate) fn neighbors(
    (row, col): (usize, usize),
    (rows, cols): (usize, usize),
) -> impl Iterator<Item = (usize, usize)> {
    let up = row.checked_sub(1).map(|r| (r, col));
    let down = (row + 1 < rows).then_some((row + 1, col));
    let left = col.checked_sub(1).map(|c| (row, c));
    let right = (col + 1 < cols).then_some((row, col + 1));
    [up, down, left, right].into_iter().flatten()
}

/// Nearest-neighbor upsampling of a cell grid back to pixel resolution.
pub(crate) fn upsample(cells: &Array2<bool>, stride: usize, image_size: (usize, usize)) -> Array2<bool> {
    Array2::from_shape_fn(image_size, |(row, col)| cells[[row / stride, col / stride]])
}

/// Euclidean distance with per-channel weights, normalized by the total weight.
pub(crate) fn weighted_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>, weights: &[f32]) -> f32 {
    let total: f32 = weights.iter().sum();
    let sum: f32 = a
        .iter()
        .zip(b.iter())
        .zip(weights)
        .map(|((x, y), w)| w * (x - y) * (x - y))
        .sum();
    if total > 0.0 {
        (sum / total).sqrt()
    } else {
        0.0
    }
}
