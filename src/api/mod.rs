//! Purpose: Define the stable public Rust API boundary for pointseg.
//! Exports: Model management and inference operations plus the types they return.
//! Role: Public, additive-only surface used by the CLI and embedding applications.
//! Invariants: Types reachable from here are the supported contract; `core` paths may move.

mod client;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::artifact::{ArtifactInfo, PullOutcome};
pub use crate::core::embedding::ImageEmbedding;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::image_io::{FileImageLoader, ImageLoader};
pub use crate::core::mask::{Mask, decode_mask_b64};
pub use crate::core::model::{Model, Segmenter};
pub use crate::core::pipeline::{InferencePipeline, Segmentation};
pub use crate::core::prompt::{PointLabel, Prompt};
pub use crate::core::registry::{ModelRegistry, ModelRow};
pub use crate::core::transport::{ArtifactSource, ArtifactTransport};
pub use client::{ApiResult, LocalModels, PullReport};
