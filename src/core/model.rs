//! Purpose: Capability traits every segmentation model variant implements.
//! Exports: `Model`, `Segmenter`.
//! Role: `Model` is the static, registry-held descriptor (identity + artifact + loader);
//!       `Segmenter` is the loaded instance exposing the two inference stages.
//! Invariants: `encode_image` never sees a prompt; `generate_mask` never re-encodes.
//! Invariants: `id()` is derived from the artifact digest and is available before any pull.
use ndarray::ArrayView3;

use crate::core::artifact::sha256_hex;
use crate::core::embedding::ImageEmbedding;
use crate::core::error::Error;
use crate::core::mask::Mask;
use crate::core::prompt::Prompt;

const ID_LEN: usize = 12;

pub trait Model: Send + Sync {
    /// Stable registry key, e.g. `patchproto:16`.
    fn name(&self) -> &'static str;

    fn architecture(&self) -> &'static str;

    /// Canonical artifact bytes; every transport must reproduce them exactly.
    fn bundled_artifact(&self) -> &'static [u8];

    /// Builds an inference-ready instance from verified artifact bytes.
    fn load(&self, weights: &[u8]) -> Result<Box<dyn Segmenter>, Error>;

    fn digest(&self) -> String {
        sha256_hex(self.bundled_artifact())
    }

    fn id(&self) -> String {
        let mut digest = self.digest();
        digest.truncate(ID_LEN);
        digest
    }
}

pub trait Segmenter {
    /// Prompt-independent, expensive stage. `image` is `H x W x C`.
    fn encode_image(&self, image: ArrayView3<'_, u8>) -> Result<ImageEmbedding, Error>;

    /// Prompt-dependent, cheap stage; callable many times per embedding.
    fn generate_mask(&self, embedding: &ImageEmbedding, prompt: &Prompt) -> Result<Mask, Error>;
}
