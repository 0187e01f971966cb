//! Purpose: End-to-end point-prompted segmentation for one image.
//! Exports: `InferencePipeline`, `Segmentation`.
//! Role: Orchestrates resolve -> validate -> instantiate -> load image -> encode -> decode
//!       -> serialize over the registry, store, transport and image loader collaborators.
//! Invariants: Stages run in order, no retries; the first failure is the only error.
//! Invariants: Name resolution and prompt validation finish before any file I/O.
use std::path::Path;
use std::time::Instant;

use crate::core::artifact::ArtifactStore;
use crate::core::error::{Error, ErrorKind};
use crate::core::image_io::ImageLoader;
use crate::core::mask::Mask;
use crate::core::model::{Model, Segmenter};
use crate::core::prompt::Prompt;
use crate::core::registry::ModelRegistry;
use crate::core::transport::ArtifactTransport;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Segmentation {
    /// Base64 of an 8-bit grayscale PNG (0 background, 255 foreground).
    pub mask_b64: String,
    pub auto_pulled: bool,
}

pub struct InferencePipeline<'a, L> {
    registry: ModelRegistry,
    store: &'a ArtifactStore,
    transport: &'a dyn ArtifactTransport,
    loader: L,
}

impl<'a, L: ImageLoader> InferencePipeline<'a, L> {
    pub fn new(
        registry: ModelRegistry,
        store: &'a ArtifactStore,
        transport: &'a dyn ArtifactTransport,
        loader: L,
    ) -> Self {
        Self {
            registry,
            store,
            transport,
            loader,
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn run(&self, name: &str, image_path: &Path, prompt_json: &str) -> Result<Segmentation, Error> {
        let (mask, auto_pulled) = self.segment(name, image_path, prompt_json)?;
        let started = Instant::now();
        let mask_b64 = mask.to_b64()?;
        tracing::debug!(
            bytes = mask_b64.len(),
            elapsed_us = elapsed_us(started),
            "mask serialized"
        );
        Ok(Segmentation {
            mask_b64,
            auto_pulled,
        })
    }

    /// Same as `run` but returns the mask itself; the bool reports an implicit pull.
    pub fn segment(&self, name: &str, image_path: &Path, prompt_json: &str) -> Result<(Mask, bool), Error> {
        let model = self.registry.resolve(name)?;
        let prompt = Prompt::from_json(prompt_json).map_err(|err| err.with_model(name))?;
        tracing::debug!(model = name, points = prompt.len(), "prompt validated");

        let started = Instant::now();
        let (segmenter, auto_pulled) = self.instantiate(model)?;
        tracing::debug!(model = name, elapsed_us = elapsed_us(started), "model loaded");

        let started = Instant::now();
        let image = self.loader.load(image_path)?;
        tracing::debug!(
            shape = ?image.shape(),
            dtype = "u8",
            elapsed_us = elapsed_us(started),
            "image loaded"
        );

        let started = Instant::now();
        let embedding = segmenter
            .encode_image(image.view())
            .map_err(|err| inference_error(err, model))?;
        tracing::debug!(
            shape = ?embedding.shape(),
            dtype = embedding.dtype(),
            elapsed_us = elapsed_us(started),
            "image encoded"
        );

        let started = Instant::now();
        let mask = segmenter
            .generate_mask(&embedding, &prompt)
            .map_err(|err| err.with_model(model.name()))?;
        tracing::debug!(
            height = mask.height(),
            width = mask.width(),
            foreground = mask.foreground_count(),
            elapsed_us = elapsed_us(started),
            "mask decoded"
        );
        if (mask.height(), mask.width()) != embedding.image_size() {
            return Err(Error::new(ErrorKind::Inference)
                .with_message("mask size does not match the input image")
                .with_model(model.name()));
        }
        Ok((mask, auto_pulled))
    }

    fn instantiate(&self, model: &dyn Model) -> Result<(Box<dyn Segmenter>, bool), Error> {
        let (weights, auto_pulled) = match self.store.read(model) {
            Ok(weights) => (weights, false),
            Err(err) if err.kind() == ErrorKind::NotPulled => {
                tracing::info!(model = model.name(), "model not pulled; pulling");
                self.store
                    .pull(model, self.transport)
                    .map_err(|err| err.with_kind(ErrorKind::Load))?;
                (self.store.read(model)?, true)
            }
            Err(err) => return Err(err),
        };
        let segmenter = model.load(&weights)?;
        Ok((segmenter, auto_pulled))
    }
}

fn inference_error(err: Error, model: &dyn Model) -> Error {
    let err = err.with_model(model.name());
    if err.kind() == ErrorKind::Inference {
        err
    } else {
        err.with_kind(ErrorKind::Inference)
    }
}

fn elapsed_us(started: Instant) -> u64 {
    started.elapsed().as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::InferencePipeline;
    use crate::core::artifact::ArtifactStore;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::image_io::{FileImageLoader, ImageLoader};
    use crate::core::mask::{BACKGROUND, FOREGROUND, decode_mask_b64};
    use crate::core::registry::ModelRegistry;
    use crate::core::transport::BundledTransport;
    use crate::models::PATCH_PROTO_16;
    use ndarray::Array3;
    use std::cell::Cell;
    use std::path::Path;

    struct CountingLoader {
        image: Array3<u8>,
        calls: Cell<usize>,
    }

    impl CountingLoader {
        fn new(height: usize, width: usize) -> Self {
            let image = Array3::from_shape_fn((height, width, 3), |(row, col, c)| {
                ((row * 7 + col * 3 + c * 50) % 256) as u8
            });
            Self {
                image,
                calls: Cell::new(0),
            }
        }
    }

    impl ImageLoader for CountingLoader {
        fn load(&self, _path: &Path) -> Result<Array3<u8>, Error> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.image.clone())
        }
    }

    const PROMPT: &str = r#"{"points": [[10, 12]], "point_labels": [1]}"#;

    #[test]
    fn unknown_model_touches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path().join("models"));
        let pipeline = InferencePipeline::new(
            ModelRegistry::builtin(),
            &store,
            &BundledTransport,
            CountingLoader::new(8, 8),
        );
        let err = pipeline
            .run("nonexistent-model", Path::new("x.png"), PROMPT)
            .expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
        assert_eq!(pipeline.loader().calls.get(), 0);
        assert!(!store.root().exists());
    }

    #[test]
    fn invalid_prompt_fails_before_pull_and_image_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path().join("models"));
        let pipeline = InferencePipeline::new(
            ModelRegistry::builtin(),
            &store,
            &BundledTransport,
            CountingLoader::new(8, 8),
        );
        let err = pipeline
            .run(
                "patchproto:16",
                Path::new("x.png"),
                r#"{"points": [[1, 2], [3, 4]], "point_labels": [1]}"#,
            )
            .expect_err("mismatch");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(pipeline.loader().calls.get(), 0);
        assert_eq!(store.info(&PATCH_PROTO_16).expect("info"), None);
    }

    #[test]
    fn run_auto_pulls_and_produces_binary_mask() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());
        let pipeline = InferencePipeline::new(
            ModelRegistry::builtin(),
            &store,
            &BundledTransport,
            CountingLoader::new(37, 53),
        );

        let first = pipeline
            .run("patchproto:16", Path::new("ignored.png"), PROMPT)
            .expect("run");
        assert!(first.auto_pulled);
        assert!(store.info(&PATCH_PROTO_16).expect("info").is_some());

        let second = pipeline
            .run("patchproto:16", Path::new("ignored.png"), PROMPT)
            .expect("run");
        assert!(!second.auto_pulled);
        assert_eq!(first.mask_b64, second.mask_b64);

        let mask = decode_mask_b64(&first.mask_b64).expect("decode");
        assert_eq!((mask.width(), mask.height()), (53, 37));
        assert!(mask.pixels().all(|p| p.0[0] == FOREGROUND || p.0[0] == BACKGROUND));
        assert_eq!(mask.get_pixel(10, 12).0[0], FOREGROUND);
    }

    #[test]
    fn tampered_cache_is_a_load_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());
        std::fs::write(store.artifact_path(&PATCH_PROTO_16), b"{}").expect("write");
        let pipeline = InferencePipeline::new(
            ModelRegistry::builtin(),
            &store,
            &BundledTransport,
            CountingLoader::new(8, 8),
        );
        let err = pipeline
            .run("patchproto:16", Path::new("x.png"), PROMPT)
            .expect_err("tampered");
        assert_eq!(err.kind(), ErrorKind::Load);
        assert_eq!(pipeline.loader().calls.get(), 0);
    }

    #[test]
    fn missing_image_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());
        let pipeline =
            InferencePipeline::new(ModelRegistry::builtin(), &store, &BundledTransport, FileImageLoader);
        let err = pipeline
            .run("regiongrow:4", &dir.path().join("missing.png"), PROMPT)
            .expect_err("missing image");
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
