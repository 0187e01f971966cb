//! Purpose: Public entry point for managing and running local segmentation models.
//! Exports: `LocalModels`, `PullReport`.
//! Role: Binds a model directory and an artifact source to the registry, store and
//!       pipeline; the CLI is a thin presenter over these calls.
//! Invariants: Every operation resolves the model name before touching the filesystem.
//! Invariants: Construction performs no I/O.
#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};

use crate::core::artifact::{ArtifactInfo, ArtifactStore, PullOutcome};
use crate::core::error::Error;
use crate::core::image_io::FileImageLoader;
use crate::core::model::Model;
use crate::core::pipeline::{InferencePipeline, Segmentation};
use crate::core::registry::{ModelRegistry, ModelRow};
use crate::core::transport::{ArtifactSource, transport_for};
use crate::model_paths::default_model_dir;

pub type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PullReport {
    pub name: &'static str,
    pub id: String,
    pub path: PathBuf,
    pub info: ArtifactInfo,
    pub outcome: PullOutcome,
}

#[derive(Clone)]
pub struct LocalModels {
    model_dir: PathBuf,
    source: ArtifactSource,
    registry: ModelRegistry,
}

impl LocalModels {
    pub fn new() -> Self {
        Self {
            model_dir: default_model_dir(),
            source: ArtifactSource::Bundled,
            registry: ModelRegistry::builtin(),
        }
    }

    pub fn with_model_dir(mut self, model_dir: impl Into<PathBuf>) -> Self {
        self.model_dir = model_dir.into();
        self
    }

    pub fn with_source(mut self, source: ArtifactSource) -> Self {
        self.source = source;
        self
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn source(&self) -> &ArtifactSource {
        &self.source
    }

    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.model_dir)
    }

    pub fn resolve(&self, name: &str) -> ApiResult<&'static dyn Model> {
        self.registry.resolve(name)
    }

    pub fn list(&self, include_unpulled: bool) -> ApiResult<Vec<ModelRow>> {
        self.registry.list(&self.store(), include_unpulled)
    }

    pub fn pull(&self, name: &str) -> ApiResult<PullReport> {
        let model = self.registry.resolve(name)?;
        let transport = transport_for(&self.source);
        tracing::info!(model = model.name(), source = %self.source, "pulling model");
        let store = self.store();
        let (info, outcome) = store.pull(model, transport.as_ref())?;
        tracing::info!(model = model.name(), size = info.size, ?outcome, "model ready");
        Ok(PullReport {
            name: model.name(),
            id: model.id(),
            path: store.artifact_path(model),
            info,
            outcome,
        })
    }

    pub fn remove(&self, name: &str) -> ApiResult<&'static dyn Model> {
        let model = self.registry.resolve(name)?;
        self.store().remove(model)?;
        tracing::info!(model = model.name(), "model removed");
        Ok(model)
    }

    /// Segments `image_path` with `name`, pulling the model first if needed.
    pub fn run(&self, name: &str, image_path: &Path, prompt_json: &str) -> ApiResult<Segmentation> {
        let store = self.store();
        let transport = transport_for(&self.source);
        InferencePipeline::new(self.registry, &store, transport.as_ref(), FileImageLoader)
            .run(name, image_path, prompt_json)
    }
}

impl Default for LocalModels {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::LocalModels;
    use crate::core::artifact::PullOutcome;
    use crate::core::error::ErrorKind;
    use crate::core::transport::ArtifactSource;
    use image::RgbImage;

    #[test]
    fn pull_list_remove_flow() {
        let dir = tempfile::tempdir().expect("tempdir");
        let models = LocalModels::new().with_model_dir(dir.path());

        let report = models.pull("patchproto:8").expect("pull");
        assert_eq!(report.outcome, PullOutcome::Fetched);
        assert_eq!(report.id.len(), 12);
        let again = models.pull("patchproto:8").expect("pull");
        assert_eq!(again.outcome, PullOutcome::AlreadyPresent);

        let rows = models.list(false).expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "patchproto:8");
        assert_eq!(rows[0].size, Some(report.info.size));

        models.remove("patchproto:8").expect("remove");
        assert!(models.list(false).expect("list").is_empty());
        let err = models.remove("patchproto:8").err().expect("absent");
        assert_eq!(err.kind(), ErrorKind::NotPulled);
    }

    #[test]
    fn unknown_names_fail_without_creating_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let models = LocalModels::new().with_model_dir(dir.path().join("models"));
        for err in [
            models.pull("nonexistent-model").err().expect("pull"),
            models.remove("nonexistent-model").err().expect("remove"),
        ] {
            assert_eq!(err.kind(), ErrorKind::ModelNotFound);
        }
        assert!(!dir.path().join("models").exists());
    }

    #[test]
    fn pull_from_mirror_directory() {
        let mirror = tempfile::tempdir().expect("mirror");
        let cache = tempfile::tempdir().expect("cache");
        let models = LocalModels::new()
            .with_model_dir(cache.path())
            .with_source(ArtifactSource::Directory(mirror.path().to_path_buf()));

        let err = models.pull("regiongrow:4").expect_err("empty mirror");
        assert_eq!(err.kind(), ErrorKind::Retrieval);
        assert!(models.list(false).expect("list").is_empty());

        let bundled = models.resolve("regiongrow:4").expect("resolve").bundled_artifact();
        std::fs::write(mirror.path().join("regiongrow-4.weights"), bundled).expect("mirror");
        models.pull("regiongrow:4").expect("pull");
        assert_eq!(models.list(false).expect("list").len(), 1);
    }

    #[test]
    fn run_segments_an_image_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image_path = dir.path().join("input.png");
        RgbImage::from_fn(24, 16, |x, _| {
            if x < 12 {
                image::Rgb([250, 10, 10])
            } else {
                image::Rgb([10, 10, 250])
            }
        })
        .save(&image_path)
        .expect("save");

        let models = LocalModels::new().with_model_dir(dir.path().join("models"));
        let result = models
            .run(
                "regiongrow:4",
                &image_path,
                r#"{"points": [[2, 2]], "point_labels": [1]}"#,
            )
            .expect("run");
        assert!(result.auto_pulled);
        let mask = crate::core::mask::decode_mask_b64(&result.mask_b64).expect("decode");
        assert_eq!(mask.dimensions(), (24, 16));
        assert_eq!(mask.get_pixel(0, 15).0[0], 255);
        assert_eq!(mask.get_pixel(23, 0).0[0], 0);
    }
}
