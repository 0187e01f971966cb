//! Purpose: Built-in segmentation model variants and their bundled artifacts.
//! Exports: `PATCH_PROTO_16`, `PATCH_PROTO_8`, `REGION_GROW_4`, `BUILTIN_MODELS`,
//!          `PatchPrototypeModel`, `RegionGrowModel`.
//! Role: Concrete `Model` implementations consumed by `ModelRegistry::builtin`.
//! Invariants: Each artifact is a JSON parameter document whose header names the model
//!             and architecture; a header mismatch is a `Load` error.
//! Invariants: Registry order is the order of `BUILTIN_MODELS`.
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::core::error::{Error, ErrorKind};
use crate::core::model::Model;

mod grid;
pub mod patch_prototype;
pub mod region_grow;

pub use patch_prototype::PatchPrototypeModel;
pub use region_grow::RegionGrowModel;

pub const WEIGHTS_FORMAT: &str = "pointseg-weights/1";

pub static PATCH_PROTO_16: PatchPrototypeModel = PatchPrototypeModel::new(
    "patchproto:16",
    include_bytes!("../../assets/weights/patchproto-16.json"),
);

pub static PATCH_PROTO_8: PatchPrototypeModel = PatchPrototypeModel::new(
    "patchproto:8",
    include_bytes!("../../assets/weights/patchproto-8.json"),
);

pub static REGION_GROW_4: RegionGrowModel = RegionGrowModel::new(
    "regiongrow:4",
    include_bytes!("../../assets/weights/regiongrow-4.json"),
);

pub static BUILTIN_MODELS: [&'static dyn Model; 3] = [&PATCH_PROTO_16, &PATCH_PROTO_8, &REGION_GROW_4];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WeightsDocument<P> {
    format: String,
    architecture: String,
    name: String,
    params: P,
}

/// Decodes an artifact and checks its header against the model loading it.
pub(crate) fn parse_weights<P: DeserializeOwned>(model: &dyn Model, weights: &[u8]) -> Result<P, Error> {
    let document: WeightsDocument<P> = serde_json::from_slice(weights).map_err(|err| {
        load_error(model, "artifact is not a valid weights document").with_source(err)
    })?;
    if document.format != WEIGHTS_FORMAT {
        return Err(load_error(
            model,
            format!("unsupported weights format '{}'", document.format),
        ));
    }
    if document.architecture != model.architecture() {
        return Err(load_error(
            model,
            format!(
                "artifact architecture '{}' does not match '{}'",
                document.architecture,
                model.architecture()
            ),
        ));
    }
    if document.name != model.name() {
        return Err(load_error(
            model,
            format!("artifact belongs to '{}'", document.name),
        ));
    }
    Ok(document.params)
}

pub(crate) fn load_error(model: &dyn Model, message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Load)
        .with_message(message)
        .with_model(model.name())
}
