//! Purpose: Fixed catalog of supported models and per-model listing rows.
//! Exports: `ModelRegistry`, `ModelRow`.
//! Role: Name resolution for every operation; joins catalog entries with cache state.
//! Invariants: Names are unique and ordering is the catalog order.
//! Invariants: Resolution is exact and case-sensitive.
use std::time::SystemTime;

use crate::core::artifact::ArtifactStore;
use crate::core::error::{Error, ErrorKind};
use crate::core::model::Model;
use crate::models::BUILTIN_MODELS;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModelRow {
    pub name: &'static str,
    pub id: String,
    pub size: Option<u64>,
    pub modified_at: Option<SystemTime>,
}

impl ModelRow {
    pub fn is_pulled(&self) -> bool {
        self.size.is_some()
    }
}

#[derive(Clone, Copy)]
pub struct ModelRegistry {
    models: &'static [&'static dyn Model],
}

impl ModelRegistry {
    pub fn new(models: &'static [&'static dyn Model]) -> Result<Self, Error> {
        for (idx, model) in models.iter().enumerate() {
            if models[..idx].iter().any(|other| other.name() == model.name()) {
                return Err(Error::new(ErrorKind::Internal)
                    .with_message("duplicate model name in registry")
                    .with_model(model.name()));
            }
        }
        Ok(Self { models })
    }

    pub fn builtin() -> Self {
        Self {
            models: &BUILTIN_MODELS,
        }
    }

    pub fn models(&self) -> &'static [&'static dyn Model] {
        self.models
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.models.iter().map(|model| model.name())
    }

    pub fn resolve(&self, name: &str) -> Result<&'static dyn Model, Error> {
        self.models
            .iter()
            .copied()
            .find(|model| model.name() == name)
            .ok_or_else(|| {
                Error::new(ErrorKind::ModelNotFound)
                    .with_message(format!("unknown model '{name}'"))
                    .with_model(name)
                    .with_hint("See available models with: pointseg list --all")
            })
    }

    pub fn list(&self, store: &ArtifactStore, include_unpulled: bool) -> Result<Vec<ModelRow>, Error> {
        let mut rows = Vec::with_capacity(self.models.len());
        for model in self.models {
            let info = store.info(*model)?;
            if info.is_none() && !include_unpulled {
                continue;
            }
            rows.push(ModelRow {
                name: model.name(),
                id: model.id(),
                size: info.map(|info| info.size),
                modified_at: info.map(|info| info.modified_at),
            });
        }
        Ok(rows)
    }
}
