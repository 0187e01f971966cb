//! Purpose: Local on-disk cache of model artifacts.
//! Exports: `ArtifactStore`, `ArtifactInfo`, `PullOutcome`, `sha256_hex`.
//! Role: Owns the model directory; the only code that writes or deletes artifacts.
//! Invariants: An artifact is present iff `<root>/<slug>.weights` is a regular file; size
//!             and mtime are reported together or not at all.
//! Invariants: Anything else at the artifact path is an `Io` error for info, pull and remove.
//! Invariants: Installed bytes always match the model digest (temp file + fsync + rename).
//! Invariants: pull/remove for one model serialize on `<root>/.<slug>.lock` (fs2 exclusive).
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fs2::FileExt;
use libc::{EACCES, EPERM};
use sha2::{Digest, Sha256};

use crate::core::error::{Error, ErrorKind, io_error_kind};
use crate::core::model::Model;
use crate::core::transport::ArtifactTransport;
use crate::model_paths::{artifact_file_name, lock_file_name, partial_file_name};

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Size and mtime of a cached artifact; only ever observed together.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArtifactInfo {
    pub size: u64,
    pub modified_at: SystemTime,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PullOutcome {
    Fetched,
    AlreadyPresent,
    Replaced,
}

#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, model: &dyn Model) -> PathBuf {
        self.root.join(artifact_file_name(model.name()))
    }

    pub fn info(&self, model: &dyn Model) -> Result<Option<ArtifactInfo>, Error> {
        let path = self.artifact_path(model);
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(Error::new(io_error_kind(&err))
                    .with_message("failed to stat artifact")
                    .with_model(model.name())
                    .with_path(&path)
                    .with_source(err));
            }
        };
        if !meta.is_file() {
            return Err(not_a_file(model, &path));
        }
        let modified_at = meta.modified().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("artifact mtime is unavailable")
                .with_path(&path)
                .with_source(err)
        })?;
        Ok(Some(ArtifactInfo {
            size: meta.len(),
            modified_at,
        }))
    }

    pub fn get_size(&self, model: &dyn Model) -> Result<Option<u64>, Error> {
        Ok(self.info(model)?.map(|info| info.size))
    }

    pub fn get_modified_at(&self, model: &dyn Model) -> Result<Option<SystemTime>, Error> {
        Ok(self.info(model)?.map(|info| info.modified_at))
    }

    /// Fetches and installs the artifact. A valid cached copy is kept as is.
    pub fn pull(
        &self,
        model: &dyn Model,
        transport: &dyn ArtifactTransport,
    ) -> Result<(ArtifactInfo, PullOutcome), Error> {
        self.ensure_root()?;
        let _lock = self.lock(model)?;
        let path = self.artifact_path(model);
        let expected = model.digest();

        if self.info(model)?.is_none() {
            return self.fetch_and_install(model, transport, None);
        }
        let previous = match std::fs::read(&path) {
            Ok(bytes) => Some(sha256_hex(&bytes) == expected),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                return Err(Error::new(io_error_kind(&err))
                    .with_message("failed to read cached artifact")
                    .with_model(model.name())
                    .with_path(&path)
                    .with_source(err));
            }
        };
        if previous == Some(true) {
            let info = self.require_info(model)?;
            return Ok((info, PullOutcome::AlreadyPresent));
        }
        if previous == Some(false) {
            tracing::warn!(model = model.name(), "cached artifact failed verification; replacing");
        }
        self.fetch_and_install(model, transport, previous)
    }

    fn fetch_and_install(
        &self,
        model: &dyn Model,
        transport: &dyn ArtifactTransport,
        previous: Option<bool>,
    ) -> Result<(ArtifactInfo, PullOutcome), Error> {
        let expected = model.digest();
        tracing::debug!(model = model.name(), source = %transport.describe(), "fetching artifact");
        let bytes = transport.fetch(model).map_err(|err| {
            if err.kind() == ErrorKind::Retrieval {
                err
            } else {
                err.with_kind(ErrorKind::Retrieval)
            }
        })?;
        let actual = sha256_hex(&bytes);
        if actual != expected {
            return Err(Error::new(ErrorKind::Retrieval)
                .with_message(format!(
                    "artifact digest mismatch (expected {expected}, got {actual})"
                ))
                .with_model(model.name())
                .with_hint("The source served different bytes than this model version expects."));
        }
        self.install(model, &bytes)?;

        let info = self.require_info(model)?;
        let outcome = if previous.is_some() {
            PullOutcome::Replaced
        } else {
            PullOutcome::Fetched
        };
        Ok((info, outcome))
    }

    pub fn remove(&self, model: &dyn Model) -> Result<(), Error> {
        let path = self.artifact_path(model);
        if !self.root.is_dir() {
            return Err(not_pulled(model, &path));
        }
        let _lock = self.lock(model)?;
        if self.info(model)?.is_none() {
            return Err(not_pulled(model, &path));
        }
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(not_pulled(model, &path)),
            Err(err) => Err(Error::new(io_error_kind(&err))
                .with_message("failed to remove artifact")
                .with_model(model.name())
                .with_path(&path)
                .with_source(err)),
        }
    }

    /// Reads the cached artifact, refusing bytes that do not match the model digest.
    pub fn read(&self, model: &dyn Model) -> Result<Vec<u8>, Error> {
        let path = self.artifact_path(model);
        let bytes = std::fs::read(&path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                return not_pulled(model, &path);
            }
            Error::new(ErrorKind::Load)
                .with_message("failed to read artifact")
                .with_model(model.name())
                .with_path(&path)
                .with_source(err)
        })?;
        if sha256_hex(&bytes) != model.digest() {
            return Err(Error::new(ErrorKind::Load)
                .with_message("cached artifact failed verification")
                .with_model(model.name())
                .with_path(&path)
                .with_hint(format!(
                    "Re-pull it: pointseg pull {} (a mismatching copy is replaced).",
                    model.name()
                )));
        }
        Ok(bytes)
    }

    fn require_info(&self, model: &dyn Model) -> Result<ArtifactInfo, Error> {
        self.info(model)?.ok_or_else(|| {
            Error::new(ErrorKind::Internal)
                .with_message("artifact vanished right after install")
                .with_model(model.name())
        })
    }

    fn install(&self, model: &dyn Model, bytes: &[u8]) -> Result<(), Error> {
        let path = self.artifact_path(model);
        let partial = self.root.join(partial_file_name(model.name()));
        let result = write_synced(&partial, bytes).and_then(|()| {
            std::fs::rename(&partial, &path).map_err(|err| {
                Error::new(io_error_kind(&err))
                    .with_message("failed to move artifact into place")
                    .with_path(&path)
                    .with_source(err)
            })
        });
        if result.is_err() {
            let _ = std::fs::remove_file(&partial);
        }
        result.map_err(|err| err.with_model(model.name()))
    }

    fn ensure_root(&self) -> Result<(), Error> {
        std::fs::create_dir_all(&self.root).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to create model directory")
                .with_path(&self.root)
                .with_source(err)
        })
    }

    fn lock(&self, model: &dyn Model) -> Result<ArtifactLock, Error> {
        let path = self.root.join(lock_file_name(model.name()));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| {
                Error::new(io_error_kind(&err))
                    .with_message("failed to open artifact lock")
                    .with_path(&path)
                    .with_source(err)
            })?;
        file.lock_exclusive().map_err(|err| {
            Error::new(lock_error_kind(&err))
                .with_message("failed to lock artifact")
                .with_model(model.name())
                .with_path(&path)
                .with_source(err)
        })?;
        Ok(ArtifactLock { file })
    }
}

pub struct ArtifactLock {
    file: File,
}

impl Drop for ArtifactLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let io_err = |err: io::Error| {
        Error::new(io_error_kind(&err))
            .with_message("failed to write artifact")
            .with_path(path)
            .with_source(err)
    };
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    file.sync_all().map_err(io_err)
}

fn not_pulled(model: &dyn Model, path: &Path) -> Error {
    Error::new(ErrorKind::NotPulled)
        .with_message("model is not pulled")
        .with_model(model.name())
        .with_path(path)
        .with_hint("See pulled models with: pointseg list")
}

fn not_a_file(model: &dyn Model, path: &Path) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("artifact path is not a regular file")
        .with_model(model.name())
        .with_path(path)
        .with_hint("Move it out of the model directory, then pull again.")
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}
