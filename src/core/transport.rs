//! Purpose: Fetch model artifacts from wherever they are published.
//! Exports: `ArtifactTransport`, `ArtifactSource`, `BundledTransport`, `DirectoryTransport`,
//!          `HttpTransport`, `transport_for`.
//! Role: Collaborator used by `ArtifactStore::pull`; knows nothing about the local cache.
//! Invariants: Every failure is `ErrorKind::Retrieval`; digest checks happen in the store.
//! Invariants: Mirror layout is `<base>/<slug>.weights` for both directories and URLs.
//! Invariants: No source yields more than `MAX_ARTIFACT_BYTES`.
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::core::error::{Error, ErrorKind};
use crate::core::model::Model;
use crate::model_paths::artifact_file_name;

pub const SOURCE_ENV: &str = "POINTSEG_SOURCE";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ARTIFACT_BYTES: u64 = 512 * 1024 * 1024;

pub trait ArtifactTransport {
    fn fetch(&self, model: &dyn Model) -> Result<Vec<u8>, Error>;

    fn describe(&self) -> String;
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ArtifactSource {
    #[default]
    Bundled,
    Directory(PathBuf),
    Http(Url),
}

impl ArtifactSource {
    /// Accepts `bundled`, `file://` URLs, `http(s)://` URLs, or a plain directory path.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "bundled" {
            return Ok(ArtifactSource::Bundled);
        }
        if !trimmed.contains("://") {
            return Ok(ArtifactSource::Directory(PathBuf::from(trimmed)));
        }
        let url = Url::parse(trimmed).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid artifact source url")
                .with_hint("Use `bundled`, a directory path, file:///dir, or http(s)://host/dir.")
                .with_source(err)
        })?;
        match url.scheme() {
            "http" | "https" => Ok(ArtifactSource::Http(with_trailing_slash(url))),
            "file" => url
                .to_file_path()
                .map(ArtifactSource::Directory)
                .map_err(|_| {
                    Error::new(ErrorKind::Usage).with_message("file source must be an absolute path")
                }),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unsupported artifact source scheme '{other}'"))
                .with_hint("Use `bundled`, a directory path, file:///dir, or http(s)://host/dir.")),
        }
    }

    pub fn from_env() -> Result<Self, Error> {
        match std::env::var(SOURCE_ENV) {
            Ok(value) => Self::parse(&value),
            Err(_) => Ok(ArtifactSource::Bundled),
        }
    }
}

impl fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactSource::Bundled => write!(f, "bundled"),
            ArtifactSource::Directory(path) => write!(f, "{}", path.display()),
            ArtifactSource::Http(url) => write!(f, "{url}"),
        }
    }
}

pub fn transport_for(source: &ArtifactSource) -> Box<dyn ArtifactTransport> {
    match source {
        ArtifactSource::Bundled => Box::new(BundledTransport),
        ArtifactSource::Directory(dir) => Box::new(DirectoryTransport::new(dir)),
        ArtifactSource::Http(url) => Box::new(HttpTransport::new(url.clone())),
    }
}

/// Serves the artifacts compiled into the binary; never touches the network.
#[derive(Clone, Copy, Debug, Default)]
pub struct BundledTransport;

impl ArtifactTransport for BundledTransport {
    fn fetch(&self, model: &dyn Model) -> Result<Vec<u8>, Error> {
        Ok(model.bundled_artifact().to_vec())
    }

    fn describe(&self) -> String {
        "bundled".to_string()
    }
}

#[derive(Clone, Debug)]
pub struct DirectoryTransport {
    dir: PathBuf,
}

impl DirectoryTransport {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl ArtifactTransport for DirectoryTransport {
    fn fetch(&self, model: &dyn Model) -> Result<Vec<u8>, Error> {
        let path = self.dir.join(artifact_file_name(model.name()));
        let file = std::fs::File::open(&path).map_err(|err| {
            Error::new(ErrorKind::Retrieval)
                .with_message("failed to read artifact from mirror directory")
                .with_model(model.name())
                .with_path(&path)
                .with_source(err)
        })?;
        read_capped(file, MAX_ARTIFACT_BYTES)
            .map_err(|err| err.with_model(model.name()).with_path(&path))
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

#[derive(Clone, Debug)]
pub struct HttpTransport {
    base_url: Url,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(base_url: Url) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
        Self {
            base_url: with_trailing_slash(base_url),
            agent,
        }
    }

    fn artifact_url(&self, model: &dyn Model) -> Result<Url, Error> {
        self.base_url
            .join(&artifact_file_name(model.name()))
            .map_err(|err| {
                Error::new(ErrorKind::Retrieval)
                    .with_message("failed to build artifact url")
                    .with_model(model.name())
                    .with_source(err)
            })
    }
}

impl ArtifactTransport for HttpTransport {
    fn fetch(&self, model: &dyn Model) -> Result<Vec<u8>, Error> {
        let url = self.artifact_url(model)?;
        tracing::debug!(url = %url, "downloading artifact");
        let response = match self.agent.get(url.as_str()).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(Error::new(ErrorKind::Retrieval)
                    .with_message(format!("artifact server answered status {code}"))
                    .with_model(model.name()));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(Error::new(ErrorKind::Retrieval)
                    .with_message("artifact download failed")
                    .with_model(model.name())
                    .with_hint("Check the --source url and your network connection.")
                    .with_source(err));
            }
        };
        read_capped(response.into_reader(), MAX_ARTIFACT_BYTES)
            .map_err(|err| err.with_model(model.name()))
    }

    fn describe(&self) -> String {
        self.base_url.to_string()
    }
}

fn read_capped(reader: impl Read, limit: u64) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut body)
        .map_err(|err| {
            Error::new(ErrorKind::Retrieval)
                .with_message("failed to read artifact body")
                .with_source(err)
        })?;
    if body.len() as u64 > limit {
        return Err(Error::new(ErrorKind::Retrieval)
            .with_message(format!("artifact exceeds the maximum download size ({limit} bytes)")));
    }
    Ok(body)
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
