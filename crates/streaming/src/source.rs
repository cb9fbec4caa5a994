//! Where regional GeoJSON comes from.
//!
//! Paths are relative (`geojson/{country}/{type}/manifest.json`,
//! `geojson/{country}/{type}/{region}.geojson`); each source decides how to
//! resolve them. A missing resource (HTTP 404, absent file, empty body) is
//! `Ok(None)`, never an error: regional geometry is optional by nature.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use foundation::CountryCode;

/// Boxed, single-threaded future returned by [`GeoJsonSource`].
pub type FetchFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Status { status: u16, url: String },
    Transport { url: String, message: String },
    Io { path: String, message: String },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Status { status, url } => write!(f, "HTTP {status} for {url}"),
            FetchError::Transport { url, message } => write!(f, "request to {url} failed: {message}"),
            FetchError::Io { path, message } => write!(f, "read {path} failed: {message}"),
        }
    }
}

impl std::error::Error for FetchError {}

pub trait GeoJsonSource {
    /// Fetches the raw bytes at `path`; `Ok(None)` when the resource does not exist.
    fn fetch(&self, path: &str) -> FetchFuture<'_, Result<Option<Vec<u8>>, FetchError>>;
}

pub fn manifest_path(country: &CountryCode, subdivision_type: &str) -> String {
    format!("geojson/{}/{subdivision_type}/manifest.json", country.as_str())
}

pub fn region_path(country: &CountryCode, subdivision_type: &str, region: &str) -> String {
    format!("geojson/{}/{subdivision_type}/{region}.geojson", country.as_str())
}

fn blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| b.is_ascii_whitespace())
}

/// Fetches from a static file host (`{base_url}/{path}`).
#[derive(Debug, Clone)]
pub struct HttpGeoJsonSource {
    base_url: String,
    http: reqwest::Client,
}

impl HttpGeoJsonSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl GeoJsonSource for HttpGeoJsonSource {
    fn fetch(&self, path: &str) -> FetchFuture<'_, Result<Option<Vec<u8>>, FetchError>> {
        let url = self.url_for(path);
        Box::pin(async move {
            let resp = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Transport {
                    url: url.clone(),
                    message: e.to_string(),
                })?;

            let status = resp.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url,
                });
            }

            let bytes = resp.bytes().await.map_err(|e| FetchError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;
            if blank(&bytes) {
                return Ok(None);
            }
            Ok(Some(bytes.to_vec()))
        })
    }
}

/// Reads the same layout from a local directory tree.
#[derive(Debug, Clone)]
pub struct DirGeoJsonSource {
    root: PathBuf,
}

impl DirGeoJsonSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl GeoJsonSource for DirGeoJsonSource {
    fn fetch(&self, path: &str) -> FetchFuture<'_, Result<Option<Vec<u8>>, FetchError>> {
        let full = self.root.join(path);
        Box::pin(async move {
            match tokio::fs::read(&full).await {
                Ok(bytes) if blank(&bytes) => Ok(None),
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(FetchError::Io {
                    path: full.display().to_string(),
                    message: e.to_string(),
                }),
            }
        })
    }
}

/// In-memory source with scripted failures and a request log.
#[derive(Debug, Default)]
pub struct StaticGeoJsonSource {
    resources: BTreeMap<String, Vec<u8>>,
    failing: BTreeSet<String>,
    requests: RefCell<Vec<String>>,
}

impl StaticGeoJsonSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, body: impl Into<Vec<u8>>) -> &mut Self {
        self.resources.insert(path.into(), body.into());
        self
    }

    pub fn insert_json(&mut self, path: impl Into<String>, body: &serde_json::Value) -> &mut Self {
        self.insert(path, body.to_string())
    }

    /// Requests for `path` fail with HTTP 500.
    pub fn fail(&mut self, path: impl Into<String>) -> &mut Self {
        self.failing.insert(path.into());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests.borrow().iter().filter(|p| *p == path).count()
    }
}

impl GeoJsonSource for StaticGeoJsonSource {
    fn fetch(&self, path: &str) -> FetchFuture<'_, Result<Option<Vec<u8>>, FetchError>> {
        self.requests.borrow_mut().push(path.to_string());
        let result = if self.failing.contains(path) {
            Err(FetchError::Status {
                status: 500,
                url: path.to_string(),
            })
        } else {
            Ok(self
                .resources
                .get(path)
                .filter(|b| !blank(b))
                .cloned())
        };
        Box::pin(std::future::ready(result))
    }
}
