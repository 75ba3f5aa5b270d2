//! Release indexes and how they are fetched

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::repository::Repository;
use crate::error::PluginHostError;
use crate::version;

/// Index file looked up inside a repository directory
pub const INDEX_FILE: &str = "plugins.json";

/// One published version of a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub module_id: String,
    pub version: String,
    /// Absolute archive location
    pub download_url: String,
    /// Required host version constraint
    pub requires: String,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    id: String,
    #[serde(default)]
    releases: Vec<IndexRelease>,
}

#[derive(Debug, Deserialize)]
struct IndexRelease {
    version: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    requires: String,
    url: String,
}

/// Fetches release indexes and archives for the catalog
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Releases advertised by one repository
    async fn fetch_index(&self, repository: &Repository) -> Result<Vec<Release>, PluginHostError>;

    /// Archive bytes behind a release's download URL
    async fn download(&self, url: &str) -> Result<Vec<u8>, PluginHostError>;
}

/// Directory URL of a repository; index and relative archive URLs resolve
/// against it
fn base_url(uri: &str) -> Result<Url, PluginHostError> {
    let trimmed = uri.trim();
    let with_slash = if trimmed.ends_with('/') || trimmed.ends_with(".json") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash).map_err(|e| PluginHostError::update_failure(uri, e))
}

fn index_url(uri: &str) -> Result<Url, PluginHostError> {
    let base = base_url(uri)?;
    if base.path().ends_with(".json") {
        return Ok(base);
    }
    base.join(INDEX_FILE)
        .map_err(|e| PluginHostError::update_failure(uri, e))
}

/// Parse a JSON release index published at repository `uri`
///
/// Releases whose version or constraint cannot be parsed, or whose URL
/// cannot be resolved, are dropped with a warning.
pub fn parse_index(uri: &str, json: &[u8]) -> Result<Vec<Release>, PluginHostError> {
    let entries: Vec<IndexEntry> =
        serde_json::from_slice(json).map_err(|e| PluginHostError::update_failure(uri, e))?;
    let base = base_url(uri)?;

    let mut releases = Vec::new();
    for entry in entries {
        let module_id = entry.id.trim().to_string();
        for release in entry.releases {
            if let Err(e) = version::parse_version(&release.version) {
                tracing::warn!(plugin = %module_id, error = %e, "Dropping release with bad version");
                continue;
            }
            if let Err(e) = version::satisfies("0.0.0", &release.requires, false) {
                tracing::warn!(plugin = %module_id, error = %e, "Dropping release with bad constraint");
                continue;
            }
            let download_url = match base.join(release.url.trim()) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    tracing::warn!(plugin = %module_id, url = %release.url, error = %e, "Dropping release with bad url");
                    continue;
                }
            };
            releases.push(Release {
                module_id: module_id.clone(),
                version: release.version.trim().to_string(),
                download_url,
                requires: release.requires.trim().to_string(),
                date: release.date,
            });
        }
    }
    Ok(releases)
}

/// [`ReleaseSource`] over HTTP(S), reading `file://` URLs from disk
pub struct HttpReleaseSource {
    http_client: reqwest::Client,
}

impl HttpReleaseSource {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, PluginHostError> {
        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|_| PluginHostError::update_failure(url.as_str(), "not a local path"))?;
            return Ok(tokio::fs::read(path).await?);
        }

        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl Default for HttpReleaseSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReleaseSource for HttpReleaseSource {
    async fn fetch_index(&self, repository: &Repository) -> Result<Vec<Release>, PluginHostError> {
        let url = index_url(&repository.uri)?;
        tracing::debug!(repository = %repository.id, url = %url, "Fetching release index");
        let body = self.fetch(&url).await?;
        parse_index(&repository.uri, &body)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, PluginHostError> {
        let url = Url::parse(url).map_err(|e| PluginHostError::update_failure(url, e))?;
        tracing::debug!(url = %url, "Downloading archive");
        self.fetch(&url).await
    }
}
