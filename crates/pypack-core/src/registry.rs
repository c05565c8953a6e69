use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_REGISTRY_URL: &str = "https://pypi.org";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Package not found: {name}")]
    NotFound { name: String },

    #[error("Network error fetching {name}: {details}")]
    Network { name: String, details: String },

    #[error("Unexpected registry response for {name}: {details}")]
    Decode { name: String, details: String },
}

impl RegistryError {
    fn not_found(name: &str) -> Self {
        Self::NotFound {
            name: name.to_string(),
        }
    }

    fn network(name: &str, details: impl std::fmt::Display) -> Self {
        Self::Network {
            name: name.to_string(),
            details: details.to_string(),
        }
    }

    fn decode(name: &str, details: impl std::fmt::Display) -> Self {
        Self::Decode {
            name: name.to_string(),
            details: details.to_string(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReleaseFile {
    #[serde(default)]
    pub upload_time: Option<String>,
}

/// Package document as returned by `GET /pypi/{name}/json`.
#[derive(Debug, Clone, Default)]
pub struct RawPackage {
    pub info: RawInfo,
    pub releases: HashMap<String, Vec<RawReleaseFile>>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    info: Option<RawInfo>,
    #[serde(default)]
    releases: HashMap<String, Vec<RawReleaseFile>>,
}

/// Source of raw package documents.
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    async fn fetch_package(&self, name: &str) -> Result<RawPackage, RegistryError>;
}

/// HTTP client for the registry's per-package JSON endpoint. Issues exactly
/// one request per lookup; retrying is left to the caller.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    #[must_use]
    pub fn package_url(&self, name: &str) -> String {
        format!("{}/pypi/{name}/json", self.base_url)
    }

    /// Fetch the raw document for one package.
    ///
    /// # Errors
    /// `NotFound` for a 404, an invalid project name or a body without an
    /// `info` object; `Network` for transport failures and other statuses;
    /// `Decode` when the body is not the expected JSON.
    pub async fn fetch_package(&self, name: &str) -> Result<RawPackage, RegistryError> {
        if !is_valid_project_name(name) {
            debug!("Skipping lookup for invalid project name {name:?}");
            return Err(RegistryError::not_found(name));
        }

        let response = self
            .client
            .get(self.package_url(name))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| RegistryError::network(name, error))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::not_found(name));
        }
        if !status.is_success() {
            let snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(RegistryError::network(name, format!("HTTP {status}{snippet}")));
        }

        let body = response
            .text()
            .await
            .map_err(|error| RegistryError::network(name, error))?;
        decode_package(name, &body)
    }
}

#[async_trait]
impl PackageRegistry for RegistryClient {
    async fn fetch_package(&self, name: &str) -> Result<RawPackage, RegistryError> {
        RegistryClient::fetch_package(self, name).await
    }
}

/// Decode a package document body.
///
/// # Errors
/// `Decode` for malformed JSON, `NotFound` when there is no `info` object.
pub fn decode_package(name: &str, body: &str) -> Result<RawPackage, RegistryError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|error| RegistryError::decode(name, error))?;
    let info = envelope.info.ok_or_else(|| RegistryError::not_found(name))?;
    Ok(RawPackage {
        info,
        releases: envelope.releases,
    })
}

fn is_valid_project_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

pub(crate) fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

#[cfg(test)]
mod tests {
    use super::{RegistryError, decode_package, is_valid_project_name};

    #[test]
    fn decode_reads_info_and_releases() {
        let body = r#"{
            "info": {"name": "requests", "summary": "HTTP for Humans.", "author": null},
            "releases": {"2.32.3": [{"upload_time": "2024-05-29T15:37:49"}], "2.0.0": []}
        }"#;

        let package = decode_package("requests", body).expect("valid document should decode");
        assert_eq!(package.info.name.as_deref(), Some("requests"));
        assert_eq!(package.info.author, None);
        assert_eq!(package.releases.len(), 2);
        assert_eq!(
            package.releases["2.32.3"][0].upload_time.as_deref(),
            Some("2024-05-29T15:37:49")
        );
    }

    #[test]
    fn decode_without_info_is_not_found() {
        let result = decode_package("ghost", r#"{"message": "Not Found"}"#);
        assert_eq!(
            result.map(|_| ()),
            Err(RegistryError::NotFound {
                name: "ghost".to_string()
            })
        );
    }

    #[test]
    fn decode_rejects_malformed_json() {
        let result = decode_package("broken", "<html>oops</html>");
        assert!(matches!(result, Err(RegistryError::Decode { ref name, .. }) if name == "broken"));
    }

    #[test]
    fn project_names_follow_registry_charset() {
        assert!(is_valid_project_name("scikit-learn"));
        assert!(is_valid_project_name("zope.interface"));
        assert!(!is_valid_project_name("two words"));
        assert!(!is_valid_project_name("../etc"));
        assert!(!is_valid_project_name(""));
    }
}
