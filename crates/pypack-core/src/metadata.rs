use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;

use crate::registry::{RawPackage, RawReleaseFile};
use crate::version::release_order;

pub const MAX_LISTED_VERSIONS: usize = 5;
pub const NO_VERSIONS: &str = "N/A";
pub const UNKNOWN: &str = "Unknown";
pub const NO_SUMMARY: &str = "No description available";
pub const NO_LONG_DESCRIPTION: &str = "No detailed description available";

/// Canonical view of one registry package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRecord {
    pub name: String,
    pub summary: String,
    /// Newest first, at most [`MAX_LISTED_VERSIONS`], never empty.
    pub versions: Vec<String>,
    pub author: String,
    pub project_url: String,
    pub long_description: String,
    pub icon_ref: String,
    /// `YYYY-MM-DD` of the newest release, or [`UNKNOWN`].
    pub upload_date: String,
}

impl PackageRecord {
    #[must_use]
    pub fn latest_version(&self) -> &str {
        self.versions.first().map_or(NO_VERSIONS, String::as_str)
    }

    #[must_use]
    pub fn has_known_upload_date(&self) -> bool {
        self.upload_date != UNKNOWN
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Turn a raw registry document into a [`PackageRecord`]. Pure and
/// deterministic; `requested_name` is used only when the document carries no
/// name of its own.
#[must_use]
pub fn normalize(requested_name: &str, raw: &RawPackage) -> PackageRecord {
    let name = non_blank(raw.info.name.as_deref())
        .unwrap_or(requested_name)
        .to_string();

    let mut all_versions: Vec<&String> = raw.releases.keys().collect();
    all_versions.sort_by(|a, b| release_order(b, a).then_with(|| b.cmp(a)));

    let upload_date = all_versions
        .first()
        .and_then(|latest| raw.releases.get(*latest))
        .and_then(|files| files.first())
        .and_then(format_upload_date)
        .unwrap_or_else(|| UNKNOWN.to_string());

    let mut versions: Vec<String> = all_versions
        .into_iter()
        .take(MAX_LISTED_VERSIONS)
        .cloned()
        .collect();
    if versions.is_empty() {
        versions.push(NO_VERSIONS.to_string());
    }

    PackageRecord {
        summary: non_blank(raw.info.summary.as_deref())
            .unwrap_or(NO_SUMMARY)
            .to_string(),
        author: non_blank(raw.info.author.as_deref())
            .unwrap_or(UNKNOWN)
            .to_string(),
        project_url: non_blank(raw.info.project_url.as_deref())
            .map_or_else(|| format!("https://pypi.org/project/{name}/"), str::to_string),
        long_description: match raw.info.description.as_deref() {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => NO_LONG_DESCRIPTION.to_string(),
        },
        icon_ref: format!("{}.png", name.to_lowercase()),
        versions,
        upload_date,
        name,
    }
}

fn format_upload_date(file: &RawReleaseFile) -> Option<String> {
    let raw = file.upload_time.as_deref()?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.format("%Y-%m-%d").to_string());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|parsed| parsed.format("%Y-%m-%d").to_string())
}
