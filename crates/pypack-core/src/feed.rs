//! Runtime release discovery from the python.org documentation index.
//!
//! The index is an HTML page, not an API, so entries are pulled out by
//! pattern. A page that stops matching yields [`FeedError::NoEntries`]
//! rather than a silent "up to date".

use std::sync::LazyLock;

use log::{debug, info};
use regex::Regex;
use thiserror::Error;

use crate::registry::response_snippet;
use crate::version::{VersionError, compare, is_newer_version, max_version, release_series};

pub const DEFAULT_FEED_URL: &str = "https://www.python.org/doc/versions/";

static FEED_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<li><a[^>]*>Python\s+(\d+\.\d+\.\d+)</a>,\s+documentation\s+released\s+on\s+(\d+\s+\w+\s+\d{4})\.</li>",
    )
    .expect("feed entry pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub version: String,
    pub released_on: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeUpdate {
    pub current_version: String,
    pub latest_version: String,
    pub released_on: String,
    pub release_notes: String,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to fetch release index: {0}")]
    Request(#[source] reqwest::Error),
    #[error("release index request failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("failed to read release index: {0}")]
    Read(#[source] reqwest::Error),
    #[error("no release entries found in release index")]
    NoEntries,
    #[error("cannot compare runtime version: {0}")]
    Version(#[from] VersionError),
}

/// Extract every `Python X.Y.Z, documentation released on ...` entry.
#[must_use]
pub fn parse_feed(html: &str) -> Vec<FeedEntry> {
    FEED_ENTRY
        .captures_iter(html)
        .map(|caps| FeedEntry {
            version: caps[1].to_string(),
            released_on: caps[2].to_string(),
        })
        .collect()
}

/// Newest entry in the same `major.minor` series as `current`.
///
/// # Errors
/// Returns an error when `current` is not a dotted numeric version.
pub fn latest_in_series<'a>(
    entries: &'a [FeedEntry],
    current: &str,
) -> Result<Option<&'a FeedEntry>, VersionError> {
    compare(current, current)?;
    let Some(series) = release_series(current) else {
        return Ok(None);
    };

    let in_series: Vec<&FeedEntry> = entries
        .iter()
        .filter(|entry| release_series(&entry.version).as_deref() == Some(series.as_str()))
        .collect();
    let versions = in_series.iter().copied().map(|entry| entry.version.as_str());
    let Some(newest) = max_version(versions) else {
        return Ok(None);
    };
    Ok(in_series.into_iter().find(|entry| entry.version == newest))
}

/// Decide from an already-fetched index page whether `current` has a newer
/// patch release.
///
/// # Errors
/// Returns [`FeedError::NoEntries`] when the page has no recognizable entries
/// and [`FeedError::Version`] when `current` cannot be compared.
pub fn update_from_feed(html: &str, current: &str) -> Result<Option<RuntimeUpdate>, FeedError> {
    let entries = parse_feed(html);
    if entries.is_empty() {
        return Err(FeedError::NoEntries);
    }
    debug!("Release index lists {} versions", entries.len());

    let Some(latest) = latest_in_series(&entries, current)? else {
        debug!("No releases listed for the series of {current}");
        return Ok(None);
    };

    if !is_newer_version(&latest.version, current)? {
        debug!("Runtime {current} is current (latest {})", latest.version);
        return Ok(None);
    }

    info!("Runtime update available: {current} -> {}", latest.version);
    Ok(Some(RuntimeUpdate {
        current_version: current.to_string(),
        latest_version: latest.version.clone(),
        released_on: latest.released_on.clone(),
        release_notes: release_notes(&latest.version, &latest.released_on),
    }))
}

fn release_notes(version: &str, released_on: &str) -> String {
    let compact: String = version.chars().filter(|c| *c != '.').collect();
    format!(
        "Python {version} is available!\n\n\
         This release was published on {released_on} and contains bug fixes and \
         improvements over your current version.\n\n\
         Documentation: https://docs.python.org/release/{version}/\n\
         Download: https://www.python.org/downloads/release/python-{compact}/"
    )
}

/// Fetch the release index and check it for a newer release of `current`.
///
/// # Errors
/// Returns an error when the request fails, the page has no entries, or the
/// current version cannot be compared.
pub async fn check_for_update(
    client: &reqwest::Client,
    feed_url: &str,
    current: &str,
) -> Result<Option<RuntimeUpdate>, FeedError> {
    let response = client
        .get(feed_url)
        .send()
        .await
        .map_err(FeedError::Request)?;

    if !response.status().is_success() {
        let status = response.status();
        let body_snippet = response
            .text()
            .await
            .ok()
            .map(|body| response_snippet(&body, 160))
            .unwrap_or_default();
        return Err(FeedError::HttpStatus {
            status,
            body_snippet,
        });
    }

    let html = response.text().await.map_err(FeedError::Read)?;
    update_from_feed(&html, current)
}
