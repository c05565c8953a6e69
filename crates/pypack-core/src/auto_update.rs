//! Runtime self-update: resolve the installer, download it into a private
//! temp directory, verify it, and hand it to the platform installer.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::StreamExt;
use log::{debug, info, warn};
use pypack_platform::{InstallerPlatform, LaunchOutcome};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_INSTALLER_BASE_URL: &str = "https://www.python.org/ftp/python";
pub const DEFAULT_MIN_INSTALLER_BYTES: u64 = 1_000_000;

const TEMP_PREFIX: &str = "pypack-update-";
const DOWNLOAD_START: u8 = 15;
const DOWNLOAD_END: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateTaskState {
    #[default]
    Idle,
    DeterminingPlatform,
    Downloading,
    Verifying,
    Launching,
    Completed,
    Failed,
    Cancelled,
}

impl UpdateTaskState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateProgress {
    pub state: UpdateTaskState,
    pub percent: u8,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub version: String,
    pub base_url: String,
    pub min_installer_bytes: u64,
    /// Hex SHA-256 of the installer, optionally prefixed with `sha256:`.
    pub expected_sha256: Option<String>,
}

impl UpdateRequest {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            base_url: DEFAULT_INSTALLER_BASE_URL.to_string(),
            min_installer_bytes: DEFAULT_MIN_INSTALLER_BYTES,
            expected_sha256: None,
        }
    }
}

/// Result of a successful hand-off. The installer file is left on disk for
/// the external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub installer_path: PathBuf,
    pub launch: LaunchOutcome,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Automatic update is not supported on {platform}. Please use your package manager.")]
    PlatformUnsupported { platform: String },
    #[error("Downloaded installer appears to be invalid: {0}")]
    InvalidArtifact(String),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Download failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("Failed to launch installer: {0}")]
    Launch(#[source] std::io::Error),
    #[error("Update cancelled")]
    Cancelled,
}

impl UpdateError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }
}

struct ProgressReporter<'a> {
    sender: &'a mpsc::Sender<UpdateProgress>,
    last_percent: Option<u8>,
}

impl ProgressReporter<'_> {
    async fn report(&mut self, state: UpdateTaskState, percent: u8, message: impl Into<String>) {
        self.last_percent = Some(percent);
        let _ = self
            .sender
            .send(UpdateProgress {
                state,
                percent,
                message: message.into(),
            })
            .await;
    }

    async fn report_download(&mut self, version: &str, downloaded: u64, total: u64) {
        if total == 0 {
            return;
        }
        let byte_percent = u8::try_from(downloaded.min(total) * 100 / total).unwrap_or(100);
        let percent = scale_download_percent(byte_percent);
        if self.last_percent == Some(percent) {
            return;
        }
        self.report(
            UpdateTaskState::Downloading,
            percent,
            format!("Downloading Python {version} installer... {byte_percent}%"),
        )
        .await;
    }
}

/// Map a 0–100 byte percentage onto the download span of overall progress.
#[must_use]
pub fn scale_download_percent(byte_percent: u8) -> u8 {
    let span = u16::from(DOWNLOAD_END - DOWNLOAD_START);
    let scaled = u16::from(byte_percent.min(100)) * span / 100;
    DOWNLOAD_START + u8::try_from(scaled).unwrap_or(DOWNLOAD_END - DOWNLOAD_START)
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), UpdateError> {
    if cancel.is_cancelled() {
        Err(UpdateError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run the download → verify → launch pipeline.
///
/// `platform` is the installer capability resolved for this machine; `None`
/// fails immediately as unsupported. The artifact lives in a directory
/// created under `temp_root` and is removed on every error, including
/// cancellation. Only a successful launch keeps it.
///
/// # Errors
/// Returns an error for an unsupported platform, a failed or cancelled
/// download, an invalid artifact, or a failed launch.
pub async fn download_and_launch(
    client: &reqwest::Client,
    request: &UpdateRequest,
    platform: Option<Arc<dyn InstallerPlatform>>,
    temp_root: &Path,
    cancel: &CancellationToken,
    progress: mpsc::Sender<UpdateProgress>,
) -> Result<LaunchReport, UpdateError> {
    let mut reporter = ProgressReporter {
        sender: &progress,
        last_percent: None,
    };
    let version = request.version.as_str();

    reporter
        .report(
            UpdateTaskState::DeterminingPlatform,
            5,
            "Determining installer for your platform...",
        )
        .await;
    let Some(platform) = platform else {
        return Err(UpdateError::PlatformUnsupported {
            platform: pypack_platform::HostPlatform::current().to_string(),
        });
    };
    let url = platform.installer_url(&request.base_url, version);
    debug!("Resolved {} installer URL: {url}", platform.name());
    check_cancelled(cancel)?;

    reporter
        .report(
            UpdateTaskState::DeterminingPlatform,
            10,
            "Creating temporary directory...",
        )
        .await;
    std::fs::create_dir_all(temp_root).map_err(|error| {
        UpdateError::io_with_path("failed to create temp root", temp_root, &error)
    })?;
    let temp_dir = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempdir_in(temp_root)
        .map_err(|error| UpdateError::io("failed to create temp directory", error))?;
    let installer_path = temp_dir.path().join(artifact_file_name(&url));
    check_cancelled(cancel)?;

    reporter
        .report(
            UpdateTaskState::Downloading,
            DOWNLOAD_START,
            format!("Downloading Python {version} installer..."),
        )
        .await;
    info!("Downloading runtime installer from {url}");
    download_file(client, &url, &installer_path, version, cancel, &mut reporter).await?;
    check_cancelled(cancel)?;

    reporter
        .report(
            UpdateTaskState::Verifying,
            DOWNLOAD_END,
            "Verifying downloaded installer...",
        )
        .await;
    verify_artifact(&installer_path, request)?;
    check_cancelled(cancel)?;

    reporter
        .report(UpdateTaskState::Launching, 85, "Launching installer...")
        .await;
    if platform.needs_elevation() {
        reporter
            .report(
                UpdateTaskState::Launching,
                90,
                "Requesting administrator privileges...",
            )
            .await;
    }

    let launch_path = installer_path.clone();
    let launcher = Arc::clone(&platform);
    let launch = tokio::task::spawn_blocking(move || launcher.launch(&launch_path))
        .await
        .map_err(|error| UpdateError::Launch(std::io::Error::other(error.to_string())))?
        .map_err(UpdateError::Launch)?;

    // The external installer may still be reading the file.
    let kept_dir = temp_dir.keep();
    debug!("Keeping installer directory {}", kept_dir.display());

    reporter
        .report(UpdateTaskState::Completed, 95, "Installation started...")
        .await;
    info!("Runtime installer handed off ({launch:?})");

    Ok(LaunchReport {
        installer_path,
        launch,
    })
}

fn artifact_file_name(url: &str) -> &str {
    let raw_name = url.rsplit('/').next().unwrap_or("python-installer");
    Path::new(raw_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && !n.contains(".."))
        .unwrap_or("python-installer")
}

async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    version: &str,
    cancel: &CancellationToken,
    reporter: &mut ProgressReporter<'_>,
) -> Result<(), UpdateError> {
    let response = tokio::select! {
        () = cancel.cancelled() => return Err(UpdateError::Cancelled),
        response = client.get(url).send() => {
            response.map_err(|error| UpdateError::http("download request failed", error))?
        }
    };

    if !response.status().is_success() {
        return Err(UpdateError::HttpStatus(response.status()));
    }

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
        UpdateError::io_with_path("failed to create download file", dest, &error)
    })?;

    let mut stream = response.bytes_stream();
    loop {
        let chunk = tokio::select! {
            () = cancel.cancelled() => {
                info!("Installer download cancelled after {downloaded} bytes");
                return Err(UpdateError::Cancelled);
            }
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };
        let chunk = chunk.map_err(|error| UpdateError::http("download stream error", error))?;
        file.write_all(&chunk).await.map_err(|error| {
            UpdateError::io_with_path("failed to write download data", dest, &error)
        })?;
        downloaded += chunk.len() as u64;
        reporter.report_download(version, downloaded, total).await;
    }

    file.flush().await.map_err(|error| {
        UpdateError::io_with_path("failed to flush download file", dest, &error)
    })?;

    info!("Download complete: {downloaded} bytes");
    Ok(())
}

fn verify_artifact(path: &Path, request: &UpdateRequest) -> Result<(), UpdateError> {
    let size = std::fs::metadata(path)
        .map_err(|error| UpdateError::io_with_path("failed to inspect installer", path, &error))?
        .len();
    if size < request.min_installer_bytes {
        warn!(
            "Installer is {size} bytes, below the {} byte minimum",
            request.min_installer_bytes
        );
        return Err(UpdateError::InvalidArtifact(format!(
            "{size} bytes is smaller than expected"
        )));
    }

    let Some(expected) = request.expected_sha256.as_deref() else {
        return Ok(());
    };
    let expected = parse_sha256_digest(expected).ok_or_else(|| {
        UpdateError::InvalidArtifact(format!("malformed expected SHA-256 digest {expected:?}"))
    })?;
    let actual = sha256_file(path)?;
    if actual == expected {
        info!("Installer checksum verified");
        Ok(())
    } else {
        Err(UpdateError::InvalidArtifact("checksum mismatch".to_string()))
    }
}

/// Normalize a SHA-256 digest given as bare hex or `sha256:<hex>`.
#[must_use]
pub fn parse_sha256_digest(digest: &str) -> Option<String> {
    let hash = match digest.split_once(':') {
        Some((algorithm, hash)) if algorithm.eq_ignore_ascii_case("sha256") => hash,
        Some(_) => return None,
        None => digest,
    };
    if hash.len() != 64 || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(hash.to_ascii_lowercase())
}

fn sha256_file(path: &Path) -> Result<String, UpdateError> {
    let mut file = std::fs::File::open(path).map_err(|error| {
        UpdateError::io_with_path("failed to open file for checksum", path, &error)
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer).map_err(|error| {
            UpdateError::io_with_path("failed to read file for checksum", path, &error)
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// How long a launched installer's directory is kept before a later run may
/// remove it. The installer can still be reading it well after launch.
pub const STALE_DOWNLOAD_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Remove update directories under `temp_root` last modified at least
/// `max_age` ago. Directories whose age cannot be read are kept.
pub fn cleanup_stale_downloads(temp_root: &Path, max_age: Duration) {
    let Ok(entries) = std::fs::read_dir(temp_root) else {
        return;
    };
    let now = SystemTime::now();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() || !entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|metadata| metadata.modified())
            .ok()
            .map(|modified| now.duration_since(modified).unwrap_or(Duration::ZERO));
        match age {
            Some(age) if age >= max_age => {
                debug!("Cleaning up update temp dir: {}", path.display());
                let _ = std::fs::remove_dir_all(&path);
            }
            _ => debug!("Keeping recent update temp dir: {}", path.display()),
        }
    }
}
