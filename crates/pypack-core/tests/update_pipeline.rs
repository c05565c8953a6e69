//! End-to-end tests for the self-update pipeline against a mock download
//! server and a recording installer platform.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc as std_mpsc};
use std::time::Duration;

use pypack_core::{
    UpdateError, UpdateProgress, UpdateRequest, UpdateTaskState, download_and_launch,
};
use pypack_platform::{InstallerPlatform, LaunchOutcome};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingInstaller {
    launched: Mutex<Vec<(PathBuf, bool)>>,
}

impl InstallerPlatform for RecordingInstaller {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn installer_url(&self, base_url: &str, version: &str) -> String {
        format!("{base_url}/{version}/python-{version}-test.pkg")
    }

    fn launch(&self, installer: &Path) -> std::io::Result<LaunchOutcome> {
        self.launched
            .lock()
            .expect("launch log lock")
            .push((installer.to_path_buf(), installer.exists()));
        Ok(LaunchOutcome::Started)
    }
}

fn request(server: &MockServer) -> UpdateRequest {
    let mut request = UpdateRequest::new("3.12.10");
    request.base_url = server.uri();
    request
}

async fn run(
    request: &UpdateRequest,
    platform: Option<Arc<dyn InstallerPlatform>>,
    temp_root: &Path,
    cancel: &CancellationToken,
) -> (Result<pypack_core::LaunchReport, UpdateError>, Vec<UpdateProgress>) {
    let (tx, mut rx) = mpsc::channel(512);
    let collector = tokio::spawn(async move {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    });
    let result = download_and_launch(
        &reqwest::Client::new(),
        request,
        platform,
        temp_root,
        cancel,
        tx,
    )
    .await;
    let events = collector.await.expect("collector should finish");
    (result, events)
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map_or(0, Iterator::count)
}

#[tokio::test]
async fn successful_update_launches_installer_and_keeps_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/3.12.10/python-3.12.10-test.pkg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7_u8; 1_200_000]))
        .mount(&server)
        .await;
    let temp_root = tempfile::tempdir().expect("tempdir should be created");
    let installer = Arc::new(RecordingInstaller::default());

    let (result, events) = run(
        &request(&server),
        Some(installer.clone()),
        temp_root.path(),
        &CancellationToken::new(),
    )
    .await;

    let report = result.expect("update should succeed");
    assert_eq!(report.launch, LaunchOutcome::Started);
    assert!(report.installer_path.exists());

    let launched = installer.launched.lock().expect("launch log lock");
    assert_eq!(launched.len(), 1);
    assert!(launched[0].1, "installer should exist when launched");

    let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert!(events.iter().any(|e| e.state == UpdateTaskState::Verifying && e.percent == 80));
    assert_eq!(
        events.last().map(|e| e.state),
        Some(UpdateTaskState::Completed)
    );
}

#[tokio::test]
async fn unsupported_platform_fails_before_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let temp_root = tempfile::tempdir().expect("tempdir should be created");

    let (result, events) = run(
        &request(&server),
        None,
        temp_root.path(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(UpdateError::PlatformUnsupported { .. })));
    assert!(events.iter().all(|e| e.percent < 15));
    assert!(
        events
            .iter()
            .all(|e| e.state == UpdateTaskState::DeterminingPlatform)
    );
}

/// Announces `declared` bytes, sends `sent` of them and then stalls until
/// the returned sender is dropped.
fn stalling_download_server(sent: usize, declared: usize) -> (String, std_mpsc::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let address = listener.local_addr().expect("listener address");
    let (release, hold) = std_mpsc::channel::<()>();

    std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0_u8; 1024];
        while !request.windows(4).any(|window| window == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(read) => request.extend_from_slice(&buf[..read]),
            }
        }
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\n\r\n");
        if stream.write_all(head.as_bytes()).is_err() || stream.write_all(&vec![1_u8; sent]).is_err()
        {
            return;
        }
        let _ = stream.flush();
        let _ = hold.recv_timeout(Duration::from_secs(30));
    });

    (format!("http://{address}"), release)
}

fn staged_files(temp_root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(temp_root)
        .into_iter()
        .flatten()
        .flatten()
        .flat_map(|dir| std::fs::read_dir(dir.path()).into_iter().flatten().flatten())
        .map(|entry| entry.path())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_mid_stream_removes_partial_artifact() {
    let (base_url, release) = stalling_download_server(300 * 1024, 2_000_000);
    let mut request = UpdateRequest::new("3.12.10");
    request.base_url = base_url;
    let temp_root = tempfile::tempdir().expect("tempdir should be created");
    let installer = Arc::new(RecordingInstaller::default());
    let cancel = CancellationToken::new();

    let (tx, mut rx) = mpsc::channel::<UpdateProgress>(512);
    let trigger = cancel.clone();
    let root = temp_root.path().to_path_buf();
    let watcher = tokio::spawn(async move {
        let mut staged_at_cancel = Vec::new();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            if event.percent > 15 && !trigger.is_cancelled() {
                staged_at_cancel = staged_files(&root);
                trigger.cancel();
            }
            events.push(event);
        }
        (staged_at_cancel, events)
    });

    let result = download_and_launch(
        &reqwest::Client::new(),
        &request,
        Some(installer.clone()),
        temp_root.path(),
        &cancel,
        tx,
    )
    .await;
    let (staged_at_cancel, events) = watcher.await.expect("watcher should finish");
    drop(release);

    assert!(matches!(result, Err(UpdateError::Cancelled)));
    assert_eq!(staged_at_cancel.len(), 1, "download should be partly written");
    assert!(
        events
            .iter()
            .any(|e| e.state == UpdateTaskState::Downloading && e.percent > 15)
    );
    assert_eq!(entries(temp_root.path()), 0, "temp directory should be removed");
    assert!(installer.launched.lock().expect("launch log lock").is_empty());
}

#[tokio::test]
async fn undersized_installer_is_rejected_and_removed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>error page</html>"))
        .mount(&server)
        .await;
    let temp_root = tempfile::tempdir().expect("tempdir should be created");
    let installer = Arc::new(RecordingInstaller::default());

    let (result, _) = run(
        &request(&server),
        Some(installer.clone()),
        temp_root.path(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(UpdateError::InvalidArtifact(_))));
    assert_eq!(entries(temp_root.path()), 0);
    assert!(installer.launched.lock().expect("launch log lock").is_empty());
}

#[tokio::test]
async fn missing_installer_reports_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let temp_root = tempfile::tempdir().expect("tempdir should be created");

    let (result, _) = run(
        &request(&server),
        Some(Arc::new(RecordingInstaller::default())),
        temp_root.path(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(
        result,
        Err(UpdateError::HttpStatus(status)) if status == reqwest::StatusCode::NOT_FOUND
    ));
    assert_eq!(entries(temp_root.path()), 0);
}
