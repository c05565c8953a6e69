use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, mpsc};
use std::time::Duration;

use async_trait::async_trait;
use pypack_core::{PackageRegistry, RawInfo, RawPackage, RawReleaseFile, RegistryError};
use pypack_pip::{InstalledPackage, PipError, RuntimeInfo, RuntimeProbe};

use super::{CandidateSource, TaskEvent, TaskHandle};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("test runtime should build")
}

/// Collects events up to and including the terminal one, then checks that
/// nothing follows it.
pub(crate) fn drain<T: std::fmt::Debug>(handle: &TaskHandle<T>) -> Vec<TaskEvent<T>> {
    let mut events = Vec::new();
    loop {
        let event = handle
            .next_timeout(EVENT_TIMEOUT)
            .expect("task should deliver a terminal event");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }
    assert!(
        handle.next_timeout(Duration::from_millis(50)).is_none(),
        "no event may follow the terminal event"
    );
    events
}

pub(crate) fn package(name: &str, releases: &[(&str, &str)]) -> RawPackage {
    RawPackage {
        info: RawInfo {
            name: Some(name.to_string()),
            summary: Some(format!("The {name} package")),
            author: Some("Test Author".to_string()),
            project_url: None,
            description: None,
        },
        releases: releases
            .iter()
            .map(|(version, upload_time)| {
                (
                    (*version).to_string(),
                    vec![RawReleaseFile {
                        upload_time: Some((*upload_time).to_string()),
                    }],
                )
            })
            .collect(),
    }
}

/// In-memory registry. Unknown names are `NotFound`; every request is
/// recorded.
#[derive(Default)]
pub(crate) struct FakeRegistry {
    packages: HashMap<String, Result<RawPackage, RegistryError>>,
    stall: bool,
    requested: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, raw: RawPackage) -> Self {
        let name = raw.info.name.clone().unwrap_or_default();
        self.packages.insert(name, Ok(raw));
        self
    }

    pub(crate) fn failing(mut self, name: &str, error: RegistryError) -> Self {
        self.packages.insert(name.to_string(), Err(error));
        self
    }

    /// Every lookup waits forever.
    pub(crate) fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    pub(crate) fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .expect("request log lock should not be poisoned")
            .clone()
    }
}

#[async_trait]
impl PackageRegistry for FakeRegistry {
    async fn fetch_package(&self, name: &str) -> Result<RawPackage, RegistryError> {
        self.requested
            .lock()
            .expect("request log lock should not be poisoned")
            .push(name.to_string());
        if self.stall {
            std::future::pending::<()>().await;
        }
        self.packages
            .get(name)
            .cloned()
            .unwrap_or_else(|| {
                Err(RegistryError::NotFound {
                    name: name.to_string(),
                })
            })
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StaticCandidates {
    pub(crate) search: Vec<String>,
    pub(crate) recent: Vec<String>,
    pub(crate) trending: Vec<String>,
}

impl CandidateSource for StaticCandidates {
    fn search_candidates(&self) -> Vec<String> {
        self.search.clone()
    }

    fn recent_candidates(&self) -> Vec<String> {
        self.recent.clone()
    }

    fn trending_candidates(&self) -> Vec<String> {
        self.trending.clone()
    }
}

/// Canned answers for the three runtime queries.
pub(crate) struct FakeProbe {
    pub(crate) runtime: Result<RuntimeInfo, PipError>,
    pub(crate) pip_version: Result<String, PipError>,
    pub(crate) installed: Result<Vec<InstalledPackage>, PipError>,
}

impl FakeProbe {
    pub(crate) fn healthy(version: &str) -> Self {
        Self {
            runtime: Ok(RuntimeInfo {
                version: version.to_string(),
                implementation: "CPython".to_string(),
                executable: PathBuf::from("/usr/local/bin/python3"),
            }),
            pip_version: Ok("24.0".to_string()),
            installed: Ok(vec![
                InstalledPackage::new("requests", "2.31.0"),
                InstalledPackage::new("Django", "5.0"),
                InstalledPackage::new("attrs", "23.2.0"),
            ]),
        }
    }
}

#[async_trait]
impl RuntimeProbe for FakeProbe {
    async fn runtime_info(&self) -> Result<RuntimeInfo, PipError> {
        self.runtime.clone()
    }

    async fn pip_version(&self) -> Result<String, PipError> {
        self.pip_version.clone()
    }

    async fn list_installed(&self) -> Result<Vec<InstalledPackage>, PipError> {
        self.installed.clone()
    }
}

/// Serves one download that announces `declared` bytes, sends `sent` of them
/// and then stalls until the returned sender is used or dropped. Returns the
/// base URL.
pub(crate) fn stalling_download_server(
    sent: usize,
    declared: usize,
) -> (String, mpsc::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let address = listener.local_addr().expect("listener should have an address");
    let (release, hold) = mpsc::channel::<()>();

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
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {declared}\r\n\r\n"
        );
        if stream.write_all(head.as_bytes()).is_err() || stream.write_all(&vec![7_u8; sent]).is_err()
        {
            return;
        }
        let _ = stream.flush();
        let _ = hold.recv_timeout(Duration::from_secs(30));
    });

    (format!("http://{address}"), release)
}

/// Files staged under `temp_root` by an in-flight download.
pub(crate) fn staged_files(temp_root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(temp_root)
        .into_iter()
        .flatten()
        .flatten()
        .flat_map(|dir| std::fs::read_dir(dir.path()).into_iter().flatten().flatten())
        .map(|entry| entry.path())
        .collect()
}
