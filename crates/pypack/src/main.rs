use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{info, warn};
use pypack::tasks::{EnvironmentInfo, StartOutcome, TaskEvent};
use pypack::{App, AppError, AppSettings, logging};
use pypack_core::PackageRecord;
use pypack_core::auto_update::{STALE_DOWNLOAD_AGE, cleanup_stale_downloads};
use pypack_platform::AppPaths;
use tokio::runtime::Runtime;

/// Browse PyPI packages and keep the local Python runtime up to date.
#[derive(Parser)]
#[command(name = "pypack", version, about)]
struct Cli {
    /// Record debug-level detail in the log file.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look a package up by name, falling back to well-known packages that
    /// contain the query.
    Search { query: String },

    /// Recently released versions of popular packages, newest first.
    Recent,

    /// Packages that are currently popular.
    Trending,

    /// Show the local Python runtime, pip and installed packages.
    Env,

    /// Download and launch the installer for a newer Python release.
    Update {
        /// Release to install; defaults to the newest patch release of the
        /// current series.
        #[arg(long)]
        version: Option<String>,

        /// Expected SHA-256 of the installer, as hex or `sha256:<hex>`.
        #[arg(long)]
        sha256: Option<String>,
    },

    /// Install a package with pip.
    Install {
        name: String,

        #[arg(long)]
        version: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = AppSettings::load();

    let paths = match AppPaths::new() {
        Ok(paths) => paths,
        Err(error) => {
            eprintln!("error: {error}");
            return ExitCode::FAILURE;
        }
    };
    let dirs_ready = paths.ensure_dirs();
    logging::init_logging(
        &paths.log_file(),
        cli.debug || settings.debug_logging,
        settings.max_log_size_bytes,
    );
    if let Err(error) = dirs_ready {
        warn!("Failed to create application directories: {error}");
    } else if !paths.settings_file().exists()
        && let Err(error) = settings.save_to(&paths.settings_file())
    {
        warn!("Failed to write default settings: {error}");
    }
    cleanup_stale_downloads(&paths.downloads_dir(), STALE_DOWNLOAD_AGE);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("error: failed to start async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };
    let result = App::new(settings, paths.downloads_dir(), runtime.handle().clone())
        .and_then(|app| run(cli.command, &app, &runtime));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, app: &App, runtime: &Runtime) -> Result<(), AppError> {
    match command {
        Command::Search { query } => {
            let records = wait_for(runtime, app.start_search(&query))?;
            if records.is_empty() {
                println!("No packages found for \"{query}\".");
            }
            print_records(&records);
        }
        Command::Recent => print_records(&wait_for(runtime, app.start_recent())?),
        Command::Trending => print_records(&wait_for(runtime, app.start_trending())?),
        Command::Env => print_environment(&wait_for(runtime, app.start_environment_scan())?),
        Command::Update { version, sha256 } => {
            let version = match version {
                Some(version) => version,
                None => match newest_runtime(app, runtime)? {
                    Some(version) => version,
                    None => return Ok(()),
                },
            };
            let (outcome, state) = app.start_runtime_update(&version, sha256);
            let report = wait_for(runtime, outcome)?;
            info!("Update task ended in state {:?}", *state.borrow());
            println!(
                "Python {version} installer has been launched from {}. \
                 Please complete the installation as required.",
                report.installer_path.display()
            );
        }
        Command::Install { name, version } => {
            let output = wait_for(runtime, app.start_install(&name, version))?;
            println!("{output}");
        }
    }
    Ok(())
}

/// Version to update to, or `None` when the runtime is already current.
fn newest_runtime(app: &App, runtime: &Runtime) -> Result<Option<String>, AppError> {
    let environment = wait_for(runtime, app.start_environment_scan())?;
    if let Some(error) = environment.update_error {
        return Err(AppError::message(error));
    }
    match environment.latest_version {
        Some(latest) if environment.update_available => Ok(Some(latest)),
        _ => {
            println!(
                "Python {} is already the newest release in its series.",
                environment.runtime_version
            );
            Ok(None)
        }
    }
}

/// Poll a task's events on this thread until it finishes, relaying Ctrl-C as
/// a cancellation request.
fn wait_for<T>(runtime: &Runtime, outcome: StartOutcome<T>) -> Result<T, AppError> {
    let handle = match outcome {
        StartOutcome::Started(handle) => handle,
        StartOutcome::AlreadyRunning(kind) => {
            return Err(AppError::message(format!(
                "{} is already running",
                kind.label()
            )));
        }
    };

    let cancel = handle.cancel_handle();
    let interrupt = runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, cancelling");
            cancel.cancel();
        }
    });

    let mut result = Err(AppError::message(format!(
        "{} ended without a result",
        handle.kind().label()
    )));
    for event in handle.events() {
        match event {
            TaskEvent::Progress { percent, message } => eprintln!("[{percent:>3}%] {message}"),
            TaskEvent::Result(value) => result = Ok(value),
            TaskEvent::Error(message) => result = Err(AppError::message(message)),
            TaskEvent::Cancelled => {
                result = Err(AppError::operation_cancelled(handle.kind().label()));
            }
        }
    }
    interrupt.abort();
    result
}

fn print_records(records: &[PackageRecord]) {
    for record in records {
        println!("{} {}", record.name, record.latest_version());
        println!("    {}", record.summary);
        println!(
            "    author: {}  uploaded: {}  versions: {}",
            record.author,
            record.upload_date,
            record.versions.join(", ")
        );
        println!("    {}", record.project_url);
    }
}

fn print_environment(environment: &EnvironmentInfo) {
    println!(
        "{} {}",
        environment.runtime_implementation, environment.runtime_version
    );
    println!("  executable: {}", environment.executable_path.display());
    println!("  install path: {}", environment.install_path.display());
    println!("  pip: {}", environment.package_manager_version);

    if environment.update_available
        && let Some(latest) = &environment.latest_version
    {
        println!("  update available: {latest}");
        if let Some(notes) = &environment.release_notes {
            for line in notes.lines() {
                println!("    {line}");
            }
        }
    } else if let Some(error) = &environment.update_error {
        println!("  update check: {error}");
    } else {
        println!("  up to date");
    }

    if let Some(error) = &environment.packages_error {
        println!("  installed packages unavailable: {error}");
        return;
    }
    println!(
        "  installed packages ({}):",
        environment.installed_packages.len()
    );
    for package in &environment.installed_packages {
        println!("    {} {}", package.name, package.version);
    }
}
