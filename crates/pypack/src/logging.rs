//! Log setup for the command-line front end.
//!
//! Every run appends to one log file; once it grows past the configured size
//! it is rotated to `<name>.1` before the run starts. Warnings and errors
//! are also echoed to stderr, and `--debug` echoes everything.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

fn backup_path(log_path: &Path) -> PathBuf {
    let mut name = log_path.file_name().unwrap_or_default().to_os_string();
    name.push(".1");
    log_path.with_file_name(name)
}

/// Move an oversized log aside, replacing any previous backup. Returns
/// whether a rotation happened.
fn rotate_if_oversized(log_path: &Path, max_log_size: u64) -> io::Result<bool> {
    match std::fs::metadata(log_path) {
        Ok(metadata) if metadata.len() > max_log_size => {
            std::fs::rename(log_path, backup_path(log_path))?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

fn open_log_file(log_path: &Path) -> io::Result<File> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(log_path)
}

fn console_level(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

fn record_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .set_location_level(LevelFilter::Off)
        .add_filter_allow_str("pypack")
        .build()
}

/// Install the global logger. Records from every `pypack*` crate go to
/// `log_path` and, filtered by level, to stderr. A log file that cannot be
/// opened leaves only the stderr logger in place.
pub fn init_logging(log_path: &Path, debug_enabled: bool, max_log_size: u64) {
    let rotated = rotate_if_oversized(log_path, max_log_size);
    let config = record_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        console_level(debug_enabled),
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    let open_error = match open_log_file(log_path) {
        Ok(file) => {
            loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));
            None
        }
        Err(error) => Some(error),
    };
    let _ = CombinedLogger::init(loggers);
    set_debug_logging(debug_enabled);

    if let Some(error) = open_error {
        log::warn!("Could not open {}: {error}", log_path.display());
    }
    match rotated {
        Ok(true) => log::info!("Rotated oversized log {}", log_path.display()),
        Ok(false) => {}
        Err(error) => log::warn!("Could not rotate {}: {error}", log_path.display()),
    }
    log::debug!("Logging to {}", log_path.display());
}

/// Info and above are always recorded; `debug` adds per-item detail.
pub fn set_debug_logging(debug: bool) {
    if debug {
        log::set_max_level(LevelFilter::Debug);
    } else {
        log::set_max_level(LevelFilter::Info);
    }
}
