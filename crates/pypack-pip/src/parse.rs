use std::path::PathBuf;

use crate::error::PipError;
use crate::types::{InstalledPackage, RuntimeInfo};

/// Interpreter snippet whose output [`parse_runtime_info`] understands.
pub(crate) const RUNTIME_INFO_SCRIPT: &str = "import platform, sys; \
print(platform.python_version()); \
print(platform.python_implementation()); \
print(sys.executable)";

pub(crate) fn clean_output(output: &str) -> String {
    output.replace("\r\n", "\n").trim().to_string()
}

pub(crate) fn parse_runtime_info(output: &str) -> Result<RuntimeInfo, PipError> {
    let mut lines = output.lines().map(str::trim).filter(|line| !line.is_empty());
    let (Some(version), Some(implementation), Some(executable)) =
        (lines.next(), lines.next(), lines.next())
    else {
        return Err(PipError::parse(
            "runtime info",
            format!("expected three lines, got {output:?}"),
        ));
    };

    Ok(RuntimeInfo {
        version: version.to_string(),
        implementation: implementation.to_string(),
        executable: PathBuf::from(executable),
    })
}

pub(crate) fn parse_pip_version(output: &str) -> Result<String, PipError> {
    let version = output.trim();
    if version.is_empty() {
        Err(PipError::parse("pip version", "empty output"))
    } else {
        Ok(version.to_string())
    }
}

/// Parse `pip list` output, preferring the JSON format and falling back to
/// the column layout.
pub(crate) fn parse_pip_list(output: &str) -> Vec<InstalledPackage> {
    parse_pip_list_json(output).unwrap_or_else(|_| parse_pip_list_columns(output))
}

fn parse_pip_list_json(output: &str) -> Result<Vec<InstalledPackage>, PipError> {
    serde_json::from_str(output.trim()).map_err(|e| PipError::parse("pip list", e.to_string()))
}

fn parse_pip_list_columns(output: &str) -> Vec<InstalledPackage> {
    output
        .lines()
        .skip(2)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let version = parts.next().unwrap_or("Unknown");
            Some(InstalledPackage::new(name, version))
        })
        .collect()
}
