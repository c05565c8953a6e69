//! Local Python runtime introspection through the interpreter and `pip`.

mod client;
mod detection;
mod error;
mod parse;
mod types;

pub use client::{PackageInstaller, PipClient, RuntimeProbe};
pub use detection::detect_interpreter;
pub use error::PipError;
pub use types::{InstalledPackage, RuntimeInfo, sort_by_name};
