//! Application layer for pypack: the background task model, the tasks that
//! drive the registry, runtime and installer, and the settings and logging
//! the command-line front end is built on.

mod app;
mod async_helpers;
pub mod error;
pub mod logging;
pub mod settings;
pub mod tasks;

pub use app::App;
pub use error::{AppError, AppErrorDetail};
pub use settings::AppSettings;
