//! Moving the running build to a selected release
//!
//! - [`installer`]: `Installer` trait and the download → install → restart flow
//! - [`github`]: `Installer` backed by GitHub release assets
//! - [`progress`]: Download events and progress folding
//! - [`error`]: Install error type

pub mod error;
pub mod github;
pub mod installer;
pub mod progress;

pub use error::InstallError;
pub use github::GitHubInstaller;
pub use installer::{InstallFlow, Installer, ManagedDownload};
pub use progress::{DownloadEvent, ProgressTracker};
