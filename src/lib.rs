//! Clearphone Library
//!
//! Configures Android phones for minimal distraction: removes bloatware,
//! installs a curated set of open-source apps and assigns default apps,
//! all over ADB and driven by declarative device profiles.

pub mod adb;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod controller;
pub mod device;
pub mod downloader;
pub mod error;
pub mod events;
pub mod installer;
pub mod profile;
pub mod remover;
pub mod render;
pub mod workflow;

// Re-export main types for convenience
pub use adb::AdbTransport;
pub use catalog::{AppDefinition, AppSource, AppsCatalog, load_apps_catalog};
pub use controller::{ConfigurationController, ConfigureOptions, PhoneMode, ToggleReport};
pub use device::{CommandOutput, DefaultRole, DeviceInfo, DeviceTransport};
pub use downloader::{ApkDownloader, DownloadError, Downloader, Progress};
pub use error::{ClearphoneError, Result};
pub use events::{Event, EventKind, EventLog, EventPayload, EventSink};
pub use installer::{AppInstaller, InstallSummary};
pub use profile::{DeviceProfile, PackageToRemove, ProfileSummary, load_profile};
pub use remover::{PackageRemover, RemovalOutcome, RemovalSummary};
pub use workflow::{
    CameraChoice, ConfigurationWorkflow, Phase, PhaseTracker, UserChoices, WorkflowConfig,
    WorkflowResult,
};
