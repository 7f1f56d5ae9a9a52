//! Error handling module for Clearphone
//!
//! Provides the fatal error taxonomy using thiserror. Every variant here aborts
//! a configuration run: the workflow catches it, records it in the result and
//! emits a single `WORKFLOW_FAILED` event.
//!
//! Per-item failures (a package that will not uninstall, an APK that fails to
//! download or install) are NOT represented here. They are reported as events
//! and tallied by the component that produced them.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal error type for Clearphone.
///
/// `Display` is the "what happened" half; [`ClearphoneError::suggestion`] is
/// the "what to do next" half.
#[derive(Error, Debug)]
pub enum ClearphoneError {
    /// Device profile file does not exist
    #[error("Profile not found: {}", path.display())]
    ProfileNotFound { path: PathBuf },

    /// Device profile TOML is invalid or missing required fields
    #[error("Failed to parse profile: {}\n{details}", path.display())]
    ProfileParse { path: PathBuf, details: String },

    /// Apps catalog directory or required file not found
    #[error("Apps catalog not found: {}", path.display())]
    CatalogNotFound { path: PathBuf },

    /// Apps catalog TOML is invalid
    #[error("Failed to parse catalog: {}\n{details}", path.display())]
    CatalogParse { path: PathBuf, details: String },

    /// App id is not declared in the catalog partition it was looked up in
    #[error("App '{app_id}' not found in {partition}")]
    AppNotFound { app_id: String, partition: String },

    /// Profile references extras the catalog does not declare
    #[error("Profile validation failed:\n{}", format_list(errors))]
    ProfileValidation { errors: Vec<String> },

    /// Connected device does not match the profile's model pattern
    #[error("Wrong device model\n\nExpected: {expected_name} ({expected_pattern})\nFound: {actual_model}")]
    DeviceMismatch {
        expected_pattern: String,
        expected_name: String,
        actual_model: String,
    },

    /// No Android device attached
    #[error("No device connected")]
    NoDevice,

    /// More than one Android device attached
    #[error("Multiple devices connected ({count} devices)")]
    MultipleDevices { count: usize },

    /// Device rejected the debugging connection (RSA key not authorized)
    #[error("Device authentication failed")]
    DeviceAuthentication,

    /// Transport-level failure talking to the device (USB, adb server)
    #[error("USB communication error: {0}")]
    Transport(String),

    /// Device went away in the middle of a run
    #[error("Device disconnected during configuration")]
    DeviceDisconnected,

    /// A device command could not be executed at all
    #[error("ADB command failed: {command}\n{error}")]
    AdbCommand { command: String, error: String },

    /// IO errors (profile/catalog files, download directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything that does not fit a known kind; still aborts the run cleanly
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Result type alias for Clearphone operations
pub type Result<T> = std::result::Result<T, ClearphoneError>;

fn format_list(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

impl ClearphoneError {
    /// Create a profile parse error
    pub fn profile_parse(path: &Path, details: impl Into<String>) -> Self {
        Self::ProfileParse {
            path: path.to_path_buf(),
            details: details.into(),
        }
    }

    /// Create a catalog parse error
    pub fn catalog_parse(path: &Path, details: impl Into<String>) -> Self {
        Self::CatalogParse {
            path: path.to_path_buf(),
            details: details.into(),
        }
    }

    /// Create an app-not-found error for a catalog partition
    pub fn app_not_found(app_id: impl Into<String>, partition: impl Into<String>) -> Self {
        Self::AppNotFound {
            app_id: app_id.into(),
            partition: partition.into(),
        }
    }

    /// Create a transport error
    pub fn transport(details: impl Into<String>) -> Self {
        Self::Transport(details.into())
    }

    /// Create an unexpected error
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    /// What happened, as shown to the user.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Actionable next step for the user.
    pub fn suggestion(&self) -> String {
        match self {
            Self::ProfileNotFound { .. } => {
                "Check that the profile path is correct and the file exists.".to_string()
            }
            Self::ProfileParse { .. } => {
                "Check the profile file for TOML syntax errors or missing required fields."
                    .to_string()
            }
            Self::CatalogNotFound { .. } => {
                "Ensure the apps/ directory exists with core.toml and extras/ subdirectory."
                    .to_string()
            }
            Self::CatalogParse { .. } => {
                "Check the catalog file for TOML syntax errors.".to_string()
            }
            Self::AppNotFound { app_id, .. } => {
                format!("Check that '{}' is defined in the apps catalog files.", app_id)
            }
            Self::ProfileValidation { .. } => {
                "Fix the app ids in the profile's [apps] section or add them to the catalog."
                    .to_string()
            }
            Self::DeviceMismatch { .. } => {
                "Connect the correct device or use a different profile.".to_string()
            }
            Self::NoDevice => "1. Connect your Android device via USB\n\
                 2. Enable USB debugging in Developer Options\n\
                 3. Accept the debugging prompt on your device"
                .to_string(),
            Self::MultipleDevices { .. } => {
                "Disconnect all but one device and try again.".to_string()
            }
            Self::DeviceAuthentication => "1. Check your device for an 'Allow USB debugging' prompt\n\
                 2. Tap 'Allow' (optionally check 'Always allow from this computer')\n\
                 3. Try running clearphone again"
                .to_string(),
            Self::Transport(_) => "1. Ensure the device is connected via USB\n\
                 2. Try a different USB port or cable\n\
                 3. On Linux, you may need to set up udev rules for your device"
                .to_string(),
            Self::DeviceDisconnected => {
                "Reconnect the device and run configuration again.".to_string()
            }
            Self::AdbCommand { .. } => "Check device connection and try again.".to_string(),
            Self::Io(_) => "Check file permissions and available disk space.".to_string(),
            Self::Unexpected(_) => {
                "Configuration has been aborted. Your device may be in a partial state.".to_string()
            }
        }
    }
}
