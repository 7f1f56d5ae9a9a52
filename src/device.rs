//! Device transport contract.
//!
//! The workflow never talks to a phone directly. It goes through
//! [`DeviceTransport`], which the `adb` module implements for a real
//! USB-attached device and tests implement with recording fakes.
//!
//! # Success detection
//!
//! Device tooling is inconsistent about exit codes: `pm` prints `Success` and
//! may still exit non-zero, or exit zero after printing `Failure [...]`. Callers
//! therefore decide success from the command text via
//! [`CommandOutput::contains_marker`] rather than from `success` alone.

use serde::Serialize;
use std::fmt;
use std::path::Path;
use strum::{Display, EnumIter, IntoEnumIterator};
use wildmatch::WildMatch;

use crate::error::Result;

/// Identity of the connected device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DeviceInfo {
    pub serial: String,
    pub model: String,
    pub android_version: String,
    pub manufacturer: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.manufacturer, self.model)
    }
}

/// Raw result of a device command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Whether the command reported success (exit status)
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Case-insensitive search of stdout for `marker`.
    pub fn contains_marker(&self, marker: &str) -> bool {
        self.stdout
            .to_lowercase()
            .contains(&marker.to_lowercase())
    }

    /// The most useful error text: stderr, falling back to stdout.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Default-app roles Clearphone can assign, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, Serialize)]
pub enum DefaultRole {
    #[strum(serialize = "HOME")]
    Launcher,
    #[strum(serialize = "DIALER")]
    Dialer,
    #[strum(serialize = "SMS")]
    Messaging,
    #[strum(serialize = "KEYBOARD")]
    Keyboard,
    #[strum(serialize = "GALLERY")]
    Gallery,
}

impl DefaultRole {
    /// Catalog app id that fills this role.
    pub const fn app_id(self) -> &'static str {
        match self {
            Self::Launcher => "launcher",
            Self::Dialer => "dialer",
            Self::Messaging => "messaging",
            Self::Keyboard => "keyboard",
            Self::Gallery => "gallery",
        }
    }

    pub fn from_app_id(app_id: &str) -> Option<Self> {
        Self::iter().find(|role| role.app_id() == app_id)
    }

    /// Android role name passed to `cmd role`.
    pub fn android_role(self) -> String {
        format!("android.app.role.{}", self)
    }
}

/// Operations the workflow needs from a device.
pub trait DeviceTransport {
    /// Open a session and fetch device identity.
    ///
    /// Fails with `NoDevice`, `MultipleDevices`, `DeviceAuthentication` or
    /// `Transport`.
    fn connect(&mut self) -> Result<DeviceInfo>;

    /// Identity captured by the last successful `connect`.
    fn device_info(&self) -> Option<&DeviceInfo>;

    fn list_packages(&self) -> Result<Vec<String>>;

    fn is_installed(&self, package_id: &str) -> Result<bool> {
        Ok(self.list_packages()?.iter().any(|p| p == package_id))
    }

    /// Uninstall for user 0. Command failures come back as output, not errors.
    fn uninstall(&self, package_id: &str) -> Result<CommandOutput>;

    fn disable(&self, package_id: &str) -> Result<CommandOutput>;

    fn enable(&self, package_id: &str) -> Result<CommandOutput>;

    /// Push a local APK to the device and install it.
    fn install_apk(&self, apk_path: &Path) -> Result<CommandOutput>;

    fn set_role(&self, role: DefaultRole, package_id: &str) -> Result<CommandOutput>;

    /// Release the session. Default is a no-op.
    fn close(&mut self) {}
}

/// Glob match of a reported model against a profile pattern (`*`, `?`).
pub fn model_matches(pattern: &str, model: &str) -> bool {
    WildMatch::new(pattern).matches(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_matches() {
        assert!(model_matches("SM-S921*", "SM-S921U"));
        assert!(model_matches("SM-S921*", "SM-S921"));
        assert!(model_matches("SM-S92?U", "SM-S921U"));
        assert!(!model_matches("SM-S921*", "SM-S911U"));
        assert!(!model_matches("SM-S921*", "sm-s921u"));
    }

    #[test]
    fn test_marker_is_case_insensitive() {
        let output = CommandOutput {
            success: false,
            stdout: "Performing Streamed Install\nSUCCESS".into(),
            stderr: String::new(),
        };
        assert!(output.contains_marker("success"));
        assert!(!CommandOutput::failed("Failure [DELETE_FAILED_INTERNAL_ERROR]")
            .contains_marker("success"));
    }

    #[test]
    fn test_error_text_prefers_stderr() {
        let output = CommandOutput {
            success: false,
            stdout: "out".into(),
            stderr: "  err \n".into(),
        };
        assert_eq!(output.error_text(), "err");
        assert_eq!(CommandOutput::ok(" Failure ").error_text(), "Failure");
    }

    #[test]
    fn test_role_table() {
        let roles: Vec<DefaultRole> = DefaultRole::iter().collect();
        assert_eq!(roles.len(), 5);
        assert_eq!(roles[0], DefaultRole::Launcher);
        assert_eq!(DefaultRole::Messaging.to_string(), "SMS");
        assert_eq!(DefaultRole::Launcher.android_role(), "android.app.role.HOME");
        assert_eq!(DefaultRole::from_app_id("gallery"), Some(DefaultRole::Gallery));
        assert_eq!(DefaultRole::from_app_id("weather"), None);
    }
}
