//! `adb` executable transport.
//!
//! All device access goes through the platform-tools `adb` binary. Every
//! command is a blocking child process whose output is captured in full;
//! nothing is streamed.
//!
//! The binary is looked up on `PATH` unless `CLEARPHONE_ADB` names one.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use crate::device::{CommandOutput, DefaultRole, DeviceInfo, DeviceTransport};
use crate::error::{ClearphoneError, Result};

/// Environment variable overriding the `adb` executable.
pub const ADB_ENV: &str = "CLEARPHONE_ADB";

/// Staging directory for pushed APKs.
const REMOTE_TMP: &str = "/data/local/tmp";

/// Devices reported by `adb devices`, by state.
#[derive(Debug, Default, PartialEq, Eq)]
struct DeviceList {
    ready: Vec<String>,
    unauthorized: Vec<String>,
}

/// Parse `adb devices` output.
///
/// Lines after the "List of devices attached" header are `<serial>\t<state>`.
/// Offline devices are ignored.
fn parse_devices(output: &str) -> DeviceList {
    let mut list = DeviceList::default();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("List of devices") || line.starts_with('*') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(serial), Some(state)) = (parts.next(), parts.next()) else {
            continue;
        };
        match state {
            "device" => list.ready.push(serial.to_string()),
            "unauthorized" => list.unauthorized.push(serial.to_string()),
            _ => debug!("Ignoring device {} in state {}", serial, state),
        }
    }
    list
}

/// Extract package ids from `pm list packages` output.
fn parse_packages(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Transport that drives a single USB device through `adb`.
#[derive(Debug)]
pub struct AdbTransport {
    program: PathBuf,
    serial: Option<String>,
    info: Option<DeviceInfo>,
}

impl Default for AdbTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl AdbTransport {
    /// Transport using `$CLEARPHONE_ADB` or `adb` from `PATH`.
    pub fn new() -> Self {
        let program = std::env::var_os(ADB_ENV)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("adb"));
        Self::with_program(program)
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            serial: None,
            info: None,
        }
    }

    /// Run `adb [-s serial] <args>` and capture its output.
    ///
    /// Only a failure to spawn the process is an error.
    fn run<I, S>(&self, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        if let Some(serial) = &self.serial {
            cmd.args(["-s", serial]);
        }
        cmd.args(args).stdin(Stdio::null());
        debug!("Running {:?}", cmd);

        let output = cmd.output().map_err(|e| {
            ClearphoneError::transport(format!(
                "failed to run {}: {}",
                self.program.display(),
                e
            ))
        })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run a device shell command.
    ///
    /// A non-zero exit mentioning a missing device means the phone went away.
    fn shell(&self, command: &str) -> Result<CommandOutput> {
        let output = self.run(["shell", command])?;
        if !output.success {
            let text = output.error_text().to_lowercase();
            if text.contains("device not found") || text.contains("no devices") {
                warn!("Device disconnected while running: {}", command);
                return Err(ClearphoneError::DeviceDisconnected);
            }
        }
        Ok(output)
    }

    fn getprop(&self, key: &str) -> Result<String> {
        let output = self.shell(&format!("getprop {}", key))?;
        if !output.success {
            return Err(ClearphoneError::AdbCommand {
                command: format!("getprop {}", key),
                error: output.error_text().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Shell command where success is recognized from the output text.
    fn marked(&self, command: &str, markers: &[&str]) -> Result<CommandOutput> {
        let mut output = self.shell(command)?;
        output.success = markers.iter().any(|m| output.contains_marker(m));
        Ok(output)
    }
}

impl DeviceTransport for AdbTransport {
    fn connect(&mut self) -> Result<DeviceInfo> {
        let listing = self.run(["devices"])?;
        if !listing.success {
            return Err(ClearphoneError::transport(listing.error_text()));
        }

        let devices = parse_devices(&listing.stdout);
        let total = devices.ready.len() + devices.unauthorized.len();
        if total > 1 {
            return Err(ClearphoneError::MultipleDevices { count: total });
        }
        if !devices.unauthorized.is_empty() {
            return Err(ClearphoneError::DeviceAuthentication);
        }
        let Some(serial) = devices.ready.into_iter().next() else {
            return Err(ClearphoneError::NoDevice);
        };
        self.serial = Some(serial);

        let info = DeviceInfo {
            serial: self.getprop("ro.serialno")?,
            model: self.getprop("ro.product.model")?,
            android_version: self.getprop("ro.build.version.release")?,
            manufacturer: self.getprop("ro.product.manufacturer")?,
        };
        info!("Connected to {} ({})", info, info.serial);
        self.info = Some(info.clone());
        Ok(info)
    }

    fn device_info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    fn list_packages(&self) -> Result<Vec<String>> {
        let output = self.shell("pm list packages")?;
        if !output.success {
            return Err(ClearphoneError::AdbCommand {
                command: "pm list packages".to_string(),
                error: output.error_text().to_string(),
            });
        }
        Ok(parse_packages(&output.stdout))
    }

    fn uninstall(&self, package_id: &str) -> Result<CommandOutput> {
        self.marked(&format!("pm uninstall --user 0 {}", package_id), &["success"])
    }

    fn disable(&self, package_id: &str) -> Result<CommandOutput> {
        self.marked(
            &format!("pm disable-user --user 0 {}", package_id),
            &["disabled", "new state"],
        )
    }

    fn enable(&self, package_id: &str) -> Result<CommandOutput> {
        self.marked(&format!("pm enable {}", package_id), &["enabled", "new state"])
    }

    fn install_apk(&self, apk_path: &Path) -> Result<CommandOutput> {
        let Some(file_name) = apk_path.file_name() else {
            return Ok(CommandOutput::failed(format!(
                "Not an APK file: {}",
                apk_path.display()
            )));
        };
        let remote = format!("{}/{}", REMOTE_TMP, file_name.to_string_lossy());

        let push = self.run([OsStr::new("push"), apk_path.as_os_str(), OsStr::new(&remote)])?;
        if !push.success {
            return Ok(CommandOutput::failed(format!(
                "Failed to push APK: {}",
                push.error_text()
            )));
        }

        let result = self.marked(&format!("pm install -r {}", remote), &["success"]);
        if let Err(e) = self.shell(&format!("rm {}", remote)) {
            debug!("Could not remove {}: {}", remote, e);
        }
        result
    }

    fn set_role(&self, role: DefaultRole, package_id: &str) -> Result<CommandOutput> {
        let command = match role {
            DefaultRole::Keyboard => {
                format!("settings put secure default_input_method {}/.LatinIME", package_id)
            }
            _ => format!("cmd role add-role-holder {} {}", role.android_role(), package_id),
        };
        self.shell(&command)
    }

    fn close(&mut self) {
        self.serial = None;
        self.info = None;
    }
}
