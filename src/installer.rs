//! APK installation and default-app roles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use tracing::{info, warn};

use crate::catalog::AppDefinition;
use crate::device::{DefaultRole, DeviceTransport};
use crate::error::{ClearphoneError, Result};
use crate::events::{Event, EventKind, EventPayload, EventSink};

/// Counts from one `install_apps` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    pub installed: usize,
    pub failed: usize,
    /// Ids of apps that installed, in install order
    pub installed_ids: Vec<String>,
}

fn install_event(kind: EventKind, message: String, app: &AppDefinition, apk_path: &Path) -> Event {
    Event::new(
        kind,
        message,
        EventPayload::Install {
            app_id: app.id.clone(),
            app_name: app.name.clone(),
            package_id: app.package_id.clone(),
            apk_path: apk_path.display().to_string(),
        },
    )
}

fn role_event(kind: EventKind, message: String, app: &AppDefinition, role: DefaultRole) -> Event {
    Event::new(
        kind,
        message,
        EventPayload::DefaultApp {
            app_id: app.id.clone(),
            app_name: app.name.clone(),
            role: role.to_string(),
        },
    )
}

/// Installs downloaded APKs and assigns default roles.
pub struct AppInstaller<'a> {
    device: &'a dyn DeviceTransport,
    dry_run: bool,
}

impl<'a> AppInstaller<'a> {
    pub fn new(device: &'a dyn DeviceTransport, dry_run: bool) -> Self {
        Self { device, dry_run }
    }

    /// Install each `(app, apk)` pair in order.
    ///
    /// A marker of `success` in the output counts as installed whatever the
    /// exit status. Only a lost device aborts the batch.
    pub fn install_apps(
        &self,
        apps: &[(AppDefinition, PathBuf)],
        sink: &mut dyn EventSink,
    ) -> Result<InstallSummary> {
        let mut summary = InstallSummary::default();

        for (app, apk_path) in apps {
            sink.emit(install_event(
                EventKind::InstallStarted,
                format!("Installing: {}", app.name),
                app,
                apk_path,
            ));

            if self.dry_run {
                sink.emit(install_event(
                    EventKind::InstallCompleted,
                    format!("Would install: {} (dry run)", app.name),
                    app,
                    apk_path,
                ));
                summary.installed += 1;
                summary.installed_ids.push(app.id.clone());
                continue;
            }

            let error = match self.device.install_apk(apk_path) {
                Ok(output) if output.success || output.contains_marker("success") => None,
                Ok(output) => Some(output.error_text().to_string()),
                Err(ClearphoneError::DeviceDisconnected) => {
                    return Err(ClearphoneError::DeviceDisconnected);
                }
                Err(e) => Some(e.to_string()),
            };

            match error {
                None => {
                    info!("Installed {} ({})", app.id, app.package_id);
                    sink.emit(install_event(
                        EventKind::InstallCompleted,
                        format!("Installed: {}", app.name),
                        app,
                        apk_path,
                    ));
                    summary.installed += 1;
                    summary.installed_ids.push(app.id.clone());
                }
                Some(error) => {
                    warn!("Install of {} failed: {}", app.id, error);
                    sink.emit(install_event(
                        EventKind::InstallFailed,
                        format!("Failed to install {}: {}", app.name, error),
                        app,
                        apk_path,
                    ));
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Assign default roles, walking the role table in its fixed order.
    ///
    /// Roles missing from `apps` are skipped. Results are reported only as
    /// `DEFAULT_APP_SET` / `DEFAULT_APP_FAILED` events.
    pub fn set_default_apps(
        &self,
        apps: &HashMap<DefaultRole, AppDefinition>,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        for role in DefaultRole::iter() {
            let Some(app) = apps.get(&role) else {
                continue;
            };

            if self.dry_run {
                sink.emit(role_event(
                    EventKind::DefaultAppSet,
                    format!("Would set {} as default {} (dry run)", app.name, role),
                    app,
                    role,
                ));
                continue;
            }

            let error = match self.device.set_role(role, &app.package_id) {
                Ok(output) if output.success => None,
                Ok(output) => Some(output.error_text().to_string()),
                Err(ClearphoneError::DeviceDisconnected) => {
                    return Err(ClearphoneError::DeviceDisconnected);
                }
                Err(e) => Some(e.to_string()),
            };

            match error {
                None => sink.emit(role_event(
                    EventKind::DefaultAppSet,
                    format!("Set {} as default {}", app.name, role),
                    app,
                    role,
                )),
                Some(error) => {
                    warn!("Setting {} as {} failed: {}", app.id, role, error);
                    sink.emit(role_event(
                        EventKind::DefaultAppFailed,
                        format!("Failed to set {} as default {}: {}", app.name, role, error),
                        app,
                        role,
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Map installed apps onto the roles they fill, by app id.
pub fn role_assignments<'a>(
    apps: impl IntoIterator<Item = &'a AppDefinition>,
) -> HashMap<DefaultRole, AppDefinition> {
    apps.into_iter()
        .filter_map(|app| DefaultRole::from_app_id(&app.id).map(|role| (role, app.clone())))
        .collect()
}
