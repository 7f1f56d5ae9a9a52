//! Progress events emitted by every Clearphone operation.
//!
//! An operation reports what it is doing through an [`EventSink`] while it
//! runs and hands back its final result through its ordinary return value.
//! The two channels are never mixed: no event carries a terminal result and
//! no return value replays events.
//!
//! Events are immutable once built. Fields are private and exposed through
//! accessors so a listener that forwards an event upward forwards exactly
//! what was emitted.

use serde::Serialize;
use strum::{Display, EnumIter};

/// Closed set of event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    // Workflow lifecycle
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,

    // Phase boundaries
    PhaseStarted,
    PhaseCompleted,

    // Device
    DeviceConnected,
    DeviceValidated,

    // Package removal
    PackageRemovalStarted,
    PackageRemoved,
    PackageRemovalSkipped,
    PackageRemovalFailed,
    PackageNotInstalled,

    // Downloads
    DownloadStarted,
    DownloadProgress,
    DownloadCompleted,
    DownloadFailed,

    // Installs
    InstallStarted,
    InstallCompleted,
    InstallFailed,

    // Default apps
    DefaultAppSet,
    DefaultAppFailed,

    // Checkpoints
    CameraChoiceRequired,
    CameraChoiceMade,
    ExtrasSelectionRequired,
    ExtrasSelectionMade,

    Warning,
}

impl EventKind {
    /// True for kinds that report a per-item failure.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::WorkflowFailed
                | Self::PackageRemovalFailed
                | Self::DownloadFailed
                | Self::InstallFailed
                | Self::DefaultAppFailed
        )
    }
}

/// Kind-specific structured fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum EventPayload {
    None,
    Workflow {
        profile_name: String,
        device_name: String,
    },
    Phase {
        phase_name: String,
        phase_number: u8,
        total_phases: u8,
    },
    Device {
        serial: String,
        model: String,
        android_version: String,
        manufacturer: String,
    },
    Package {
        package_id: String,
        package_name: String,
        reason: String,
    },
    Download {
        app_id: String,
        app_name: String,
        source: String,
        url: String,
        progress_bytes: u64,
        total_bytes: u64,
        progress_percent: f64,
    },
    Install {
        app_id: String,
        app_name: String,
        package_id: String,
        apk_path: String,
    },
    DefaultApp {
        app_id: String,
        app_name: String,
        role: String,
    },
    CameraChoice {
        stock_camera_name: String,
        stock_camera_package: String,
        replacement_name: String,
        user_choice: String,
    },
    ExtrasSelection {
        available_free: Vec<String>,
        available_non_free: Vec<String>,
        selected_free: Vec<String>,
        selected_non_free: Vec<String>,
    },
}

/// A single progress notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    kind: EventKind,
    message: String,
    payload: EventPayload,
}

impl Event {
    pub fn new(kind: EventKind, message: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            kind,
            message: message.into(),
            payload,
        }
    }

    /// Event with no structured fields.
    pub fn bare(kind: EventKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, EventPayload::None)
    }

    pub fn package(
        kind: EventKind,
        message: impl Into<String>,
        package_id: &str,
        package_name: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            kind,
            message,
            EventPayload::Package {
                package_id: package_id.to_string(),
                package_name: package_name.to_string(),
                reason: reason.into(),
            },
        )
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Package id for package events.
    pub fn package_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Package { package_id, .. } | EventPayload::Install { package_id, .. } => {
                Some(package_id)
            }
            _ => None,
        }
    }

    /// App id for download, install and default-app events.
    pub fn app_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Download { app_id, .. }
            | EventPayload::Install { app_id, .. }
            | EventPayload::DefaultApp { app_id, .. } => Some(app_id),
            _ => None,
        }
    }
}

/// Receiver of progress events.
///
/// Implemented for any `FnMut(Event)` so callers can pass a closure.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

impl<F: FnMut(Event)> EventSink for F {
    fn emit(&mut self, event: Event) {
        self(event)
    }
}

/// Sink that keeps every event in emission order.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(Event::kind).collect()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<&Event> {
        self.events.iter().filter(|e| e.kind == kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn into_inner(self) -> Vec<Event> {
        self.events
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_kind_display_is_screaming_snake() {
        assert_eq!(EventKind::WorkflowFailed.to_string(), "WORKFLOW_FAILED");
        assert_eq!(
            EventKind::ExtrasSelectionMade.to_string(),
            "EXTRAS_SELECTION_MADE"
        );
    }

    #[test]
    fn test_kind_set_is_closed() {
        assert_eq!(EventKind::iter().count(), 26);
    }

    #[test]
    fn test_closure_sink_receives_in_order() {
        let mut seen = Vec::new();
        {
            let mut sink = |e: Event| seen.push(e.kind());
            sink.emit(Event::bare(EventKind::WorkflowStarted, "start"));
            sink.emit(Event::bare(EventKind::WorkflowCompleted, "done"));
        }
        assert_eq!(
            seen,
            vec![EventKind::WorkflowStarted, EventKind::WorkflowCompleted]
        );
    }

    #[test]
    fn test_package_accessors() {
        let event = Event::package(
            EventKind::PackageRemoved,
            "Removed: Bixby",
            "com.samsung.android.bixby.agent",
            "Bixby",
            "",
        );
        assert_eq!(event.package_id(), Some("com.samsung.android.bixby.agent"));
        assert_eq!(event.app_id(), None);
        assert_eq!(event.message(), "Removed: Bixby");
    }

    #[test]
    fn test_event_serializes_kind_and_family() {
        let event = Event::new(
            EventKind::PhaseStarted,
            "Starting: Loading profile",
            EventPayload::Phase {
                phase_name: "Loading profile".into(),
                phase_number: 1,
                total_phases: 8,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "PHASE_STARTED");
        assert_eq!(json["payload"]["family"], "phase");
        assert_eq!(json["payload"]["phase_number"], 1);
    }

    #[test]
    fn test_event_log_counts() {
        let mut log = EventLog::new();
        log.emit(Event::bare(EventKind::Warning, "a"));
        log.emit(Event::bare(EventKind::Warning, "b"));
        log.emit(Event::bare(EventKind::WorkflowStarted, "c"));
        assert_eq!(log.count(EventKind::Warning), 2);
        assert_eq!(log.of_kind(EventKind::WorkflowStarted).len(), 1);
        assert!(EventKind::DownloadFailed.is_failure());
        assert!(!EventKind::DownloadCompleted.is_failure());
    }
}
