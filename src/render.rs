//! Terminal presentation: event lines, JSON lines, summaries and prompts.
//!
//! Everything that formats text takes its writer as a parameter so the
//! binary can hand in stdout / stdin and tests can hand in buffers.

use crossterm::style::{StyledContent, Stylize};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tracing::warn;

use crate::catalog::AppDefinition;
use crate::events::{Event, EventKind, EventPayload, EventSink};
use crate::profile::ProfileSummary;
use crate::workflow::{CameraChoice, Phase, REPLACEMENT_CAMERA_NAME, WorkflowResult};

/// How a rendered line is colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Header,
    Progress,
    Success,
    Muted,
    Warning,
    Failure,
}

fn paint(tone: Tone, text: &str) -> StyledContent<&str> {
    match tone {
        Tone::Header => text.bold().blue(),
        Tone::Progress => text.cyan(),
        Tone::Success => text.green(),
        Tone::Muted => text.dim(),
        Tone::Warning => text.yellow(),
        Tone::Failure => text.red(),
    }
}

fn item(tone: Tone, symbol: &'static str, text: String) -> Option<(Tone, &'static str, String)> {
    Some((tone, symbol, text))
}

/// Symbol and text for one event, or `None` for events the terminal skips.
pub fn describe(event: &Event) -> Option<(Tone, &'static str, String)> {
    use EventKind as K;

    match (event.kind(), event.payload()) {
        (K::WorkflowStarted, EventPayload::Workflow { profile_name, .. }) => item(
            Tone::Header,
            "",
            format!("Configuring device with profile: {}", profile_name),
        ),
        (K::WorkflowCompleted, _) => {
            item(Tone::Success, "", "Configuration completed successfully.".into())
        }
        (K::WorkflowFailed, _) => item(
            Tone::Failure,
            "",
            format!("Configuration failed: {}", event.message()),
        ),
        (
            K::PhaseStarted,
            EventPayload::Phase {
                phase_name,
                phase_number,
                total_phases,
            },
        ) => item(
            Tone::Header,
            "",
            format!("Phase {}/{}: {}", phase_number, total_phases, phase_name),
        ),
        (K::DeviceConnected | K::DeviceValidated, _) => {
            item(Tone::Success, "✓", event.message().to_string())
        }
        (K::PackageRemoved, _) => item(Tone::Success, "✓", event.message().to_string()),
        (K::PackageNotInstalled, EventPayload::Package { package_name, .. }) => {
            item(Tone::Muted, "○", format!("Not installed: {}", package_name))
        }
        (
            K::PackageRemovalSkipped,
            EventPayload::Package {
                package_name,
                reason,
                ..
            },
        ) => item(
            Tone::Warning,
            "⊘",
            format!("Skipped: {} ({})", package_name, reason),
        ),
        (
            K::PackageRemovalFailed,
            EventPayload::Package {
                package_name,
                reason,
                ..
            },
        ) => item(
            Tone::Failure,
            "✗",
            format!("Failed: {} ({})", package_name, reason),
        ),
        (K::DownloadStarted, EventPayload::Download { app_name, .. }) => {
            item(Tone::Progress, "↓", format!("Downloading: {}", app_name))
        }
        (K::DownloadCompleted, EventPayload::Download { app_name, .. }) => {
            item(Tone::Success, "✓", format!("Downloaded: {}", app_name))
        }
        (K::DownloadFailed, _) => item(Tone::Failure, "✗", event.message().to_string()),
        (K::InstallStarted, EventPayload::Install { app_name, .. }) => {
            item(Tone::Progress, "→", format!("Installing: {}", app_name))
        }
        (K::InstallCompleted, _) => item(Tone::Success, "✓", event.message().to_string()),
        (K::InstallFailed, _) => item(Tone::Failure, "✗", event.message().to_string()),
        (K::DefaultAppSet, _) => item(Tone::Success, "✓", event.message().to_string()),
        (K::DefaultAppFailed, EventPayload::DefaultApp { app_name, role, .. }) => item(
            Tone::Warning,
            "⚠",
            format!("Could not set default {}: {}", role, app_name),
        ),
        (K::CameraChoiceMade, EventPayload::CameraChoice { user_choice, .. }) => {
            let text = if user_choice == "stock" {
                "Camera choice: Keep stock camera".to_string()
            } else {
                format!("Camera choice: Use {}", REPLACEMENT_CAMERA_NAME)
            };
            item(Tone::Progress, "→", text)
        }
        (
            K::ExtrasSelectionMade,
            EventPayload::ExtrasSelection {
                selected_free,
                selected_non_free,
                ..
            },
        ) => item(
            Tone::Progress,
            "→",
            format!(
                "Selected {} extra apps",
                selected_free.len() + selected_non_free.len()
            ),
        ),
        (K::Warning, _) => item(Tone::Warning, "⚠", event.message().to_string()),
        _ => None,
    }
}

/// Colored, human-readable event output.
pub struct TerminalRenderer<W: Write> {
    out: W,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn write_event(&mut self, event: &Event) -> io::Result<()> {
        let Some((tone, symbol, text)) = describe(event) else {
            return Ok(());
        };
        match (event.kind(), symbol) {
            (
                EventKind::PhaseStarted | EventKind::WorkflowCompleted | EventKind::WorkflowFailed,
                _,
            ) => {
                writeln!(self.out, "\n{}", paint(tone, &text))
            }
            (_, "") => writeln!(self.out, "{}", paint(tone, &text)),
            (_, symbol) => writeln!(self.out, "  {} {}", paint(tone, symbol), text),
        }
    }
}

impl<W: Write> EventSink for TerminalRenderer<W> {
    fn emit(&mut self, event: Event) {
        if let Err(e) = self.write_event(&event) {
            warn!("Failed to write event: {}", e);
        }
    }
}

/// One JSON object per event, newline separated.
pub struct JsonLines<W: Write> {
    out: W,
}

impl<W: Write> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Write any serializable value as one line.
    pub fn write_value<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, value)?;
        writeln!(self.out)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for JsonLines<W> {
    fn emit(&mut self, event: Event) {
        if let Err(e) = self.write_value(&event) {
            warn!("Failed to write event: {}", e);
        }
    }
}

/// Final counts table.
pub fn write_summary(out: &mut impl Write, result: &WorkflowResult) -> io::Result<()> {
    writeln!(out, "\n{}", "Summary".bold())?;
    let rows = [
        ("Packages removed", result.packages_removed, Tone::Success),
        ("Packages skipped", result.packages_skipped, Tone::Warning),
        ("Packages failed", result.packages_failed, Tone::Failure),
        ("Apps installed", result.apps_installed, Tone::Success),
        ("Apps failed", result.apps_failed, Tone::Failure),
        ("Downloads failed", result.apps_download_failed, Tone::Failure),
    ];
    for (label, count, tone) in rows {
        writeln!(out, "  {:<18} {}", label, paint(tone, &count.to_string()))?;
    }
    if !result.success {
        writeln!(out, "\n{} {}", paint(Tone::Failure, "Error:"), result.error_message)?;
        if let Some(suggestion) = &result.error_suggestion {
            writeln!(out, "\n{}", suggestion)?;
        }
        if result.failed_phase.is_some_and(|phase| phase.mutates_device()) {
            writeln!(
                out,
                "{}",
                paint(Tone::Warning, "Some changes may have already been applied to the device.")
            )?;
        }
    }
    Ok(())
}

pub fn write_profile_summary(
    out: &mut impl Write,
    file_name: &str,
    summary: &ProfileSummary,
) -> io::Result<()> {
    writeln!(out, "\n{} {}\n", "Device Profile:".bold(), file_name)?;
    writeln!(out, "  {:<16} {}", "Device", summary.name)?;
    writeln!(out, "  {:<16} {}", "Model Pattern", summary.model_pattern)?;
    writeln!(out, "  {:<16} {}", "Android Version", summary.android_version)?;
    writeln!(out, "  {:<16} {}", "Maintainer", summary.maintainer)?;
    let camera = if summary.has_camera_choice {
        paint(Tone::Success, "Yes")
    } else {
        paint(Tone::Muted, "No")
    };
    writeln!(out, "  {:<16} {}", "Camera Choice", camera)?;
    writeln!(out, "\n{} {}", "Packages to Remove:".bold(), summary.package_count)?;
    if !summary.extras_free.is_empty() {
        writeln!(out, "\n{} {}", "Free Extras:".bold(), summary.extras_free.join(", "))?;
    }
    if !summary.extras_non_free.is_empty() {
        writeln!(
            out,
            "{} {}",
            "Non-Free Extras:".bold(),
            summary.extras_non_free.join(", ")
        )?;
    }
    Ok(())
}

/// Read one trimmed line. `None` at end of input.
fn read_answer(input: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Ask stock vs replacement camera. Empty input or end of input keeps stock.
pub fn prompt_camera_choice(
    input: &mut impl BufRead,
    out: &mut impl Write,
    stock_name: &str,
) -> io::Result<CameraChoice> {
    writeln!(out, "\n{}", "Camera Choice".bold())?;
    writeln!(
        out,
        "\nYou can keep the {} or replace it with {}.\n",
        stock_name.cyan(),
        REPLACEMENT_CAMERA_NAME.cyan()
    )?;
    writeln!(
        out,
        "  1. Keep {}: better photo quality (HDR, night mode), but gallery links break once the stock gallery is removed",
        stock_name
    )?;
    writeln!(
        out,
        "  2. {}: simpler and works with the replacement gallery, but lower photo quality",
        REPLACEMENT_CAMERA_NAME
    )?;

    loop {
        write!(out, "\nWhich camera do you want [1/2] (1): ")?;
        out.flush()?;
        match read_answer(input)?.as_deref() {
            None | Some("") | Some("1") => return Ok(CameraChoice::Stock),
            Some("2") => return Ok(CameraChoice::Replacement),
            Some(other) => writeln!(out, "Please enter 1 or 2 (got '{}')", other)?,
        }
    }
}

fn confirm(
    input: &mut impl BufRead,
    out: &mut impl Write,
    app: &AppDefinition,
    default: bool,
) -> io::Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        write!(
            out,
            "  {} - {} {} ",
            app.name.as_str().cyan(),
            app.description.as_deref().unwrap_or("No description"),
            hint
        )?;
        out.flush()?;
        match read_answer(input)?.map(|a| a.to_lowercase()).as_deref() {
            None | Some("") => return Ok(default),
            Some("y" | "yes") => return Ok(true),
            Some("n" | "no") => return Ok(false),
            Some(_) => writeln!(out, "  Please answer y or n")?,
        }
    }
}

/// Ask about each extra app. Free apps default to yes, non-free to no.
pub fn prompt_extras(
    input: &mut impl BufRead,
    out: &mut impl Write,
    free: &[AppDefinition],
    non_free: &[AppDefinition],
) -> io::Result<(Vec<String>, Vec<String>)> {
    let mut selected_free = Vec::new();
    let mut selected_non_free = Vec::new();

    if !free.is_empty() {
        writeln!(out, "\n{} (from F-Droid)", "Open Source Apps".bold())?;
        writeln!(out, "Select which apps to install:\n")?;
        for app in free {
            if confirm(input, out, app, true)? {
                selected_free.push(app.id.clone());
            }
        }
    }

    if !non_free.is_empty() {
        writeln!(out, "\n{} (direct download)", "Proprietary Apps".bold())?;
        writeln!(out, "Select which apps to install:\n")?;
        for app in non_free {
            if confirm(input, out, app, false)? {
                selected_non_free.push(app.id.clone());
            }
        }
    }

    Ok((selected_free, selected_non_free))
}
