//! Clearphone - Main entry point

use anyhow::{Context, bail};
use crossterm::style::Stylize;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use clearphone::cli::{Cli, Commands};
use clearphone::config::{self, ROOT_ENV};
use clearphone::render::{
    JsonLines, TerminalRenderer, prompt_camera_choice, prompt_extras, write_profile_summary,
    write_summary,
};
use clearphone::{
    AdbTransport, ApkDownloader, CameraChoice, ClearphoneError, ConfigurationController,
    ConfigureOptions, DeviceTransport, PhoneMode, ToggleReport,
};

/// Log to stderr so stdout stays clean for event output and JSON lines.
fn init_tracing(verbose: bool) {
    let default = if verbose { "clearphone=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);
    debug!("CLI arguments parsed: {:?}", cli);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red(), e);
            if let Some(err) = e.downcast_ref::<ClearphoneError>() {
                eprintln!("\n{}", err.suggestion());
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let cwd = std::env::current_dir().context("Cannot determine working directory")?;
    let root = config::resolve_project_root(cli.root.as_deref(), std::env::var_os(ROOT_ENV), &cwd);
    info!("Project root: {}", root.display());
    let controller = ConfigurationController::new(root);

    match cli.command {
        Commands::Configure {
            profile,
            dry_run,
            interactive,
            download_dir,
            json,
        } => {
            let options = ConfigureOptions {
                profile,
                dry_run,
                interactive,
                download_dir,
            };
            configure(&controller, &options, json)
        }
        Commands::ListProfiles => list_profiles(&controller),
        Commands::ShowProfile { profile } => {
            let summary = controller.profile_summary(&profile)?;
            let name = display_name(&controller.resolve_profile(&profile));
            write_profile_summary(&mut io::stdout().lock(), &name, &summary)?;
            Ok(true)
        }
        Commands::EnableBrowser { dry_run } => {
            with_device(&controller, |c, device, downloader, sink| {
                Ok(vec![c.set_browser(true, dry_run, device, downloader, sink)?])
            })
        }
        Commands::DisableBrowser { dry_run } => {
            with_device(&controller, |c, device, downloader, sink| {
                Ok(vec![c.set_browser(false, dry_run, device, downloader, sink)?])
            })
        }
        Commands::EnablePlayStore { dry_run } => with_device(&controller, |c, device, _, sink| {
            Ok(vec![c.set_play_store(true, dry_run, device, sink)?])
        }),
        Commands::DisablePlayStore { dry_run } => with_device(&controller, |c, device, _, sink| {
            Ok(vec![c.set_play_store(false, dry_run, device, sink)?])
        }),
        Commands::ClearphoneMode { dry_run } => {
            with_device(&controller, |c, device, downloader, sink| {
                c.set_mode(PhoneMode::Clearphone, dry_run, device, downloader, sink)
            })
        }
        Commands::SmartphoneMode { dry_run } => {
            with_device(&controller, |c, device, downloader, sink| {
                c.set_mode(PhoneMode::Smartphone, dry_run, device, downloader, sink)
            })
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn check_project(controller: &ConfigurationController) -> anyhow::Result<()> {
    let problems = controller.check_prerequisites();
    if !problems.is_empty() {
        bail!(
            "{}\nRun from a Clearphone checkout, pass --root or set {}",
            problems.join("\n"),
            ROOT_ENV
        );
    }
    Ok(())
}

fn configure(
    controller: &ConfigurationController,
    options: &ConfigureOptions,
    json: bool,
) -> anyhow::Result<bool> {
    check_project(controller)?;

    let config = controller.workflow_config(options);
    let mut device = AdbTransport::new();
    let mut downloader = ApkDownloader::new(config.download_dir());

    let result = {
        let mut workflow = controller.workflow(options, &mut device, &mut downloader);
        if options.interactive {
            workflow = workflow
                .with_camera_callback(|stock_name, _package| {
                    prompt_camera_choice(&mut io::stdin().lock(), &mut io::stdout(), stock_name)
                        .unwrap_or_else(|e| {
                            warn!("Camera prompt failed, keeping stock camera: {}", e);
                            CameraChoice::Stock
                        })
                })
                .with_extras_callback(|free, non_free| {
                    prompt_extras(&mut io::stdin().lock(), &mut io::stdout(), free, non_free)
                        .unwrap_or_else(|e| {
                            warn!("Extras prompt failed, installing none: {}", e);
                            (Vec::new(), Vec::new())
                        })
                });
        }

        if json {
            let mut sink = JsonLines::new(io::stdout());
            let result = workflow.execute(&mut sink);
            sink.write_value(&result)?;
            result
        } else {
            let mut sink = TerminalRenderer::new(io::stdout());
            let result = workflow.execute(&mut sink);
            write_summary(&mut io::stdout().lock(), &result)?;
            result
        }
    };

    device.close();
    Ok(result.success)
}

fn list_profiles(controller: &ConfigurationController) -> anyhow::Result<bool> {
    let profiles = controller.list_profiles()?;
    let mut out = io::stdout().lock();

    if profiles.is_empty() {
        writeln!(out, "No device profiles found.")?;
        writeln!(
            out,
            "Create profiles in: {}",
            controller.root().join(config::PROFILES_DIR).display()
        )?;
        return Ok(true);
    }

    writeln!(out, "{}", "Available Device Profiles".bold())?;
    writeln!(out, "  {:<28} {:<32} {}", "Profile", "Device", "Packages")?;
    for path in profiles {
        let name = display_name(&path);
        match controller.profile_summary(&path) {
            Ok(summary) => writeln!(
                out,
                "  {} {:<32} {}",
                format!("{:<28}", name).cyan(),
                summary.name,
                summary.package_count
            )?,
            Err(e) => writeln!(
                out,
                "  {} {}",
                format!("{:<28}", name).cyan(),
                format!("Error: {}", e).red()
            )?,
        }
    }
    Ok(true)
}

/// Run a toggle against a fresh ADB session and print its reports.
fn with_device<'c>(
    controller: &'c ConfigurationController,
    toggle: impl FnOnce(
        &'c ConfigurationController,
        &mut dyn DeviceTransport,
        &mut ApkDownloader,
        &mut TerminalRenderer<io::Stdout>,
    ) -> clearphone::Result<Vec<ToggleReport>>,
) -> anyhow::Result<bool> {
    check_project(controller)?;

    let mut device = AdbTransport::new();
    let mut downloader = ApkDownloader::new(controller.root().join(config::DOWNLOADS_DIR));
    let mut sink = TerminalRenderer::new(io::stdout());

    let outcome = toggle(controller, &mut device, &mut downloader, &mut sink);
    device.close();
    let reports = outcome?;

    let mut out = io::stdout().lock();
    let mut all_ok = true;
    for report in &reports {
        if report.success {
            writeln!(out, "  {} {}", "✓".green(), report.message)?;
        } else {
            all_ok = false;
            writeln!(out, "  {} {}", "⚠".yellow(), report.message)?;
        }
    }
    Ok(all_ok)
}
