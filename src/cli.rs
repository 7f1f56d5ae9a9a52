use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Clearphone - configure an Android phone for minimal distraction
#[derive(Parser, Debug)]
#[command(name = "clearphone")]
#[command(about = "Remove bloatware, install curated apps and set default apps over ADB")]
#[command(version)]
pub struct Cli {
    /// Project root holding `apps/` and `device-profiles/`.
    ///
    /// Defaults to $CLEARPHONE_ROOT, then the nearest directory above the
    /// working directory that contains `apps/core.toml`.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Verbose logging to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Configure a connected phone from a device profile
    Configure {
        /// Profile name (e.g. samsung-s24) or path to a profile TOML
        profile: PathBuf,

        /// Show what would be done without changing the device
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Ask for the camera and extra-app choices
        #[arg(short, long, conflicts_with = "json")]
        interactive: bool,

        /// Directory for downloaded APKs (default: <root>/downloads)
        #[arg(short, long)]
        download_dir: Option<PathBuf>,

        /// Print events and the result as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// List available device profiles
    ListProfiles,
    /// Show a device profile summary
    ShowProfile {
        /// Profile name or path
        profile: PathBuf,
    },
    /// Install the browser from the apps catalog
    EnableBrowser {
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Uninstall the browser
    DisableBrowser {
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Re-enable the Google Play Store
    EnablePlayStore {
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Disable the Google Play Store
    DisablePlayStore {
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Browser removed and Play Store disabled
    ClearphoneMode {
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Browser installed and Play Store enabled
    SmartphoneMode {
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["clearphone"]).is_err());
    }

    #[test]
    fn test_cli_configure_flags() {
        let cli = Cli::try_parse_from([
            "clearphone",
            "configure",
            "samsung-s24",
            "-n",
            "--interactive",
            "-d",
            "/tmp/apks",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Commands::Configure {
                profile: PathBuf::from("samsung-s24"),
                dry_run: true,
                interactive: true,
                download_dir: Some(PathBuf::from("/tmp/apks")),
                json: false,
            }
        );
    }

    #[test]
    fn test_cli_configure_defaults() {
        let cli = Cli::try_parse_from(["clearphone", "configure", "p.toml", "--json"]).unwrap();
        match cli.command {
            Commands::Configure {
                dry_run,
                interactive,
                download_dir,
                json,
                ..
            } => {
                assert!(!dry_run);
                assert!(!interactive);
                assert!(download_dir.is_none());
                assert!(json);
            }
            other => panic!("Expected Configure, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_interactive_conflicts_with_json() {
        let err = Cli::try_parse_from(["clearphone", "configure", "p.toml", "-i", "--json"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_global_root() {
        let cli =
            Cli::try_parse_from(["clearphone", "list-profiles", "--root", "/srv/cp"]).unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/srv/cp")));
        assert_eq!(cli.command, Commands::ListProfiles);
    }

    #[test]
    fn test_cli_toggle_commands() {
        let cli = Cli::try_parse_from(["clearphone", "disable-play-store", "--dry-run"]).unwrap();
        assert_eq!(cli.command, Commands::DisablePlayStore { dry_run: true });

        let cli = Cli::try_parse_from(["clearphone", "clearphone-mode"]).unwrap();
        assert_eq!(cli.command, Commands::ClearphoneMode { dry_run: false });

        let cli = Cli::try_parse_from(["clearphone", "-v", "enable-browser", "-n"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.command, Commands::EnableBrowser { dry_run: true });
    }
}
