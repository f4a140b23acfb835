use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "orderloader")]
#[command(about = "OrderLoader - order queue automation for a remote desktop application")]
#[command(
    long_about = "Processes JSON order documents from the pending queue by driving the remote application to its sales order form. Move the pointer to the top-left corner of the screen to abort."
)]
pub struct Cli {
    /// JSON config file (falls back to ORDERLOADER_CONFIG, then built-in defaults)
    #[clap(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Queue root holding pending/, completed/ and backups/
    #[clap(long, short = 'q', global = true, env = "ORDERLOADER_QUEUE_DIR")]
    pub queue_dir: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "orderloader=trace" (RUST_LOG takes precedence)
    #[clap(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Validate documents without touching the GUI or moving files
    #[clap(long)]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Order document to check
    pub file: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check templates, then process every pending document
    Run(RunArgs),
    /// Show pending and completed counts
    Status,
    /// List required template images that are missing
    CheckTemplates,
    /// Validate a single order document
    Validate(ValidateArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_dry_run() {
        let cli = Cli::try_parse_from(["orderloader", "run", "--dry-run"]).unwrap();
        assert!(matches!(cli.command, Commands::Run(RunArgs { dry_run: true })));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "orderloader",
            "status",
            "--queue-dir",
            "/tmp/q",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.queue_dir, Some(PathBuf::from("/tmp/q")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_validate_requires_file() {
        assert!(Cli::try_parse_from(["orderloader", "validate"]).is_err());
    }
}
