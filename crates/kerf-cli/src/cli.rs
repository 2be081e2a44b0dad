use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kerf",
    version,
    about = "Split large byte streams into hash-addressed parts for deduplicated backups",
    after_help = "\
Configuration file lookup order:
  1. --config <path>            (explicit flag)
  2. $KERF_CONFIG               (environment variable)
  3. ./kerf.yaml                (project)
  4. Platform user config dir + /kerf/config.yaml

With --root, no configuration file is needed; defaults apply."
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides KERF_CONFIG and default search)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Store root directory (bypasses the configuration file)
    #[arg(short, long)]
    pub root: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Create the store root and shared areas
    Init,

    /// Read a byte stream and store it as a new instance of a target
    Add {
        /// Target name the instance belongs to
        target: String,

        /// Read from this file instead of stdin
        #[arg(short, long)]
        file: Option<String>,
    },

    /// List targets present in the store
    Targets,

    /// Show completeness of every instance of a target
    Status {
        /// Target name; all targets when omitted
        target: Option<String>,
    },

    /// Recompute an instance's whole-stream hash and compare sizes
    Verify {
        target: String,

        /// Instance identifier (e.g. 20260214T083015Z); newest complete
        /// when omitted
        instance: Option<String>,
    },

    /// Reassemble an instance's parts into the original stream
    Recover {
        target: String,

        /// Instance identifier; newest complete when omitted
        instance: Option<String>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Remove superseded instances according to the retention policy
    Prune {
        /// Target name; all targets when omitted
        target: Option<String>,

        /// Only show what would be removed
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Delete store entries no instance references any more
    Gc {
        /// Only show what would be removed
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Forcibly remove advisory locks left by crashed processes
    BreakLocks,
}
