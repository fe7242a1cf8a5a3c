//! Clap-derived command line surface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Laughter-detection ingestion pipeline.
#[derive(Debug, Parser)]
#[command(name = "laughter-pipeline", version, about)]
pub struct Cli {
    /// Increase log verbosity; repeat for more (`-v`, `-vv`, `-vvv`).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Root directory audio/clip subtrees are written under, overriding `UPLOAD_DIR`.
    #[arg(long, global = true, env = "UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,

    /// The run mode to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// One invocation mode of the pipeline.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fleet sweep: process every active user's previous local day.
    RunNightly {
        /// Restrict the sweep to these users (id or email), in order given.
        #[arg(long = "user")]
        users: Vec<String>,
    },
    /// Catch up one user from their last-processed point to now.
    UpdateToday {
        /// User id or email.
        #[arg(long)]
        user: String,
    },
    /// Re-run a user over an explicit local-date range, deleting prior
    /// segments and detections in that range first.
    Reprocess {
        /// User id or email.
        #[arg(long)]
        user: String,
        /// First local date to reprocess (inclusive), `YYYY-MM-DD`.
        #[arg(long)]
        from: chrono::NaiveDate,
        /// Last local date to reprocess (inclusive), `YYYY-MM-DD`.
        #[arg(long)]
        to: chrono::NaiveDate,
    },
    /// Run only the orphan reconciliation sweep for one user.
    Reconcile {
        /// User id or email.
        #[arg(long)]
        user: String,
    },
}
