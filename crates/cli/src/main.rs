// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! cairn - read-only observer CLI for the step cache
//!
//! Scans the storage roots and reports cached step directories. The CLI
//! never coordinates with running workers; state files are written by
//! atomic rename, so reads are always consistent.

mod commands;
mod output;

use anyhow::Result;
use cairn_core::Config;
use cairn_storage::{ScanFilter, Scanner};
use clap::{Parser, Subcommand, ValueEnum};
use output::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cairn",
    version,
    about = "cairn - content-addressed pipeline step cache"
)]
struct Cli {
    /// Storage root override (defaults to CAIRN_ROOT)
    #[arg(long = "root", global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Output format
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value_t,
        global = true
    )]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ResultStatusArg {
    Absent,
    Incomplete,
    Success,
    Failed,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AttemptStatusArg {
    Queued,
    Running,
    Success,
    Failed,
    Crashed,
    Cancelled,
    Preempted,
}

#[derive(Subcommand)]
enum Commands {
    /// List cached step directories, newest first
    List {
        /// Filter by result status
        #[arg(long)]
        result: Option<ResultStatusArg>,
        /// Filter by attempt status
        #[arg(long)]
        attempt: Option<AttemptStatusArg>,
        /// Filter by namespace prefix
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Show one step directory in full
    Show {
        /// Dot-separated namespace (e.g. my_project.pipelines.Train)
        namespace: String,
        /// Configuration hash
        hash: String,
    },
    /// Aggregate counts by status
    Stats,
    /// Print the storage root in use
    Root,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(root) = cli.root {
        config.base_root = root;
    }
    let scanner = Scanner::new(&config.base_root);

    match cli.command {
        Commands::List {
            result,
            attempt,
            namespace,
        } => {
            let filter = ScanFilter {
                result_status: result.map(Into::into),
                attempt_status: attempt.map(Into::into),
                namespace_prefix: namespace,
            };
            commands::list(&scanner, &filter, cli.output)
        }
        Commands::Show { namespace, hash } => {
            commands::show(&scanner, &namespace, &hash, cli.output)
        }
        Commands::Stats => commands::stats(&scanner, cli.output),
        Commands::Root => {
            println!("{}", config.base_root.display());
            Ok(())
        }
    }
}

impl From<ResultStatusArg> for cairn_storage::ResultStatus {
    fn from(arg: ResultStatusArg) -> Self {
        use cairn_storage::ResultStatus as R;
        match arg {
            ResultStatusArg::Absent => R::Absent,
            ResultStatusArg::Incomplete => R::Incomplete,
            ResultStatusArg::Success => R::Success,
            ResultStatusArg::Failed => R::Failed,
        }
    }
}

impl From<AttemptStatusArg> for cairn_storage::AttemptStatus {
    fn from(arg: AttemptStatusArg) -> Self {
        use cairn_storage::AttemptStatus as A;
        match arg {
            AttemptStatusArg::Queued => A::Queued,
            AttemptStatusArg::Running => A::Running,
            AttemptStatusArg::Success => A::Success,
            AttemptStatusArg::Failed => A::Failed,
            AttemptStatusArg::Crashed => A::Crashed,
            AttemptStatusArg::Cancelled => A::Cancelled,
            AttemptStatusArg::Preempted => A::Preempted,
        }
    }
}
