//! CLI command layer: open the project, call the navigation engine, print.

mod diff;
mod log;
mod restore;
mod show;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use retrace::cancel::CancellationToken;
use retrace::decode::JsonLineDecoder;
use retrace::format::OutputFormat;
use retrace::project::{Project, ProjectOptions};

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Project root; also the locator matched against shard origins
    #[arg(long, short = 'C', global = true, env = "RETRACE_PROJECT", default_value = ".")]
    pub project: PathBuf,

    /// Directory scanned for log shards (overrides discovery.log_root)
    #[arg(long, global = true, env = "RETRACE_LOG_ROOT")]
    pub log_root: Option<PathBuf>,

    /// Snapshot store directory (overrides store.dir)
    #[arg(long, global = true, env = "RETRACE_STORE")]
    pub store: Option<PathBuf>,

    /// Serve from the last materialised timeline instead of re-scanning logs
    #[arg(long, global = true)]
    pub no_scan: bool,

    /// Output format (default: pretty on a terminal, text otherwise; env FORMAT)
    #[arg(long, global = true, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Summarize shards, operations and the view head
    ///
    /// Always succeeds, even when no shards were found.
    Status,

    /// List operations, newest first
    ///
    /// Examples:
    ///   retrace log --path 'src/**/*.rs'
    ///   retrace log --producer session-1 -n 10
    Log {
        /// Only operations whose path matches this glob (project-relative)
        #[arg(long)]
        path: Option<String>,

        /// Only operations from this producer
        #[arg(long)]
        producer: Option<String>,

        /// Maximum entries (0 = all; default from navigation.default_log_limit)
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Show one operation and its diff against the file's previous state
    Show {
        /// Operation id or unambiguous prefix
        id: String,
    },

    /// Diff the file state at two operations
    ///
    /// Either side may be 'current' for the live working file.
    ///
    /// Examples:
    ///   retrace diff 0b9c 7f21
    ///   retrace diff 0b9c current
    Diff {
        /// Old side: operation id/prefix or 'current'
        from: String,

        /// New side: operation id/prefix or 'current'
        to: String,

        /// Compare this path instead of each operation's own target
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Restore a file to its recorded state at an operation
    Checkout {
        /// Operation id or unambiguous prefix
        id: String,

        /// File to restore
        path: PathBuf,
    },

    /// Step back N mutating operations and restore the touched files
    ///
    /// Without --path the view head moves back too, so repeated undos keep
    /// stepping backwards. 'undo 0' changes nothing.
    Undo {
        /// Number of mutating operations to step back
        #[arg(default_value_t = 1)]
        n: usize,

        /// Only count and restore operations on this file
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Move the view head to an operation
    ///
    /// --soft (default) only moves the head. --hard also restores every
    /// recorded file to its state at that operation.
    Reset {
        /// Operation id or unambiguous prefix
        id: String,

        /// Also restore working files
        #[arg(long, conflicts_with = "soft")]
        hard: bool,

        /// Only move the view head (default)
        #[arg(long)]
        soft: bool,
    },
}

/// Run one command.
pub fn run(global: &GlobalArgs, command: Commands) -> Result<()> {
    let format = OutputFormat::resolve(global.format);
    let project = open_project(global)?;

    match command {
        Commands::Status => status::run(&project, format),
        Commands::Log {
            path,
            producer,
            limit,
        } => log::run(&project, path, producer, limit, format),
        Commands::Show { id } => show::run(&project, &id, format),
        Commands::Diff { from, to, path } => diff::run(&project, &from, &to, path.as_deref(), format),
        Commands::Checkout { id, path } => restore::checkout(&project, &id, &path, format),
        Commands::Undo { n, path } => restore::undo(&project, n, path.as_deref(), format),
        Commands::Reset { id, hard, soft: _ } => restore::reset(&project, &id, hard, format),
    }
}

fn open_project(global: &GlobalArgs) -> Result<Project> {
    let opts = ProjectOptions {
        root: global.project.clone(),
        log_root: global.log_root.clone(),
        store_dir: global.store.clone(),
        scan: !global.no_scan,
    };
    let project = Project::open(&opts, &JsonLineDecoder, &CancellationToken::new())?;

    let warnings = &project.report().warnings;
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
    if !warnings.is_empty() {
        eprintln!(
            "warning: {} record(s) or shard(s) had problems; results exclude them",
            warnings.len()
        );
    }
    Ok(project)
}
