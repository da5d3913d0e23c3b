use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

mod commands;

/// Undo and history for multi-agent edits
///
/// Retrace reads the operation logs that coding agents leave behind, merges
/// every agent's log for this project into one ordered timeline, and keeps
/// a content-addressed snapshot of each file state they wrote. From that
/// timeline you can browse, diff, and restore files without any agent
/// having used version control.
///
/// QUICK START:
///
///   retrace --log-root ~/.agent/logs status
///   retrace log --path 'src/**'
///   retrace show <op>
///   retrace checkout <op> src/main.rs
///
/// IDENTIFIERS:
///
///   Operations are named by their id or any unambiguous prefix of at least
///   navigation.min_prefix_len characters (default 4).
///
/// CONFIGURATION:
///
///   .retrace/config.toml in the project root; flags override it.
///   RETRACE_LOG controls diagnostics (e.g. RETRACE_LOG=debug, stderr-json).
#[derive(Parser)]
#[command(name = "retrace")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(
    after_help = "See 'retrace <command> --help' for more information on a specific command."
)]
struct Cli {
    #[command(flatten)]
    global: commands::GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Navigate(commands::Commands),

    /// Generate shell completions
    ///
    /// Example: retrace completions zsh > ~/.zfunc/_retrace
    Completions {
        /// Target shell
        shell: Shell,
    },
}

fn main() -> Result<()> {
    retrace::telemetry::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Navigate(cmd) => commands::run(&cli.global, cmd),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "retrace", &mut io::stdout());
            Ok(())
        }
    }
}
