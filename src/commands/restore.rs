use std::path::Path;

use anyhow::Result;

use retrace::format::OutputFormat;
use retrace::navigate::restore::{self, RestoreAction, RestoreReport};
use retrace::project::Project;

/// `retrace checkout <id> <path>`
pub fn checkout(project: &Project, id: &str, path: &Path, format: OutputFormat) -> Result<()> {
    let report = restore::checkout(project, id, path)?;
    print_report("checkout", &report, format)
}

/// `retrace undo [n] [--path P]`
pub fn undo(project: &Project, n: usize, path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let report = restore::undo(project, n, path)?;
    print_report("undo", &report, format)
}

/// `retrace reset <id> [--hard]`
pub fn reset(project: &Project, id: &str, hard: bool, format: OutputFormat) -> Result<()> {
    let report = restore::reset(project, id, hard)?;
    print_report(if hard { "reset --hard" } else { "reset" }, &report, format)
}

fn print_report(command: &str, report: &RestoreReport, format: OutputFormat) -> Result<()> {
    // Conflict warnings are mandatory output in every format.
    for conflict in &report.conflicts {
        eprintln!("{conflict}");
    }
    for path in report.unavailable() {
        eprintln!(
            "warning: {} left unchanged: snapshot of {} is unavailable",
            path.path,
            path.from_op.as_deref().unwrap_or("-")
        );
    }

    match format {
        OutputFormat::Json => println!("{}", format.serialize(report)?),
        OutputFormat::Text => {
            for restored in &report.restored {
                let action = match restored.action {
                    RestoreAction::Written => "restored",
                    RestoreAction::Deleted => "deleted",
                    RestoreAction::Skipped => "skipped",
                    RestoreAction::Unavailable => "unavailable",
                };
                let from = restored.from_op.as_deref().unwrap_or("-");
                println!("{action}  {}  {from}", restored.path);
            }
            if let Some(head) = &report.head {
                println!("head: {head}");
            }
        }
        OutputFormat::Pretty => {
            match &report.target {
                Some(target) => println!(
                    "{command}: {} ({} {} by {})",
                    target.short_id, target.kind, target.path, target.producer
                ),
                None => println!("{command}: nothing to do"),
            }
            if report.restored.is_empty() {
                println!("  No files changed.");
            }
            for restored in &report.restored {
                match restored.action {
                    RestoreAction::Written => println!(
                        "  ✓ {} ({} bytes)",
                        restored.path,
                        restored.bytes.unwrap_or(0)
                    ),
                    RestoreAction::Deleted => println!("  ✗ {} (deleted)", restored.path),
                    RestoreAction::Skipped => println!(
                        "  - {} (skipped: first recorded after the target)",
                        restored.path
                    ),
                    RestoreAction::Unavailable => println!(
                        "  ! {} (left unchanged: snapshot unavailable)",
                        restored.path
                    ),
                }
            }
            println!();
            match &report.head {
                Some(head) => println!("View head: {head}"),
                None => println!("View head: none"),
            }
            println!("Next: retrace status");
        }
    }
    Ok(())
}
