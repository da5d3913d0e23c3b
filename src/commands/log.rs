use anyhow::Result;
use serde::Serialize;

use retrace::format::OutputFormat;
use retrace::navigate::EntryView;
use retrace::navigate::log::{LogQuery, log};
use retrace::project::Project;

#[derive(Serialize)]
struct LogEnvelope<'a> {
    entries: &'a [EntryView],
    count: usize,
}

/// Print operations newest first.
pub fn run(
    project: &Project,
    path: Option<String>,
    producer: Option<String>,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let entries = log(
        project,
        &LogQuery {
            path,
            producer,
            limit,
        },
    )?;

    match format {
        OutputFormat::Json => {
            let envelope = LogEnvelope {
                entries: &entries,
                count: entries.len(),
            };
            println!("{}", format.serialize(&envelope)?);
        }
        OutputFormat::Text => {
            for entry in &entries {
                println!(
                    "{}  {}  {}  {}  {}",
                    entry.short_id, entry.timestamp, entry.producer, entry.kind, entry.path
                );
            }
        }
        OutputFormat::Pretty => print_pretty(&entries),
    }
    Ok(())
}

fn print_pretty(entries: &[EntryView]) {
    if entries.is_empty() {
        println!("No operations recorded.");
        return;
    }
    println!("  op            timestamp                 producer              kind         path");
    println!("  ────────────  ────────────────────────  ────────────────────  ───────────  ────────────");
    for entry in entries {
        let marker = if entry.snapshot || entry.kind == "read" { ' ' } else { '!' };
        println!(
            "{marker} {:<12}  {:<24}  {:<20}  {:<11}  {}",
            entry.short_id, entry.timestamp, entry.producer, entry.kind, entry.path
        );
    }
    println!();
    println!("Showing {} operation(s)", entries.len());
    if entries.iter().any(|e| !e.snapshot && e.kind != "read") {
        println!("  ! snapshot unavailable (store write failed)");
    }
    println!();
    println!("Next: retrace show <op>");
}
