use anyhow::Result;

use retrace::format::OutputFormat;
use retrace::navigate::ShowReport;
use retrace::navigate::show::show;
use retrace::project::Project;

/// Print one operation's detail and diff.
pub fn run(project: &Project, id: &str, format: OutputFormat) -> Result<()> {
    let report = show(project, id)?;
    match format {
        OutputFormat::Json => println!("{}", format.serialize(&report)?),
        OutputFormat::Text | OutputFormat::Pretty => print_detail(&report, format),
    }
    Ok(())
}

fn print_detail(report: &ShowReport, format: OutputFormat) {
    let entry = &report.entry;
    if format == OutputFormat::Pretty {
        println!("=== Operation {} ===", entry.id);
        println!();
    } else {
        println!("operation {}", entry.id);
    }
    println!("seq:       {}", entry.seq);
    println!("producer:  {}", entry.producer);
    println!("shard:     {} #{}", report.shard, report.shard_seq);
    println!("timestamp: {}", entry.timestamp);
    println!("kind:      {}", entry.kind);
    println!("path:      {}", entry.path);
    if let Some(parent) = &report.parent {
        println!("parent:    {parent}");
    }
    if let Some(snapshot) = &report.snapshot {
        if snapshot.deleted {
            println!("snapshot:  tombstone (file deleted)");
        } else {
            println!("snapshot:  {} ({} bytes)", snapshot.hash, snapshot.size);
        }
    } else if entry.kind != "read" {
        println!("snapshot:  unavailable");
    }
    for (key, value) in &report.extra {
        println!("{key}: {value}");
    }

    match &report.diff {
        Some(diff) if diff.is_empty() => {
            println!();
            println!("(content unchanged from previous state)");
        }
        Some(diff) => {
            println!();
            print!("{diff}");
        }
        None if report.snapshot.is_some() => {
            println!();
            println!("(no diff: the previous state's snapshot is unavailable)");
        }
        None => {}
    }

    if format == OutputFormat::Text {
        println!();
        println!("Next: retrace checkout {} {}", entry.short_id, entry.path);
    }
}
