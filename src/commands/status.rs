use anyhow::Result;

use retrace::format::OutputFormat;
use retrace::navigate::StatusReport;
use retrace::navigate::status::status;
use retrace::project::Project;

/// Print the project summary.
pub fn run(project: &Project, format: OutputFormat) -> Result<()> {
    let report = status(project)?;
    match format {
        OutputFormat::Json => println!("{}", format.serialize(&report)?),
        OutputFormat::Text => print_text(&report),
        OutputFormat::Pretty => print_pretty(&report),
    }
    Ok(())
}

fn print_text(report: &StatusReport) {
    println!(
        "shards: {}  operations: {}  snapshots: {}",
        report.shards.len(),
        report.operations,
        report.snapshots
    );
    match &report.head {
        Some(head) => println!("head: {} ({} beyond)", head.id, report.beyond_head),
        None => println!("head: none"),
    }
    for shard in &report.shards {
        let last = shard.last.as_ref().map_or("-", |id| id.as_str());
        println!("{}  {}  {}  {}", shard.shard, shard.producer, shard.operations, last);
    }
    if report.operations == 0 {
        println!();
        println!("Next: point --log-root (or discovery.log_root) at the agent log directory");
    } else {
        println!();
        println!("Next: retrace log");
    }
}

fn print_pretty(report: &StatusReport) {
    println!("=== Retrace: {} ===", report.root);
    println!();
    if report.shards.is_empty() {
        println!("  No log shards found for this project.");
        println!();
        println!("  Set the log directory with --log-root or in .retrace/config.toml:");
        println!("    [discovery]");
        println!("    log_root = \"/path/to/agent/logs\"");
        return;
    }

    println!(
        "  {} shard(s), {} operation(s), {} snapshot(s)",
        report.shards.len(),
        report.operations,
        report.snapshots
    );
    if let Some(head) = &report.head {
        if report.detached {
            println!(
                "  head: {} {} {} ({} newer operation(s) beyond the view)",
                head.short_id, head.kind, head.path, report.beyond_head
            );
        } else {
            println!("  head: {} {} {} (latest)", head.short_id, head.kind, head.path);
        }
    }
    println!();
    println!("  shard                             producer              ops  last");
    println!("  ────────────────────────────────  ────────────────────  ───  ────────────");
    for shard in &report.shards {
        let last = shard
            .last
            .as_ref()
            .map_or_else(|| "-".to_owned(), |id| id.short(12).to_owned());
        println!(
            "  {:<32}  {:<20}  {:>3}  {last}",
            shard.shard.as_str(),
            shard.producer.as_str(),
            shard.operations
        );
    }
    if report.warnings > 0 {
        println!();
        println!("  {} warning(s) while loading (see stderr)", report.warnings);
    }
}
