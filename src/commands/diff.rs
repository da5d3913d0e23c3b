use std::path::Path;

use anyhow::Result;

use retrace::format::OutputFormat;
use retrace::navigate::diff::{DiffSide, diff};
use retrace::project::Project;

/// Print the diff between two sides.
pub fn run(
    project: &Project,
    from: &str,
    to: &str,
    path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let report = diff(project, &DiffSide::parse(from), &DiffSide::parse(to), path)?;
    match format {
        OutputFormat::Json => println!("{}", format.serialize(&report)?),
        OutputFormat::Text | OutputFormat::Pretty => {
            if report.identical {
                println!("No differences: {} and {} are identical.", report.from, report.to);
            } else {
                print!("{}", report.diff);
            }
        }
    }
    Ok(())
}
