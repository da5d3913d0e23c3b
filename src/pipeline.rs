//! The batch pipeline: discovery → decode → merge → extract → store → index.
//!
//! Runs to completion before any navigation query is served. Shards are read
//! and decoded in parallel; the merge is single-threaded. Snapshot writes for
//! distinct keys run in parallel (the store serialises same-key writes). All
//! parallel stages share one rayon pool sized by `discovery.parallelism`.
//!
//! Partial failures never abort the run. They are collected as
//! [`PipelineWarning`]s in the returned [`PipelineReport`]:
//!
//! | Warning | Effect |
//! |---|---|
//! | `Decode` | line skipped, raw bytes kept in the warning |
//! | `Discovery` | shard excluded |
//! | `StoreWrite` | entry kept, flagged snapshot-unavailable |
//! | `DanglingParent` | entry kept |
//! | `DuplicateOperation` | later copy dropped |

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::cancel::CancellationToken;
use crate::decode::{DecodeError, RecordDecoder};
use crate::discovery::{self, DiscoveryError, DiscoveryOptions, LogShard};
use crate::error::RetraceError;
use crate::model::types::{OperationId, ProducerId, ShardId};
use crate::store::SnapshotStore;
use crate::timeline::{
    DecodedShard, SnapshotContent, SnapshotRequest, TimelineIndex, extract, merge,
};

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// A non-fatal problem found during a pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineWarning {
    /// A line could not be decoded; it was skipped.
    Decode {
        /// Shard holding the line.
        shard: ShardId,
        /// 1-based line number.
        line: usize,
        /// The failure, with the raw bytes.
        error: DecodeError,
    },
    /// A shard location was unreadable; it was excluded.
    Discovery(DiscoveryError),
    /// A snapshot could not be stored; the entry is snapshot-unavailable.
    StoreWrite {
        /// The producing operation.
        op: OperationId,
        /// The target path.
        path: PathBuf,
        /// The store failure.
        reason: String,
    },
    /// An operation names a parent not seen earlier in its shard.
    DanglingParent {
        /// The operation.
        op: OperationId,
        /// The missing parent.
        parent: OperationId,
        /// Its shard.
        shard: ShardId,
    },
    /// An operation id repeated an earlier one; the later copy was dropped.
    DuplicateOperation {
        /// The repeated id.
        op: OperationId,
        /// Shard holding the dropped copy.
        shard: ShardId,
    },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode { shard, line, error } => write!(
                f,
                "{shard}:{line}: undecodable record ({error}): {}",
                truncate(&error.raw_lossy(), 120)
            ),
            Self::Discovery(e) => {
                write!(f, "{}: shard unreadable, skipped: {}", e.path.display(), e.reason)
            }
            Self::StoreWrite { op, path, reason } => write!(
                f,
                "{op}: snapshot of {} unavailable: {reason}",
                path.display()
            ),
            Self::DanglingParent { op, parent, shard } => write!(
                f,
                "{shard}: operation {op} names parent {parent}, which does not precede it in the shard"
            ),
            Self::DuplicateOperation { op, shard } => {
                write!(f, "{shard}: duplicate operation id {op} dropped")
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Per-shard summary of one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShardSummary {
    /// The shard id.
    pub shard: ShardId,
    /// Its producer.
    pub producer: ProducerId,
    /// Operations from this shard in the timeline.
    pub operations: usize,
    /// The shard's latest operation in the timeline.
    pub last: Option<OperationId>,
}

/// Everything a run learned besides the timeline itself.
#[derive(Clone, Debug, Default)]
pub struct PipelineReport {
    /// Shards that contributed (possibly zero operations each).
    pub shards: Vec<ShardSummary>,
    /// Snapshots durably stored.
    pub snapshots_stored: usize,
    /// Accumulated non-fatal problems.
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineReport {
    /// Shard summaries derived from a timeline alone (no scan performed).
    #[must_use]
    pub fn from_index(index: &TimelineIndex) -> Self {
        let mut shards: Vec<ShardSummary> = Vec::new();
        for entry in index.entries() {
            match shards.iter_mut().find(|s| s.shard == entry.shard) {
                Some(summary) => {
                    summary.operations += 1;
                    summary.last = Some(entry.id().clone());
                }
                None => shards.push(ShardSummary {
                    shard: entry.shard.clone(),
                    producer: entry.producer.clone(),
                    operations: 1,
                    last: Some(entry.id().clone()),
                }),
            }
        }
        shards.sort_by(|a, b| a.shard.cmp(&b.shard));
        Self {
            shards,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Inputs for one pipeline run.
pub struct PipelineInput<'a> {
    /// Project root; locator for discovery and base for relative paths.
    pub project_root: &'a Path,
    /// Where and how to scan. `None` means no log root: empty project.
    pub discovery: Option<DiscoveryOptions>,
    /// Record decoder.
    pub decoder: &'a dyn RecordDecoder,
    /// Snapshot store.
    pub store: &'a dyn SnapshotStore,
    /// Checked between shards.
    pub cancel: &'a CancellationToken,
    /// Minimum abbreviated-id length for the resulting index.
    pub min_prefix_len: usize,
}

/// Run the full pipeline.
///
/// # Errors
/// Only [`RetraceError::Cancelled`]; everything else is a warning.
#[instrument(skip_all, fields(root = %input.project_root.display()))]
pub fn run(input: &PipelineInput<'_>) -> Result<(TimelineIndex, PipelineReport), RetraceError> {
    let parallelism = input.discovery.as_ref().map_or(0, |o| o.parallelism);
    match discovery::build_pool(parallelism) {
        Some(pool) => {
            debug!(threads = pool.current_num_threads(), "running on a dedicated pool");
            pool.install(|| run_stages(input))
        }
        None => run_stages(input),
    }
}

fn run_stages(input: &PipelineInput<'_>) -> Result<(TimelineIndex, PipelineReport), RetraceError> {
    let mut report = PipelineReport::default();

    let shards = match &input.discovery {
        Some(opts) => {
            let found = discovery::discover(opts, input.project_root, input.decoder, input.cancel)?;
            report
                .warnings
                .extend(found.errors.into_iter().map(PipelineWarning::Discovery));
            found.shards
        }
        None => Vec::new(),
    };

    let decoded = decode_all(&shards, input.decoder, input.cancel)?;
    let mut decoded_shards = Vec::with_capacity(decoded.len());
    for (shard, warnings) in decoded {
        report.warnings.extend(warnings);
        decoded_shards.push(shard);
    }
    let producers: Vec<(ShardId, ProducerId)> = decoded_shards
        .iter()
        .map(|s| (s.id.clone(), s.producer.clone()))
        .collect();

    let merged = merge(decoded_shards);
    report
        .warnings
        .extend(merged.duplicates.into_iter().map(|d| PipelineWarning::DuplicateOperation {
            op: d.id,
            shard: d.shard,
        }));
    let mut entries = merged.entries;

    let requests = extract(&entries, input.project_root);
    let outcomes = store_all(&requests, input.store);
    let mut stored = Vec::new();
    for (request, outcome) in requests.iter().zip(outcomes) {
        match outcome {
            Ok(()) => stored.push(request.seq),
            Err(reason) => {
                debug!(op = %request.op, path = %request.path.display(), %reason, "snapshot write failed");
                report.warnings.push(PipelineWarning::StoreWrite {
                    op: request.op.clone(),
                    path: request.path.clone(),
                    reason,
                });
            }
        }
    }
    drop(requests);
    for seq in &stored {
        entries[*seq].snapshot = true;
    }
    report.snapshots_stored = stored.len();

    let index = TimelineIndex::new(input.project_root, entries, input.min_prefix_len);

    let mut summaries = PipelineReport::from_index(&index).shards;
    for (shard, producer) in producers {
        if !summaries.iter().any(|s| s.shard == shard) {
            summaries.push(ShardSummary {
                shard,
                producer,
                operations: 0,
                last: None,
            });
        }
    }
    summaries.sort_by(|a, b| a.shard.cmp(&b.shard));
    report.shards = summaries;

    info!(
        shards = report.shards.len(),
        operations = index.len(),
        snapshots = report.snapshots_stored,
        warnings = report.warnings.len(),
        "pipeline complete"
    );
    Ok((index, report))
}

fn decode_all(
    shards: &[LogShard],
    decoder: &dyn RecordDecoder,
    cancel: &CancellationToken,
) -> Result<Vec<(DecodedShard, Vec<PipelineWarning>)>, RetraceError> {
    let decoded: Option<Vec<_>> = shards
        .par_iter()
        .map(|shard| {
            if cancel.is_cancelled() {
                return None;
            }
            Some(decode_shard(shard, decoder))
        })
        .collect();
    match decoded {
        Some(decoded) if !cancel.is_cancelled() => Ok(decoded),
        _ => Err(RetraceError::Cancelled),
    }
}

/// Decode every line of one shard, keeping shard order.
#[instrument(skip_all, fields(shard = %shard.id, lines = shard.lines.len()))]
pub fn decode_shard(
    shard: &LogShard,
    decoder: &dyn RecordDecoder,
) -> (DecodedShard, Vec<PipelineWarning>) {
    let mut operations = Vec::new();
    let mut warnings = Vec::new();
    let mut seen: HashSet<OperationId> = HashSet::new();

    for line in &shard.lines {
        match decoder.decode(&line.bytes, &shard.producer) {
            Ok(op) => {
                if let Some(parent) = &op.parent
                    && !seen.contains(parent)
                {
                    warnings.push(PipelineWarning::DanglingParent {
                        op: op.id.clone(),
                        parent: parent.clone(),
                        shard: shard.id.clone(),
                    });
                }
                seen.insert(op.id.clone());
                operations.push((operations.len() as u64, op));
            }
            Err(error) if error.is_not_an_operation() => {}
            Err(error) => {
                debug!(line = line.number, %error, "skipping undecodable line");
                warnings.push(PipelineWarning::Decode {
                    shard: shard.id.clone(),
                    line: line.number,
                    error,
                });
            }
        }
    }

    (
        DecodedShard {
            id: shard.id.clone(),
            producer: shard.producer.clone(),
            operations,
        },
        warnings,
    )
}

fn store_all(requests: &[SnapshotRequest<'_>], store: &dyn SnapshotStore) -> Vec<Result<(), String>> {
    requests
        .par_iter()
        .map(|request| {
            let result = match request.content {
                SnapshotContent::Bytes(bytes) => store.put(request.op, &request.path, bytes),
                SnapshotContent::Tombstone => store.put_tombstone(request.op, &request.path),
            };
            result.map(|_| ()).map_err(|e| e.to_string())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
