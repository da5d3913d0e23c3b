//! Shard discovery: find every log shard that belongs to a project.
//!
//! Walks the log root for `*.jsonl` files and keeps those whose declared
//! origin (the `cwd` of the first record carrying one) equals the project
//! root. A shard without a declared origin is still accepted when it sits in
//! a directory named after the encoded project path (`/work/app` becomes
//! `-work-app`), the layout agent tools commonly use.
//!
//! Discovery is read-only. Unreadable entries become [`DiscoveryError`]s and
//! are excluded; they never abort the scan. Files are read in parallel on the
//! current `rayon` pool (see [`build_pool`]) and the cancellation token is
//! checked before each shard.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::cancel::CancellationToken;
use crate::decode::RecordDecoder;
use crate::error::RetraceError;
use crate::model::path::normalize;
use crate::model::types::{ProducerId, ShardId};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One raw line of a shard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawLine {
    /// 1-based line number in the file.
    pub number: usize,
    /// Line bytes without the trailing newline.
    pub bytes: Vec<u8>,
}

/// One append-only log file produced by a single producer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogShard {
    /// Path relative to the log root, `/`-separated.
    pub id: ShardId,
    /// Where the file lives.
    pub origin_path: PathBuf,
    /// The producer discovered from the shard's records (or its file stem).
    pub producer: ProducerId,
    /// Non-blank lines in file order.
    pub lines: Vec<RawLine>,
}

/// A shard location that could not be read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryError {
    /// The unreadable file or directory.
    pub path: PathBuf,
    /// What went wrong.
    pub reason: String,
}

/// Result of one discovery scan.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Matching shards, sorted by id.
    pub shards: Vec<LogShard>,
    /// Locations that were skipped.
    pub errors: Vec<DiscoveryError>,
}

/// Discovery parameters.
#[derive(Clone, Debug)]
pub struct DiscoveryOptions {
    /// Root scanned for shards.
    pub log_root: PathBuf,
    /// Maximum directory depth below the root.
    pub max_depth: usize,
    /// Worker threads for the scan (0 = rayon default).
    pub parallelism: usize,
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Encode a project root the way agent log directories name it.
#[must_use]
pub fn encode_locator(locator: &Path) -> String {
    locator
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Find all shards under `opts.log_root` whose origin matches `locator`.
///
/// A missing log root yields an empty result. Shards are read on the
/// current rayon pool; callers that honour `opts.parallelism` run this
/// inside the pool from [`build_pool`].
///
/// # Errors
/// Returns [`RetraceError::Cancelled`] if `cancel` fires during the scan.
#[instrument(skip_all, fields(log_root = %opts.log_root.display(), locator = %locator.display()))]
pub fn discover(
    opts: &DiscoveryOptions,
    locator: &Path,
    decoder: &dyn RecordDecoder,
    cancel: &CancellationToken,
) -> Result<Discovery, RetraceError> {
    let mut result = Discovery::default();

    if !opts.log_root.is_dir() {
        debug!("log root does not exist; empty project");
        return Ok(result);
    }

    let candidates = collect_candidates(opts, &mut result.errors);
    debug!(candidates = candidates.len(), "scanning shard candidates");

    let locator = normalize(Path::new("/"), locator);
    let encoded = encode_locator(&locator);

    let scan = |path: &PathBuf| -> Option<Result<Option<LogShard>, DiscoveryError>> {
        if cancel.is_cancelled() {
            return None;
        }
        Some(read_shard(&opts.log_root, path, &locator, &encoded, decoder))
    };

    let outcomes: Vec<Option<Result<Option<LogShard>, DiscoveryError>>> =
        candidates.par_iter().map(scan).collect();

    if cancel.is_cancelled() || outcomes.iter().any(Option::is_none) {
        return Err(RetraceError::Cancelled);
    }

    for outcome in outcomes.into_iter().flatten() {
        match outcome {
            Ok(Some(shard)) => result.shards.push(shard),
            Ok(None) => {}
            Err(e) => {
                debug!(path = %e.path.display(), reason = %e.reason, "skipping unreadable shard");
                result.errors.push(e);
            }
        }
    }

    result.shards.sort_by(|a, b| a.id.cmp(&b.id));
    debug!(shards = result.shards.len(), "discovery complete");
    Ok(result)
}

/// A dedicated pool of `parallelism` threads, or `None` for the global pool.
pub(crate) fn build_pool(parallelism: usize) -> Option<rayon::ThreadPool> {
    if parallelism == 0 {
        return None;
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism)
        .build()
        .map_err(|e| warn!("falling back to the global rayon pool: {e}"))
        .ok()
}

fn collect_candidates(opts: &DiscoveryOptions, errors: &mut Vec<DiscoveryError>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(&opts.log_root)
        .max_depth(opts.max_depth)
        .follow_links(false)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if entry.file_type().is_file()
                    && path.extension().is_some_and(|ext| ext == "jsonl")
                {
                    files.push(path.to_path_buf());
                }
            }
            Err(e) => errors.push(DiscoveryError {
                path: e
                    .path()
                    .map_or_else(|| opts.log_root.clone(), Path::to_path_buf),
                reason: e.to_string(),
            }),
        }
    }
    files
}

fn read_shard(
    log_root: &Path,
    path: &Path,
    locator: &Path,
    encoded_locator: &str,
    decoder: &dyn RecordDecoder,
) -> Result<Option<LogShard>, DiscoveryError> {
    let bytes = std::fs::read(path).map_err(|e| DiscoveryError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let lines = split_lines(&bytes);

    let declared = lines.iter().find_map(|line| decoder.origin(&line.bytes));
    let matches = declared.as_ref().map_or_else(
        || {
            path.parent()
                .and_then(Path::file_name)
                .is_some_and(|dir| dir.to_string_lossy() == encoded_locator)
        },
        |origin| normalize(locator, origin) == locator,
    );
    if !matches {
        debug!(path = %path.display(), "shard belongs to another project");
        return Ok(None);
    }

    let id = shard_id(log_root, path);
    let producer = lines
        .iter()
        .find_map(|line| decoder.producer(&line.bytes))
        .or_else(|| {
            path.file_stem()
                .and_then(|stem| ProducerId::new(&stem.to_string_lossy()).ok())
        })
        .map_or_else(|| fallback_producer(&id), Ok)?;

    Ok(Some(LogShard {
        id,
        origin_path: path.to_path_buf(),
        producer,
        lines,
    }))
}

fn fallback_producer(id: &ShardId) -> Result<ProducerId, DiscoveryError> {
    let sanitized: String = id
        .as_str()
        .chars()
        .map(|c| if c.is_whitespace() || c.is_control() { '_' } else { c })
        .collect();
    ProducerId::new(&sanitized).map_err(|e| DiscoveryError {
        path: PathBuf::from(id.as_str()),
        reason: e.to_string(),
    })
}

fn shard_id(log_root: &Path, path: &Path) -> ShardId {
    let rel = path.strip_prefix(log_root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    ShardId::new(parts.join("/"))
}

/// Split file bytes into non-blank lines, keeping 1-based line numbers.
#[must_use]
pub fn split_lines(bytes: &[u8]) -> Vec<RawLine> {
    bytes
        .split(|b| *b == b'\n')
        .enumerate()
        .filter_map(|(idx, line)| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.iter().all(u8::is_ascii_whitespace) {
                None
            } else {
                Some(RawLine {
                    number: idx + 1,
                    bytes: line.to_vec(),
                })
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
