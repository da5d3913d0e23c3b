//! The project aggregate: one unit of work with its timeline and store.
//!
//! A [`Project`] owns its [`TimelineIndex`] and [`FsStore`]. Log shards are
//! inputs it reads but does not own. Opening a project either runs the full
//! pipeline (the default) or loads the last materialised timeline from the
//! store (`scan = false`).

use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::cancel::CancellationToken;
use crate::config::RetraceConfig;
use crate::decode::RecordDecoder;
use crate::discovery::DiscoveryOptions;
use crate::error::RetraceError;
use crate::model::types::TimelineEntry;
use crate::pipeline::{self, PipelineInput, PipelineReport};
use crate::store::FsStore;
use crate::timeline::TimelineIndex;

/// How to open a project. Unset fields fall back to the config file.
#[derive(Clone, Debug, Default)]
pub struct ProjectOptions {
    /// Project root (the discovery locator).
    pub root: PathBuf,
    /// Overrides `discovery.log_root`.
    pub log_root: Option<PathBuf>,
    /// Overrides `store.dir`.
    pub store_dir: Option<PathBuf>,
    /// Run discovery and the pipeline (`true`) or serve the stored timeline.
    pub scan: bool,
}

/// A loaded project.
#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    config: RetraceConfig,
    store: FsStore,
    index: TimelineIndex,
    report: PipelineReport,
}

impl Project {
    /// Open a project.
    ///
    /// # Errors
    /// Returns an error if the config is invalid, the store cannot be opened,
    /// or the run is cancelled. Partial pipeline failures are warnings in
    /// [`report`](Self::report), not errors.
    #[instrument(skip_all, fields(root = %opts.root.display(), scan = opts.scan))]
    pub fn open(
        opts: &ProjectOptions,
        decoder: &dyn RecordDecoder,
        cancel: &CancellationToken,
    ) -> Result<Self, RetraceError> {
        let root = absolute(&opts.root)?;
        let config = RetraceConfig::load(&root)?;
        let store_dir = opts
            .store_dir
            .as_ref()
            .map_or_else(|| config.store_dir(&root), |dir| root.join(dir));
        let store = FsStore::open(&store_dir)?;
        let min_prefix_len = config.navigation.min_prefix_len;

        let (index, report) = if opts.scan {
            let log_root = opts
                .log_root
                .clone()
                .or_else(|| config.discovery.log_root.clone())
                .map(|dir| root.join(dir));
            let discovery = log_root.map(|log_root| DiscoveryOptions {
                log_root,
                max_depth: config.discovery.max_depth,
                parallelism: config.discovery.parallelism,
            });
            let (index, report) = pipeline::run(&PipelineInput {
                project_root: &root,
                discovery,
                decoder,
                store: &store,
                cancel,
                min_prefix_len,
            })?;
            index.save(&store.timeline_path())?;
            (index, report)
        } else {
            let index = TimelineIndex::load(&store.timeline_path(), min_prefix_len)?
                .unwrap_or_else(|| {
                    debug!("no stored timeline; serving an empty project");
                    TimelineIndex::new(&root, Vec::new(), min_prefix_len)
                });
            let report = PipelineReport::from_index(&index);
            (index, report)
        };

        Ok(Self {
            root,
            config,
            store,
            index,
            report,
        })
    }

    /// Project root (absolute).
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &RetraceConfig {
        &self.config
    }

    /// The snapshot store.
    #[must_use]
    pub const fn store(&self) -> &FsStore {
        &self.store
    }

    /// The timeline index.
    #[must_use]
    pub const fn index(&self) -> &TimelineIndex {
        &self.index
    }

    /// Shard summaries and warnings from opening.
    #[must_use]
    pub const fn report(&self) -> &PipelineReport {
        &self.report
    }

    /// The view head: the entry named in `HEAD`, else the latest entry.
    ///
    /// A `HEAD` naming an operation no longer in the timeline is ignored.
    ///
    /// # Errors
    /// Returns an error if `HEAD` cannot be read.
    pub fn head(&self) -> Result<Option<&TimelineEntry>, RetraceError> {
        if let Some(id) = self.store.read_head()? {
            if let Some(entry) = self.index.get(&id) {
                return Ok(Some(entry));
            }
            warn!(head = %id, "HEAD names an unknown operation; following the latest entry");
        }
        Ok(self.index.last())
    }
}

fn absolute(path: &Path) -> Result<PathBuf, RetraceError> {
    std::path::absolute(path)
        .map(|p| crate::model::path::normalize(Path::new("/"), &p))
        .map_err(|e| RetraceError::io(path, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::JsonLineDecoder;
    use crate::model::types::OperationId;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ProjectOptions) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");
        let logs = tmp.path().join("logs");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&logs).unwrap();
        fs::write(
            logs.join("s1.jsonl"),
            format!(
                "{{\"cwd\":\"{}\"}}\n{{\"id\":\"op-1\",\"timestamp\":1,\"kind\":\"write\",\"path\":\"a.txt\",\"content\":\"x\"}}\n",
                root.display()
            ),
        )
        .unwrap();
        let opts = ProjectOptions {
            root,
            log_root: Some(logs),
            store_dir: None,
            scan: true,
        };
        (tmp, opts)
    }

    fn open(opts: &ProjectOptions) -> Project {
        Project::open(opts, &JsonLineDecoder, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn scan_materialises_and_persists_the_timeline() {
        let (_tmp, opts) = setup();
        let project = open(&opts);
        assert_eq!(project.index().len(), 1);
        assert!(project.store().timeline_path().is_file());
        assert!(project.root().join(".retrace/store/snapshots.jsonl").is_file());

        let cached = open(&ProjectOptions {
            scan: false,
            ..opts
        });
        assert_eq!(cached.index().entries(), project.index().entries());
        assert_eq!(cached.report().shards.len(), 1);
    }

    #[test]
    fn no_scan_without_timeline_is_empty() {
        let (_tmp, opts) = setup();
        let project = open(&ProjectOptions {
            scan: false,
            ..opts
        });
        assert!(project.index().is_empty());
        assert!(project.head().unwrap().is_none());
    }

    #[test]
    fn head_follows_latest_until_reset() {
        let (_tmp, opts) = setup();
        let project = open(&opts);
        assert_eq!(project.head().unwrap().unwrap().id().as_str(), "op-1");
        project
            .store()
            .write_head(&OperationId::new("op-gone").unwrap())
            .unwrap();
        assert_eq!(project.head().unwrap().unwrap().id().as_str(), "op-1");
    }

    #[test]
    fn invalid_config_is_an_error() {
        let (_tmp, opts) = setup();
        fs::create_dir_all(opts.root.join(".retrace")).unwrap();
        fs::write(opts.root.join(".retrace/config.toml"), "bogus = 1\n").unwrap();
        let err = Project::open(&opts, &JsonLineDecoder, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, RetraceError::Config { .. }));
    }
}
