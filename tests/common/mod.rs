//! Integration test infrastructure.
#![allow(dead_code)]
//!
//! [`TestProject`] lays out a project directory and a log directory in a
//! fresh temp dir, writes agent log shards into it, and runs the `retrace`
//! binary against them. Everything is removed when it drops.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// One record in a shard: `(id, timestamp_ms, kind, path, content)`.
pub type Record<'a> = (&'a str, i64, &'a str, &'a str, Option<&'a str>);

/// A project plus its agent logs in a temporary directory.
pub struct TestProject {
    _dir: TempDir,
    root: PathBuf,
    logs: PathBuf,
}

impl TestProject {
    /// Create empty `proj/` and `logs/` directories.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let root = dir.path().join("proj");
        let logs = dir.path().join("logs");
        fs::create_dir_all(&root).expect("failed to create project dir");
        fs::create_dir_all(&logs).expect("failed to create log dir");
        Self {
            _dir: dir,
            root,
            logs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs(&self) -> &Path {
        &self.logs
    }

    /// Write a shard for `producer` whose header names this project.
    pub fn shard(&self, name: &str, producer: &str, records: &[Record<'_>]) {
        let mut lines = vec![self.header(producer)];
        lines.extend(records.iter().map(|r| record_line(*r)));
        self.raw_shard(name, &lines);
    }

    /// Write a shard from literal lines.
    pub fn raw_shard(&self, name: &str, lines: &[String]) {
        let path = self.logs.join(format!("{name}.jsonl"));
        fs::write(&path, lines.join("\n") + "\n").expect("failed to write shard");
    }

    /// The header line naming this project and `producer`.
    pub fn header(&self, producer: &str) -> String {
        serde_json::json!({ "cwd": self.root, "producer": producer }).to_string()
    }

    pub fn write_file(&self, rel: &str, content: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        fs::write(path, content).expect("failed to write file");
    }

    pub fn read_file(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.root.join(rel)).ok()
    }

    /// Number of content blobs in the default store.
    pub fn object_count(&self) -> usize {
        let objects = self.root.join(".retrace/store/objects");
        walkdir::WalkDir::new(objects)
            .into_iter()
            .flatten()
            .filter(|e| e.file_type().is_file())
            .count()
    }

    /// Run `retrace` against this project with text output.
    pub fn retrace(&self, args: &[&str]) -> Output {
        self.run("text", args)
    }

    fn run(&self, format: &str, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_retrace"))
            .arg("--project")
            .arg(&self.root)
            .arg("--log-root")
            .arg(&self.logs)
            .args(["--format", format])
            .args(args)
            .env_remove("FORMAT")
            .env_remove("RETRACE_LOG")
            .output()
            .expect("failed to run retrace")
    }

    /// Run `retrace` and assert success. Returns stdout.
    pub fn retrace_ok(&self, args: &[&str]) -> String {
        let out = self.retrace(args);
        let stdout = String::from_utf8_lossy(&out.stdout);
        let stderr = String::from_utf8_lossy(&out.stderr);
        assert!(
            out.status.success(),
            "retrace {} failed:\nstdout: {stdout}\nstderr: {stderr}",
            args.join(" "),
        );
        stdout.to_string()
    }

    /// Run `retrace` and assert it fails with exit code 1. Returns stderr.
    pub fn retrace_fails(&self, args: &[&str]) -> String {
        let out = self.retrace(args);
        assert_eq!(
            out.status.code(),
            Some(1),
            "expected retrace {} to exit 1.\nstdout: {}\nstderr: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr),
        );
        String::from_utf8_lossy(&out.stderr).to_string()
    }

    /// Run `retrace --format json`, assert success and parse stdout.
    pub fn retrace_json(&self, args: &[&str]) -> serde_json::Value {
        let out = self.run("json", args);
        let stdout = String::from_utf8_lossy(&out.stdout);
        assert!(
            out.status.success(),
            "retrace {} failed:\nstderr: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr),
        );
        serde_json::from_str(&stdout)
            .unwrap_or_else(|e| panic!("invalid JSON from retrace {}: {e}\n{stdout}", args.join(" ")))
    }
}

/// A single JSON log line.
pub fn record_line((id, ts, kind, path, content): Record<'_>) -> String {
    let mut record = serde_json::json!({
        "id": id, "timestamp": ts, "kind": kind, "path": path,
    });
    if let Some(content) = content {
        record["content"] = serde_json::json!(content);
    }
    record.to_string()
}

/// Scenario fixture: `foo.txt` written "1", "2", "3" at t=1,2,3; shard s1
/// (producer p1) holds the first and last write, s2 (producer p2) the middle.
pub fn three_writes() -> TestProject {
    let project = TestProject::new();
    project.shard(
        "s1",
        "p1",
        &[
            ("op-A-0001", 1, "write", "foo.txt", Some("1")),
            ("op-C-0003", 3, "write", "foo.txt", Some("3")),
        ],
    );
    project.shard("s2", "p2", &[("op-B-0002", 2, "write", "foo.txt", Some("2"))]);
    project.write_file("foo.txt", "3");
    project
}
