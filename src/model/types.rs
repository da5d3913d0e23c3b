//! Core timeline types for retrace.
//!
//! Foundation types used throughout the crate: operation and producer
//! identifiers, content hashes, timestamps, the decoded [`Operation`], its
//! position in the merged timeline ([`TimelineEntry`]) and the recorded state
//! of a file at that position ([`FileSnapshot`]).

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Which kind of value failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// An [`OperationId`].
    OperationId,
    /// A [`ProducerId`].
    ProducerId,
    /// A [`ContentHash`].
    ContentHash,
    /// A [`Timestamp`].
    Timestamp,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperationId => write!(f, "operation id"),
            Self::ProducerId => write!(f, "producer id"),
            Self::ContentHash => write!(f, "content hash"),
            Self::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// A value failed format validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What was being validated.
    pub kind: ErrorKind,
    /// The rejected input.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} '{}': {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

fn validate_token(kind: ErrorKind, s: &str, max_len: usize) -> Result<(), ValidationError> {
    if s.is_empty() {
        return Err(ValidationError {
            kind,
            value: s.to_owned(),
            reason: "must not be empty".to_owned(),
        });
    }
    if s.len() > max_len {
        return Err(ValidationError {
            kind,
            value: s.to_owned(),
            reason: format!("must be at most {max_len} bytes, got {}", s.len()),
        });
    }
    if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError {
            kind,
            value: s.to_owned(),
            reason: "must not contain whitespace or control characters".to_owned(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// OperationId
// ---------------------------------------------------------------------------

/// Globally unique identifier of one operation (typically a UUID).
///
/// Ordered lexicographically so a sorted set of ids supports prefix range
/// queries for abbreviated-id lookup.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationId(String);

impl OperationId {
    /// The maximum length of an operation id in bytes.
    pub const MAX_LEN: usize = 256;

    /// Create a new `OperationId`, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, or contains whitespace.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_token(ErrorKind::OperationId, s, Self::MAX_LEN)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first `len` characters, for display.
    #[must_use]
    pub fn short(&self, len: usize) -> &str {
        self.0
            .char_indices()
            .nth(len)
            .map_or(self.0.as_str(), |(idx, _)| &self.0[..idx])
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OperationId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for OperationId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_token(ErrorKind::OperationId, &s, Self::MAX_LEN)?;
        Ok(Self(s))
    }
}

impl From<OperationId> for String {
    fn from(id: OperationId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// ProducerId
// ---------------------------------------------------------------------------

/// Identifier of the producer (agent session) that emitted a shard.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProducerId(String);

impl ProducerId {
    /// The maximum length of a producer id in bytes.
    pub const MAX_LEN: usize = 256;

    /// Create a new `ProducerId`, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, or contains whitespace.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_token(ErrorKind::ProducerId, s, Self::MAX_LEN)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProducerId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_token(ErrorKind::ProducerId, &s, Self::MAX_LEN)?;
        Ok(Self(s))
    }
}

impl From<ProducerId> for String {
    fn from(id: ProducerId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// ShardId
// ---------------------------------------------------------------------------

/// Identifier of one log shard: its path relative to the log root,
/// `/`-separated. Used as the cross-shard tie-break in the merge.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(String);

impl ShardId {
    /// Wrap a shard id string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Return the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ContentHash
// ---------------------------------------------------------------------------

/// A validated 64-character lowercase hex SHA-256 digest of snapshot content.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Hex length of a SHA-256 digest.
    pub const HEX_LEN: usize = 64;

    /// Hash `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(format!("{digest:x}"))
    }

    /// Parse a hex digest, validating format.
    ///
    /// # Errors
    /// Returns an error unless `s` is exactly 64 lowercase hex characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.len() != Self::HEX_LEN {
            return Err(ValidationError {
                kind: ErrorKind::ContentHash,
                value: s.to_owned(),
                reason: format!("expected {} hex characters, got {}", Self::HEX_LEN, s.len()),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ValidationError {
                kind: ErrorKind::ContentHash,
                value: s.to_owned(),
                reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Milliseconds since the Unix epoch.
///
/// Records may carry either an integer or an RFC 3339 string; both decode to
/// the same representation so timestamps from different producers compare
/// directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Wrap a millisecond value.
    #[must_use]
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Parse an integer millisecond count or an RFC 3339 date-time.
    ///
    /// # Errors
    /// Returns an error if `s` is neither.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();
        if let Ok(ms) = trimmed.parse::<i64>() {
            return Ok(Self(ms));
        }
        DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| Self(dt.timestamp_millis()))
            .map_err(|e| ValidationError {
                kind: ErrorKind::Timestamp,
                value: s.to_owned(),
                reason: format!("expected epoch milliseconds or RFC 3339: {e}"),
            })
    }

    /// RFC 3339 rendering (UTC, millisecond precision).
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.0).map_or_else(
            || self.0.to_string(),
            |dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Self(ms)),
            Raw::Text(s) => Self::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// OpKind
// ---------------------------------------------------------------------------

/// What an operation did to its target file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// The file was read; no state change.
    Read,
    /// The file was written whole.
    Write,
    /// Several edits were applied; the record carries the resulting content.
    #[serde(alias = "multi-write", alias = "edit", alias = "multi_edit")]
    MultiWrite,
    /// The file was removed.
    Delete,
}

impl OpKind {
    /// Whether this kind changes file state (and therefore gets a snapshot).
    #[must_use]
    pub const fn mutates_file(self) -> bool {
        !self.reads_only()
    }

    /// Whether this kind only observes the file.
    #[must_use]
    pub const fn reads_only(self) -> bool {
        matches!(self, Self::Read)
    }

    /// Whether the recorded resulting content is required.
    #[must_use]
    pub const fn carries_content(self) -> bool {
        matches!(self, Self::Write | Self::MultiWrite)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::MultiWrite => "multi_write",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// One decoded unit of work with a potential file-state effect.
///
/// Only the fixed fields the timeline needs are typed; everything else the
/// producer wrote is kept in `extra` so newer record schemas survive a
/// round-trip through the decoder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Globally unique id.
    pub id: OperationId,
    /// The producer that emitted this record.
    pub producer: ProducerId,
    /// Wall-clock time as recorded by the producer.
    pub timestamp: Timestamp,
    /// Same-shard predecessor, if the producer recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<OperationId>,
    /// What happened to the file.
    pub kind: OpKind,
    /// Target file path exactly as recorded.
    pub path: PathBuf,
    /// Resulting file content for `write`/`multi_write`.
    ///
    /// Never persisted with the timeline; content lives in the snapshot store.
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
    /// Unrecognised record fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// TimelineEntry
// ---------------------------------------------------------------------------

/// One position in the globally merged sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// 0-based position, strictly increasing in merge order.
    pub seq: usize,
    /// The shard the operation came from.
    pub shard: ShardId,
    /// Position of the record within its shard (0-based).
    pub shard_seq: u64,
    /// Producer id, denormalised for display.
    pub producer: ProducerId,
    /// The operation itself.
    pub operation: Operation,
    /// Whether a snapshot was durably stored for this entry.
    ///
    /// Always `false` for read-only kinds. `false` for a mutating kind means
    /// the store write failed and the snapshot is unavailable.
    #[serde(default)]
    pub snapshot: bool,
}

impl TimelineEntry {
    /// Shorthand for the operation id.
    #[must_use]
    pub const fn id(&self) -> &OperationId {
        &self.operation.id
    }

    /// Shorthand for the operation kind.
    #[must_use]
    pub const fn kind(&self) -> OpKind {
        self.operation.kind
    }
}

// ---------------------------------------------------------------------------
// FileSnapshot
// ---------------------------------------------------------------------------

/// Immutable recorded state of one file at one timeline entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// The operation that produced this state.
    pub op: OperationId,
    /// The file, normalised to an absolute path.
    pub path: PathBuf,
    /// Content address of the bytes (the empty-content hash for tombstones).
    pub hash: ContentHash,
    /// `true` if the file did not exist after the operation.
    #[serde(default)]
    pub deleted: bool,
    /// Content length in bytes.
    #[serde(default)]
    pub size: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
