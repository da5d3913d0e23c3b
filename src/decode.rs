//! Record decoding: raw shard lines to typed [`Operation`]s.
//!
//! The pipeline depends only on the [`RecordDecoder`] capability. The bundled
//! [`JsonLineDecoder`] understands the JSON-lines record format with an open
//! schema: the fields the timeline needs are typed, everything else lands in
//! [`Operation::extra`].
//!
//! A failed decode always hands the raw bytes back inside [`DecodeError`] so
//! that callers can report or recover the original line.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::model::types::{OpKind, Operation, OperationId, ProducerId, Timestamp};

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Why a raw line did not yield an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeFailure {
    /// Well-formed record that describes no file operation (header, message).
    NotAnOperation,
    /// The record could not be parsed or is missing required fields.
    Malformed(String),
}

/// A raw line that could not be decoded, with its bytes retained.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{}", describe(.failure))]
pub struct DecodeError {
    /// What went wrong.
    pub failure: DecodeFailure,
    /// The original line, byte for byte.
    pub raw: Vec<u8>,
}

fn describe(failure: &DecodeFailure) -> String {
    match failure {
        DecodeFailure::NotAnOperation => "record is not a file operation".to_owned(),
        DecodeFailure::Malformed(reason) => reason.clone(),
    }
}

impl DecodeError {
    fn malformed(raw: &[u8], reason: impl Into<String>) -> Self {
        Self {
            failure: DecodeFailure::Malformed(reason.into()),
            raw: raw.to_vec(),
        }
    }

    /// `true` if the line is simply not an operation and needs no warning.
    #[must_use]
    pub const fn is_not_an_operation(&self) -> bool {
        matches!(self.failure, DecodeFailure::NotAnOperation)
    }

    /// The raw line as lossy UTF-8, for messages.
    #[must_use]
    pub fn raw_lossy(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

// ---------------------------------------------------------------------------
// RecordDecoder
// ---------------------------------------------------------------------------

/// Pluggable decoder capability.
///
/// Implementations must be stateless per line: shards are decoded in
/// parallel and lines are handed over one at a time.
pub trait RecordDecoder: Send + Sync {
    /// Decode one raw line.
    ///
    /// `default_producer` is the shard's discovered producer, used when the
    /// record does not name one itself.
    ///
    /// # Errors
    /// Returns a [`DecodeError`] carrying `raw` when the line is not a
    /// usable operation.
    fn decode(&self, raw: &[u8], default_producer: &ProducerId) -> Result<Operation, DecodeError>;

    /// The origin (working directory) a line declares, if any.
    fn origin(&self, _raw: &[u8]) -> Option<PathBuf> {
        None
    }

    /// The producer a line declares, if any.
    fn producer(&self, _raw: &[u8]) -> Option<ProducerId> {
        None
    }
}

// ---------------------------------------------------------------------------
// JsonLineDecoder
// ---------------------------------------------------------------------------

/// Decoder for the JSON-lines record format.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonLineDecoder;

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default, alias = "uuid")]
    id: Option<String>,
    #[serde(default, alias = "session_id", alias = "sessionId")]
    producer: Option<String>,
    #[serde(default)]
    timestamp: Option<Timestamp>,
    #[serde(default)]
    kind: Option<OpKind>,
    #[serde(default, alias = "file_path")]
    path: Option<PathBuf>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "parent_id", alias = "parentUuid")]
    parent: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    cwd: Option<PathBuf>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct ShardHeader {
    #[serde(default)]
    cwd: Option<PathBuf>,
    #[serde(default, alias = "session_id", alias = "sessionId")]
    producer: Option<String>,
}

impl JsonLineDecoder {
    fn header(raw: &[u8]) -> Option<ShardHeader> {
        serde_json::from_slice(raw).ok()
    }
}

impl RecordDecoder for JsonLineDecoder {
    fn decode(&self, raw: &[u8], default_producer: &ProducerId) -> Result<Operation, DecodeError> {
        let record: RawRecord = serde_json::from_slice(raw)
            .map_err(|e| DecodeError::malformed(raw, format!("invalid record: {e}")))?;

        let Some(kind) = record.kind else {
            return Err(DecodeError {
                failure: DecodeFailure::NotAnOperation,
                raw: raw.to_vec(),
            });
        };

        let id = record
            .id
            .ok_or_else(|| DecodeError::malformed(raw, "missing field `id`"))?;
        let id = OperationId::new(&id).map_err(|e| DecodeError::malformed(raw, e.to_string()))?;

        let producer = match record.producer {
            Some(p) => ProducerId::new(&p).map_err(|e| DecodeError::malformed(raw, e.to_string()))?,
            None => default_producer.clone(),
        };

        let timestamp = record
            .timestamp
            .ok_or_else(|| DecodeError::malformed(raw, "missing field `timestamp`"))?;

        let path = record
            .path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| DecodeError::malformed(raw, "missing field `path`"))?;

        let parent = record
            .parent
            .map(|p| OperationId::new(&p))
            .transpose()
            .map_err(|e| DecodeError::malformed(raw, e.to_string()))?;

        let content = if kind.carries_content() {
            let content = record.content.ok_or_else(|| {
                DecodeError::malformed(raw, format!("`{kind}` record is missing `content`"))
            })?;
            Some(content.into_bytes())
        } else {
            None
        };

        Ok(Operation {
            id,
            producer,
            timestamp,
            parent,
            kind,
            path,
            content,
            extra: record.extra,
        })
    }

    fn origin(&self, raw: &[u8]) -> Option<PathBuf> {
        Self::header(raw).and_then(|p| p.cwd)
    }

    fn producer(&self, raw: &[u8]) -> Option<ProducerId> {
        Self::header(raw)
            .and_then(|p| p.producer)
            .and_then(|p| ProducerId::new(&p).ok())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
