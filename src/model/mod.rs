//! Data model: identifiers, operations, timeline entries and path rules.

pub mod ordering;
pub mod path;
pub mod types;
