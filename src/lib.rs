//! retrace library crate: the reconstruction pipeline and navigation engine.
//!
//! The primary interface is the `retrace` binary. This lib.rs exposes the
//! engine so integration tests and other front ends can drive discovery,
//! timeline construction and restores without going through the CLI.
//!
//! Data flows one way:
//! [`discovery`] finds shards, [`decode`] turns lines into operations,
//! [`timeline`] merges and indexes them, [`store`] keeps the file states,
//! and [`navigate`] answers queries over a [`project::Project`].

pub mod cancel;
pub mod config;
pub mod decode;
pub mod discovery;
pub mod error;
pub mod format;
pub mod model;
pub mod navigate;
pub mod pipeline;
pub mod project;
pub mod store;
pub mod telemetry;
pub mod timeline;
