//! qsync - keep a local directory of saved queries in step with the server
//!
//! This crate provides the core functionality for the `qsync` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (`QueryId`, `RemoteQuery`, `QueryMeta`)
//! - [`remote`] - Paginated HTTP client for the query API
//! - [`sync`] - Fingerprints, local store, and the reconciliation engine
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod sync;

pub use error::{Error, Result};
