// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the writer.
//!
//! Only [`FanOutError`] ever reaches the caller of the coordinator; every
//! [`BackendError`] is absorbed, logged, and reported as `false` in the
//! per-backend result map.

use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown backend kind: {0}")]
    UnknownBackendKind(String),

    #[error("{kind} backend requires `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Failure of a single backend during `connect`, `write` or `close`.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("backend is not connected")]
    NotConnected,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A column could not be added to the relational table.
///
/// Never fatal: the column is left out of the rows of the current write.
#[derive(Debug, Error)]
#[error("could not add column `{column}`: {source}")]
pub struct SchemaError {
    pub column: String,
    #[source]
    pub source: sqlx::Error,
}

/// Errors raised by the fan-out coordinator itself.
#[derive(Debug, Error)]
pub enum FanOutError {
    #[error("no database backends available ({attempted} attempted)")]
    TotalFailure { attempted: usize },
}
