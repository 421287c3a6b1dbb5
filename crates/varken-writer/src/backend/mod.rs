// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Backend adapters.
//!
//! Defines the trait every storage backend implements, and the factory that
//! turns a [`BackendDescriptor`] into a boxed adapter.
//!
//! # Implementations
//!
//! - [`InfluxV1Backend`] -- InfluxDB 1.x, creates the database on connect
//! - [`InfluxV2Backend`] -- InfluxDB 2.x and 3.x, token auth
//! - [`TimescaleBackend`] -- TimescaleDB, schema-on-write wide table
//! - [`HttpLineBackend`] -- QuestDB and VictoriaMetrics `/write` endpoints
//!
//! Every adapter except TimescaleDB sends one newline-joined Line Protocol
//! body per write.

pub mod http_line;
pub mod influx;
pub mod schema;
pub mod timescale;

pub use http_line::HttpLineBackend;
pub use influx::{InfluxV1Backend, InfluxV2Backend};
pub use schema::{ColumnType, SchemaCache, SqlSession, SqlValue};
pub use timescale::TimescaleBackend;

use crate::descriptor::{BackendDescriptor, BackendId, BackendKind};
use crate::error::BackendError;
use crate::point::Point;
use async_trait::async_trait;
use reqwest::{Client, Response};

/// A storage backend.
///
/// Lifecycle: `connect` once (idempotent), any number of `write`s, then
/// `close`. A backend whose `connect` fails is never written to.
#[async_trait]
pub trait Backend: Send {
    /// Descriptor this backend was built from.
    fn descriptor(&self) -> &BackendDescriptor;

    /// Identity used in fan-out reports.
    fn id(&self) -> BackendId {
        self.descriptor().id()
    }

    /// Probe the backend and provision what it needs (database, table).
    async fn connect(&mut self) -> Result<(), BackendError>;

    /// Write an already normalized batch. An empty batch, or one with
    /// nothing encodable, succeeds without I/O.
    async fn write(&mut self, points: &[Point]) -> Result<(), BackendError>;

    /// Release connections.
    async fn close(&mut self) -> Result<(), BackendError>;
}

/// Build the adapter for a descriptor.
pub fn from_descriptor(descriptor: BackendDescriptor) -> Result<Box<dyn Backend>, BackendError> {
    let backend: Box<dyn Backend> = match descriptor.kind() {
        BackendKind::InfluxV1 => Box::new(InfluxV1Backend::new(descriptor)?),
        BackendKind::InfluxV2 | BackendKind::InfluxV3 => {
            Box::new(InfluxV2Backend::new(descriptor)?)
        }
        BackendKind::Timescale => Box::new(TimescaleBackend::new(descriptor)),
        BackendKind::QuestDb | BackendKind::VictoriaMetrics => {
            Box::new(HttpLineBackend::new(descriptor)?)
        }
    };
    Ok(backend)
}

/// HTTP client configured from the descriptor's timeout and TLS settings.
pub(crate) fn http_client(descriptor: &BackendDescriptor) -> Result<Client, BackendError> {
    let client = Client::builder()
        .timeout(descriptor.timeout())
        .danger_accept_invalid_certs(!descriptor.verify_tls())
        .build()?;
    Ok(client)
}

/// Turn a non-success response into [`BackendError::Status`].
pub(crate) async fn expect_status(
    response: Response,
    accepted: &[u16],
) -> Result<Response, BackendError> {
    let status = response.status().as_u16();
    if accepted.contains(&status) {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status { status, body })
    }
}
