// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Varken metrics writer
//!
//! Forwards measurement points produced by service pollers (Tautulli,
//! Sonarr, Radarr, ...) to every configured time-series backend.
//!
//! # Features
//!
//! - **Fan-out** -- one batch, every backend, concurrently, each with its own timeout
//! - **Failure isolation** -- a failing backend is reported, never fatal
//! - **Line Protocol** -- InfluxDB 1.x/2.x/3.x, QuestDB, VictoriaMetrics
//! - **TimescaleDB** -- schema-on-write hypertable, columns added as keys appear
//! - **Normalization** -- unstable field types pinned before any backend sees them
//!
//! # Architecture
//!
//! ```text
//! FanOut
//! +-- normalize()          (once per batch)
//! +-- InfluxV1Backend      (/write?db=)
//! +-- InfluxV2Backend      (/api/v2/write, 2.x and 3.x)
//! +-- TimescaleBackend     (varken_metrics hypertable + SchemaCache)
//! +-- HttpLineBackend      (QuestDB / VictoriaMetrics /write)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use varken_writer::{BackendDescriptor, FanOut, Point};
//!
//! let influx = BackendDescriptor::influx_v2("influx.local", 8086, token, "home", "varken")?;
//! let pg = BackendDescriptor::timescale("pg.local", 5432, "varken", password, "varken")?;
//!
//! let mut fanout = FanOut::connect(vec![influx, pg]).await?;
//! let report = fanout
//!     .write(&[Point::new("Tautulli").tag("server", "1").field("stream_count", 2i64)])
//!     .await;
//! if !report.all_succeeded() {
//!     tracing::warn!("failed backends: {:?}", report.failed());
//! }
//! fanout.close().await;
//! ```

pub mod backend;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fanout;
pub mod legacy;
pub mod line_protocol;
pub mod normalize;
pub mod point;

pub use backend::{Backend, HttpLineBackend, InfluxV1Backend, InfluxV2Backend, TimescaleBackend};
pub use config::{BackendConfig, WriterConfig};
pub use descriptor::{BackendDescriptor, BackendId, BackendKind, Credentials};
pub use error::{BackendError, ConfigError, FanOutError, SchemaError};
pub use fanout::{BackendInfo, FanOut, WriteReport, DEFAULT_WRITE_TIMEOUT};
pub use legacy::{LegacyConfig, LegacyError, LegacyInfluxServer, LegacyWriter};
pub use normalize::normalize;
pub use point::{FieldValue, Point, PointTime};
