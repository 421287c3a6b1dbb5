// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fan-out coordinator.
//!
//! Owns the live backends. Each `write` normalizes the batch once and hands
//! the same slice to every backend concurrently, each bounded by its own
//! timeout. Backend failures never escape as errors: they show up as
//! `false` in the returned [`WriteReport`].
//!
//! ```text
//! points --normalize--> batch --+--> influxdb2@a:8086  (timeout) --> true
//!                               +--> timescale@b:5432  (timeout) --> false
//!                               +--> questdb@c:9000    (timeout) --> true
//! ```

use crate::backend::{self, Backend};
use crate::descriptor::{BackendDescriptor, BackendId, BackendKind};
use crate::error::{BackendError, FanOutError};
use crate::normalize::normalize;
use crate::point::Point;
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

/// Per-backend bound on one `write`.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one `write`: one entry per live backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    results: BTreeMap<BackendId, bool>,
}

impl WriteReport {
    pub fn get(&self, id: &BackendId) -> Option<bool> {
        self.results.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BackendId, bool)> {
        self.results.iter().map(|(id, ok)| (id, *ok))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// At least one backend accepted the batch.
    pub fn any_succeeded(&self) -> bool {
        self.results.values().any(|ok| *ok)
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(|ok| *ok)
    }

    /// Backends that did not accept the batch.
    pub fn failed(&self) -> Vec<&BackendId> {
        self.results
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn into_map(self) -> BTreeMap<BackendId, bool> {
        self.results
    }
}

impl FromIterator<(BackendId, bool)> for WriteReport {
    fn from_iter<I: IntoIterator<Item = (BackendId, bool)>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for WriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, ok) in &self.results {
            writeln!(f, "{:<40} {}", id.to_string(), if *ok { "ok" } else { "FAILED" })?;
        }
        Ok(())
    }
}

/// Summary of a live backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub enabled: bool,
}

impl From<&BackendDescriptor> for BackendInfo {
    fn from(d: &BackendDescriptor) -> Self {
        Self {
            kind: d.kind(),
            host: d.host().to_string(),
            port: d.port(),
            database: d.database().to_string(),
            enabled: d.enabled(),
        }
    }
}

/// The fan-out coordinator.
pub struct FanOut {
    backends: Vec<Box<dyn Backend>>,
    write_timeout: Duration,
}

impl FanOut {
    /// Build and connect a backend for every enabled descriptor.
    ///
    /// Fails only when no backend ends up connected.
    pub async fn connect(
        descriptors: impl IntoIterator<Item = BackendDescriptor>,
    ) -> Result<Self, FanOutError> {
        let mut candidates = Vec::new();
        let mut attempted = 0usize;
        for descriptor in descriptors {
            if !descriptor.enabled() {
                tracing::debug!(backend = %descriptor.id(), "backend disabled, skipping");
                continue;
            }
            attempted += 1;
            let id = descriptor.id();
            match backend::from_descriptor(descriptor) {
                Ok(b) => candidates.push(b),
                Err(e) => tracing::error!(backend = %id, error = %e, "failed to build backend"),
            }
        }
        Self::connect_all(candidates, attempted).await
    }

    /// Connect already built backends.
    pub async fn from_backends(backends: Vec<Box<dyn Backend>>) -> Result<Self, FanOutError> {
        let attempted = backends.len();
        Self::connect_all(backends, attempted).await
    }

    async fn connect_all(
        candidates: Vec<Box<dyn Backend>>,
        attempted: usize,
    ) -> Result<Self, FanOutError> {
        let outcomes = join_all(candidates.into_iter().map(|mut b| async move {
            let res = b.connect().await;
            (b, res)
        }))
        .await;

        let mut backends: Vec<Box<dyn Backend>> = Vec::new();
        let mut seen = HashSet::new();
        for (mut b, res) in outcomes {
            let id = b.id();
            match res {
                Ok(()) if !seen.insert(id.clone()) => {
                    tracing::warn!(backend = %id, "duplicate backend, skipping");
                    if let Err(e) = b.close().await {
                        tracing::debug!(backend = %id, error = %e, "error closing duplicate");
                    }
                }
                Ok(()) => {
                    tracing::info!(backend = %id, "backend connected");
                    backends.push(b);
                }
                Err(e) => tracing::error!(backend = %id, error = %e, "failed to connect"),
            }
        }

        if backends.is_empty() {
            tracing::error!(attempted, "no database backends available");
            return Err(FanOutError::TotalFailure { attempted });
        }
        tracing::info!(live = backends.len(), attempted, "fan-out ready");
        Ok(Self {
            backends,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        })
    }

    /// Override the per-backend write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    pub fn backend_ids(&self) -> Vec<BackendId> {
        self.backends.iter().map(|b| b.id()).collect()
    }

    pub fn backend_info(&self) -> Vec<BackendInfo> {
        self.backends
            .iter()
            .map(|b| BackendInfo::from(b.descriptor()))
            .collect()
    }

    /// Write a batch to every live backend.
    ///
    /// A backend that errors or exceeds the write timeout is `false` in
    /// the report; its in-flight future is dropped. A batch that normalizes
    /// to nothing is reported as accepted everywhere without any I/O.
    pub async fn write(&mut self, points: &[Point]) -> WriteReport {
        let batch = normalize(points);
        if batch.is_empty() {
            tracing::warn!(received = points.len(), "no valid points to write");
            return self.backends.iter().map(|b| (b.id(), true)).collect();
        }

        let timeout = self.write_timeout;
        let batch = &batch;
        let outcomes = join_all(self.backends.iter_mut().map(|b| async move {
            let id = b.id();
            let res = match tokio::time::timeout(timeout, b.write(batch)).await {
                Ok(res) => res,
                Err(_) => Err(BackendError::Timeout(timeout)),
            };
            match res {
                Ok(()) => {
                    tracing::debug!(backend = %id, points = batch.len(), "write ok");
                    (id, true)
                }
                Err(e) => {
                    tracing::warn!(backend = %id, error = %e, "write failed");
                    (id, false)
                }
            }
        }))
        .await;

        let report: WriteReport = outcomes.into_iter().collect();
        if !report.any_succeeded() {
            tracing::error!(points = batch.len(), "batch rejected by every backend");
        }
        report
    }

    /// Close every backend, continuing past failures.
    pub async fn close(&mut self) {
        for b in self.backends.iter_mut() {
            let id = b.id();
            match b.close().await {
                Ok(()) => tracing::debug!(backend = %id, "backend closed"),
                Err(e) => tracing::warn!(backend = %id, error = %e, "error closing backend"),
            }
        }
    }
}
