// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Compatibility wrapper for call sites written against a single InfluxDB
//! server.
//!
//! `write_points` collapses the fan-out report to one boolean: `true` as
//! soon as any backend accepted the batch. A failing backend is therefore
//! invisible to these callers; `write_points_detailed` exposes the full
//! report for those that need it.

use crate::descriptor::{BackendDescriptor, DEFAULT_DATABASE};
use crate::error::{ConfigError, FanOutError};
use crate::fanout::{FanOut, WriteReport};
use crate::point::Point;
use serde::Deserialize;
use thiserror::Error;

/// Single-server settings of older deployments (always InfluxDB 1.x).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyInfluxServer {
    pub url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

fn default_port() -> u16 {
    8086
}

fn default_true() -> bool {
    true
}

impl LegacyInfluxServer {
    /// InfluxDB 1.x descriptor writing to the `varken` database.
    pub fn to_descriptor(&self) -> Result<BackendDescriptor, ConfigError> {
        Ok(BackendDescriptor::influx_v1(
            self.url.as_str(),
            self.port,
            self.username.as_str(),
            self.password.as_str(),
            DEFAULT_DATABASE,
        )?
        .with_tls(self.ssl, self.verify_ssl))
    }
}

/// Either the old single-server settings or a full backend list.
#[derive(Debug, Clone)]
pub enum LegacyConfig {
    Single(LegacyInfluxServer),
    Multi(Vec<BackendDescriptor>),
}

impl LegacyConfig {
    pub fn descriptors(self) -> Result<Vec<BackendDescriptor>, ConfigError> {
        match self {
            LegacyConfig::Single(server) => Ok(vec![server.to_descriptor()?]),
            LegacyConfig::Multi(descriptors) => Ok(descriptors),
        }
    }
}

#[derive(Debug, Error)]
pub enum LegacyError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    FanOut(#[from] FanOutError),
}

/// Drop-in writer for the old single-boolean contract.
pub struct LegacyWriter {
    fanout: FanOut,
}

impl LegacyWriter {
    pub async fn connect(config: LegacyConfig) -> Result<Self, LegacyError> {
        let fanout = FanOut::connect(config.descriptors()?).await?;
        Ok(Self { fanout })
    }

    /// Wrap an existing coordinator.
    pub fn from_fanout(fanout: FanOut) -> Self {
        Self { fanout }
    }

    /// `true` when at least one backend accepted the batch.
    pub async fn write_points(&mut self, points: &[Point]) -> bool {
        self.fanout.write(points).await.any_succeeded()
    }

    pub async fn write_points_detailed(&mut self, points: &[Point]) -> WriteReport {
        self.fanout.write(points).await
    }

    pub fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    pub async fn close(&mut self) {
        self.fanout.close().await;
    }
}
