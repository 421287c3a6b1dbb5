// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Backend descriptors.
//!
//! A [`BackendDescriptor`] names one backend and how to reach it. It is
//! immutable once built; each per-kind constructor validates the fields
//! that kind needs before anything tries to connect.

use crate::error::ConfigError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default database / bucket name.
pub const DEFAULT_DATABASE: &str = "varken";

/// Default connect/request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Supported backend kinds. Serialized as their configuration strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum BackendKind {
    /// InfluxDB 1.x (`/write`, InfluxQL provisioning).
    #[serde(rename = "influxdb1")]
    InfluxV1,
    /// InfluxDB 2.x (`/api/v2/write`, token auth).
    #[serde(rename = "influxdb2")]
    InfluxV2,
    /// InfluxDB 3.x through its v2-compatible write API.
    #[serde(rename = "influxdb3")]
    InfluxV3,
    /// TimescaleDB (PostgreSQL hypertable).
    #[serde(rename = "timescale")]
    Timescale,
    /// QuestDB line protocol over HTTP.
    #[serde(rename = "questdb")]
    QuestDb,
    /// VictoriaMetrics line protocol over HTTP.
    #[serde(rename = "victoriametrics")]
    VictoriaMetrics,
}

impl BackendKind {
    /// Configuration string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::InfluxV1 => "influxdb1",
            BackendKind::InfluxV2 => "influxdb2",
            BackendKind::InfluxV3 => "influxdb3",
            BackendKind::Timescale => "timescale",
            BackendKind::QuestDb => "questdb",
            BackendKind::VictoriaMetrics => "victoriametrics",
        }
    }

    /// Port used when the configuration does not give one.
    pub fn default_port(&self) -> u16 {
        match self {
            BackendKind::InfluxV1 | BackendKind::InfluxV2 => 8086,
            BackendKind::InfluxV3 => 443,
            BackendKind::Timescale => 5432,
            BackendKind::QuestDb => 9000,
            BackendKind::VictoriaMetrics => 8428,
        }
    }

    /// Whether the kind speaks TLS unless told otherwise.
    pub fn default_tls(&self) -> bool {
        matches!(self, BackendKind::InfluxV3)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "influxdb1" => Ok(BackendKind::InfluxV1),
            "influxdb2" => Ok(BackendKind::InfluxV2),
            "influxdb3" => Ok(BackendKind::InfluxV3),
            "timescale" => Ok(BackendKind::Timescale),
            "questdb" => Ok(BackendKind::QuestDb),
            "victoriametrics" => Ok(BackendKind::VictoriaMetrics),
            _ => Err(ConfigError::UnknownBackendKind(s.to_string())),
        }
    }
}

/// Authentication material.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    /// No authentication.
    #[default]
    None,
    /// Username / password (basic auth or database login).
    Basic { username: String, password: String },
    /// API token, with the organization for InfluxDB 2.x.
    Token { token: String, org: Option<String> },
}

// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Token { org, .. } => f
                .debug_struct("Token")
                .field("token", &"***")
                .field("org", org)
                .finish(),
        }
    }
}

impl Credentials {
    /// Build basic credentials, or `None` when either half is empty.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        let password = password.into();
        if username.is_empty() || password.is_empty() {
            Credentials::None
        } else {
            Credentials::Basic { username, password }
        }
    }

    /// Username/password pair, if any.
    pub fn basic_pair(&self) -> Option<(&str, &str)> {
        match self {
            Credentials::Basic { username, password } => Some((username, password)),
            _ => None,
        }
    }

    /// API token, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            Credentials::Token { token, .. } => Some(token),
            _ => None,
        }
    }

    /// InfluxDB organization, if any.
    pub fn org(&self) -> Option<&str> {
        match self {
            Credentials::Token { org, .. } => org.as_deref(),
            _ => None,
        }
    }
}

/// Identity of a live backend: `kind@host:port`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackendId {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.kind, self.host, self.port)
    }
}

/// Immutable description of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    kind: BackendKind,
    host: String,
    port: u16,
    credentials: Credentials,
    database: String,
    tls: bool,
    verify_tls: bool,
    timeout: Duration,
    enabled: bool,
}

impl BackendDescriptor {
    fn base(kind: BackendKind, host: impl Into<String>, port: u16) -> Result<Self, ConfigError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ConfigError::MissingField {
                kind: kind.as_str(),
                field: "host",
            });
        }
        if port == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} backend at {} has port 0",
                kind, host
            )));
        }
        Ok(Self {
            kind,
            host,
            port,
            credentials: Credentials::None,
            database: DEFAULT_DATABASE.to_string(),
            tls: kind.default_tls(),
            verify_tls: true,
            timeout: DEFAULT_TIMEOUT,
            enabled: true,
        })
    }

    /// InfluxDB 1.x. Username and password may be empty (no auth).
    pub fn influx_v1(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let mut d = Self::base(BackendKind::InfluxV1, host, port)?;
        d.credentials = Credentials::basic(username, password);
        d.database = require(BackendKind::InfluxV1, "database", database.into())?;
        Ok(d)
    }

    /// InfluxDB 2.x. Token, org and bucket are all required.
    pub fn influx_v2(
        host: impl Into<String>,
        port: u16,
        token: impl Into<String>,
        org: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let kind = BackendKind::InfluxV2;
        let mut d = Self::base(kind, host, port)?;
        d.credentials = Credentials::Token {
            token: require(kind, "token", token.into())?,
            org: Some(require(kind, "org", org.into())?),
        };
        d.database = require(kind, "bucket", bucket.into())?;
        Ok(d)
    }

    /// InfluxDB 3.x. Token and bucket are required, org is optional.
    pub fn influx_v3(
        host: impl Into<String>,
        port: u16,
        token: impl Into<String>,
        org: Option<String>,
        bucket: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let kind = BackendKind::InfluxV3;
        let mut d = Self::base(kind, host, port)?;
        d.credentials = Credentials::Token {
            token: require(kind, "token", token.into())?,
            org: org.filter(|o| !o.is_empty()),
        };
        d.database = require(kind, "bucket", bucket.into())?;
        Ok(d)
    }

    /// TimescaleDB. Username and database are required.
    pub fn timescale(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let kind = BackendKind::Timescale;
        let mut d = Self::base(kind, host, port)?;
        d.credentials = Credentials::Basic {
            username: require(kind, "username", username.into())?,
            password: password.into(),
        };
        d.database = require(kind, "database", database.into())?;
        Ok(d)
    }

    /// QuestDB over HTTP.
    pub fn questdb(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let mut d = Self::base(BackendKind::QuestDb, host, port)?;
        d.credentials = Credentials::basic(username, password);
        Ok(d)
    }

    /// VictoriaMetrics over HTTP.
    pub fn victoria_metrics(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let mut d = Self::base(BackendKind::VictoriaMetrics, host, port)?;
        d.credentials = Credentials::basic(username, password);
        Ok(d)
    }

    /// Set TLS usage and certificate verification.
    pub fn with_tls(mut self, tls: bool, verify_tls: bool) -> Self {
        self.tls = tls;
        self.verify_tls = verify_tls;
        self
    }

    /// Set the connect/request timeout. Zero is rejected.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::Invalid(format!(
                "{} backend at {} has a zero timeout",
                self.kind, self.host
            )));
        }
        self.timeout = timeout;
        Ok(self)
    }

    /// Override the database name used by the HTTP line-protocol kinds.
    pub fn with_database(mut self, database: impl Into<String>) -> Result<Self, ConfigError> {
        self.database = require(self.kind, "database", database.into())?;
        Ok(self)
    }

    /// Enable or disable the backend. Disabled backends are never contacted.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Database name (InfluxDB 1.x, TimescaleDB, HTTP kinds) or bucket
    /// (InfluxDB 2.x/3.x).
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn tls(&self) -> bool {
        self.tls
    }

    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Identity used as the key of the fan-out report.
    pub fn id(&self) -> BackendId {
        BackendId {
            kind: self.kind,
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// `http(s)://host:port` for the HTTP kinds.
    pub fn base_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

fn require(kind: BackendKind, field: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::MissingField {
            kind: kind.as_str(),
            field,
        })
    } else {
        Ok(value)
    }
}
