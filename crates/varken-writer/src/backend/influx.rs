// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB backends.
//!
//! - 1.x: `/ping`, InfluxQL over `/query` for provisioning, `/write?db=`.
//! - 2.x and 3.x: `/health`, bucket lookup over `/api/v2/buckets`, and the
//!   `/api/v2/write` endpoint (3.x serves it for compatibility).

use super::{expect_status, http_client, Backend};
use crate::descriptor::{BackendDescriptor, BackendKind};
use crate::error::BackendError;
use crate::line_protocol;
use crate::point::Point;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

/// Retention policy created alongside a fresh 1.x database.
pub const RETENTION_POLICY_NAME: &str = "varken 30d-1h";
const RETENTION_DURATION: &str = "30d";
const RETENTION_SHARD_DURATION: &str = "1h";

/// InfluxDB 1.x backend.
pub struct InfluxV1Backend {
    descriptor: BackendDescriptor,
    client: Client,
    base_url: String,
    connected: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl QueryResponse {
    fn into_result(self) -> Result<Vec<StatementResult>, BackendError> {
        if let Some(e) = self.error {
            return Err(BackendError::Protocol(e));
        }
        if let Some(e) = self.results.iter().find_map(|r| r.error.clone()) {
            return Err(BackendError::Protocol(e));
        }
        Ok(self.results)
    }
}

impl InfluxV1Backend {
    pub fn new(descriptor: BackendDescriptor) -> Result<Self, BackendError> {
        let client = http_client(&descriptor)?;
        let base_url = descriptor.base_url();
        Ok(Self {
            descriptor,
            client,
            base_url,
            connected: false,
        })
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match self.descriptor.credentials().basic_pair() {
            Some((user, pass)) => req.basic_auth(user, Some(pass)),
            None => req,
        }
    }

    async fn ping(&self) -> Result<Option<String>, BackendError> {
        let req = self.authed(self.client.get(format!("{}/ping", self.base_url)));
        let resp = expect_status(req.send().await?, &[204]).await?;
        Ok(resp
            .headers()
            .get("X-Influxdb-Version")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }

    async fn list_databases(&self) -> Result<Vec<String>, BackendError> {
        let req = self.authed(
            self.client
                .get(format!("{}/query", self.base_url))
                .query(&[("q", "SHOW DATABASES")]),
        );
        let resp = expect_status(req.send().await?, &[200]).await?;
        let results = resp.json::<QueryResponse>().await?.into_result()?;
        Ok(results
            .into_iter()
            .flat_map(|r| r.series)
            .flat_map(|s| s.values)
            .filter_map(|row| row.first().and_then(|v| v.as_str()).map(str::to_string))
            .collect())
    }

    async fn execute(&self, statement: &str) -> Result<(), BackendError> {
        let req = self.authed(
            self.client
                .post(format!("{}/query", self.base_url))
                .form(&[("q", statement)]),
        );
        let resp = expect_status(req.send().await?, &[200]).await?;
        resp.json::<QueryResponse>().await?.into_result()?;
        Ok(())
    }
}

#[async_trait]
impl Backend for InfluxV1Backend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn connect(&mut self) -> Result<(), BackendError> {
        if self.connected {
            return Ok(());
        }
        let version = self.ping().await?;
        tracing::info!(
            backend = %self.id(),
            version = version.as_deref().unwrap_or("unknown"),
            "InfluxDB v1 reachable"
        );

        let database = self.descriptor.database();
        let databases = self.list_databases().await?;
        if !databases.iter().any(|db| db == database) {
            let db = quote_ident(database);
            self.execute(&format!("CREATE DATABASE {}", db)).await?;
            self.execute(&format!(
                "CREATE RETENTION POLICY {} ON {} DURATION {} REPLICATION 1 SHARD DURATION {} DEFAULT",
                quote_ident(RETENTION_POLICY_NAME),
                db,
                RETENTION_DURATION,
                RETENTION_SHARD_DURATION
            ))
            .await?;
            tracing::info!(backend = %self.id(), database, "created database");
        }

        self.connected = true;
        Ok(())
    }

    async fn write(&mut self, points: &[Point]) -> Result<(), BackendError> {
        if !self.connected {
            return Err(BackendError::NotConnected);
        }
        let lines = line_protocol::encode_batch(points);
        if lines.is_empty() {
            return Ok(());
        }
        let req = self.authed(
            self.client
                .post(format!("{}/write", self.base_url))
                .query(&[("db", self.descriptor.database()), ("precision", "ns")])
                .header(CONTENT_TYPE, "text/plain")
                .body(lines.join("\n")),
        );
        expect_status(req.send().await?, &[204, 200]).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.connected = false;
        Ok(())
    }
}

/// InfluxDB 2.x / 3.x backend.
///
/// Buckets are never created: that takes an all-access token, so a missing
/// bucket is only reported.
pub struct InfluxV2Backend {
    descriptor: BackendDescriptor,
    client: Client,
    base_url: String,
    connected: bool,
}

#[derive(Debug, Deserialize)]
struct Health {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Buckets {
    #[serde(default)]
    buckets: Vec<serde_json::Value>,
}

impl InfluxV2Backend {
    pub fn new(descriptor: BackendDescriptor) -> Result<Self, BackendError> {
        let client = http_client(&descriptor)?;
        let base_url = descriptor.base_url();
        Ok(Self {
            descriptor,
            client,
            base_url,
            connected: false,
        })
    }

    fn label(&self) -> &'static str {
        match self.descriptor.kind() {
            BackendKind::InfluxV3 => "InfluxDB v3",
            _ => "InfluxDB v2",
        }
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match self.descriptor.credentials().token() {
            Some(token) => req.header(AUTHORIZATION, format!("Token {}", token)),
            None => req,
        }
    }

    async fn health(&self) -> Result<Health, BackendError> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        let resp = expect_status(resp, &[200, 204]).await?;
        // 3.x answers with plain text.
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body).unwrap_or(Health {
            status: Some(body.trim().to_string()).filter(|s| !s.is_empty()),
            version: None,
        }))
    }

    async fn bucket_exists(&self) -> Result<bool, BackendError> {
        let mut query = vec![("name", self.descriptor.database())];
        if let Some(org) = self.descriptor.credentials().org() {
            query.push(("org", org));
        }
        let req = self.authed(
            self.client
                .get(format!("{}/api/v2/buckets", self.base_url))
                .query(&query),
        );
        let resp = expect_status(req.send().await?, &[200]).await?;
        Ok(!resp.json::<Buckets>().await?.buckets.is_empty())
    }
}

#[async_trait]
impl Backend for InfluxV2Backend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn connect(&mut self) -> Result<(), BackendError> {
        if self.connected {
            return Ok(());
        }
        let health = self.health().await?;
        tracing::info!(
            backend = %self.id(),
            status = health.status.as_deref().unwrap_or("unknown"),
            version = health.version.as_deref().unwrap_or("unknown"),
            "{} reachable",
            self.label()
        );

        match self.bucket_exists().await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                backend = %self.id(),
                bucket = self.descriptor.database(),
                "bucket not found, please create it manually"
            ),
            Err(e) => tracing::warn!(
                backend = %self.id(),
                bucket = self.descriptor.database(),
                error = %e,
                "could not verify bucket"
            ),
        }

        self.connected = true;
        Ok(())
    }

    async fn write(&mut self, points: &[Point]) -> Result<(), BackendError> {
        if !self.connected {
            return Err(BackendError::NotConnected);
        }
        let lines = line_protocol::encode_batch(points);
        if lines.is_empty() {
            return Ok(());
        }
        let mut query = vec![("bucket", self.descriptor.database()), ("precision", "ns")];
        if let Some(org) = self.descriptor.credentials().org() {
            query.push(("org", org));
        }
        let req = self.authed(
            self.client
                .post(format!("{}/api/v2/write", self.base_url))
                .query(&query)
                .header(CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(lines.join("\n")),
        );
        expect_status(req.send().await?, &[204, 200]).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.connected = false;
        Ok(())
    }
}

/// Quote an InfluxQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}
