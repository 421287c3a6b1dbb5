// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TimescaleDB backend.
//!
//! All points go to one hypertable, [`TABLE`], with a `time` column plus one
//! column per tag or field key ever seen. A write runs in two phases:
//!
//! 1. Every distinct key of the batch gets its column (autocommitted DDL,
//!    see [`SchemaCache::ensure_column`]). A key whose column cannot be
//!    added is left out of this write.
//! 2. One transaction inserts one row per point. Any failing row rolls the
//!    whole batch back.
//!
//! DDL never shares a transaction with rows, so no partial batch is ever
//! committed.

use super::schema::{
    quote_ident, sanitize_column, ColumnType, PgSession, SchemaCache, SqlSession, SqlValue, TABLE,
};
use super::Backend;
use crate::descriptor::BackendDescriptor;
use crate::error::BackendError;
use crate::line_protocol::parse_iso8601;
use crate::point::{Point, PointTime};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

const TIME_COLUMN: &str = "time";

/// TimescaleDB backend over a single session.
pub struct TimescaleBackend {
    descriptor: BackendDescriptor,
    session: Option<Box<dyn SqlSession>>,
    schema: SchemaCache,
    connected: bool,
    // Set between BEGIN and COMMIT/ROLLBACK. Still set at the start of a
    // write means the previous one was cancelled mid-transaction.
    in_transaction: bool,
}

impl TimescaleBackend {
    /// Backend that opens a PostgreSQL connection on `connect`.
    pub fn new(descriptor: BackendDescriptor) -> Self {
        Self {
            descriptor,
            session: None,
            schema: SchemaCache::new(),
            connected: false,
            in_transaction: false,
        }
    }

    /// Backend over an already established session.
    pub fn with_session(descriptor: BackendDescriptor, session: Box<dyn SqlSession>) -> Self {
        Self {
            session: Some(session),
            ..Self::new(descriptor)
        }
    }

    /// Columns currently known to exist.
    pub fn schema(&self) -> &SchemaCache {
        &self.schema
    }

    async fn provision(&mut self) -> Result<(), BackendError> {
        let id = self.descriptor.id();
        let session = self.session.as_deref_mut().ok_or(BackendError::NotConnected)?;

        let version = session
            .fetch_column("SELECT version()")
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        tracing::info!(backend = %id, version = %version, "TimescaleDB connection successful");

        let extension = session
            .fetch_column("SELECT extname::text FROM pg_extension WHERE extname = 'timescaledb'")
            .await?;
        if extension.is_empty() {
            tracing::warn!(backend = %id, "timescaledb extension not found, creating it");
            session
                .execute("CREATE EXTENSION IF NOT EXISTS timescaledb")
                .await?;
        }

        session
            .execute(&format!(
                "CREATE TABLE IF NOT EXISTS {} ({} TIMESTAMPTZ NOT NULL)",
                TABLE, TIME_COLUMN
            ))
            .await?;
        if let Err(e) = session
            .execute(&format!(
                "SELECT create_hypertable('{}', '{}', if_not_exists => TRUE, migrate_data => TRUE)",
                TABLE, TIME_COLUMN
            ))
            .await
        {
            tracing::debug!(backend = %id, error = %e, "create_hypertable failed, continuing");
        }

        let columns = session
            .fetch_column(&format!(
                "SELECT column_name::text FROM information_schema.columns WHERE table_name = '{}'",
                TABLE
            ))
            .await?;
        self.schema.replace(columns);
        tracing::debug!(backend = %id, columns = self.schema.len(), "loaded table schema");
        Ok(())
    }
}

#[async_trait]
impl Backend for TimescaleBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn connect(&mut self) -> Result<(), BackendError> {
        if self.connected {
            return Ok(());
        }
        if self.session.is_none() {
            self.session = Some(Box::new(PgSession::connect(&self.descriptor).await?));
        }
        self.provision().await?;
        self.connected = true;
        Ok(())
    }

    async fn write(&mut self, points: &[Point]) -> Result<(), BackendError> {
        if !self.connected {
            return Err(BackendError::NotConnected);
        }
        if points.is_empty() {
            return Ok(());
        }
        let id = self.descriptor.id();
        let session = self.session.as_deref_mut().ok_or(BackendError::NotConnected)?;

        if self.in_transaction {
            tracing::warn!(backend = %id, "rolling back transaction left open by a cancelled write");
            session.execute("ROLLBACK").await?;
            self.in_transaction = false;
        }
        // After the rollback: a SET inside the open transaction would be undone.
        if self.schema.timeout_bounded() {
            tracing::warn!(backend = %id, "restoring statement_timeout left bounded by a cancelled write");
            self.schema.restore_timeout(session).await?;
        }

        // Phase 1: columns.
        let mut failed: HashSet<String> = HashSet::new();
        for point in points {
            let keys = point
                .present_tags()
                .map(|(k, _)| (k, ColumnType::Text))
                .chain(point.present_fields().map(|(k, v)| (k, ColumnType::of(v))));
            for (key, column_type) in keys {
                let column = sanitize_column(key);
                if failed.contains(&column) {
                    continue;
                }
                if let Err(e) = self.schema.ensure_column(session, key, column_type).await {
                    tracing::warn!(backend = %id, error = %e, "omitting column from this write");
                    failed.insert(column);
                }
            }
        }

        // Phase 2: rows.
        self.in_transaction = true;
        if let Err(e) = session.execute("BEGIN").await {
            self.in_transaction = false;
            return Err(e.into());
        }
        for point in points {
            let (sql, values) = insert_statement(&self.schema, point);
            if let Err(e) = session.insert(&sql, &values).await {
                tracing::error!(
                    backend = %id,
                    measurement = %point.measurement,
                    error = %e,
                    "insert failed, rolling back batch"
                );
                if let Err(rollback) = session.execute("ROLLBACK").await {
                    tracing::warn!(backend = %id, error = %rollback, "rollback failed");
                }
                self.in_transaction = false;
                return Err(e.into());
            }
        }
        let committed = session.execute("COMMIT").await;
        self.in_transaction = false;
        committed?;

        tracing::debug!(backend = %id, rows = points.len(), "wrote rows");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.connected = false;
        self.in_transaction = false;
        if let Some(mut session) = self.session.take() {
            session.close().await?;
        }
        Ok(())
    }
}

/// `INSERT` for one point, limited to columns known to exist.
///
/// `time` comes first; a later key that sanitizes to a name already in the
/// row is dropped.
fn insert_statement(schema: &SchemaCache, point: &Point) -> (String, Vec<SqlValue>) {
    let mut columns = vec![TIME_COLUMN.to_string()];
    let mut values = vec![SqlValue::Timestamp(row_time(point.time.as_ref()))];
    let mut seen: HashSet<String> = HashSet::from([TIME_COLUMN.to_string()]);

    let tags = point
        .present_tags()
        .map(|(k, v)| (k, SqlValue::Text(v.to_string())));
    let fields = point.present_fields().map(|(k, v)| (k, SqlValue::from(v)));
    for (key, value) in tags.chain(fields) {
        let column = sanitize_column(key);
        if !schema.contains(&column) || !seen.insert(column.clone()) {
            continue;
        }
        columns.push(column);
        values.push(value);
    }

    let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        TABLE,
        names.join(", "),
        placeholders.join(", ")
    );
    (sql, values)
}

/// Row timestamp: ISO text or epoch nanoseconds, else the current time.
fn row_time(time: Option<&PointTime>) -> DateTime<Utc> {
    match time {
        Some(PointTime::Iso(s)) => parse_iso8601(s).unwrap_or_else(Utc::now),
        Some(PointTime::Nanos(ns)) => DateTime::<Utc>::from_timestamp_nanos(*ns),
        None => Utc::now(),
    }
}
