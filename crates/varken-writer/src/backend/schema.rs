// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema-on-write support for the relational backend.
//!
//! Every tag and field key becomes a column of one wide table. Columns are
//! added the first time a key is seen; the [`SchemaCache`] remembers which
//! exist so the DDL runs once per column per process.
//!
//! SQL goes through [`SqlSession`] so the DDL/insert sequencing can be
//! exercised without a server. [`PgSession`] is the PostgreSQL
//! implementation.

use crate::descriptor::BackendDescriptor;
use crate::error::{BackendError, SchemaError};
use crate::point::FieldValue;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::Connection;
use std::collections::HashSet;

/// The wide table every point lands in.
pub const TABLE: &str = "varken_metrics";

/// Upper bound for one `ALTER TABLE`, so a lock conflict cannot stall writes.
pub const DDL_STATEMENT_TIMEOUT: &str = "5s";

/// SQL type of a provisioned column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    BigInt,
    Double,
    Text,
}

impl ColumnType {
    /// Column type for a field value.
    pub fn of(value: &FieldValue) -> Self {
        match value {
            FieldValue::Boolean(_) => ColumnType::Boolean,
            FieldValue::Integer(_) => ColumnType::BigInt,
            FieldValue::Float(_) => ColumnType::Double,
            FieldValue::String(_) => ColumnType::Text,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Text => "TEXT",
        }
    }
}

/// A bound parameter of an `INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Timestamp(DateTime<Utc>),
    Text(String),
    BigInt(i64),
    Double(f64),
    Boolean(bool),
}

impl From<&FieldValue> for SqlValue {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Boolean(v) => SqlValue::Boolean(*v),
            FieldValue::Integer(v) => SqlValue::BigInt(*v),
            FieldValue::Float(v) => SqlValue::Double(*v),
            FieldValue::String(v) => SqlValue::Text(v.clone()),
        }
    }
}

/// Minimal SQL surface used by the relational backend.
#[async_trait]
pub trait SqlSession: Send {
    /// Run a statement without parameters (DDL, `BEGIN`, `SET`, ...).
    async fn execute(&mut self, sql: &str) -> Result<(), sqlx::Error>;

    /// Run a query and return the first column of every row as text.
    async fn fetch_column(&mut self, sql: &str) -> Result<Vec<String>, sqlx::Error>;

    /// Run a parameterized statement (`$1`, `$2`, ...).
    async fn insert(&mut self, sql: &str, values: &[SqlValue]) -> Result<(), sqlx::Error>;

    /// Close the underlying connection.
    async fn close(&mut self) -> Result<(), sqlx::Error>;
}

/// PostgreSQL session over a single connection.
pub struct PgSession {
    conn: Option<PgConnection>,
}

impl PgSession {
    /// Connect using the descriptor's credentials, database and timeout.
    pub async fn connect(descriptor: &BackendDescriptor) -> Result<Self, BackendError> {
        let mut options = PgConnectOptions::new()
            .host(descriptor.host())
            .port(descriptor.port())
            .database(descriptor.database())
            .ssl_mode(if descriptor.tls() {
                PgSslMode::Require
            } else {
                PgSslMode::Prefer
            });
        if let Some((user, pass)) = descriptor.credentials().basic_pair() {
            options = options.username(user).password(pass);
        }

        let conn = tokio::time::timeout(descriptor.timeout(), PgConnection::connect_with(&options))
            .await
            .map_err(|_| BackendError::Timeout(descriptor.timeout()))??;
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut PgConnection, sqlx::Error> {
        self.conn.as_mut().ok_or(sqlx::Error::PoolClosed)
    }
}

#[async_trait]
impl SqlSession for PgSession {
    async fn execute(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        let conn = self.conn()?;
        sqlx::Executor::execute(&mut *conn, sql).await?;
        Ok(())
    }

    async fn fetch_column(&mut self, sql: &str) -> Result<Vec<String>, sqlx::Error> {
        let conn = self.conn()?;
        sqlx::query_scalar::<sqlx::Postgres, String>(sql)
            .fetch_all(&mut *conn)
            .await
    }

    async fn insert(&mut self, sql: &str, values: &[SqlValue]) -> Result<(), sqlx::Error> {
        let mut query = sqlx::query::<sqlx::Postgres>(sql);
        for value in values {
            query = match value {
                SqlValue::Timestamp(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.clone()),
                SqlValue::BigInt(v) => query.bind(*v),
                SqlValue::Double(v) => query.bind(*v),
                SqlValue::Boolean(v) => query.bind(*v),
            };
        }
        let conn = self.conn()?;
        query.execute(&mut *conn).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), sqlx::Error> {
        match self.conn.take() {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }
}

/// Column names known to exist in [`TABLE`].
///
/// Owned by one backend instance; never shared.
#[derive(Debug, Default)]
pub struct SchemaCache {
    known: HashSet<String>,
    timeout_bounded: bool,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache with the columns read from the server.
    pub fn replace(&mut self, columns: impl IntoIterator<Item = String>) {
        self.known = columns.into_iter().collect();
    }

    pub fn contains(&self, column: &str) -> bool {
        self.known.contains(column)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// True while the session may still carry [`DDL_STATEMENT_TIMEOUT`].
    ///
    /// Stays set if a DDL call was dropped or the reset itself failed.
    pub fn timeout_bounded(&self) -> bool {
        self.timeout_bounded
    }

    /// Put the session back to an unbounded statement timeout if a previous
    /// DDL call left it bounded. No SQL otherwise.
    pub async fn restore_timeout(&mut self, session: &mut dyn SqlSession) -> Result<(), sqlx::Error> {
        if self.timeout_bounded {
            session.execute("SET statement_timeout = 0").await?;
            self.timeout_bounded = false;
        }
        Ok(())
    }

    /// Make sure a column for `name` exists, returning its sanitized name.
    ///
    /// A cache hit issues no SQL. A miss runs `ADD COLUMN IF NOT EXISTS`
    /// under [`DDL_STATEMENT_TIMEOUT`]; the session timeout is reset to
    /// unbounded afterwards whether or not the DDL succeeded.
    pub async fn ensure_column(
        &mut self,
        session: &mut dyn SqlSession,
        name: &str,
        column_type: ColumnType,
    ) -> Result<String, SchemaError> {
        let column = sanitize_column(name);
        if self.known.contains(&column) {
            return Ok(column);
        }

        self.timeout_bounded = true;
        let added = add_column(session, &column, column_type).await;
        if let Err(e) = self.restore_timeout(session).await {
            tracing::warn!(error = %e, "could not reset statement_timeout");
        }

        match added {
            Ok(()) => {
                tracing::debug!(column = %column, sql_type = column_type.sql(), "added column");
                self.known.insert(column.clone());
                Ok(column)
            }
            Err(source) => Err(SchemaError { column, source }),
        }
    }
}

async fn add_column(
    session: &mut dyn SqlSession,
    column: &str,
    column_type: ColumnType,
) -> Result<(), sqlx::Error> {
    session
        .execute(&format!("SET statement_timeout = '{}'", DDL_STATEMENT_TIMEOUT))
        .await?;
    session
        .execute(&format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
            TABLE,
            quote_ident(column),
            column_type.sql()
        ))
        .await
}

/// Lower-case, spaces and hyphens to underscores.
pub fn sanitize_column(name: &str) -> String {
    name.to_lowercase().replace([' ', '-'], "_")
}

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Records statements; fails any statement containing one of `fail_on`.
    #[derive(Default)]
    struct ScriptedSession {
        statements: Vec<String>,
        fail_on: Vec<&'static str>,
        responses: VecDeque<Vec<String>>,
    }

    impl ScriptedSession {
        fn ddl_count(&self) -> usize {
            self.statements
                .iter()
                .filter(|s| s.starts_with("ALTER TABLE"))
                .count()
        }
    }

    #[async_trait]
    impl SqlSession for ScriptedSession {
        async fn execute(&mut self, sql: &str) -> Result<(), sqlx::Error> {
            self.statements.push(sql.to_string());
            if self.fail_on.iter().any(|f| sql.contains(f)) {
                return Err(sqlx::Error::Protocol(format!("scripted failure: {}", sql)));
            }
            Ok(())
        }

        async fn fetch_column(&mut self, sql: &str) -> Result<Vec<String>, sqlx::Error> {
            self.statements.push(sql.to_string());
            Ok(self.responses.pop_front().unwrap_or_default())
        }

        async fn insert(&mut self, sql: &str, _values: &[SqlValue]) -> Result<(), sqlx::Error> {
            self.statements.push(sql.to_string());
            Ok(())
        }

        async fn close(&mut self) -> Result<(), sqlx::Error> {
            Ok(())
        }
    }

    #[test]
    fn test_sanitize_column() {
        assert_eq!(sanitize_column("My Field"), "my_field");
        assert_eq!(sanitize_column("parent-media index"), "parent_media_index");
        assert_eq!(sanitize_column("already_ok"), "already_ok");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("time"), "\"time\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_column_types() {
        assert_eq!(ColumnType::of(&FieldValue::Boolean(true)).sql(), "BOOLEAN");
        assert_eq!(ColumnType::of(&FieldValue::Integer(1)).sql(), "BIGINT");
        assert_eq!(ColumnType::of(&FieldValue::Float(1.0)).sql(), "DOUBLE PRECISION");
        assert_eq!(ColumnType::of(&FieldValue::String("x".into())).sql(), "TEXT");
    }

    #[tokio::test]
    async fn test_ensure_column_issues_ddl_once() {
        let mut session = ScriptedSession::default();
        let mut cache = SchemaCache::new();

        let first = cache
            .ensure_column(&mut session, "my_field", ColumnType::BigInt)
            .await
            .unwrap();
        let second = cache
            .ensure_column(&mut session, "my_field", ColumnType::BigInt)
            .await
            .unwrap();

        assert_eq!(first, "my_field");
        assert_eq!(second, "my_field");
        assert_eq!(session.ddl_count(), 1);
        assert!(cache.contains("my_field"));
    }

    #[tokio::test]
    async fn test_sanitized_collision_reuses_column() {
        let mut session = ScriptedSession::default();
        let mut cache = SchemaCache::new();

        let a = cache
            .ensure_column(&mut session, "My Field", ColumnType::Text)
            .await
            .unwrap();
        let b = cache
            .ensure_column(&mut session, "my_field", ColumnType::Text)
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(session.ddl_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_ddl_runs_under_bounded_timeout_and_resets() {
        let mut session = ScriptedSession::default();
        let mut cache = SchemaCache::new();

        cache
            .ensure_column(&mut session, "Player", ColumnType::Text)
            .await
            .unwrap();

        assert_eq!(
            session.statements,
            vec![
                "SET statement_timeout = '5s'".to_string(),
                "ALTER TABLE varken_metrics ADD COLUMN IF NOT EXISTS \"player\" TEXT".to_string(),
                "SET statement_timeout = 0".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_ddl_not_cached_and_timeout_restored() {
        let mut session = ScriptedSession {
            fail_on: vec!["ALTER TABLE"],
            ..Default::default()
        };
        let mut cache = SchemaCache::new();

        let err = cache
            .ensure_column(&mut session, "locked", ColumnType::Double)
            .await
            .unwrap_err();

        assert_eq!(err.column, "locked");
        assert!(!cache.contains("locked"));
        assert_eq!(
            session.statements.last().map(String::as_str),
            Some("SET statement_timeout = 0")
        );
    }

    #[tokio::test]
    async fn test_failed_reset_stays_bounded_until_restored() {
        let mut session = ScriptedSession {
            fail_on: vec!["statement_timeout = 0"],
            ..Default::default()
        };
        let mut cache = SchemaCache::new();

        cache
            .ensure_column(&mut session, "player", ColumnType::Text)
            .await
            .unwrap();
        assert!(cache.timeout_bounded());

        session.fail_on.clear();
        cache.restore_timeout(&mut session).await.unwrap();
        assert!(!cache.timeout_bounded());
        assert_eq!(
            session.statements.last().map(String::as_str),
            Some("SET statement_timeout = 0")
        );

        let before = session.statements.len();
        cache.restore_timeout(&mut session).await.unwrap();
        assert_eq!(session.statements.len(), before);
    }

    #[tokio::test]
    async fn test_preloaded_columns_skip_ddl() {
        let mut session = ScriptedSession::default();
        let mut cache = SchemaCache::new();
        cache.replace(vec!["time".to_string(), "server".to_string()]);

        cache
            .ensure_column(&mut session, "Server", ColumnType::Text)
            .await
            .unwrap();
        assert!(session.statements.is_empty());
    }
}
