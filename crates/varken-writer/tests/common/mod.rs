// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process fakes for the backends, shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use varken_writer::backend::{SqlSession, SqlValue};

/// One request seen by a fake server.
#[derive(Debug, Clone)]
pub struct Seen {
    pub path: &'static str,
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
    pub body: String,
}

/// Requests received by a fake server, plus how `/write` should answer.
#[derive(Clone)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
    write_status: StatusCode,
    write_delay: Duration,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            seen: Arc::default(),
            write_status: StatusCode::NO_CONTENT,
            write_delay: Duration::ZERO,
        }
    }

    pub fn failing(status: StatusCode) -> Self {
        Self {
            write_status: status,
            ..Self::new()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            write_delay: delay,
            ..Self::new()
        }
    }

    fn push(&self, path: &'static str, query: HashMap<String, String>, headers: &HeaderMap, body: String) {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.seen.lock().unwrap().push(Seen {
            path,
            query,
            authorization,
            body,
        });
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Seen> {
        self.seen()
            .into_iter()
            .filter(|s| s.path.ends_with("write"))
            .collect()
    }
}

pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn write(
    rec: &Recorder,
    path: &'static str,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    rec.push(path, query, &headers, body);
    if !rec.write_delay.is_zero() {
        tokio::time::sleep(rec.write_delay).await;
    }
    rec.write_status
}

/// InfluxDB 1.x: `/ping`, `/query`, `/write`. `existing` are the databases
/// `SHOW DATABASES` reports.
pub async fn influx_v1(rec: Recorder, existing: &[&str]) -> SocketAddr {
    let values: Vec<_> = existing.iter().map(|db| json!([db])).collect();
    let show = json!({
        "results": [{
            "statement_id": 0,
            "series": [{"name": "databases", "columns": ["name"], "values": values}]
        }]
    });

    let app = Router::new()
        .route(
            "/ping",
            get(|| async { (StatusCode::NO_CONTENT, [("X-Influxdb-Version", "1.8.10")]) }),
        )
        .route(
            "/query",
            get(move || {
                let show = show.clone();
                async move { Json(show) }
            })
            .post(
                |State(rec): State<Recorder>,
                 headers: HeaderMap,
                 Form(form): Form<HashMap<String, String>>| async move {
                    let q = form.get("q").cloned().unwrap_or_default();
                    rec.push("/query", form, &headers, q);
                    Json(json!({"results": [{"statement_id": 0}]}))
                },
            ),
        )
        .route(
            "/write",
            post(
                |State(rec): State<Recorder>,
                 Query(q): Query<HashMap<String, String>>,
                 headers: HeaderMap,
                 body: String| async move { write(&rec, "/write", q, headers, body).await },
            ),
        )
        .with_state(rec);
    serve(app).await
}

/// InfluxDB 2.x (JSON health) or 3.x (plain-text health).
pub async fn influx_v2(rec: Recorder, plain_health: bool, bucket_exists: bool) -> SocketAddr {
    let app = Router::new()
        .route(
            "/health",
            get(move || async move {
                if plain_health {
                    "OK".into_response()
                } else {
                    Json(json!({"name": "influxdb", "status": "pass", "version": "v2.7.1"}))
                        .into_response()
                }
            }),
        )
        .route(
            "/api/v2/buckets",
            get(move || async move {
                let buckets = if bucket_exists {
                    json!([{"name": "varken"}])
                } else {
                    json!([])
                };
                Json(json!({ "buckets": buckets }))
            }),
        )
        .route(
            "/api/v2/write",
            post(
                |State(rec): State<Recorder>,
                 Query(q): Query<HashMap<String, String>>,
                 headers: HeaderMap,
                 body: String| async move {
                    write(&rec, "/api/v2/write", q, headers, body).await
                },
            ),
        )
        .with_state(rec);
    serve(app).await
}

/// QuestDB: `/exec` health check and `/write`.
pub async fn questdb(rec: Recorder) -> SocketAddr {
    let app = Router::new()
        .route(
            "/exec",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                if q.get("query").map(String::as_str) == Some("SELECT 1") {
                    (StatusCode::OK, Json(json!({"dataset": [[1]]})))
                } else {
                    (StatusCode::BAD_REQUEST, Json(json!({"error": "bad query"})))
                }
            }),
        )
        .route("/write", post(line_write))
        .with_state(rec);
    serve(app).await
}

/// VictoriaMetrics: `/api/v1/labels` health check and `/write`.
pub async fn victoria_metrics(rec: Recorder) -> SocketAddr {
    let app = Router::new()
        .route(
            "/api/v1/labels",
            get(|| async { Json(json!({"status": "success", "data": ["__name__"]})) }),
        )
        .route("/write", post(line_write))
        .with_state(rec);
    serve(app).await
}

async fn line_write(
    State(rec): State<Recorder>,
    Query(q): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    write(&rec, "/write", q, headers, body).await
}

/// `SqlSession` that records every statement. Statements matching `fail_on`
/// fail, those matching `hang_on` never complete.
#[derive(Clone, Default)]
pub struct RecordingSession {
    pub statements: Arc<Mutex<Vec<String>>>,
    pub fail_on: Vec<&'static str>,
    pub hang_on: Vec<&'static str>,
    /// Columns reported besides `time`.
    pub columns: Vec<&'static str>,
}

impl RecordingSession {
    pub fn failing_on(fail_on: Vec<&'static str>) -> Self {
        Self {
            fail_on,
            ..Self::default()
        }
    }

    pub fn hanging_on(hang_on: Vec<&'static str>, columns: Vec<&'static str>) -> Self {
        Self {
            hang_on,
            columns,
            ..Self::default()
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    fn record(&self, sql: &str) -> Result<(), sqlx::Error> {
        self.statements.lock().unwrap().push(sql.to_string());
        if self.fail_on.iter().any(|f| sql.contains(f)) {
            return Err(sqlx::Error::Protocol(format!("refused: {}", sql)));
        }
        Ok(())
    }
}

#[async_trait]
impl SqlSession for RecordingSession {
    async fn execute(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        self.record(sql)?;
        if self.hang_on.iter().any(|h| sql.contains(h)) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(())
    }

    async fn fetch_column(&mut self, sql: &str) -> Result<Vec<String>, sqlx::Error> {
        self.record(sql)?;
        if sql.contains("information_schema") {
            let mut columns = vec!["time".to_string()];
            columns.extend(self.columns.iter().map(|c| c.to_string()));
            Ok(columns)
        } else {
            Ok(vec!["PostgreSQL 16.1 (timescaledb)".to_string()])
        }
    }

    async fn insert(&mut self, sql: &str, _values: &[SqlValue]) -> Result<(), sqlx::Error> {
        self.record(sql)
    }

    async fn close(&mut self) -> Result<(), sqlx::Error> {
        Ok(())
    }
}
