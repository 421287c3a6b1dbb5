// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Line Protocol over plain HTTP (QuestDB, VictoriaMetrics).
//!
//! Nothing is provisioned: both stores create tables/series on first write,
//! so `connect` is a reachability check only.

use super::{expect_status, http_client, Backend};
use crate::descriptor::{BackendDescriptor, BackendKind};
use crate::error::BackendError;
use crate::line_protocol;
use crate::point::Point;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};

/// QuestDB / VictoriaMetrics `/write` backend.
pub struct HttpLineBackend {
    descriptor: BackendDescriptor,
    client: Client,
    base_url: String,
    connected: bool,
}

impl HttpLineBackend {
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
            BackendKind::VictoriaMetrics => "VictoriaMetrics",
            _ => "QuestDB",
        }
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match self.descriptor.credentials().basic_pair() {
            Some((user, pass)) => req.basic_auth(user, Some(pass)),
            None => req,
        }
    }

    fn health_check(&self) -> RequestBuilder {
        let req = match self.descriptor.kind() {
            BackendKind::VictoriaMetrics => {
                self.client.get(format!("{}/api/v1/labels", self.base_url))
            }
            _ => self
                .client
                .get(format!("{}/exec", self.base_url))
                .query(&[("query", "SELECT 1")]),
        };
        self.authed(req)
    }
}

#[async_trait]
impl Backend for HttpLineBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn connect(&mut self) -> Result<(), BackendError> {
        if self.connected {
            return Ok(());
        }
        expect_status(self.health_check().send().await?, &[200]).await?;
        tracing::info!(backend = %self.id(), "{} connection successful", self.label());
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
                .query(&[("db", self.descriptor.database())])
                .header(CONTENT_TYPE, "text/plain")
                .body(lines.join("\n")),
        );
        expect_status(req.send().await?, &[200, 204]).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.connected = false;
        Ok(())
    }
}
