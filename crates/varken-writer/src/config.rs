// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML configuration for the writer.

use crate::descriptor::{BackendDescriptor, BackendKind, DEFAULT_DATABASE};
use crate::error::ConfigError;
use crate::fanout::DEFAULT_WRITE_TIMEOUT;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level writer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    /// Per-backend bound on one write, in seconds.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    /// Backends to fan out to.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

fn default_write_timeout_secs() -> u64 {
    DEFAULT_WRITE_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

/// One backend entry. Which keys matter depends on `kind`.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// `influxdb1`, `influxdb2`, `influxdb3`, `timescale`, `questdb` or
    /// `victoriametrics`.
    pub kind: String,
    pub host: String,
    /// None = the kind's default port.
    pub port: Option<u16>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// InfluxDB 2.x/3.x API token.
    #[serde(default)]
    pub token: String,
    /// InfluxDB 2.x/3.x organization.
    pub org: Option<String>,
    /// InfluxDB 2.x/3.x bucket. Falls back to `database`.
    pub bucket: Option<String>,
    /// None = `varken`.
    pub database: Option<String>,
    /// None = the kind's default (on for `influxdb3` only).
    pub ssl: Option<bool>,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    /// Connect/request timeout in seconds.
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl WriterConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: WriterConfig = serde_yaml::from_str(yaml)?;
        if config.write_timeout_secs == 0 {
            return Err(ConfigError::Invalid("write_timeout_secs must be > 0".into()));
        }
        Ok(config)
    }

    /// Parse configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// One construction result per backend entry, in file order.
    pub fn entries(&self) -> Vec<Result<BackendDescriptor, ConfigError>> {
        self.backends.iter().map(BackendConfig::descriptor).collect()
    }

    /// Valid descriptors, in file order.
    ///
    /// A bad entry (unknown kind, failed validation) is logged at error level
    /// and skipped; the remaining backends are still returned.
    pub fn descriptors(&self) -> Vec<BackendDescriptor> {
        self.backends
            .iter()
            .zip(self.entries())
            .enumerate()
            .filter_map(|(index, (entry, result))| match result {
                Ok(d) => Some(d),
                Err(e) => {
                    tracing::error!(
                        index,
                        kind = %entry.kind,
                        host = %entry.host,
                        error = %e,
                        "skipping backend entry"
                    );
                    None
                }
            })
            .collect()
    }
}

impl BackendConfig {
    pub fn descriptor(&self) -> Result<BackendDescriptor, ConfigError> {
        let kind: BackendKind = self.kind.parse()?;
        let port = self.port.unwrap_or_else(|| kind.default_port());
        let host = self.host.as_str();
        let database = self.database.as_deref().unwrap_or(DEFAULT_DATABASE);
        let bucket = self.bucket.as_deref().unwrap_or(database);

        let d = match kind {
            BackendKind::InfluxV1 => BackendDescriptor::influx_v1(
                host,
                port,
                self.username.as_str(),
                self.password.as_str(),
                database,
            )?,
            BackendKind::InfluxV2 => BackendDescriptor::influx_v2(
                host,
                port,
                self.token.as_str(),
                self.org.as_deref().unwrap_or_default(),
                bucket,
            )?,
            BackendKind::InfluxV3 => {
                BackendDescriptor::influx_v3(host, port, self.token.as_str(), self.org.clone(), bucket)?
            }
            BackendKind::Timescale => BackendDescriptor::timescale(
                host,
                port,
                self.username.as_str(),
                self.password.as_str(),
                database,
            )?,
            BackendKind::QuestDb => BackendDescriptor::questdb(
                host,
                port,
                self.username.as_str(),
                self.password.as_str(),
            )?
            .with_database(database)?,
            BackendKind::VictoriaMetrics => BackendDescriptor::victoria_metrics(
                host,
                port,
                self.username.as_str(),
                self.password.as_str(),
            )?
            .with_database(database)?,
        };

        let mut d = d
            .with_tls(self.ssl.unwrap_or_else(|| kind.default_tls()), self.verify_ssl)
            .with_enabled(self.enabled);
        if let Some(secs) = self.timeout_secs {
            d = d.with_timeout(Duration::from_secs(secs))?;
        }
        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Credentials;
    use std::io::Write;

    const FULL_YAML: &str = r#"
write_timeout_secs: 15
backends:
  - kind: influxdb1
    host: influx1.local
    username: root
    password: root
  - kind: InfluxDB2
    host: influx2.local
    token: "test-token-placeholder"
    org: home
    bucket: metrics
  - kind: influxdb3
    host: cloud.example.com
    token: "t3"
  - kind: timescale
    host: pg.local
    username: varken
    password: secret
    timeout_secs: 3
  - kind: questdb
    host: quest.local
    enabled: false
  - kind: victoriametrics
    host: vm.local
    ssl: true
    verify_ssl: false
"#;

    #[test]
    fn test_config_parse_all_kinds() {
        let config = WriterConfig::from_yaml(FULL_YAML).expect("parse full yaml");
        assert_eq!(config.write_timeout(), Duration::from_secs(15));

        assert!(config.entries().iter().all(Result::is_ok));
        let d = config.descriptors();
        assert_eq!(d.len(), 6);

        assert_eq!(d[0].kind(), BackendKind::InfluxV1);
        assert_eq!(d[0].port(), 8086);
        assert_eq!(d[0].database(), "varken");
        assert_eq!(d[0].credentials().basic_pair(), Some(("root", "root")));

        assert_eq!(d[1].kind(), BackendKind::InfluxV2);
        assert_eq!(d[1].database(), "metrics");
        assert_eq!(d[1].credentials().org(), Some("home"));

        assert_eq!(d[2].kind(), BackendKind::InfluxV3);
        assert_eq!(d[2].port(), 443);
        assert!(d[2].tls());
        assert_eq!(d[2].credentials().org(), None);
        assert_eq!(d[2].database(), "varken");

        assert_eq!(d[3].kind(), BackendKind::Timescale);
        assert_eq!(d[3].port(), 5432);
        assert_eq!(d[3].timeout(), Duration::from_secs(3));

        assert_eq!(d[4].port(), 9000);
        assert!(!d[4].enabled());

        assert_eq!(d[5].port(), 8428);
        assert_eq!(d[5].base_url(), "https://vm.local:8428");
        assert!(!d[5].verify_tls());
        assert_eq!(d[5].credentials(), &Credentials::None);
    }

    #[test]
    fn test_defaults() {
        let config = WriterConfig::from_yaml("backends: []\n").unwrap();
        assert_eq!(config.write_timeout_secs, 30);
        assert!(config.descriptors().is_empty());
    }

    #[test]
    fn test_unknown_kind_skipped_others_kept() {
        let config = WriterConfig::from_yaml(
            "backends:\n  - kind: graphite\n    host: g.local\n  - kind: questdb\n    host: q\n",
        )
        .unwrap();

        let entries = config.entries();
        match &entries[0] {
            Err(ConfigError::UnknownBackendKind(k)) => assert_eq!(k, "graphite"),
            other => panic!("expected UnknownBackendKind, got {:?}", other),
        }
        assert!(entries[1].is_ok());

        let d = config.descriptors();
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].kind(), BackendKind::QuestDb);
        assert_eq!(d[0].host(), "q");
    }

    #[test]
    fn test_invalid_entry_skipped_others_kept() {
        let config = WriterConfig::from_yaml(
            "backends:\n  - kind: influxdb2\n    host: h\n    token: t\n  - kind: victoriametrics\n    host: vm\n",
        )
        .unwrap();
        let d = config.descriptors();
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].kind(), BackendKind::VictoriaMetrics);
    }

    #[test]
    fn test_influx_v2_requires_org() {
        let config = WriterConfig::from_yaml(
            "backends:\n  - kind: influxdb2\n    host: h\n    token: t\n",
        )
        .unwrap();
        assert!(matches!(
            config.entries()[0],
            Err(ConfigError::MissingField { field: "org", .. })
        ));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        assert!(matches!(
            WriterConfig::from_yaml("write_timeout_secs: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        let config = WriterConfig::from_yaml(
            "backends:\n  - kind: questdb\n    host: q\n    timeout_secs: 0\n",
        )
        .unwrap();
        assert!(matches!(config.entries()[0], Err(ConfigError::Invalid(_))));
        assert!(config.descriptors().is_empty());
    }

    #[test]
    fn test_config_invalid_yaml() {
        assert!(matches!(
            WriterConfig::from_yaml("backends: [[[unclosed"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL_YAML.as_bytes()).unwrap();
        let config = WriterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.backends.len(), 6);
    }

    #[test]
    fn test_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let res = WriterConfig::from_file(&dir.path().join("missing.yaml"));
        assert!(matches!(res, Err(ConfigError::Io(_))));
    }
}
