// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Varken writer CLI
//!
//! # Usage
//!
//! ```bash
//! # Connect every configured backend and list the live ones
//! varken-writer --config varken.yaml check
//!
//! # Write a file of points (JSON array or one JSON object per line)
//! varken-writer --config varken.yaml write points.json
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use varken_writer::{FanOut, Point, WriterConfig};

#[derive(Parser, Debug)]
#[command(name = "varken-writer")]
#[command(about = "Varken metrics writer - fan points out to every backend", long_about = None)]
struct Args {
    /// Backend configuration (YAML)
    #[arg(short, long, default_value = "varken.yaml")]
    config: PathBuf,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect every backend and list the live ones
    Check,
    /// Write a file of points
    Write {
        /// JSON array or JSON lines
        points: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_directives(
            rust_log.as_deref(),
            args.log_level,
        )))
        .init();

    let config = WriterConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let descriptors = config.descriptors();

    tracing::info!("Varken writer starting...");
    tracing::info!("  Config: {}", args.config.display());
    tracing::info!("  Backends: {}", descriptors.len());
    tracing::info!("  Write timeout: {:?}", config.write_timeout());

    let mut fanout = FanOut::connect(descriptors)
        .await?
        .with_write_timeout(config.write_timeout());

    let outcome = match args.command {
        Commands::Check => {
            println!("{} live backend(s):", fanout.backend_count());
            for info in fanout.backend_info() {
                println!(
                    "  {:<16} {}:{} database={}",
                    info.kind.to_string(),
                    info.host,
                    info.port,
                    info.database
                );
            }
            Ok(())
        }
        Commands::Write { points } => write_file(&mut fanout, &points).await,
    };

    fanout.close().await;
    outcome
}

async fn write_file(fanout: &mut FanOut, path: &Path) -> Result<()> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let points = parse_points(&content).with_context(|| format!("parsing {}", path.display()))?;
    tracing::info!("Writing {} point(s)", points.len());

    let report = fanout.write(&points).await;
    print!("{}", report);
    if !report.any_succeeded() {
        bail!("no backend accepted the batch");
    }
    Ok(())
}

/// Filter directives: RUST_LOG when set and non-empty, else `level`.
fn log_directives(rust_log: Option<&str>, level: tracing::Level) -> String {
    match rust_log {
        Some(env) if !env.trim().is_empty() => env.to_string(),
        _ => level.to_string().to_lowercase(),
    }
}

/// A JSON array of points, or one point per non-empty line.
fn parse_points(content: &str) -> Result<Vec<Point>> {
    if content.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(content)?);
    }
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", n + 1))
        })
        .collect()
}
