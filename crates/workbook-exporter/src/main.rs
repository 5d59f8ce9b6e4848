//! workbook-exporter: the Workbook Prometheus exporter daemon.
//!
//! Assembles the exporter:
//! - Configuration (TOML file, environment, flags)
//! - Workbook REST client
//! - Snapshot collector
//! - HTTP exposition (`/metrics`, `/healthz`)
//!
//! # Usage
//!
//! ```text
//! workbook-exporter --config /etc/workbook-exporter.toml --listen 0.0.0.0:8000
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use workbook_client::WorkbookClient;
use workbook_core::ExporterConfig;
use workbook_metrics::SnapshotCollector;

const DEFAULT_FILTER: &str = "info,workbook=debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "workbook-exporter", about = "Prometheus exporter for Workbook", version)]
struct Cli {
    /// TOML configuration file. Built-in defaults apply without one.
    #[arg(long, env = "WORKBOOK_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Workbook base URL.
    #[arg(long, env = "WORKBOOK_URL")]
    workbook_url: Option<String>,

    /// Workbook API user.
    #[arg(long, env = "WORKBOOK_USER")]
    workbook_user: Option<String>,

    /// Workbook API password.
    #[arg(long, env = "WORKBOOK_PASSWORD", hide_env_values = true)]
    workbook_password: Option<String>,

    /// Address the exposition server listens on.
    #[arg(long)]
    listen: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print the effective configuration (password redacted) and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = load_config(&cli)?;
    if cli.print_config {
        print!("{}", redacted(&config).to_toml_string()?);
        return Ok(());
    }

    run(config).await
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

/// File (or defaults), then flags and environment on top, then validation.
fn load_config(cli: &Cli) -> anyhow::Result<ExporterConfig> {
    let mut config = match &cli.config {
        Some(path) => ExporterConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ExporterConfig::default(),
    };

    if let Some(url) = &cli.workbook_url {
        config.workbook.url = url.clone();
    }
    if let Some(user) = &cli.workbook_user {
        config.workbook.user = user.clone();
    }
    if let Some(password) = &cli.workbook_password {
        config.workbook.password = password.clone();
    }
    if let Some(listen) = &cli.listen {
        config.server.listen = listen.clone();
    }

    config.validate()?;
    Ok(config)
}

fn redacted(config: &ExporterConfig) -> ExporterConfig {
    let mut config = config.clone();
    config.workbook.password = "<redacted>".to_string();
    config
}

async fn run(config: ExporterConfig) -> anyhow::Result<()> {
    info!(
        workbook = %config.workbook.url,
        timeout_secs = config.workbook.timeout_secs,
        companies = config.filters.company_ids.len(),
        "workbook exporter starting"
    );

    let client = WorkbookClient::new(&config.workbook)?;
    let listen = config.server.listen.clone();
    let collector = Arc::new(SnapshotCollector::new(Arc::new(client), Arc::new(config)));

    let router = workbook_api::build_router(collector);
    let listener = tokio::net::TcpListener::bind(listen.as_str())
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!(addr = %listener.local_addr()?, "exposition server listening");

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("workbook exporter stopped");
    Ok(())
}
