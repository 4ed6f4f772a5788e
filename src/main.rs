//! Advanced Cache Server
//!
//! Runs the multi-tier cache with its background sweepers, exposing the
//! admin REST API and a Prometheus/health endpoint.
//!
//! ```text
//! ┌──────────────────────────────┐     ┌──────────────────────────────┐
//! │  Admin API (axum)  :8090     │     │  Metrics (hyper)  :8080      │
//! │  /cache/stats /cache/health  │     │  /metrics  /healthz          │
//! └──────────────┬───────────────┘     └──────────────┬───────────────┘
//!                └────────────────┬───────────────────┘
//!                        ┌────────┴────────┐
//!                        │  AdvancedCache  │◄── CacheMonitor (sweepers)
//!                        └─────────────────┘
//! ```

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use advanced_cache::{
    AdvancedCache, CacheAdminRouter, CacheConfig, CacheMonitor, PrometheusExporter,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Advanced Cache - multi-tier in-memory cache with compression and smart invalidation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Admin REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: SocketAddr,

    /// Metrics and health server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Store every value uncompressed
    #[arg(long, env = "NO_COMPRESSION")]
    no_compression: bool,

    /// Serialized size in bytes above which values are compressed
    #[arg(long, env = "COMPRESSION_THRESHOLD")]
    compression_threshold: Option<usize>,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    info!("Starting Advanced Cache");
    info!("  Version: {}", advanced_cache::VERSION);
    info!("  Admin API: {}", args.api_addr);
    info!("  Metrics: {}", args.metrics_addr);

    let config = load_config(&args)?;
    let cache = Arc::new(AdvancedCache::with_config(config).context("invalid cache configuration")?);

    let token = CancellationToken::new();
    let monitor = CacheMonitor::spawn(cache.clone(), token.clone());

    // Start metrics/health server
    let exporter = Arc::new(PrometheusExporter::new(cache.clone())?);
    let metrics_addr = args.metrics_addr;
    let metrics_token = token.clone();
    let metrics_handle = tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr, exporter, metrics_token).await {
            error!("Metrics server error: {:#}", e);
        }
    });

    // Stop everything on Ctrl-C
    let signal_token = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    // Run admin API
    let app = CacheAdminRouter::new(cache.clone()).build();
    let listener = tokio::net::TcpListener::bind(args.api_addr)
        .await
        .with_context(|| format!("failed to bind admin API on {}", args.api_addr))?;
    info!("Admin API listening on {}", args.api_addr);

    let api_token = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { api_token.cancelled().await })
        .await
        .context("admin API server error")?;

    token.cancel();
    monitor.shutdown().await;
    let _ = metrics_handle.await;

    cache.log_summary();
    info!("Advanced Cache shutdown complete");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CacheConfig::default(),
    };

    if args.no_compression {
        config.compression.enabled = false;
    }
    if let Some(threshold) = args.compression_threshold {
        config.compression.threshold_bytes = threshold;
    }
    config.validate()?;
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower=warn".parse()?)
        .add_directive("tower_http=info".parse()?)
        .add_directive("axum=info".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// Metrics & Health Server
// =============================================================================

async fn run_metrics_server(
    addr: SocketAddr,
    exporter: Arc<PrometheusExporter>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{header, Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let exporter = exporter.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let exporter = exporter.clone();
                async move {
                    let mut response = Response::new(Body::empty());
                    match req.uri().path() {
                        "/metrics" => match exporter.render() {
                            Ok((content_type, buffer)) => {
                                if let Ok(value) = header::HeaderValue::from_str(&content_type) {
                                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                                }
                                *response.body_mut() = Body::from(buffer);
                            }
                            Err(e) => {
                                error!("Failed to render metrics: {}", e);
                                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            }
                        },
                        "/healthz" | "/livez" | "/readyz" => {
                            *response.body_mut() = Body::from("ok");
                        }
                        _ => {
                            *response.status_mut() = StatusCode::NOT_FOUND;
                            *response.body_mut() = Body::from("not found");
                        }
                    }
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    info!("Metrics server listening on {}", addr);
    Server::try_bind(&addr)
        .with_context(|| format!("failed to bind metrics server on {}", addr))?
        .serve(make_svc)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .context("metrics server error")?;

    Ok(())
}
