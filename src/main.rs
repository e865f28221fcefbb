//! Application entry point for the `greenhouse-telemetry` service.
//!
//! This binary orchestrates the full startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Choosing the dismissal store (PostgreSQL when `DATABASE_URL` is set,
//!   in-memory otherwise) and creating its schema
//! - Building the backend client and the refresh pipeline
//! - Starting the periodic refresh loop
//! - Mounting all API routes via the `routes` gateway and serving requests
//!
//! # Environment Variables
//! - `SENSOR_API_URLS` (**required**) – comma-separated backend base URLs
//! - `DATABASE_URL` (optional) – PostgreSQL connection string
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the full list.
use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

mod alerts;
mod client;
mod config;
mod convert;
mod fetcher;
mod metrics;
mod models;
mod normalize;
mod pipeline;
mod resolver;
mod routes;
mod schema;
mod store;

#[cfg(test)]
mod testing;

use client::BackendClient;
use pipeline::{Pipeline, PipelineSettings};
use store::DismissalStore;

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let store = match &cfg.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(cfg.db_pool_max)
                .connect(db_url)
                .await
                .context("Failed to connect to dismissal database")?;

            tracing::info!("Successfully connected to database");
            schema::create_schema(&pool).await?;
            DismissalStore::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, dismissals are kept in memory only");
            DismissalStore::memory()
        }
    };

    let client = BackendClient::new(cfg.api_urls.clone(), cfg.request_timeout)?;
    let pipeline = Arc::new(Pipeline::new(client, store, PipelineSettings::from_config(&cfg)));

    pipeline::spawn_refresh_loop(pipeline.clone(), cfg.refresh_interval);

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(pipeline);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Install the global tracing subscriber.
///
/// - Target, file and line number are always printed.
/// - `FORCE_COLOR=1|true|yes` / `0|false|no` forces ANSI colors on or off;
///   otherwise colors follow TTY detection.
/// - `AXUM_SPAN_EVENTS`: `full` (enter, exit, close), `enter_exit`, or
///   close-only by default. Each refresh runs inside a `cycle` span.
/// - `RUST_LOG` wins when set; otherwise `AXUM_LOG_LEVEL` (default `debug`)
///   with sqlx query logging held at `warn`.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
