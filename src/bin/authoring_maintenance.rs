//! Authoring Maintenance Binary
//!
//! Offline repairs against the production authoring database.
//!
//! ## Commands
//!
//! - `repair-titles [--apply] [--module CODE]`: find steps whose generated
//!   `"Step {task}.{step}"` title disagrees with their position. Dry run by
//!   default; `--apply` rewrites them in one transaction.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... cargo run --bin authoring_maintenance --features cli -- repair-titles --apply
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use training_authoring::{AuthoringService, OrderingEngine, PostgresAuthoringStore};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "authoring_maintenance=info,training_authoring=info,sqlx=warn".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .flatten_event(true),
            )
            .init();
    }
}

#[derive(Debug, Parser)]
#[command(name = "authoring_maintenance", version, about = "Offline repairs for the authoring database")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Find generated step titles that disagree with their position
    RepairTitles {
        /// Rewrite mismatched titles instead of only reporting them
        #[arg(long)]
        apply: bool,
        /// Restrict the scan to one module code
        #[arg(long)]
        module: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let Cmd::RepairTitles { apply, module } = Cli::parse().cmd;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        apply,
        module = module.as_deref().unwrap_or("*"),
        "Starting title repair"
    );

    let connect_start = Instant::now();
    let store = match tokio::time::timeout(Duration::from_secs(30), PostgresAuthoringStore::from_env()).await {
        Ok(Ok(store)) => Arc::new(store),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            return Err(e.into());
        }
        Err(_) => {
            tracing::error!("PostgreSQL connection timeout after 30s");
            return Err("Database connection timeout".into());
        }
    };
    info!(
        latency_ms = connect_start.elapsed().as_millis() as u64,
        "PostgreSQL connection established"
    );

    let module_id = match &module {
        Some(code) => Some(AuthoringService::new(Arc::clone(&store)).get_module_by_code(code).await?.id),
        None => None,
    };

    let engine = OrderingEngine::new(store);
    let repairs = engine.repair_titles(module_id.as_ref(), apply).await?;

    for repair in &repairs {
        info!(
            module_id = %repair.module_id,
            step_id = %repair.step_id,
            old_title = %repair.old_title,
            new_title = %repair.new_title,
            applied = apply,
            "Title mismatch"
        );
    }
    info!(count = repairs.len(), applied = apply, "Title repair finished");
    Ok(())
}
