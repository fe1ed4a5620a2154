use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use pedidos_sync::config;
use pedidos_sync::db::{self, SqliteStore};
use pedidos_sync::http::{self, AppState};
use pedidos_sync::partner::PartnerClient;
use pedidos_sync::reconcile::Reconciler;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let partner = PartnerClient::from_config(&cfg)?;
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(partner),
        Arc::new(SqliteStore::new(pool)),
        cfg.reconcile_options()?,
    ));

    // In-process poller; a run that overlaps the next tick delays it.
    if let Some(every) = cfg.poll_interval() {
        let poller = Arc::clone(&reconciler);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = poller.run().await {
                    error!(error = %err, "scheduled reconciliation failed");
                }
            }
        });
        info!(every_secs = every.as_secs(), "scheduled reconciliation enabled");
    }

    let addr = cfg.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    let app = http::router(AppState::new(reconciler, cfg.server.poll_secret.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
