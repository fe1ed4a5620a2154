use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use pedidos_sync::config;
use pedidos_sync::db::{self, SqliteStore};
use pedidos_sync::http::PollResponse;
use pedidos_sync::partner::PartnerClient;
use pedidos_sync::reconcile::Reconciler;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one partner order reconciliation and exit (for cron)"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the result as the JSON body the HTTP endpoint returns
    #[arg(long)]
    json: bool,
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

    let reconciler = Reconciler::new(
        Arc::new(PartnerClient::from_config(&cfg)?),
        Arc::new(SqliteStore::new(pool)),
        cfg.reconcile_options()?,
    );

    info!("starting partner order sync");
    let report = match reconciler.run().await {
        Ok(report) => report,
        Err(err) => {
            error!(error = %err, "partner order sync failed");
            return Err(err.into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&PollResponse::from(report))?);
    } else {
        println!(
            "Novos: {}, Atualizados: {}, Total: {}, Erros: {}",
            report.created,
            report.updated,
            report.total,
            report.errors.len()
        );
        for err in &report.errors {
            println!("  {err}");
        }
    }
    Ok(())
}
