use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use pedidos_sync::config;
use pedidos_sync::partner::{PartnerApi, PartnerClient, RemoteOrder};
use pedidos_sync::reconcile::map_order;

/// Print what the partner sends for one order next to how it would be mapped.
#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Partner order id to inspect; defaults to the first listed order
    #[arg(long)]
    order_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let options = cfg.reconcile_options()?;
    let client = PartnerClient::from_config(&cfg)?;

    let summaries = client.list_orders().await?;
    println!("Listed orders: {}", summaries.len());
    let summary = match &args.order_id {
        Some(id) => summaries
            .iter()
            .find(|s| s.id.to_string() == *id)
            .cloned()
            .ok_or_else(|| anyhow!("order {id} is not in the partner list"))?,
        None => summaries
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("partner returned no orders"))?,
    };

    let raw = client.get_order_raw(&summary.id.to_string()).await?;
    println!("Raw payload:\n{}", serde_json::to_string_pretty(&raw)?);

    let order: RemoteOrder = serde_json::from_value(raw)?;
    let mapped = map_order(&order, &summary, &options.rules)?;
    println!("Contract: {:?}", mapped.contract);
    println!(
        "Mapped order:\n{}",
        serde_json::to_string_pretty(&mapped.record)?
    );
    println!("Items before catalog lookup: {}", mapped.items.len());
    for item in &mapped.items {
        println!(
            "  item_id={:?} name={:?} quantity={:?}",
            item.item_id.as_ref().map(ToString::to_string),
            item.name,
            item.quantity
        );
    }
    Ok(())
}
