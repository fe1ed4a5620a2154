use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::differ::items_changed;
use super::mapper::{map_order, resolve_items};
use super::{ReconcileError, ReconcileOptions, ReconcileReport};
use crate::db::{OrderPatch, OrderStore, OrderTx};
use crate::model::{ItemRecord, OrderRecord};
use crate::partner::{PartnerApi, RemoteItem, RemoteOrder, RemoteOrderSummary, StrOrInt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Unchanged,
    /// Both override flags set; the row is left alone.
    Protected,
}

/// Syncs partner orders into the local store.
///
/// Runs are serialized within the process. Separate processes (a cron job
/// next to the server) are not coordinated.
pub struct Reconciler {
    partner: Arc<dyn PartnerApi>,
    store: Arc<dyn OrderStore>,
    options: ReconcileOptions,
    run_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        partner: Arc<dyn PartnerApi>,
        store: Arc<dyn OrderStore>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            partner,
            store,
            options,
            run_lock: Mutex::new(()),
        }
    }

    /// One reconciliation run over every order the partner lists.
    ///
    /// Per-order failures land in [`ReconcileReport::errors`]. Listing,
    /// transaction and commit failures abort the run and roll back its writes.
    #[instrument(skip_all, fields(run_id = %Uuid::new_v4()))]
    pub async fn run(&self) -> Result<ReconcileReport, ReconcileError> {
        let _guard = self.run_lock.lock().await;

        let summaries = self
            .partner
            .list_orders()
            .await
            .map_err(ReconcileError::ListOrders)?;
        info!(count = summaries.len(), "partner orders listed");

        let mut report = ReconcileReport {
            total: summaries.len(),
            ..Default::default()
        };
        let mut tx = self.store.begin().await.map_err(ReconcileError::Storage)?;

        let partner = Arc::clone(&self.partner);
        let details = stream::iter(summaries)
            .map(move |summary| {
                let partner = Arc::clone(&partner);
                async move {
                    let detail = partner.get_order(&summary.id.to_string()).await;
                    (summary, detail)
                }
            })
            .buffered(self.options.detail_concurrency.max(1));
        let mut details = std::pin::pin!(details);

        while let Some((summary, detail)) = details.next().await {
            let order = match detail {
                Ok(order) => order,
                Err(err) => {
                    warn!(order_id = %summary.id, error = %err, "order detail fetch failed");
                    report.errors.push(format!("Order {}: {err}", summary.id));
                    continue;
                }
            };

            if let Err(err) = tx.savepoint().await {
                return Err(abort(tx, ReconcileError::Storage(err)).await);
            }
            match self.reconcile_order(tx.as_mut(), &summary, &order).await {
                Ok(outcome) => {
                    if let Err(err) = tx.release_savepoint().await {
                        return Err(abort(tx, ReconcileError::Storage(err)).await);
                    }
                    debug!(order_id = %summary.id, ?outcome, "order reconciled");
                    match outcome {
                        Outcome::Created => report.created += 1,
                        Outcome::Updated => report.updated += 1,
                        Outcome::Unchanged | Outcome::Protected => {}
                    }
                }
                Err(err) => {
                    warn!(order_id = %summary.id, error = %format!("{err:#}"), "order failed");
                    report.errors.push(format!("Order {}: {err:#}", summary.id));
                    if let Err(err) = tx.rollback_to_savepoint().await {
                        return Err(abort(tx, ReconcileError::Storage(err)).await);
                    }
                }
            }
        }

        tx.commit().await.map_err(|err| {
            error!(error = %format!("{err:#}"), "reconciliation commit failed");
            ReconcileError::Commit(err)
        })?;
        report.log_summary();
        Ok(report)
    }

    async fn reconcile_order(
        &self,
        tx: &mut dyn OrderTx,
        summary: &RemoteOrderSummary,
        order: &RemoteOrder,
    ) -> Result<Outcome> {
        let rules = &self.options.rules;
        let mapped = map_order(order, summary, rules)?;
        let record = &mapped.record;

        let Some(existing) = tx.find_order(&record.numero_pedido).await? else {
            let items = resolve_items(tx, &mapped.items).await?;
            let id = tx.insert_order(record, &items).await?;
            info!(
                numero_pedido = %record.numero_pedido,
                order_id = id,
                contract = ?mapped.contract,
                items = items.len(),
                "order created"
            );
            return Ok(Outcome::Created);
        };

        match (existing.editado_manualmente, existing.status_editado_manualmente) {
            (true, true) => {
                debug!(numero_pedido = %record.numero_pedido, "order protected by manual edits");
                Ok(Outcome::Protected)
            }
            (true, false) => {
                if existing.status == record.status {
                    return Ok(Outcome::Unchanged);
                }
                tx.apply_patch(existing.id, &OrderPatch::status_only(record.status))
                    .await?;
                info!(
                    numero_pedido = %record.numero_pedido,
                    status = record.status.as_str(),
                    "order status updated"
                );
                Ok(Outcome::Updated)
            }
            (false, status_protected) => {
                let items = resolve_items(tx, &mapped.items).await?;
                let stored_items = tx.order_items(existing.id).await?;
                let items_differ = items_changed(&stored_items, &resolved_view(&items), rules);

                let patch = if status_protected {
                    OrderPatch::changes_except_status(Some(&existing), record)
                } else if existing.status != record.status || items_differ {
                    OrderPatch::from_record(record)
                } else {
                    OrderPatch::default()
                };
                if patch.is_empty() && !items_differ {
                    return Ok(Outcome::Unchanged);
                }

                if !patch.is_empty() {
                    tx.apply_patch(existing.id, &patch).await?;
                }
                if items_differ {
                    tx.replace_items(existing.id, &items).await?;
                }
                log_update(record, status_protected, items_differ);
                Ok(Outcome::Updated)
            }
        }
    }
}

/// Resolved lines as remote items keyed by catalog id, so lines matched by
/// name compare equal to the rows they produced.
fn resolved_view(items: &[ItemRecord]) -> Vec<RemoteItem> {
    items
        .iter()
        .map(|item| RemoteItem {
            item_id: Some(StrOrInt::Int(item.item_id)),
            quantity: Some(item.quantidade),
            ..Default::default()
        })
        .collect()
}

fn log_update(record: &OrderRecord, status_protected: bool, items_changed: bool) {
    info!(
        numero_pedido = %record.numero_pedido,
        status_protected,
        items_changed,
        "order updated"
    );
}

async fn abort(tx: Box<dyn OrderTx>, err: ReconcileError) -> ReconcileError {
    error!(error = %err, "reconciliation aborted");
    if let Err(rollback_err) = tx.rollback().await {
        error!(error = %format!("{rollback_err:#}"), "rollback failed");
    }
    err
}
