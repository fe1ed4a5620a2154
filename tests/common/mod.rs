#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use pedidos_sync::db::{self, OrderPatch, OrderStore, OrderTx, Pool, SqliteStore};
use pedidos_sync::model::{ItemRecord, Order, OrderItem, OrderRecord};
use pedidos_sync::partner::{PartnerApi, PartnerError, RemoteOrder, RemoteOrderSummary, StrOrInt};
use pedidos_sync::reconcile::{ReconcileOptions, Reconciler};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub async fn setup_pool() -> Pool {
    // One connection: every in-memory connection is its own database.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

/// Catalog used by the scenarios: 5 roses, 9 sunflowers, 12 a basket.
pub async fn seed_catalog(pool: &Pool) {
    for (id, nome) in [
        (5, "Buquê de Rosas Vermelhas"),
        (9, "Girassóis"),
        (12, "Cesta Café da Manhã"),
    ] {
        db::upsert_catalog_item(pool, Some(id), nome, Decimal::new(9990, 2))
            .await
            .unwrap();
    }
}

#[derive(Clone)]
enum Detail {
    Order(Value),
    Status(u16),
    Garbage,
}

/// Partner double: serves the orders it was given, in insertion order, and
/// records every detail request.
#[derive(Clone, Default)]
pub struct RecordingPartner {
    orders: Arc<Mutex<Vec<(String, Detail)>>>,
    list_failure: Arc<Mutex<Option<u16>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    detail_calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingPartner {
    async fn put(&self, id: &str, detail: Detail) {
        let mut orders = self.orders.lock().await;
        match orders.iter_mut().find(|(known, _)| known == id) {
            Some(entry) => entry.1 = detail,
            None => orders.push((id.to_string(), detail)),
        }
    }

    /// Add or replace the detail payload of order `id`.
    pub async fn set_order(&self, id: &str, payload: Value) {
        self.put(id, Detail::Order(payload)).await;
    }

    pub async fn fail_order(&self, id: &str, status: u16) {
        self.put(id, Detail::Status(status)).await;
    }

    pub async fn corrupt_order(&self, id: &str) {
        self.put(id, Detail::Garbage).await;
    }

    /// Hold the detail response of order `id` for `delay`.
    pub async fn delay_order(&self, id: &str, delay: Duration) {
        self.delays.lock().await.insert(id.to_string(), delay);
    }

    pub async fn fail_listing(&self, status: Option<u16>) {
        *self.list_failure.lock().await = status;
    }

    pub async fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().await.clone()
    }
}

#[async_trait]
impl PartnerApi for RecordingPartner {
    async fn list_orders(&self) -> Result<Vec<RemoteOrderSummary>, PartnerError> {
        if let Some(status) = *self.list_failure.lock().await {
            return Err(PartnerError::Status {
                status,
                body: "unavailable".into(),
            });
        }
        let orders = self.orders.lock().await;
        Ok(orders
            .iter()
            .map(|(id, _)| RemoteOrderSummary {
                id: StrOrInt::Str(id.clone()),
                display_id: None,
                status: None,
            })
            .collect())
    }

    async fn get_order(&self, order_id: &str) -> Result<RemoteOrder, PartnerError> {
        self.detail_calls.lock().await.push(order_id.to_string());
        let delay = self.delays.lock().await.get(order_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let detail = self
            .orders
            .lock()
            .await
            .iter()
            .find(|(id, _)| id == order_id)
            .map(|(_, detail)| detail.clone());
        match detail {
            Some(Detail::Order(value)) => serde_json::from_value(value)
                .map_err(|err| PartnerError::InvalidJson(err.to_string())),
            Some(Detail::Status(status)) => Err(PartnerError::Status {
                status,
                body: "boom".into(),
            }),
            Some(Detail::Garbage) => Err(PartnerError::InvalidJson(
                "expected value at line 1 column 1".into(),
            )),
            None => Err(PartnerError::Status {
                status: 404,
                body: "not found".into(),
            }),
        }
    }
}

pub fn reconciler(partner: &RecordingPartner, pool: &Pool) -> Reconciler {
    reconciler_with(partner, pool, ReconcileOptions::default())
}

pub fn reconciler_with(
    partner: &RecordingPartner,
    pool: &Pool,
    options: ReconcileOptions,
) -> Reconciler {
    Reconciler::new(
        Arc::new(partner.clone()),
        Arc::new(SqliteStore::new(pool.clone())),
        options,
    )
}

pub fn reconciler_on(partner: &RecordingPartner, store: Arc<dyn OrderStore>) -> Reconciler {
    Reconciler::new(Arc::new(partner.clone()), store, ReconcileOptions::default())
}

/// Storage failure injected by [`FailingStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Begin,
    /// The savepoint with this zero-based index fails; earlier ones succeed.
    Savepoint(usize),
    Commit,
}

/// SQLite store that fails one storage step on demand.
pub struct FailingStore {
    inner: SqliteStore,
    fault: Fault,
    savepoints: Arc<AtomicUsize>,
}

impl FailingStore {
    pub fn new(pool: &Pool, fault: Fault) -> Self {
        Self {
            inner: SqliteStore::new(pool.clone()),
            fault,
            savepoints: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl OrderStore for FailingStore {
    async fn begin(&self) -> Result<Box<dyn OrderTx>> {
        if self.fault == Fault::Begin {
            bail!("database is locked");
        }
        Ok(Box::new(FailingTx {
            inner: self.inner.begin().await?,
            fault: self.fault,
            savepoints: Arc::clone(&self.savepoints),
        }))
    }
}

struct FailingTx {
    inner: Box<dyn OrderTx>,
    fault: Fault,
    savepoints: Arc<AtomicUsize>,
}

#[async_trait]
impl OrderTx for FailingTx {
    async fn find_order(&mut self, numero_pedido: &str) -> Result<Option<Order>> {
        self.inner.find_order(numero_pedido).await
    }

    async fn order_items(&mut self, order_id: i64) -> Result<Vec<OrderItem>> {
        self.inner.order_items(order_id).await
    }

    async fn insert_order(&mut self, order: &OrderRecord, items: &[ItemRecord]) -> Result<i64> {
        self.inner.insert_order(order, items).await
    }

    async fn apply_patch(&mut self, order_id: i64, patch: &OrderPatch) -> Result<()> {
        self.inner.apply_patch(order_id, patch).await
    }

    async fn replace_items(&mut self, order_id: i64, items: &[ItemRecord]) -> Result<()> {
        self.inner.replace_items(order_id, items).await
    }

    async fn find_catalog_item_by_id(&mut self, id: i64) -> Result<Option<i64>> {
        self.inner.find_catalog_item_by_id(id).await
    }

    async fn find_catalog_item_by_name(&mut self, name: &str) -> Result<Option<i64>> {
        self.inner.find_catalog_item_by_name(name).await
    }

    async fn savepoint(&mut self) -> Result<()> {
        let index = self.savepoints.fetch_add(1, Ordering::SeqCst);
        if self.fault == Fault::Savepoint(index) {
            bail!("disk I/O error");
        }
        self.inner.savepoint().await
    }

    async fn release_savepoint(&mut self) -> Result<()> {
        self.inner.release_savepoint().await
    }

    async fn rollback_to_savepoint(&mut self) -> Result<()> {
        self.inner.rollback_to_savepoint().await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.fault == Fault::Commit {
            self.inner.rollback().await?;
            bail!("database is full");
        }
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.inner.rollback().await
    }
}
