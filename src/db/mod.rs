//! Database module: storage seams, write models and SQL repositories.
//!
//! - `model`: typed write-side structures (`OrderPatch`, `RaiseFlags`).
//! - `repo`: SQL-only functions plus the SQLite implementation of the seams.
//!
//! The reconciler only sees [`OrderStore`] and [`OrderTx`]; everything it
//! writes during a run goes through one `OrderTx`.

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{ItemRecord, Order, OrderItem, OrderRecord};

pub mod model;
pub mod repo;

pub use model::{OrderPatch, RaiseFlags};
pub use repo::*;

/// Source of run-level transactions.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn OrderTx>>;
}

/// One open transaction over orders, order items and the catalog.
#[async_trait]
pub trait OrderTx: Send {
    async fn find_order(&mut self, numero_pedido: &str) -> Result<Option<Order>>;

    async fn order_items(&mut self, order_id: i64) -> Result<Vec<OrderItem>>;

    async fn insert_order(&mut self, order: &OrderRecord, items: &[ItemRecord]) -> Result<i64>;

    /// Apply a sync-driven patch. Never raises override flags.
    async fn apply_patch(&mut self, order_id: i64, patch: &OrderPatch) -> Result<()>;

    /// Delete every line of the order and insert `items` in their place.
    async fn replace_items(&mut self, order_id: i64, items: &[ItemRecord]) -> Result<()>;

    async fn find_catalog_item_by_id(&mut self, id: i64) -> Result<Option<i64>>;

    /// First catalog item whose name contains `name`.
    async fn find_catalog_item_by_name(&mut self, name: &str) -> Result<Option<i64>>;

    async fn savepoint(&mut self) -> Result<()>;

    async fn release_savepoint(&mut self) -> Result<()>;

    async fn rollback_to_savepoint(&mut self) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
