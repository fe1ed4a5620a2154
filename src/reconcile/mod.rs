//! Partner order reconciliation.
//!
//! - `status`: partner status vocabulary -> local status.
//! - `mapper`: one partner payload -> local order and item records.
//! - `differ`: whether an order's items changed.
//! - `reconciler`: the run itself (list, fetch, match, write).

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::partner::PartnerError;

pub mod differ;
pub mod mapper;
pub mod reconciler;
pub mod status;

pub use differ::items_changed;
pub use mapper::{
    detect_contract, map_order, ContractSetting, MapError, MappedOrder, MappingRules,
    PartnerContract,
};
pub use reconciler::Reconciler;
pub use status::{map_status, StatusMapper};

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOptions {
    pub rules: MappingRules,
    /// Detail requests in flight at once. 1 fetches strictly in order.
    pub detail_concurrency: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            rules: MappingRules::default(),
            detail_concurrency: 1,
        }
    }
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    /// Summaries returned by the partner list endpoint.
    pub total: usize,
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn log_summary(&self) {
        info!(
            created = self.created,
            updated = self.updated,
            total = self.total,
            errors = self.errors.len(),
            "reconciliation finished"
        );
        for err in &self.errors {
            warn!(error = %err, "order skipped");
        }
    }
}

/// Failure that aborts a whole run. Nothing from the run is committed.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to list partner orders: {0}")]
    ListOrders(#[source] PartnerError),
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
    #[error("failed to commit reconciliation: {0:#}")]
    Commit(anyhow::Error),
}
