//! Partner status vocabulary -> local dashboard status.
//!
//! The mapping is total: anything the table does not know becomes
//! [`LocalStatus::Aguardando`]. The partner adds statuses over time, so the
//! built-in tables can be extended from configuration (`status_map`).
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::model::LocalStatus;

/// Current partner API statuses.
const PARTNER_STATUSES: [(&str, LocalStatus); 9] = [
    ("waiting_confirmation", LocalStatus::Aguardando),
    ("pending_payment", LocalStatus::PagamentoPendente),
    ("pending_online_payment", LocalStatus::PagamentoOnlinePendente),
    ("scheduled_confirmed", LocalStatus::Agendado),
    ("confirmed", LocalStatus::EmProducao),
    ("ready", LocalStatus::EmProducao),
    ("waiting_to_catch", LocalStatus::EsperandoRetirada),
    ("released", LocalStatus::SaiuParaEntrega),
    ("closed", LocalStatus::Finalizado),
];

/// Statuses used by the older partner payloads (`scheduled_for` era).
const LEGACY_PARTNER_STATUSES: [(&str, LocalStatus); 7] = [
    ("pending", LocalStatus::Aguardando),
    ("confirmed", LocalStatus::Agendado),
    ("preparing", LocalStatus::EmProducao),
    ("ready", LocalStatus::EsperandoRetirada),
    ("dispatched", LocalStatus::SaiuParaEntrega),
    ("delivered", LocalStatus::Finalizado),
    ("cancelled", LocalStatus::Cancelado),
];

static DEFAULT_MAPPER: Lazy<StatusMapper> = Lazy::new(StatusMapper::default);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMapper {
    table: HashMap<String, LocalStatus>,
}

impl Default for StatusMapper {
    fn default() -> Self {
        Self::from_pairs(PARTNER_STATUSES)
    }
}

impl StatusMapper {
    pub fn legacy() -> Self {
        Self::from_pairs(LEGACY_PARTNER_STATUSES)
    }

    fn from_pairs<const N: usize>(pairs: [(&str, LocalStatus); N]) -> Self {
        Self {
            table: pairs
                .into_iter()
                .map(|(partner, local)| (partner.to_string(), local))
                .collect(),
        }
    }

    /// Add or replace entries; later pairs win.
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, LocalStatus)>,
    {
        self.table.extend(overrides);
        self
    }

    pub fn map(&self, partner_status: &str) -> LocalStatus {
        self.table
            .get(partner_status)
            .copied()
            .unwrap_or(LocalStatus::Aguardando)
    }
}

/// Map with the built-in table of the current partner API.
pub fn map_status(partner_status: &str) -> LocalStatus {
    DEFAULT_MAPPER.map(partner_status)
}
