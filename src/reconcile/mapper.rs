//! Partner order payload -> local order and item records.
//!
//! The partner has shipped more than one payload shape over time. Each
//! payload is classified with [`detect_contract`] (or forced through
//! configuration) before any field is read.

use anyhow::Result;
use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Timelike, Utc,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::status::StatusMapper;
use crate::db::OrderTx;
use crate::model::{Customer, DeliveryType, ItemRecord, LocalStatus, OrderRecord};
use crate::partner::{
    RemoteAddress, RemoteCustomer, RemoteItem, RemoteOrder, RemoteOrderSummary, StrOrInt,
};

const DEFAULT_CUSTOMER_NAME: &str = "Cliente";
const SCHEDULED_STATUS: &str = "scheduled_confirmed";

/// Payload shapes the partner API has used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerContract {
    /// `display_id`, `schedule.scheduled_date_time_start`, `observation`.
    V1,
    /// `scheduled_for`, `notes` + `delivery_notes`, customer as a bare name.
    Legacy,
}

/// `partner.contract` setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractSetting {
    #[default]
    Auto,
    V1,
    Legacy,
}

impl ContractSetting {
    pub fn resolve(self, order: &RemoteOrder) -> PartnerContract {
        match self {
            ContractSetting::Auto => detect_contract(order),
            ContractSetting::V1 => PartnerContract::V1,
            ContractSetting::Legacy => PartnerContract::Legacy,
        }
    }
}

pub fn detect_contract(order: &RemoteOrder) -> PartnerContract {
    let legacy_fields =
        order.scheduled_for.is_some() || order.notes.is_some() || order.delivery_notes.is_some();
    let current_fields =
        order.display_id.is_some() || order.schedule.is_some() || order.observation.is_some();
    if legacy_fields && !current_fields {
        PartnerContract::Legacy
    } else {
        PartnerContract::V1
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("invalid {field} timestamp {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("item {item_id} total overflows: {quantity} x {unit_price}")]
    ItemTotalOverflow {
        item_id: i64,
        quantity: i64,
        unit_price: Decimal,
    },
}

/// Everything the mapper needs besides the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRules {
    pub status_mapper: StatusMapper,
    pub legacy_status_mapper: StatusMapper,
    /// Item statuses treated as cancelled, compared case-insensitively.
    pub cancelled_item_statuses: Vec<String>,
    /// Used only when a payload carries no timestamp at all.
    pub fallback_utc_offset_minutes: i32,
    pub contract: ContractSetting,
}

impl Default for MappingRules {
    fn default() -> Self {
        Self {
            status_mapper: StatusMapper::default(),
            legacy_status_mapper: StatusMapper::legacy(),
            cancelled_item_statuses: vec!["canceled".to_string()],
            fallback_utc_offset_minutes: -180,
            contract: ContractSetting::Auto,
        }
    }
}

impl MappingRules {
    pub fn is_cancelled(&self, item: &RemoteItem) -> bool {
        let Some(status) = item.status.as_deref().map(str::trim) else {
            return false;
        };
        self.cancelled_item_statuses
            .iter()
            .any(|cancelled| cancelled.trim().eq_ignore_ascii_case(status))
    }

    pub fn fallback_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.fallback_utc_offset_minutes * 60).unwrap_or(Utc.fix())
    }

    pub fn map_status(&self, contract: PartnerContract, partner_status: &str) -> LocalStatus {
        match contract {
            PartnerContract::V1 => self.status_mapper.map(partner_status),
            PartnerContract::Legacy => self.legacy_status_mapper.map(partner_status),
        }
    }
}

/// A payload mapped to local records. `items` are the non-cancelled remote
/// lines, still to be resolved against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedOrder {
    pub contract: PartnerContract,
    pub record: OrderRecord,
    pub items: Vec<RemoteItem>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn non_blank_id(value: Option<&StrOrInt>) -> Option<&StrOrInt> {
    value.filter(|id| !id.is_blank())
}

/// Display id when the partner sends one, otherwise its internal id.
pub fn numero_pedido(order: &RemoteOrder, summary: &RemoteOrderSummary) -> String {
    non_blank_id(order.display_id.as_ref())
        .or_else(|| non_blank_id(summary.display_id.as_ref()))
        .or_else(|| non_blank_id(order.id.as_ref()))
        .unwrap_or(&summary.id)
        .to_string()
        .trim()
        .to_string()
}

pub fn normalize_customer(raw: Option<&RemoteCustomer>) -> Customer {
    let (name, phone) = match raw {
        Some(RemoteCustomer::Detailed { name, phone }) => {
            (name.as_deref(), phone.as_ref().map(ToString::to_string))
        }
        Some(RemoteCustomer::Name(name)) => (Some(name.as_str()), None),
        None => (None, None),
    };
    Customer {
        name: non_blank(name).unwrap_or(DEFAULT_CUSTOMER_NAME).to_string(),
        phone: non_blank(phone.as_deref()).unwrap_or_default().to_string(),
    }
}

/// `street, nº number, neighborhood, city, state` with empty parts dropped.
pub fn format_address(address: Option<&RemoteAddress>) -> String {
    let Some(address) = address else {
        return String::new();
    };
    let number = non_blank_id(address.number.as_ref()).map(|n| format!("nº {}", n.to_string().trim()));
    [
        non_blank(address.street.as_deref()).map(str::to_string),
        number,
        non_blank(address.neighborhood.as_deref()).map(str::to_string),
        non_blank(address.city.as_deref()).map(str::to_string),
        non_blank(address.state.as_deref()).map(str::to_string),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(", ")
}

pub fn delivery_type(order_type: Option<&str>) -> DeliveryType {
    match non_blank(order_type) {
        Some(kind) if kind.eq_ignore_ascii_case("takeout") || kind.eq_ignore_ascii_case("pickup") => {
            DeliveryType::Retirada
        }
        _ => DeliveryType::Delivery,
    }
}

/// Wall-clock date and time of a partner timestamp, in the offset the
/// timestamp carries. Naive timestamps are taken as already local.
pub fn parse_timestamp(raw: &str) -> Option<(NaiveDate, NaiveTime)> {
    let raw = raw.trim();
    let local = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%z"))
        .map(|dt| dt.naive_local())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    let time = local.time().with_nanosecond(0).unwrap_or(local.time());
    Some((local.date(), time))
}

fn timestamp(field: &'static str, raw: &str) -> Result<(NaiveDate, NaiveTime), MapError> {
    parse_timestamp(raw).ok_or_else(|| MapError::InvalidTimestamp {
        field,
        value: raw.to_string(),
    })
}

/// Date and time the order is due.
pub fn resolve_schedule(
    order: &RemoteOrder,
    contract: PartnerContract,
    rules: &MappingRules,
) -> Result<(NaiveDate, NaiveTime), MapError> {
    let scheduled = match contract {
        PartnerContract::V1 if order.status.as_deref() == Some(SCHEDULED_STATUS) => order
            .schedule
            .as_ref()
            .and_then(|s| non_blank(s.scheduled_date_time_start.as_deref()))
            .map(|raw| ("schedule.scheduled_date_time_start", raw)),
        PartnerContract::V1 => None,
        PartnerContract::Legacy => {
            non_blank(order.scheduled_for.as_deref()).map(|raw| ("scheduled_for", raw))
        }
    };
    if let Some((field, raw)) = scheduled {
        return timestamp(field, raw);
    }

    match non_blank(order.created_at.as_deref()) {
        Some(raw) => timestamp("created_at", raw),
        None => {
            let now = Utc::now().with_timezone(&rules.fallback_offset()).naive_local();
            let time = now.time().with_nanosecond(0).unwrap_or(now.time());
            Ok((now.date(), time))
        }
    }
}

fn order_notes(order: &RemoteOrder, contract: PartnerContract) -> String {
    match contract {
        PartnerContract::V1 => non_blank(order.observation.as_deref())
            .unwrap_or_default()
            .to_string(),
        PartnerContract::Legacy => format!(
            "{}\n{}",
            order.notes.as_deref().unwrap_or_default(),
            order.delivery_notes.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string(),
    }
}

pub fn map_order(
    order: &RemoteOrder,
    summary: &RemoteOrderSummary,
    rules: &MappingRules,
) -> Result<MappedOrder, MapError> {
    let contract = rules.contract.resolve(order);
    let (data_agendamento, horario_agendamento) = resolve_schedule(order, contract, rules)?;
    let partner_status = order
        .status
        .as_deref()
        .or(summary.status.as_deref())
        .unwrap_or_default();

    let record = OrderRecord {
        numero_pedido: numero_pedido(order, summary),
        customer: normalize_customer(order.customer.as_ref()),
        data_agendamento,
        horario_agendamento,
        status: rules.map_status(contract, partner_status),
        tipo_entrega: delivery_type(order.order_type.as_deref()),
        endereco_entrega: format_address(order.delivery_address.as_ref()),
        observacoes: order_notes(order, contract),
        valor_total: order.total.unwrap_or(Decimal::ZERO),
    };
    let items = order
        .items()
        .iter()
        .filter(|item| !rules.is_cancelled(item))
        .cloned()
        .collect();

    Ok(MappedOrder {
        contract,
        record,
        items,
    })
}

/// Local line for a remote item resolved to catalog id `item_id`.
pub fn item_record(item: &RemoteItem, item_id: i64) -> Result<ItemRecord, MapError> {
    let quantidade = item.quantity.unwrap_or(1);
    let preco_unitario = item.unit_price.unwrap_or(Decimal::ZERO);
    let preco_total = match item.total_price {
        Some(total) => total,
        None => preco_unitario
            .checked_mul(Decimal::from(quantidade))
            .ok_or(MapError::ItemTotalOverflow {
                item_id,
                quantity: quantidade,
                unit_price: preco_unitario,
            })?,
    };
    Ok(ItemRecord {
        item_id,
        quantidade,
        preco_unitario,
        preco_total,
        observacoes: non_blank(item.observation.as_deref())
            .unwrap_or_default()
            .to_string(),
    })
}

/// Resolve items against the catalog: exact id first, then name substring.
/// Items matching neither are dropped.
pub async fn resolve_items(tx: &mut dyn OrderTx, items: &[RemoteItem]) -> Result<Vec<ItemRecord>> {
    let mut resolved = Vec::with_capacity(items.len());
    for item in items {
        let by_id = match item.item_id.as_ref().and_then(StrOrInt::as_i64) {
            Some(id) => tx.find_catalog_item_by_id(id).await?,
            None => None,
        };
        let catalog_id = match (by_id, non_blank(item.name.as_deref())) {
            (Some(id), _) => Some(id),
            (None, Some(name)) => tx.find_catalog_item_by_name(name).await?,
            (None, None) => None,
        };
        match catalog_id {
            Some(id) => resolved.push(item_record(item, id)?),
            None => debug!(
                item_id = ?item.item_id,
                name = ?item.name,
                "dropping item missing from catalog"
            ),
        }
    }
    Ok(resolved)
}
