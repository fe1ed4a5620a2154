//! Write-side models used by repositories.
//!
//! Keep these structs focused on what a query writes. The decision of what to
//! write lives in the reconciler.

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;

use crate::model::{DeliveryType, LocalStatus, Order, OrderRecord};

/// Typed partial update of an order row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
    pub nome_cliente: Option<String>,
    pub telefone_cliente: Option<String>,
    pub data_agendamento: Option<NaiveDate>,
    pub horario_agendamento: Option<NaiveTime>,
    pub status: Option<LocalStatus>,
    pub tipo_entrega: Option<DeliveryType>,
    pub endereco_entrega: Option<String>,
    pub observacoes: Option<String>,
    pub valor_total: Option<Decimal>,
}

impl OrderPatch {
    pub fn status_only(status: LocalStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Every field of a mapped order, status included.
    pub fn from_record(record: &OrderRecord) -> Self {
        Self {
            status: Some(record.status),
            ..Self::changes_except_status(None, record)
        }
    }

    /// Fields that differ between the stored row and the mapped order, status excluded.
    /// With no stored row every field is included.
    pub fn changes_except_status(existing: Option<&Order>, record: &OrderRecord) -> Self {
        fn changed<T: PartialEq + Clone>(current: Option<&T>, incoming: &T) -> Option<T> {
            match current {
                Some(current) if current == incoming => None,
                _ => Some(incoming.clone()),
            }
        }

        Self {
            nome_cliente: changed(existing.map(|o| &o.nome_cliente), &record.customer.name),
            telefone_cliente: changed(
                existing.map(|o| &o.telefone_cliente),
                &record.customer.phone,
            ),
            data_agendamento: changed(
                existing.map(|o| &o.data_agendamento),
                &record.data_agendamento,
            ),
            horario_agendamento: changed(
                existing.map(|o| &o.horario_agendamento),
                &record.horario_agendamento,
            ),
            status: None,
            tipo_entrega: changed(existing.map(|o| &o.tipo_entrega), &record.tipo_entrega),
            endereco_entrega: changed(
                existing.map(|o| &o.endereco_entrega),
                &record.endereco_entrega,
            ),
            observacoes: changed(existing.map(|o| &o.observacoes), &record.observacoes),
            valor_total: changed(existing.map(|o| &o.valor_total), &record.valor_total),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True when a field other than status is set.
    pub fn touches_details(&self) -> bool {
        Self {
            status: None,
            ..self.clone()
        } != Self::default()
    }
}

/// Override flags an applied patch raises. They only ever go from false to true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RaiseFlags {
    pub editado_manualmente: bool,
    pub status_editado_manualmente: bool,
}

impl RaiseFlags {
    /// Flags an operator edit implies for the given patch.
    pub fn for_operator_edit(patch: &OrderPatch) -> Self {
        Self {
            editado_manualmente: patch.touches_details(),
            status_editado_manualmente: patch.status.is_some(),
        }
    }
}
