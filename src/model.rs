use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Local order status vocabulary shown on the dashboard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LocalStatus {
    #[serde(rename = "Aguardando")]
    Aguardando,
    #[serde(rename = "Pagamento Pendente")]
    PagamentoPendente,
    #[serde(rename = "Pagamento Online Pendente")]
    PagamentoOnlinePendente,
    #[serde(rename = "Agendado")]
    Agendado,
    #[serde(rename = "Em Produção")]
    EmProducao,
    #[serde(rename = "Esperando Retirada")]
    EsperandoRetirada,
    #[serde(rename = "Saiu para Entrega")]
    SaiuParaEntrega,
    #[serde(rename = "Finalizado")]
    Finalizado,
    #[serde(rename = "Cancelado")]
    Cancelado,
}

impl LocalStatus {
    pub const ALL: [LocalStatus; 9] = [
        LocalStatus::Aguardando,
        LocalStatus::PagamentoPendente,
        LocalStatus::PagamentoOnlinePendente,
        LocalStatus::Agendado,
        LocalStatus::EmProducao,
        LocalStatus::EsperandoRetirada,
        LocalStatus::SaiuParaEntrega,
        LocalStatus::Finalizado,
        LocalStatus::Cancelado,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LocalStatus::Aguardando => "Aguardando",
            LocalStatus::PagamentoPendente => "Pagamento Pendente",
            LocalStatus::PagamentoOnlinePendente => "Pagamento Online Pendente",
            LocalStatus::Agendado => "Agendado",
            LocalStatus::EmProducao => "Em Produção",
            LocalStatus::EsperandoRetirada => "Esperando Retirada",
            LocalStatus::SaiuParaEntrega => "Saiu para Entrega",
            LocalStatus::Finalizado => "Finalizado",
            LocalStatus::Cancelado => "Cancelado",
        }
    }

    pub fn parse_label(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryType {
    Delivery,
    Retirada,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryType::Delivery => "DELIVERY",
            DeliveryType::Retirada => "RETIRADA",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "DELIVERY" => Some(DeliveryType::Delivery),
            "RETIRADA" => Some(DeliveryType::Retirada),
            _ => None,
        }
    }
}

/// Customer identity after normalization at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Customer {
    pub name: String,
    pub phone: String,
}

/// Order fields produced from a partner payload, ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub numero_pedido: String,
    pub customer: Customer,
    pub data_agendamento: NaiveDate,
    pub horario_agendamento: NaiveTime,
    pub status: LocalStatus,
    pub tipo_entrega: DeliveryType,
    pub endereco_entrega: String,
    pub observacoes: String,
    pub valor_total: Decimal,
}

/// One order line resolved against the local catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRecord {
    pub item_id: i64,
    pub quantidade: i64,
    pub preco_unitario: Decimal,
    pub preco_total: Decimal,
    pub observacoes: String,
}

/// Persisted order row, including the flags the sync must respect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: i64,
    pub numero_pedido: String,
    pub nome_cliente: String,
    pub telefone_cliente: String,
    pub data_agendamento: NaiveDate,
    pub horario_agendamento: NaiveTime,
    pub status: LocalStatus,
    pub tipo_entrega: DeliveryType,
    pub endereco_entrega: String,
    pub observacoes: String,
    pub valor_total: Decimal,
    pub editado_manualmente: bool,
    pub status_editado_manualmente: bool,
    pub is_feito: bool,
    pub data_criacao: String,
    pub data_atualizacao: String,
}

/// Persisted order line. `item_id` is null when the catalog entry is gone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub id: i64,
    pub pedido_id: i64,
    pub item_id: Option<i64>,
    pub quantidade: i64,
    pub preco_unitario: Decimal,
    pub preco_total: Decimal,
    pub observacoes: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip_through_parse() {
        for status in LocalStatus::ALL {
            assert_eq!(LocalStatus::parse_label(status.as_str()), Some(status));
        }
        assert_eq!(LocalStatus::parse_label("em produção"), None);
    }

    #[test]
    fn delivery_type_uses_dashboard_codes() {
        assert_eq!(DeliveryType::Retirada.as_str(), "RETIRADA");
        assert_eq!(DeliveryType::parse_kind("DELIVERY"), Some(DeliveryType::Delivery));
        assert_eq!(DeliveryType::parse_kind("pickup"), None);
    }
}
