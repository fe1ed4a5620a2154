use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier or short value the partner sends either as a JSON number or a string.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum StrOrInt {
    Int(i64),
    Str(String),
}

impl StrOrInt {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StrOrInt::Int(v) => Some(*v),
            StrOrInt::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, StrOrInt::Str(s) if s.trim().is_empty())
    }
}

impl fmt::Display for StrOrInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrOrInt::Int(v) => write!(f, "{v}"),
            StrOrInt::Str(s) => f.write_str(s),
        }
    }
}

/// Entry of the order list endpoint.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RemoteOrderSummary {
    pub id: StrOrInt,
    #[serde(default)]
    pub display_id: Option<StrOrInt>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Full order payload from the detail endpoint.
///
/// Both partner contracts land here: the current one (`display_id`, `schedule`,
/// `observation`) and the legacy one (`scheduled_for`, `notes`, `delivery_notes`).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct RemoteOrder {
    #[serde(default)]
    pub id: Option<StrOrInt>,
    #[serde(default)]
    pub display_id: Option<StrOrInt>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub customer: Option<RemoteCustomer>,
    #[serde(default)]
    pub schedule: Option<RemoteSchedule>,
    #[serde(default)]
    pub scheduled_for: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<RemoteAddress>,
    #[serde(default)]
    pub observation: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub delivery_notes: Option<String>,
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub items: Option<Vec<RemoteItem>>,
}

impl RemoteOrder {
    pub fn items(&self) -> &[RemoteItem] {
        self.items.as_deref().unwrap_or_default()
    }
}

/// Customer as the partner sends it: an object, or just a name in older payloads.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RemoteCustomer {
    Detailed {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        phone: Option<StrOrInt>,
    },
    Name(String),
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct RemoteSchedule {
    #[serde(default)]
    pub scheduled_date_time_start: Option<String>,
    #[serde(default)]
    pub scheduled_date_time_end: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct RemoteAddress {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub number: Option<StrOrInt>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct RemoteItem {
    #[serde(default)]
    pub item_id: Option<StrOrInt>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub quantity: Option<i64>,
    #[serde(default, alias = "price")]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default, alias = "notes")]
    pub observation: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Quantities arrive as `2`, `2.0` or `"2"` depending on the partner build.
fn deserialize_quantity<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    let number = match raw {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            s.parse().ok().or_else(|| s.parse().ok().and_then(whole))
        }
        Some(other) => return Err(D::Error::custom(format!("invalid quantity {other}"))),
    };
    number
        .map(Some)
        .ok_or_else(|| D::Error::custom("quantity is not a whole number"))
}

fn whole(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && value.abs() < i64::MAX as f64).then_some(value as i64)
}
