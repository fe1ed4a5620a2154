//! Decide whether an order's item list changed.
//!
//! Only catalog ids and quantities count. Notes and prices never trigger an
//! item rewrite.

use std::collections::HashMap;

use super::mapper::MappingRules;
use crate::model::OrderItem;
use crate::partner::RemoteItem;

/// True when the incoming items differ from the stored ones in id multiset or
/// per-id quantity. Cancelled incoming items are ignored, as are items with no id.
pub fn items_changed(existing: &[OrderItem], incoming: &[RemoteItem], rules: &MappingRules) -> bool {
    let mut remote_ids: Vec<Option<i64>> = Vec::with_capacity(incoming.len());
    let mut remote_qty: HashMap<Option<i64>, i64> = HashMap::new();
    for item in incoming.iter().filter(|item| !rules.is_cancelled(item)) {
        let Some(raw) = item.item_id.as_ref().filter(|id| !id.is_blank()) else {
            continue;
        };
        // A non-numeric id can never equal a stored catalog id.
        let Some(id) = raw.as_i64() else {
            return true;
        };
        remote_ids.push(Some(id));
        let qty = remote_qty.entry(Some(id)).or_default();
        *qty = qty.saturating_add(item.quantity.unwrap_or(1));
    }

    let mut local_ids: Vec<Option<i64>> = existing.iter().map(|item| item.item_id).collect();
    let mut local_qty: HashMap<Option<i64>, i64> = HashMap::new();
    for item in existing {
        let qty = local_qty.entry(item.item_id).or_default();
        *qty = qty.saturating_add(item.quantidade);
    }

    remote_ids.sort_unstable();
    local_ids.sort_unstable();
    remote_ids != local_ids || remote_qty != local_qty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partner::StrOrInt;
    use rust_decimal::Decimal;

    fn stored(item_id: Option<i64>, quantidade: i64) -> OrderItem {
        OrderItem {
            id: 0,
            pedido_id: 1,
            item_id,
            quantidade,
            preco_unitario: Decimal::ONE,
            preco_total: Decimal::from(quantidade),
            observacoes: String::new(),
        }
    }

    fn remote(item_id: i64, quantity: i64, status: Option<&str>) -> RemoteItem {
        RemoteItem {
            item_id: Some(StrOrInt::Int(item_id)),
            quantity: Some(quantity),
            status: status.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn cancelled_items_do_not_count_as_changes() {
        let rules = MappingRules::default();
        let existing = [stored(Some(5), 2)];
        let incoming = [remote(5, 2, None), remote(9, 1, Some("canceled"))];
        assert!(!items_changed(&existing, &incoming, &rules));
    }

    #[test]
    fn cancelling_the_last_instance_removes_the_item() {
        let rules = MappingRules::default();
        let existing = [stored(Some(5), 2), stored(Some(9), 1)];
        let incoming = [remote(5, 2, None), remote(9, 1, Some("CANCELED"))];
        assert!(items_changed(&existing, &incoming, &rules));
    }

    #[test]
    fn order_of_lines_does_not_matter() {
        let rules = MappingRules::default();
        let existing = [stored(Some(9), 1), stored(Some(5), 2)];
        let incoming = [remote(5, 2, None), remote(9, 1, None)];
        assert!(!items_changed(&existing, &incoming, &rules));
    }

    #[test]
    fn quantity_and_id_changes_are_detected() {
        let rules = MappingRules::default();
        let existing = [stored(Some(5), 2)];
        assert!(items_changed(&existing, &[remote(5, 3, None)], &rules));
        assert!(items_changed(&existing, &[remote(6, 2, None)], &rules));
        assert!(items_changed(&existing, &[], &rules));
        assert!(items_changed(&[], &[remote(5, 1, None)], &rules));
        assert!(!items_changed(&[], &[], &rules));
    }

    #[test]
    fn duplicate_ids_compare_by_count_and_total_quantity() {
        let rules = MappingRules::default();
        let existing = [stored(Some(5), 1), stored(Some(5), 1)];
        assert!(!items_changed(
            &existing,
            &[remote(5, 1, None), remote(5, 1, None)],
            &rules
        ));
        assert!(items_changed(&existing, &[remote(5, 2, None)], &rules));
    }

    #[test]
    fn string_ids_and_unlinked_lines() {
        let rules = MappingRules::default();
        let string_id = RemoteItem {
            item_id: Some(StrOrInt::Str("5".into())),
            quantity: Some(2),
            ..Default::default()
        };
        assert!(!items_changed(&[stored(Some(5), 2)], &[string_id], &rules));

        let opaque = RemoteItem {
            item_id: Some(StrOrInt::Str("sku-5".into())),
            ..Default::default()
        };
        assert!(items_changed(&[stored(Some(5), 1)], &[opaque], &rules));

        // A stored line whose catalog entry is gone never matches a remote id.
        assert!(items_changed(&[stored(None, 1)], &[remote(5, 1, None)], &rules));
    }

    #[test]
    fn missing_quantity_counts_as_one() {
        let rules = MappingRules::default();
        let item = RemoteItem {
            item_id: Some(StrOrInt::Int(5)),
            ..Default::default()
        };
        assert!(!items_changed(&[stored(Some(5), 1)], &[item], &rules));
    }

    #[test]
    fn huge_quantities_do_not_overflow() {
        let rules = MappingRules::default();
        let existing = [stored(Some(5), i64::MAX), stored(Some(5), 1)];
        let incoming = [remote(5, i64::MAX, None), remote(5, i64::MAX, None)];
        assert!(!items_changed(&existing, &incoming, &rules));
        assert!(items_changed(&existing, &[remote(5, i64::MAX, None)], &rules));
    }
}
