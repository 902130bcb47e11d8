//! Stock-ledger rules.
//!
//! A Stock row (lot) and the Record rows that moved it must agree. Every
//! movement has a signed effect on exactly one lot: inbound adds, outbound
//! subtracts. Editing or deleting a record re-applies the difference in that
//! effect to the same lot, so the lot always equals the sum of the effects of
//! its surviving records plus any relocations.
//!
//! This module holds the arithmetic and validation only; [`store`] runs it
//! against Postgres inside a transaction.

pub mod store;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lots at this location belong to the secondary (Shenzhen) site.
pub const SHENZHEN_LOCATION: &str = "Shenzhen";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "operation_type")]
pub enum OperationType {
    #[serde(rename = "入库")]
    #[sqlx(rename = "入库")]
    Inbound,
    #[serde(rename = "出库")]
    #[sqlx(rename = "出库")]
    Outbound,
}

impl OperationType {
    pub fn label(self) -> &'static str {
        match self {
            OperationType::Inbound => "入库",
            OperationType::Outbound => "出库",
        }
    }

    /// Direction of this movement's effect on its lot.
    pub fn sign(self) -> i32 {
        match self {
            OperationType::Inbound => 1,
            OperationType::Outbound => -1,
        }
    }

    pub fn effect(self, quantity: i32) -> i32 {
        self.sign() * quantity
    }
}

/// Identity of a lot within one merchant. Absent components are part of the
/// identity: a lot without a batch number is distinct from every lot with one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LotKey {
    pub product_id: String,
    pub box_spec: String,
    pub batch_number: Option<String>,
    pub location: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: i32, requested: i32 },

    #[error("stock would become negative ({on_hand} on hand, change of {delta})")]
    NegativeStock { on_hand: i32, delta: i32 },

    #[error("quantity must be a positive integer")]
    InvalidQuantity,

    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("source and destination locations must differ")]
    SameLocation,

    #[error("a matching submission was made within the last {0} seconds; not repeating it")]
    Duplicate(i64),
}

/// Quantity after removing `requested` from a lot holding `on_hand`.
pub fn issue(on_hand: i32, requested: i32) -> Result<i32, LedgerError> {
    if requested <= 0 {
        return Err(LedgerError::InvalidQuantity);
    }
    if requested > on_hand {
        return Err(LedgerError::InsufficientStock {
            available: on_hand,
            requested,
        });
    }
    Ok(on_hand - requested)
}

/// Applies a signed change to a lot, refusing to go below zero.
pub fn apply_delta(on_hand: i32, delta: i32) -> Result<i32, LedgerError> {
    let next = on_hand
        .checked_add(delta)
        .ok_or(LedgerError::InvalidQuantity)?;
    if next < 0 {
        return Err(LedgerError::NegativeStock { on_hand, delta });
    }
    Ok(next)
}

/// Change to apply to a lot when the record that moved it is deleted.
pub fn reversal(op: OperationType, quantity: i32) -> i32 {
    -op.effect(quantity)
}

/// How a record edit lands on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditPlan {
    /// Lot unchanged: apply the difference between the new and old effect.
    SameLot { delta: i32 },
    /// Lot metadata changed: undo the old effect on the old lot, then apply
    /// the new effect on the new lot.
    MoveLot { reverse: i32, apply: i32 },
}

pub fn plan_edit(
    op: OperationType,
    old_key: &LotKey,
    old_quantity: i32,
    new_key: &LotKey,
    new_quantity: i32,
) -> Result<EditPlan, LedgerError> {
    if new_quantity <= 0 {
        return Err(LedgerError::InvalidQuantity);
    }
    if old_key == new_key {
        Ok(EditPlan::SameLot {
            delta: op.effect(new_quantity) - op.effect(old_quantity),
        })
    } else {
        Ok(EditPlan::MoveLot {
            reverse: reversal(op, old_quantity),
            apply: op.effect(new_quantity),
        })
    }
}

pub fn check_relocation(from: &str, to: &str, quantity: i32) -> Result<(), LedgerError> {
    if from == to {
        return Err(LedgerError::SameLocation);
    }
    if quantity <= 0 {
        return Err(LedgerError::InvalidQuantity);
    }
    Ok(())
}

/// Rejects a movement that repeats one recorded less than `window` ago.
///
/// Best effort only: distinct movements with equal quantity inside the window
/// are rejected too, and a resubmission after the window goes through.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateGuard {
    window: Duration,
}

impl DuplicateGuard {
    pub fn new(window_secs: i64) -> Self {
        Self {
            window: Duration::seconds(window_secs),
        }
    }

    pub fn window_secs(&self) -> i64 {
        self.window.num_seconds()
    }

    pub fn is_duplicate(&self, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_seen {
            Some(at) => at >= now - self.window,
            None => false,
        }
    }

    pub fn check(&self, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.is_duplicate(last_seen, now) {
            Err(LedgerError::Duplicate(self.window_secs()))
        } else {
            Ok(())
        }
    }
}

/// Accepts `12` or `"12"`; anything else, zero, or negative is rejected.
pub fn parse_quantity(value: &Value) -> Result<i32, LedgerError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed.and_then(|q| i32::try_from(q).ok()) {
        Some(q) if q > 0 => Ok(q),
        _ => Err(LedgerError::InvalidQuantity),
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| LedgerError::InvalidDate(value.to_string()))
}

/// Optional date filter: empty strings count as absent.
pub fn parse_optional_date(value: Option<&str>) -> Result<Option<NaiveDate>, LedgerError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(s).map(Some),
    }
}

/// Lot fields are trimmed; blank ones are stored and matched as absent.
pub fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Units per box, when the box spec is numeric; 0 otherwise.
pub fn box_spec_units(box_spec: &str) -> f64 {
    box_spec.trim().parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn key(location: &str) -> LotKey {
        LotKey {
            product_id: "P1".into(),
            box_spec: "24".into(),
            batch_number: Some("B1".into()),
            location: Some(location.into()),
            expiry_date: NaiveDate::from_ymd_opt(2025, 12, 31),
        }
    }

    #[derive(Debug, PartialEq)]
    enum Adjust {
        MissingLot,
        Rejected(LedgerError),
    }

    /// Mirrors what the store does against Postgres.
    #[derive(Default)]
    struct Ledger {
        lots: HashMap<LotKey, i32>,
    }

    impl Ledger {
        fn inbound(&mut self, key: &LotKey, qty: i32) {
            *self.lots.entry(key.clone()).or_insert(0) += qty;
        }

        fn outbound(&mut self, key: &LotKey, qty: i32) -> Result<(), LedgerError> {
            let on_hand = self.lots.get(key).copied().unwrap_or(0);
            let next = issue(on_hand, qty)?;
            self.lots.insert(key.clone(), next);
            Ok(())
        }

        /// Same rules as `store::adjust_lot`: a missing lot is only created
        /// when asked to and the change is positive.
        fn adjust(&mut self, key: &LotKey, delta: i32, create_missing: bool) -> Result<(), Adjust> {
            match self.lots.get(key).copied() {
                Some(on_hand) => {
                    let next = apply_delta(on_hand, delta).map_err(Adjust::Rejected)?;
                    self.lots.insert(key.clone(), next);
                }
                None if create_missing && delta > 0 => {
                    self.lots.insert(key.clone(), delta);
                }
                None => return Err(Adjust::MissingLot),
            }
            Ok(())
        }

        fn relocate(&mut self, from: &LotKey, to: &LotKey, qty: i32) -> Result<(), LedgerError> {
            check_relocation(
                from.location.as_deref().unwrap_or_default(),
                to.location.as_deref().unwrap_or_default(),
                qty,
            )?;
            self.outbound(from, qty)?;
            self.inbound(to, qty);
            Ok(())
        }

        fn qty(&self, key: &LotKey) -> i32 {
            self.lots.get(key).copied().unwrap_or(0)
        }
    }

    #[test]
    fn inbound_then_outbound_leaves_the_difference() {
        let mut ledger = Ledger::default();
        let lot = key("A1");
        ledger.inbound(&lot, 10);
        ledger.outbound(&lot, 4).unwrap();
        assert_eq!(ledger.qty(&lot), 6);
    }

    #[test]
    fn final_quantity_is_inbound_sum_minus_outbound_sum() {
        let mut ledger = Ledger::default();
        let lot = key("A1");
        let inbound = [5, 12, 3, 40];
        let outbound = [7, 2, 30];
        for q in inbound {
            ledger.inbound(&lot, q);
        }
        for q in outbound {
            ledger.outbound(&lot, q).unwrap();
        }
        let expected: i32 = inbound.iter().sum::<i32>() - outbound.iter().sum::<i32>();
        assert_eq!(ledger.qty(&lot), expected);
    }

    #[test]
    fn outbound_never_drives_a_lot_negative() {
        let mut ledger = Ledger::default();
        let lot = key("A1");
        ledger.inbound(&lot, 3);
        let err = ledger.outbound(&lot, 4).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                available: 3,
                requested: 4
            }
        );
        assert_eq!(ledger.qty(&lot), 3);

        ledger.outbound(&lot, 3).unwrap();
        assert_eq!(ledger.qty(&lot), 0);
    }

    #[test]
    fn relocation_conserves_total_on_hand() {
        let mut ledger = Ledger::default();
        let (a, b) = (key("A1"), key("B7"));
        ledger.inbound(&a, 10);
        ledger.inbound(&b, 2);

        ledger.relocate(&a, &b, 4).unwrap();
        assert_eq!(ledger.qty(&a), 6);
        assert_eq!(ledger.qty(&b), 6);
        assert_eq!(ledger.qty(&a) + ledger.qty(&b), 12);
    }

    #[test]
    fn relocation_creates_the_destination_lot() {
        let mut ledger = Ledger::default();
        let (a, c) = (key("A1"), key("C3"));
        ledger.inbound(&a, 5);
        ledger.relocate(&a, &c, 5).unwrap();
        assert_eq!(ledger.qty(&a), 0);
        assert_eq!(ledger.qty(&c), 5);
    }

    #[test]
    fn relocation_rejects_same_location_and_short_source() {
        let mut ledger = Ledger::default();
        let a = key("A1");
        ledger.inbound(&a, 1);
        assert_eq!(ledger.relocate(&a, &a, 1), Err(LedgerError::SameLocation));
        assert!(matches!(
            ledger.relocate(&a, &key("B1"), 2),
            Err(LedgerError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn editing_an_inbound_record_applies_the_difference() {
        let lot = key("A1");
        let plan = plan_edit(OperationType::Inbound, &lot, 10, &lot, 15).unwrap();
        assert_eq!(plan, EditPlan::SameLot { delta: 5 });

        let mut ledger = Ledger::default();
        ledger.inbound(&lot, 10);
        ledger.outbound(&lot, 7).unwrap();
        if let EditPlan::SameLot { delta } = plan {
            ledger.adjust(&lot, delta, false).unwrap();
        }
        assert_eq!(ledger.qty(&lot), 8);
    }

    #[test]
    fn editing_an_outbound_record_runs_the_other_way() {
        let lot = key("A1");
        assert_eq!(
            plan_edit(OperationType::Outbound, &lot, 4, &lot, 6).unwrap(),
            EditPlan::SameLot { delta: -2 }
        );
        assert_eq!(
            plan_edit(OperationType::Outbound, &lot, 6, &lot, 4).unwrap(),
            EditPlan::SameLot { delta: 2 }
        );
    }

    #[test]
    fn lowering_an_inbound_record_below_what_was_issued_is_refused() {
        let lot = key("A1");
        let mut ledger = Ledger::default();
        ledger.inbound(&lot, 10);
        ledger.outbound(&lot, 8).unwrap();

        let EditPlan::SameLot { delta } =
            plan_edit(OperationType::Inbound, &lot, 10, &lot, 1).unwrap()
        else {
            panic!("expected same-lot plan");
        };
        assert_eq!(
            ledger.adjust(&lot, delta, false),
            Err(Adjust::Rejected(LedgerError::NegativeStock { on_hand: 2, delta: -9 }))
        );
    }

    #[test]
    fn editing_lot_metadata_moves_the_effect() {
        let (old, new) = (key("A1"), key("A2"));
        let plan = plan_edit(OperationType::Inbound, &old, 10, &new, 10).unwrap();
        assert_eq!(plan, EditPlan::MoveLot { reverse: -10, apply: 10 });

        let mut ledger = Ledger::default();
        ledger.inbound(&old, 10);
        if let EditPlan::MoveLot { reverse, apply } = plan {
            ledger.adjust(&old, reverse, false).unwrap();
            ledger.adjust(&new, apply, true).unwrap();
        }
        assert_eq!(ledger.qty(&old), 0);
        assert_eq!(ledger.qty(&new), 10);
    }

    #[test]
    fn edit_to_zero_quantity_is_invalid() {
        let lot = key("A1");
        assert_eq!(
            plan_edit(OperationType::Inbound, &lot, 3, &lot, 0),
            Err(LedgerError::InvalidQuantity)
        );
    }

    #[test]
    fn deleting_an_outbound_record_restores_its_quantity() {
        let lot = key("A1");
        let mut ledger = Ledger::default();
        ledger.inbound(&lot, 10);
        ledger.outbound(&lot, 7).unwrap();
        ledger.adjust(&lot, reversal(OperationType::Outbound, 7), true).unwrap();
        assert_eq!(ledger.qty(&lot), 10);
    }

    #[test]
    fn deleting_an_outbound_record_recreates_a_missing_lot() {
        let lot = key("A1");
        let mut ledger = Ledger::default();
        ledger.adjust(&lot, reversal(OperationType::Outbound, 7), true).unwrap();
        assert_eq!(ledger.qty(&lot), 7);
    }

    #[test]
    fn deleting_an_inbound_record_without_its_lot_is_refused() {
        let lot = key("A1");
        let mut ledger = Ledger::default();
        assert_eq!(
            ledger.adjust(&lot, reversal(OperationType::Inbound, 5), false),
            Err(Adjust::MissingLot)
        );
        assert!(ledger.lots.is_empty());
    }

    #[test]
    fn deleting_an_inbound_record_needs_the_stock_to_still_be_there() {
        let lot = key("A1");
        let mut ledger = Ledger::default();
        ledger.inbound(&lot, 5);
        ledger.outbound(&lot, 3).unwrap();
        assert!(matches!(
            ledger.adjust(&lot, reversal(OperationType::Inbound, 5), false),
            Err(Adjust::Rejected(LedgerError::NegativeStock { .. }))
        ));
    }

    #[test]
    fn duplicate_window_boundaries() {
        let guard = DuplicateGuard::new(60);
        let now = Utc::now();
        assert!(!guard.is_duplicate(None, now));
        assert!(guard.is_duplicate(Some(now - Duration::seconds(10)), now));
        assert!(guard.is_duplicate(Some(now - Duration::seconds(60)), now));
        assert!(!guard.is_duplicate(Some(now - Duration::seconds(61)), now));
        assert_eq!(
            guard.check(Some(now), now),
            Err(LedgerError::Duplicate(60))
        );
    }

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity(&serde_json::json!(10)), Ok(10));
        assert_eq!(parse_quantity(&serde_json::json!(" 7 ")), Ok(7));
        assert_eq!(parse_quantity(&serde_json::json!(0)), Err(LedgerError::InvalidQuantity));
        assert_eq!(parse_quantity(&serde_json::json!(-3)), Err(LedgerError::InvalidQuantity));
        assert_eq!(parse_quantity(&serde_json::json!(2.5)), Err(LedgerError::InvalidQuantity));
        assert_eq!(parse_quantity(&serde_json::json!("ten")), Err(LedgerError::InvalidQuantity));
    }

    #[test]
    fn date_parsing() {
        assert_eq!(parse_date("2025-12-31"), Ok(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()));
        assert!(matches!(parse_date("31/12/2025"), Err(LedgerError::InvalidDate(_))));
        assert_eq!(parse_optional_date(Some("")), Ok(None));
        assert_eq!(parse_optional_date(None), Ok(None));
    }

    #[test]
    fn operation_labels_round_trip_through_json() {
        let json = serde_json::to_string(&OperationType::Outbound).unwrap();
        assert_eq!(json, "\"出库\"");
        assert_eq!(OperationType::Inbound.label(), "入库");
        let back: OperationType = serde_json::from_str("\"入库\"").unwrap();
        assert_eq!(back, OperationType::Inbound);
    }

    #[test]
    fn blank_lot_fields_are_absent() {
        assert_eq!(blank_to_none(Some("  ".into())), None);
        assert_eq!(blank_to_none(Some("B1".into())), Some("B1".to_string()));
        assert_eq!(blank_to_none(Some(" A1 ".into())), Some("A1".to_string()));
        assert_eq!(blank_to_none(None), None);
    }

    #[test]
    fn box_spec_units_falls_back_to_zero() {
        assert_eq!(box_spec_units("24"), 24.0);
        assert_eq!(box_spec_units("10个/箱"), 0.0);
    }
}
