//! Lot ledger behavior: FIFO allocation order, all-or-nothing
//! consumption, manual lot override, adjustments and lot numbering.

mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;

use common::{actor, date, TestCore};
use mrp_core::{
    entities::{
        inventory_lot::LotStatus,
        inventory_transaction::{TransactionDirection, TransactionRef},
        product::ProductKind,
    },
    events::Event,
    services::lot_ledger::{ConsumeStock, ReceiveLot},
    ServiceError,
};

fn consume(product_id: i64, quantity: rust_decimal::Decimal) -> ConsumeStock {
    ConsumeStock {
        product_id,
        quantity,
        manual_lot_id: None,
        reason: None,
        reference: TransactionRef::manual(),
    }
}

#[tokio::test]
async fn fifo_draws_oldest_lot_first() {
    let core = TestCore::new().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;

    let l1 = core.receive_on(steel.id, dec!(100), date(2024, 1, 10)).await;
    let l2 = core.receive_on(steel.id, dec!(100), date(2024, 1, 11)).await;

    let allocations = core
        .services
        .lot_ledger
        .consume(consume(steel.id, dec!(150)), actor())
        .await
        .unwrap();

    assert_eq!(allocations.len(), 2);
    assert_eq!(allocations[0].lot_id, l1.id);
    assert_eq!(allocations[0].quantity, dec!(100));
    assert_eq!(allocations[1].lot_id, l2.id);
    assert_eq!(allocations[1].quantity, dec!(50));

    let l1 = core.services.lot_ledger.get_lot(l1.id).await.unwrap();
    let l2 = core.services.lot_ledger.get_lot(l2.id).await.unwrap();
    assert_eq!(l1.current_quantity, dec!(0));
    assert_eq!(l2.current_quantity, dec!(50));
}

#[tokio::test]
async fn same_day_receipts_consume_in_lot_id_order() {
    let core = TestCore::new().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;

    let first = core.receive_on(steel.id, dec!(30), date(2024, 2, 1)).await;
    let second = core.receive_on(steel.id, dec!(30), date(2024, 2, 1)).await;
    assert!(second.id > first.id);

    let allocations = core
        .services
        .lot_ledger
        .consume(consume(steel.id, dec!(40)), actor())
        .await
        .unwrap();

    assert_eq!(allocations[0].lot_id, first.id);
    assert_eq!(allocations[0].quantity, dec!(30));
    assert_eq!(allocations[1].lot_id, second.id);
    assert_eq!(allocations[1].quantity, dec!(10));
}

#[tokio::test]
async fn oversized_consumption_mutates_nothing() {
    let core = TestCore::new().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;

    let l1 = core.receive_on(steel.id, dec!(100), date(2024, 1, 10)).await;
    let l2 = core.receive_on(steel.id, dec!(50), date(2024, 1, 11)).await;

    let result = core
        .services
        .lot_ledger
        .consume(consume(steel.id, dec!(200)), actor())
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    // Every lot untouched, and only the two IN transactions exist.
    for lot in [&l1, &l2] {
        let fresh = core.services.lot_ledger.get_lot(lot.id).await.unwrap();
        assert_eq!(fresh.current_quantity, fresh.initial_quantity);

        let log = core
            .services
            .lot_ledger
            .transactions_for_lot(lot.id)
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].direction, TransactionDirection::In);
    }
}

#[tokio::test]
async fn preview_allocation_is_read_only() {
    let core = TestCore::new().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;

    let l1 = core.receive_on(steel.id, dec!(100), date(2024, 1, 10)).await;
    core.receive_on(steel.id, dec!(100), date(2024, 1, 11)).await;

    let preview = core
        .services
        .lot_ledger
        .preview_allocation(steel.id, dec!(150))
        .await
        .unwrap();
    assert_eq!(preview.len(), 2);
    assert_eq!(preview[0].lot_id, l1.id);

    let fresh = core.services.lot_ledger.get_lot(l1.id).await.unwrap();
    assert_eq!(fresh.current_quantity, dec!(100));

    let short = core
        .services
        .lot_ledger
        .preview_allocation(steel.id, dec!(500))
        .await;
    assert_matches!(short, Err(ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn receive_rejects_non_positive_quantity() {
    let core = TestCore::new().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;

    for bad in [dec!(0), dec!(-5)] {
        let result = core
            .services
            .lot_ledger
            .receive(
                ReceiveLot {
                    product_id: steel.id,
                    quantity: bad,
                    unit_cost: None,
                    supplier_id: None,
                    received_date: None,
                    reference: TransactionRef::supplier_receipt(None),
                    notes: None,
                },
                actor(),
            )
            .await;
        assert_matches!(result, Err(ServiceError::Validation(_)));
    }
}

#[tokio::test]
async fn lot_numbers_sequence_per_product_and_day() {
    let core = TestCore::new().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;

    let a = core.receive_on(steel.id, dec!(10), date(2024, 3, 5)).await;
    let b = core.receive_on(steel.id, dec!(10), date(2024, 3, 5)).await;
    let c = core.receive_on(steel.id, dec!(10), date(2024, 3, 6)).await;

    assert_eq!(a.lot_number, "STEEL-20240305-001");
    assert_eq!(b.lot_number, "STEEL-20240305-002");
    assert_eq!(c.lot_number, "STEEL-20240306-001");
}

#[tokio::test]
async fn manual_lot_override_requires_reason_and_skips_fifo() {
    let core = TestCore::new().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;

    let older = core.receive_on(steel.id, dec!(100), date(2024, 1, 10)).await;
    let newer = core.receive_on(steel.id, dec!(100), date(2024, 1, 20)).await;

    let missing_reason = core
        .services
        .lot_ledger
        .consume(
            ConsumeStock {
                product_id: steel.id,
                quantity: dec!(10),
                manual_lot_id: Some(newer.id),
                reason: None,
                reference: TransactionRef::manual(),
            },
            actor(),
        )
        .await;
    assert_matches!(missing_reason, Err(ServiceError::Validation(_)));

    let allocations = core
        .services
        .lot_ledger
        .consume(
            ConsumeStock {
                product_id: steel.id,
                quantity: dec!(10),
                manual_lot_id: Some(newer.id),
                reason: Some("quality hold on older batch".to_string()),
                reference: TransactionRef::manual(),
            },
            actor(),
        )
        .await
        .unwrap();

    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].lot_id, newer.id);

    let older = core.services.lot_ledger.get_lot(older.id).await.unwrap();
    assert_eq!(older.current_quantity, dec!(100));

    // The single chosen lot must cover the quantity on its own, even
    // though the product as a whole has enough.
    let too_much = core
        .services
        .lot_ledger
        .consume(
            ConsumeStock {
                product_id: steel.id,
                quantity: dec!(120),
                manual_lot_id: Some(newer.id),
                reason: Some("attempt to overdraw one lot".to_string()),
                reference: TransactionRef::manual(),
            },
            actor(),
        )
        .await;
    assert_matches!(too_much, Err(ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn adjust_writes_magnitude_transaction_both_directions() {
    let core = TestCore::new().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;
    let lot = core.receive_on(steel.id, dec!(100), date(2024, 1, 10)).await;

    core.services
        .lot_ledger
        .adjust(lot.id, dec!(60), "cycle count short", actor())
        .await
        .unwrap();
    core.services
        .lot_ledger
        .adjust(lot.id, dec!(80), "recount found pallet", actor())
        .await
        .unwrap();

    let log = core
        .services
        .lot_ledger
        .transactions_for_lot(lot.id)
        .await
        .unwrap();
    let adjustments: Vec<_> = log
        .iter()
        .filter(|t| t.direction == TransactionDirection::Adjust)
        .collect();
    assert_eq!(adjustments.len(), 2);
    assert_eq!(adjustments[0].quantity, dec!(40));
    assert_eq!(adjustments[1].quantity, dec!(20));

    let empty_reason = core
        .services
        .lot_ledger
        .adjust(lot.id, dec!(70), "  ", actor())
        .await;
    assert_matches!(empty_reason, Err(ServiceError::Validation(_)));

    let above_initial = core
        .services
        .lot_ledger
        .adjust(lot.id, dec!(150), "cannot exceed receipt", actor())
        .await;
    assert_matches!(above_initial, Err(ServiceError::Validation(_)));

    let negative = core
        .services
        .lot_ledger
        .adjust(lot.id, dec!(-1), "cannot go negative", actor())
        .await;
    assert_matches!(negative, Err(ServiceError::Validation(_)));
}

#[tokio::test]
async fn blocked_lots_are_invisible_to_fifo_and_availability() {
    let core = TestCore::new().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;

    let blocked = core.receive_on(steel.id, dec!(100), date(2024, 1, 10)).await;
    let active = core.receive_on(steel.id, dec!(40), date(2024, 1, 11)).await;

    core.services
        .lot_ledger
        .set_lot_status(blocked.id, LotStatus::Blocked, Some("damage"), actor())
        .await
        .unwrap();

    assert_eq!(
        core.services
            .lot_ledger
            .available_quantity(steel.id)
            .await
            .unwrap(),
        dec!(40)
    );

    let allocations = core
        .services
        .lot_ledger
        .consume(consume(steel.id, dec!(30)), actor())
        .await
        .unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].lot_id, active.id);

    let beyond_active = core
        .services
        .lot_ledger
        .consume(consume(steel.id, dec!(50)), actor())
        .await;
    assert_matches!(beyond_active, Err(ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn ledger_mutations_emit_events() {
    let (core, mut events) = TestCore::with_events().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;

    let lot = core.receive_on(steel.id, dec!(100), date(2024, 1, 10)).await;
    assert_matches!(
        events.try_recv(),
        Ok(Event::LotReceived { lot_id, quantity, .. })
            if lot_id == lot.id && quantity == dec!(100)
    );

    core.services
        .lot_ledger
        .consume(consume(steel.id, dec!(25)), actor())
        .await
        .unwrap();
    assert_matches!(
        events.try_recv(),
        Ok(Event::LotsConsumed { quantity, .. }) if quantity == dec!(25)
    );

    core.services
        .lot_ledger
        .adjust(lot.id, dec!(70), "correction", actor())
        .await
        .unwrap();
    assert_matches!(
        events.try_recv(),
        Ok(Event::LotAdjusted { old_quantity, new_quantity, .. })
            if old_quantity == dec!(75) && new_quantity == dec!(70)
    );
}
