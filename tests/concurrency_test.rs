//! Serialization guarantees: overlapping consumptions and production
//! reports must never jointly oversell stock or overshoot a plan.

mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;

use common::{actor, date, TestCore};
use mrp_core::{
    entities::{inventory_transaction::TransactionRef, product::ProductKind},
    services::{lot_ledger::ConsumeStock, work_orders::NewWorkOrder},
    ServiceError,
};

#[tokio::test]
async fn concurrent_consumers_cannot_jointly_oversell() {
    let core = TestCore::new().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;
    core.receive_on(steel.id, dec!(100), date(2024, 1, 10)).await;

    // both requests individually fit the available 100; together they do
    // not, so exactly one must lose
    let mut handles = Vec::new();
    for _ in 0..2 {
        let ledger = core.services.lot_ledger.clone();
        let product_id = steel.id;
        handles.push(tokio::spawn(async move {
            ledger
                .consume(
                    ConsumeStock {
                        product_id,
                        quantity: dec!(80),
                        manual_lot_id: None,
                        reason: None,
                        reference: TransactionRef::manual(),
                    },
                    actor(),
                )
                .await
        }));
    }

    let mut ok = 0;
    let mut short = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ServiceError::InsufficientStock(_)) => short += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!((ok, short), (1, 1));

    assert_eq!(
        core.services
            .lot_ledger
            .available_quantity(steel.id)
            .await
            .unwrap(),
        dec!(20)
    );
}

#[tokio::test]
async fn concurrent_reports_cannot_overshoot_the_plan() {
    let core = TestCore::new().await;
    let gadget = core.product("GADGET", ProductKind::Finished, false).await;

    let orders = &core.services.work_orders;
    let order = orders
        .create(
            NewWorkOrder {
                product_id: gadget.id,
                planned_quantity: dec!(10),
                bom_item_id: None,
                sales_order_id: None,
                machine_id: None,
                order_number: None,
                notes: None,
            },
            actor(),
        )
        .await
        .unwrap();
    orders.start(order.id, actor()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let orders = core.services.work_orders.clone();
        let id = order.id;
        handles.push(tokio::spawn(async move {
            orders.record_production(id, dec!(8), dec!(0), actor()).await
        }));
    }

    let mut ok = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ServiceError::Validation(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!((ok, rejected), (1, 1));

    let fresh = orders.get(order.id).await.unwrap();
    assert_eq!(fresh.produced_quantity, dec!(8));
    assert_eq!(fresh.scrap_quantity, dec!(0));
}

#[tokio::test]
async fn concurrent_receipts_get_distinct_lot_numbers() {
    let core = TestCore::new().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let core_db = core.services.lot_ledger.clone();
        let product_id = steel.id;
        handles.push(tokio::spawn(async move {
            core_db
                .receive(
                    mrp_core::services::lot_ledger::ReceiveLot {
                        product_id,
                        quantity: dec!(10),
                        unit_cost: None,
                        supplier_id: None,
                        received_date: Some(date(2024, 5, 1)),
                        reference: TransactionRef::supplier_receipt(None),
                        notes: None,
                    },
                    actor(),
                )
                .await
        }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap().unwrap().lot_number);
    }
    numbers.sort();
    numbers.dedup();
    assert_eq!(numbers.len(), 5);

    assert_eq!(
        core.services
            .lot_ledger
            .available_quantity(steel.id)
            .await
            .unwrap(),
        dec!(50)
    );
}

#[tokio::test]
async fn interleaved_consumers_drain_exactly_to_zero() {
    let core = TestCore::new().await;
    let steel = core.product("STEEL", ProductKind::RawMaterial, true).await;
    core.receive_on(steel.id, dec!(30), date(2024, 1, 10)).await;
    core.receive_on(steel.id, dec!(30), date(2024, 1, 11)).await;

    // six competitors for six slots of 10: all succeed, nothing left
    let mut handles = Vec::new();
    for _ in 0..6 {
        let ledger = core.services.lot_ledger.clone();
        let product_id = steel.id;
        handles.push(tokio::spawn(async move {
            ledger
                .consume(
                    ConsumeStock {
                        product_id,
                        quantity: dec!(10),
                        manual_lot_id: None,
                        reason: None,
                        reference: TransactionRef::manual(),
                    },
                    actor(),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(
        core.services
            .lot_ledger
            .available_quantity(steel.id)
            .await
            .unwrap(),
        dec!(0)
    );

    let one_more = core
        .services
        .lot_ledger
        .consume(
            ConsumeStock {
                product_id: steel.id,
                quantity: dec!(1),
                manual_lot_id: None,
                reason: None,
                reference: TransactionRef::manual(),
            },
            actor(),
        )
        .await;
    assert_matches!(one_more, Err(ServiceError::InsufficientStock(_)));
}
