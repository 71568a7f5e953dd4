#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use mrp_core::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        bom_item,
        inventory_lot,
        inventory_transaction::TransactionRef,
        product::{self, ProductKind},
    },
    events::{Event, EventSender},
    logging,
    services::{bom::NewBomEdge, catalog::NewMachine, catalog::NewProduct, lot_ledger::ReceiveLot},
    CoreServices,
};

/// Test harness: a fresh file-backed SQLite database (one connection so
/// the pool cannot hand out a second writer), migrated schema and the
/// wired core services.
pub struct TestCore {
    pub db: Arc<DatabaseConnection>,
    pub services: CoreServices,
    _tmp: TempDir,
}

impl TestCore {
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Harness plus the receiving end of the domain-event channel.
    pub async fn with_events() -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(64);
        let core = Self::build(Some(EventSender::new(tx))).await;
        (core, rx)
    }

    async fn build(event_sender: Option<EventSender>) -> Self {
        logging::init(&AppConfig::for_database_url("sqlite::memory:"));

        let tmp = tempfile::tempdir().expect("failed to create temp dir");
        let url = format!("sqlite://{}?mode=rwc", tmp.path().join("mrp.db").display());

        let connection = db::establish_connection_with_config(&DbConfig {
            url,
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to open test database");

        db::run_migrations(&connection)
            .await
            .expect("failed to migrate test database");

        let db = Arc::new(connection);
        let services = CoreServices::build(db.clone(), event_sender);

        Self {
            db,
            services,
            _tmp: tmp,
        }
    }

    pub async fn product(
        &self,
        code: &str,
        kind: ProductKind,
        is_stock_tracked: bool,
    ) -> product::Model {
        self.services
            .catalog
            .create_product(NewProduct {
                code: code.to_string(),
                name: format!("{} ({:?})", code, kind),
                kind,
                is_stock_tracked,
            })
            .await
            .expect("failed to create product")
    }

    pub async fn machine(&self, code: &str) -> mrp_core::entities::machine::Model {
        self.services
            .catalog
            .create_machine(NewMachine {
                code: code.to_string(),
                name: format!("Machine {}", code),
                machine_type: None,
            })
            .await
            .expect("failed to create machine")
    }

    /// Receives a supplier lot dated `received`.
    pub async fn receive_on(
        &self,
        product_id: i64,
        quantity: Decimal,
        received: NaiveDate,
    ) -> inventory_lot::Model {
        self.services
            .lot_ledger
            .receive(
                ReceiveLot {
                    product_id,
                    quantity,
                    unit_cost: None,
                    supplier_id: None,
                    received_date: Some(received),
                    reference: TransactionRef::supplier_receipt(None),
                    notes: None,
                },
                actor(),
            )
            .await
            .expect("failed to receive lot")
    }

    pub async fn edge(
        &self,
        parent_product_id: i64,
        child_product_id: i64,
        quantity_per: Decimal,
        scrap_rate: Decimal,
        sequence_order: i32,
    ) -> bom_item::Model {
        self.services
            .bom
            .add_edge(NewBomEdge {
                parent_product_id,
                child_product_id,
                quantity_per,
                scrap_rate,
                sequence_order,
                operation_type: None,
                machine_type: None,
                cycle_time_secs: None,
                setup_time_secs: None,
            })
            .await
            .expect("failed to add BOM edge")
    }
}

pub fn actor() -> Uuid {
    Uuid::new_v4()
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("invalid date")
}
