//! Manufacturing resource planning core.
//!
//! Three collaborating subsystems track physical material from raw stock
//! through a multi-level bill of materials into finished-goods output:
//!
//! - [`services::lot_ledger::LotLedgerService`] — FIFO inventory ledger
//!   over dated lots with an append-only transaction log;
//! - [`services::bom::BomService`] — recipe DAG with cycle rejection and
//!   multi-level, scrap-compensated requirements explosion;
//! - [`services::work_orders::WorkOrderService`] — production state
//!   machine driving material consumption and output-lot creation.
//!
//! The crate is a library-level contract: callers bring their own web or
//! job layer, construct [`CoreServices`] once and invoke the operations.

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod locks;
pub mod logging;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::events::EventSender;
use crate::locks::LockManager;
use crate::services::{
    bom::BomService, catalog::CatalogService, lot_ledger::LotLedgerService,
    work_orders::WorkOrderService,
};

pub use crate::errors::ServiceError;

/// The wired-up core: one shared lock manager, the three subsystems and
/// the catalog seam over a single database handle.
#[derive(Clone)]
pub struct CoreServices {
    pub catalog: Arc<CatalogService>,
    pub lot_ledger: Arc<LotLedgerService>,
    pub bom: Arc<BomService>,
    pub work_orders: Arc<WorkOrderService>,
}

impl CoreServices {
    pub fn build(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        let locks = Arc::new(LockManager::new());
        let catalog = Arc::new(CatalogService::new(db.clone()));
        let lot_ledger = Arc::new(LotLedgerService::new(
            db.clone(),
            locks.clone(),
            event_sender.clone(),
        ));
        let bom = Arc::new(BomService::new(
            db.clone(),
            lot_ledger.clone(),
            event_sender.clone(),
        ));
        let work_orders = Arc::new(WorkOrderService::new(
            db,
            locks,
            lot_ledger.clone(),
            bom.clone(),
            event_sender,
        ));

        Self {
            catalog,
            lot_ledger,
            bom,
            work_orders,
        }
    }
}
