use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use metrics::{counter, histogram};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        inventory_lot::{self, Entity as InventoryLotEntity, LotStatus},
        inventory_transaction::{
            self, Entity as InventoryTransactionEntity, TransactionDirection, TransactionRef,
        },
        product::{self, Entity as ProductEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    locks::{LockDomain, LockManager},
};

/// One slice of a FIFO (or manual) allocation: draw `quantity` from this lot.
#[derive(Debug, Clone, PartialEq)]
pub struct LotAllocation {
    pub lot_id: i64,
    pub lot_number: String,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
}

/// Input for a stock receipt. `received_date` defaults to today; supplier
/// receipts that arrive late may backdate it, which also backdates the
/// lot's FIFO position.
#[derive(Debug, Clone)]
pub struct ReceiveLot {
    pub product_id: i64,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub supplier_id: Option<i64>,
    pub received_date: Option<NaiveDate>,
    pub reference: TransactionRef,
    pub notes: Option<String>,
}

/// Input for a stock consumption. Leaving `manual_lot_id` unset selects
/// lots FIFO; setting it draws from that single lot only and requires a
/// reason.
#[derive(Debug, Clone)]
pub struct ConsumeStock {
    pub product_id: i64,
    pub quantity: Decimal,
    pub manual_lot_id: Option<i64>,
    pub reason: Option<String>,
    pub reference: TransactionRef,
}

/// The single source of truth for physical stock: owns inventory lots and
/// is the sole writer of inventory transactions.
///
/// Public mutating methods take the product lock and run one database
/// transaction. The `*_in` variants run against a caller-provided
/// connection so the work-order orchestrator can compose consumption,
/// accumulator updates and output receipts into one atomic unit; callers
/// of those must already hold the product locks involved.
#[derive(Clone)]
pub struct LotLedgerService {
    db: Arc<DatabaseConnection>,
    locks: Arc<LockManager>,
    event_sender: Option<EventSender>,
}

impl LotLedgerService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        locks: Arc<LockManager>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            locks,
            event_sender,
        }
    }

    /// Receives stock into a new dated lot and writes the IN transaction.
    #[instrument(skip(self, input), fields(product_id = input.product_id))]
    pub async fn receive(
        &self,
        input: ReceiveLot,
        actor: Uuid,
    ) -> Result<inventory_lot::Model, ServiceError> {
        let _guard = self
            .locks
            .acquire(LockDomain::Product, input.product_id)
            .await;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let lot = self.receive_in(&txn, &input, actor).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("lot_ledger.lots.received", 1);
        histogram!(
            "lot_ledger.received.quantity",
            input.quantity.to_f64().unwrap_or(0.0)
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::LotReceived {
                    lot_id: lot.id,
                    product_id: lot.product_id,
                    quantity: lot.initial_quantity,
                })
                .await;
        }

        info!(
            "Lot {} received: product {} quantity {}",
            lot.lot_number, lot.product_id, lot.initial_quantity
        );
        Ok(lot)
    }

    /// Transaction-composable receipt; the caller owns locking and commit.
    pub(crate) async fn receive_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        input: &ReceiveLot,
        actor: Uuid,
    ) -> Result<inventory_lot::Model, ServiceError> {
        if input.quantity <= Decimal::ZERO {
            return Err(ServiceError::Validation(format!(
                "receipt quantity must be positive, got {}",
                input.quantity
            )));
        }

        let product = ProductEntity::find_by_id(input.product_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("product {} not found", input.product_id))
            })?;

        let received_date = input.received_date.unwrap_or_else(|| Utc::now().date_naive());
        let lot_number = self
            .next_lot_number(conn, &product, received_date)
            .await?;

        let now = Utc::now();
        let lot = inventory_lot::ActiveModel {
            product_id: Set(input.product_id),
            lot_number: Set(lot_number),
            initial_quantity: Set(input.quantity),
            current_quantity: Set(input.quantity),
            unit_cost: Set(input.unit_cost),
            supplier_id: Set(input.supplier_id),
            received_date: Set(received_date),
            status: Set(LotStatus::Active),
            notes: Set(input.notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        inventory_transaction::ActiveModel {
            lot_id: Set(lot.id),
            product_id: Set(lot.product_id),
            direction: Set(TransactionDirection::In),
            quantity: Set(input.quantity),
            reference_type: Set(Some(input.reference.kind.to_string())),
            reference_id: Set(input.reference.id),
            reason: Set(None),
            created_by: Set(actor),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        Ok(lot)
    }

    /// Read-only FIFO walk: which lots would `consume` draw from, and how
    /// much from each. Mutates nothing.
    #[instrument(skip(self))]
    pub async fn preview_allocation(
        &self,
        product_id: i64,
        quantity: Decimal,
    ) -> Result<Vec<LotAllocation>, ServiceError> {
        let planned = self.plan_fifo(&*self.db, product_id, quantity).await?;
        Ok(planned
            .into_iter()
            .map(|(lot, take)| LotAllocation {
                lot_id: lot.id,
                lot_number: lot.lot_number,
                quantity: take,
                unit_cost: lot.unit_cost,
            })
            .collect())
    }

    /// Consumes stock, FIFO or from one manually chosen lot, atomically.
    /// Decrements each selected lot and writes one OUT transaction per lot
    /// touched; on any failure nothing is mutated.
    #[instrument(skip(self, input), fields(product_id = input.product_id))]
    pub async fn consume(
        &self,
        input: ConsumeStock,
        actor: Uuid,
    ) -> Result<Vec<LotAllocation>, ServiceError> {
        let _guard = self
            .locks
            .acquire(LockDomain::Product, input.product_id)
            .await;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let allocations = self.consume_in(&txn, &input, actor).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("lot_ledger.consumptions", 1);
        histogram!(
            "lot_ledger.consumed.quantity",
            input.quantity.to_f64().unwrap_or(0.0)
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::LotsConsumed {
                    product_id: input.product_id,
                    quantity: input.quantity,
                    lot_ids: allocations.iter().map(|a| a.lot_id).collect(),
                    reference_type: input.reference.kind.to_string(),
                    reference_id: input.reference.id,
                })
                .await;
        }

        Ok(allocations)
    }

    /// Transaction-composable consumption; the caller owns the product
    /// lock and the commit.
    pub(crate) async fn consume_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        input: &ConsumeStock,
        actor: Uuid,
    ) -> Result<Vec<LotAllocation>, ServiceError> {
        let planned = match input.manual_lot_id {
            Some(lot_id) => self.plan_manual(conn, input, lot_id).await?,
            None => self.plan_fifo(conn, input.product_id, input.quantity).await?,
        };

        let mut allocations = Vec::with_capacity(planned.len());
        for (lot, take) in planned {
            let allocation = LotAllocation {
                lot_id: lot.id,
                lot_number: lot.lot_number.clone(),
                quantity: take,
                unit_cost: lot.unit_cost,
            };

            let remaining = lot.current_quantity - take;
            let mut active: inventory_lot::ActiveModel = lot.into();
            active.current_quantity = Set(remaining);
            active.updated_at = Set(Utc::now());
            active.update(conn).await.map_err(ServiceError::db_error)?;

            inventory_transaction::ActiveModel {
                lot_id: Set(allocation.lot_id),
                product_id: Set(input.product_id),
                direction: Set(TransactionDirection::Out),
                quantity: Set(take),
                reference_type: Set(Some(input.reference.kind.to_string())),
                reference_id: Set(input.reference.id),
                reason: Set(input.reason.clone()),
                created_by: Set(actor),
                ..Default::default()
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?;

            allocations.push(allocation);
        }

        Ok(allocations)
    }

    /// Corrects a lot's quantity outside the production flow. Writes one
    /// ADJUST transaction whose quantity is the magnitude of the change.
    #[instrument(skip(self, reason))]
    pub async fn adjust(
        &self,
        lot_id: i64,
        new_quantity: Decimal,
        reason: &str,
        actor: Uuid,
    ) -> Result<inventory_lot::Model, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::Validation(
                "adjustment requires a non-empty reason".to_string(),
            ));
        }

        // Resolve the product first so the lock covers the re-read below.
        let probe = self.get_lot(lot_id).await?;
        let _guard = self
            .locks
            .acquire(LockDomain::Product, probe.product_id)
            .await;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let lot = InventoryLotEntity::find_by_id(lot_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("lot {} not found", lot_id)))?;

        if new_quantity < Decimal::ZERO || new_quantity > lot.initial_quantity {
            return Err(ServiceError::Validation(format!(
                "adjusted quantity {} outside [0, {}] for lot {}",
                new_quantity, lot.initial_quantity, lot.lot_number
            )));
        }

        let old_quantity = lot.current_quantity;
        let delta = (new_quantity - old_quantity).abs();

        let product_id = lot.product_id;
        let mut active: inventory_lot::ActiveModel = lot.into();
        active.current_quantity = Set(new_quantity);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        inventory_transaction::ActiveModel {
            lot_id: Set(lot_id),
            product_id: Set(product_id),
            direction: Set(TransactionDirection::Adjust),
            quantity: Set(delta),
            reference_type: Set(Some(TransactionRef::manual().kind.to_string())),
            reference_id: Set(None),
            reason: Set(Some(reason.to_string())),
            created_by: Set(actor),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("lot_ledger.adjustments", 1);

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::LotAdjusted {
                    lot_id,
                    old_quantity,
                    new_quantity,
                })
                .await;
        }

        info!(
            "Lot {} adjusted: {} -> {} ({})",
            updated.lot_number, old_quantity, new_quantity, reason
        );
        Ok(updated)
    }

    /// Transitions a lot's status (block, scrap, ...). Not a quantity
    /// mutation; writes no transaction row.
    #[instrument(skip(self, reason))]
    pub async fn set_lot_status(
        &self,
        lot_id: i64,
        status: LotStatus,
        reason: Option<&str>,
        _actor: Uuid,
    ) -> Result<inventory_lot::Model, ServiceError> {
        let probe = self.get_lot(lot_id).await?;
        let _guard = self
            .locks
            .acquire(LockDomain::Product, probe.product_id)
            .await;

        let lot = self.get_lot(lot_id).await?;
        let mut active: inventory_lot::ActiveModel = lot.into();
        active.status = Set(status);
        if let Some(reason) = reason {
            active.notes = Set(Some(reason.to_string()));
        }
        active.updated_at = Set(Utc::now());
        let updated = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::LotStatusChanged {
                    lot_id,
                    new_status: format!("{:?}", updated.status),
                })
                .await;
        }

        Ok(updated)
    }

    /// Total `current_quantity` across active lots of a product.
    pub async fn available_quantity(&self, product_id: i64) -> Result<Decimal, ServiceError> {
        self.available_quantity_in(&*self.db, product_id).await
    }

    pub(crate) async fn available_quantity_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: i64,
    ) -> Result<Decimal, ServiceError> {
        let lots = self.active_lots_fifo(conn, product_id).await?;
        Ok(lots.iter().map(|l| l.current_quantity).sum())
    }

    pub async fn get_lot(&self, lot_id: i64) -> Result<inventory_lot::Model, ServiceError> {
        InventoryLotEntity::find_by_id(lot_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("lot {} not found", lot_id)))
    }

    /// All lots of a product in FIFO order, regardless of status.
    pub async fn lots_for_product(
        &self,
        product_id: i64,
    ) -> Result<Vec<inventory_lot::Model>, ServiceError> {
        InventoryLotEntity::find()
            .filter(inventory_lot::Column::ProductId.eq(product_id))
            .order_by_asc(inventory_lot::Column::ReceivedDate)
            .order_by_asc(inventory_lot::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// The immutable mutation log of one lot, oldest first.
    pub async fn transactions_for_lot(
        &self,
        lot_id: i64,
    ) -> Result<Vec<inventory_transaction::Model>, ServiceError> {
        InventoryTransactionEntity::find()
            .filter(inventory_transaction::Column::LotId.eq(lot_id))
            .order_by_asc(inventory_transaction::Column::CreatedAt)
            .order_by_asc(inventory_transaction::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    // FIFO order is `(received_date, id)` ascending: the id tie-break keeps
    // same-day receipts deterministic regardless of request arrival order.
    async fn active_lots_fifo<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: i64,
    ) -> Result<Vec<inventory_lot::Model>, ServiceError> {
        InventoryLotEntity::find()
            .filter(inventory_lot::Column::ProductId.eq(product_id))
            .filter(inventory_lot::Column::Status.eq(LotStatus::Active))
            .filter(inventory_lot::Column::CurrentQuantity.gt(Decimal::ZERO))
            .order_by_asc(inventory_lot::Column::ReceivedDate)
            .order_by_asc(inventory_lot::Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn plan_fifo<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: i64,
        quantity: Decimal,
    ) -> Result<Vec<(inventory_lot::Model, Decimal)>, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::Validation(format!(
                "consumption quantity must be positive, got {}",
                quantity
            )));
        }

        let lots = self.active_lots_fifo(conn, product_id).await?;
        let total: Decimal = lots.iter().map(|l| l.current_quantity).sum();
        if total < quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "product {}: requested {}, available {}",
                product_id, quantity, total
            )));
        }

        let mut remaining = quantity;
        let mut planned = Vec::new();
        for lot in lots {
            if remaining == Decimal::ZERO {
                break;
            }
            let take = lot.current_quantity.min(remaining);
            remaining -= take;
            planned.push((lot, take));
        }
        Ok(planned)
    }

    async fn plan_manual<C: ConnectionTrait>(
        &self,
        conn: &C,
        input: &ConsumeStock,
        lot_id: i64,
    ) -> Result<Vec<(inventory_lot::Model, Decimal)>, ServiceError> {
        if input.quantity <= Decimal::ZERO {
            return Err(ServiceError::Validation(format!(
                "consumption quantity must be positive, got {}",
                input.quantity
            )));
        }
        if input.reason.as_deref().map_or(true, |r| r.trim().is_empty()) {
            return Err(ServiceError::Validation(
                "manual lot selection requires a reason".to_string(),
            ));
        }

        let lot = InventoryLotEntity::find_by_id(lot_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("lot {} not found", lot_id)))?;

        if lot.product_id != input.product_id {
            return Err(ServiceError::Validation(format!(
                "lot {} belongs to product {}, not {}",
                lot.lot_number, lot.product_id, input.product_id
            )));
        }
        if lot.status != LotStatus::Active {
            return Err(ServiceError::Validation(format!(
                "lot {} is not active",
                lot.lot_number
            )));
        }
        if lot.current_quantity < input.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "lot {}: requested {}, available {}",
                lot.lot_number, input.quantity, lot.current_quantity
            )));
        }

        Ok(vec![(lot, input.quantity)])
    }

    // Lot numbers are `{product code}-{YYYYMMDD}-{seq:03}` with the
    // sequence counted per product and receipt date.
    async fn next_lot_number<C: ConnectionTrait>(
        &self,
        conn: &C,
        product: &product::Model,
        received_date: NaiveDate,
    ) -> Result<String, ServiceError> {
        let today_count = InventoryLotEntity::find()
            .filter(inventory_lot::Column::ProductId.eq(product.id))
            .filter(inventory_lot::Column::ReceivedDate.eq(received_date))
            .count(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(format!(
            "{}-{}-{:03}",
            product.code,
            received_date.format("%Y%m%d"),
            today_count + 1
        ))
    }
}
