use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, histogram};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        machine::Entity as MachineEntity,
        product::Entity as ProductEntity,
        work_order::{self, Entity as WorkOrderEntity, WorkOrderStatus},
        work_order_operation::{self, Entity as WorkOrderOperationEntity, OperationKind},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    locks::{LockDomain, LockManager},
    services::{
        bom::BomService,
        lot_ledger::{ConsumeStock, LotLedgerService, ReceiveLot},
    },
};

use crate::entities::inventory_transaction::TransactionRef;

// Generated order numbers are serialized through this work-order-domain
// lock key; real order ids start at 1 so the key cannot collide.
const ORDER_NUMBER_LOCK_KEY: i64 = 0;

/// Input for creating a work order. `bom_item_id`, when given, must be an
/// active edge whose parent is `product_id`: it names the material this
/// order consumes per produced unit.
#[derive(Debug, Clone)]
pub struct NewWorkOrder {
    pub product_id: i64,
    pub planned_quantity: Decimal,
    pub bom_item_id: Option<i64>,
    pub sales_order_id: Option<i64>,
    pub machine_id: Option<i64>,
    pub order_number: Option<String>,
    pub notes: Option<String>,
}

/// Drives the life cycle of production orders: the only writer of work
/// orders and their operation logs, and the only caller of the lot ledger
/// on behalf of production.
#[derive(Clone)]
pub struct WorkOrderService {
    db: Arc<DatabaseConnection>,
    locks: Arc<LockManager>,
    ledger: Arc<LotLedgerService>,
    bom: Arc<BomService>,
    event_sender: Option<EventSender>,
}

impl WorkOrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        locks: Arc<LockManager>,
        ledger: Arc<LotLedgerService>,
        bom: Arc<BomService>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            locks,
            ledger,
            bom,
            event_sender,
        }
    }

    /// Creates a work order in PLANNED state.
    #[instrument(skip(self, input), fields(product_id = input.product_id))]
    pub async fn create(
        &self,
        input: NewWorkOrder,
        actor: Uuid,
    ) -> Result<work_order::Model, ServiceError> {
        if input.planned_quantity <= Decimal::ZERO {
            return Err(ServiceError::Validation(format!(
                "planned quantity must be positive, got {}",
                input.planned_quantity
            )));
        }

        let product = ProductEntity::find_by_id(input.product_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("product {} not found", input.product_id))
            })?;
        if !product.is_active {
            return Err(ServiceError::Validation(format!(
                "product {} is deactivated",
                product.code
            )));
        }

        if let Some(machine_id) = input.machine_id {
            let machine = MachineEntity::find_by_id(machine_id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("machine {} not found", machine_id))
                })?;
            if !machine.is_active {
                return Err(ServiceError::Validation(format!(
                    "machine {} is not active",
                    machine.code
                )));
            }
        }

        if let Some(bom_item_id) = input.bom_item_id {
            let edge = self.bom.get_edge(bom_item_id).await?;
            if !edge.is_active {
                return Err(ServiceError::Validation(format!(
                    "BOM edge {} is deactivated",
                    bom_item_id
                )));
            }
            if edge.parent_product_id != input.product_id {
                return Err(ServiceError::Validation(format!(
                    "BOM edge {} does not belong to product {}",
                    bom_item_id, input.product_id
                )));
            }
        }

        let _number_guard = if input.order_number.is_none() {
            Some(
                self.locks
                    .acquire(LockDomain::WorkOrder, ORDER_NUMBER_LOCK_KEY)
                    .await,
            )
        } else {
            None
        };

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let order_number = match input.order_number {
            Some(number) => number,
            None => self.next_order_number(&txn).await?,
        };

        let now = Utc::now();
        let created = work_order::ActiveModel {
            order_number: Set(order_number),
            product_id: Set(input.product_id),
            bom_item_id: Set(input.bom_item_id),
            sales_order_id: Set(input.sales_order_id),
            machine_id: Set(input.machine_id),
            planned_quantity: Set(input.planned_quantity),
            produced_quantity: Set(Decimal::ZERO),
            scrap_quantity: Set(Decimal::ZERO),
            status: Set(WorkOrderStatus::Planned),
            actual_start: Set(None),
            actual_end: Set(None),
            notes: Set(input.notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        self.append_operation(&txn, created.id, OperationKind::Created, Some(actor), None)
            .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("work_orders.created", 1);
        histogram!(
            "work_orders.planned_quantity",
            input.planned_quantity.to_f64().unwrap_or(0.0)
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::WorkOrderCreated {
                    work_order_id: created.id,
                    product_id: created.product_id,
                    planned_quantity: created.planned_quantity,
                })
                .await;
        }

        info!(
            "Work order {} created: product {} planned {}",
            created.order_number, created.product_id, created.planned_quantity
        );
        Ok(created)
    }

    /// Starts a PLANNED order. When the order references a recipe edge,
    /// material requirements are exploded for the planned quantity first;
    /// any shortage fails the start and the order stays PLANNED.
    #[instrument(skip(self))]
    pub async fn start(&self, id: i64, actor: Uuid) -> Result<work_order::Model, ServiceError> {
        let _guard = self.locks.acquire(LockDomain::WorkOrder, id).await;

        let order = self.get(id).await?;
        self.require_status(&order, WorkOrderStatus::Planned)?;

        if order.bom_item_id.is_some() {
            let explosion = self
                .bom
                .explode_requirements(order.product_id, order.planned_quantity)
                .await?;

            let shortages: Vec<_> = explosion
                .materials
                .iter()
                .filter(|m| m.shortage > Decimal::ZERO)
                .collect();

            if !shortages.is_empty() {
                warn!(
                    "Work order {} short on {} materials",
                    order.order_number,
                    shortages.len()
                );
                if let Some(sender) = &self.event_sender {
                    for shortage in &shortages {
                        sender
                            .send_or_log(Event::ComponentShortageDetected {
                                work_order_id: id,
                                product_id: shortage.product_id,
                                required: shortage.required_with_scrap,
                                available: shortage.available,
                                shortage: shortage.shortage,
                            })
                            .await;
                    }
                }
                let detail = shortages
                    .iter()
                    .map(|m| format!("product {} short {}", m.product_id, m.shortage))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ServiceError::Validation(format!(
                    "insufficient materials: {}",
                    detail
                )));
            }
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let mut active: work_order::ActiveModel = order.into();
        active.status = Set(WorkOrderStatus::InProgress);
        active.actual_start = Set(Some(Utc::now()));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        self.append_operation(&txn, id, OperationKind::Started, Some(actor), None)
            .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("work_orders.started", 1);

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::WorkOrderStarted { work_order_id: id })
                .await;
        }

        info!("Work order {} started", updated.order_number);
        Ok(updated)
    }

    /// Records operator progress on an IN_PROGRESS order: consumes the
    /// recipe material for the produced delta, accumulates produced/scrap,
    /// appends the report to the operation log, creates the output lot for
    /// stock-tracked products, and auto-completes when the totals reach
    /// the plan — all in one transaction. Failed consumption aborts the
    /// whole report.
    #[instrument(skip(self))]
    pub async fn record_production(
        &self,
        id: i64,
        produced_delta: Decimal,
        scrap_delta: Decimal,
        operator: Uuid,
    ) -> Result<work_order::Model, ServiceError> {
        if produced_delta < Decimal::ZERO || scrap_delta < Decimal::ZERO {
            return Err(ServiceError::Validation(
                "production deltas must not be negative".to_string(),
            ));
        }
        if produced_delta + scrap_delta == Decimal::ZERO {
            return Err(ServiceError::Validation(
                "nothing to report: both deltas are zero".to_string(),
            ));
        }

        let _order_guard = self.locks.acquire(LockDomain::WorkOrder, id).await;

        // Resolve the products this report touches, then take their locks
        // in ascending order before opening the transaction.
        let order = self.get(id).await?;
        let edge = match order.bom_item_id {
            Some(edge_id) => Some(self.bom.get_edge(edge_id).await?),
            None => None,
        };

        let mut product_ids = vec![order.product_id];
        if let Some(edge) = &edge {
            product_ids.push(edge.child_product_id);
        }
        let _product_guards = self.locks.acquire_products(&product_ids).await;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let order = WorkOrderEntity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("work order {} not found", id)))?;
        self.require_status(&order, WorkOrderStatus::InProgress)?;

        let new_produced = order.produced_quantity + produced_delta;
        let new_scrap = order.scrap_quantity + scrap_delta;
        if new_produced + new_scrap > order.planned_quantity {
            return Err(ServiceError::Validation(format!(
                "report exceeds plan: {} produced + {} scrap > {} planned",
                new_produced, new_scrap, order.planned_quantity
            )));
        }

        if let Some(edge) = &edge {
            if produced_delta > Decimal::ZERO {
                self.ledger
                    .consume_in(
                        &txn,
                        &ConsumeStock {
                            product_id: edge.child_product_id,
                            quantity: produced_delta * edge.quantity_per,
                            manual_lot_id: None,
                            reason: None,
                            reference: TransactionRef::work_order(id),
                        },
                        operator,
                    )
                    .await?;
            }
        }

        let completing = new_produced + new_scrap >= order.planned_quantity;
        let product_id = order.product_id;
        let order_number = order.order_number.clone();

        let mut active: work_order::ActiveModel = order.into();
        active.produced_quantity = Set(new_produced);
        active.scrap_quantity = Set(new_scrap);
        if completing {
            active.status = Set(WorkOrderStatus::Completed);
            active.actual_end = Set(Some(Utc::now()));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        self.append_report(&txn, id, produced_delta, scrap_delta, operator)
            .await?;

        if produced_delta > Decimal::ZERO {
            let product = ProductEntity::find_by_id(product_id)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("product {} not found", product_id))
                })?;
            if product.is_stock_tracked {
                self.ledger
                    .receive_in(
                        &txn,
                        &ReceiveLot {
                            product_id,
                            quantity: produced_delta,
                            unit_cost: None,
                            supplier_id: None,
                            received_date: None,
                            reference: TransactionRef::work_order(id),
                            notes: Some(format!("output of work order {}", order_number)),
                        },
                        operator,
                    )
                    .await?;
            }
        }

        if completing {
            self.append_operation(&txn, id, OperationKind::Completed, Some(operator), None)
                .await?;
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("work_orders.production_reports", 1);
        histogram!(
            "work_orders.produced_delta",
            produced_delta.to_f64().unwrap_or(0.0)
        );
        if completing {
            counter!("work_orders.completed", 1);
        }

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ProductionRecorded {
                    work_order_id: id,
                    produced_delta,
                    scrap_delta,
                })
                .await;
            if completing {
                sender
                    .send_or_log(Event::WorkOrderCompleted {
                        work_order_id: id,
                        produced_quantity: updated.produced_quantity,
                        scrap_quantity: updated.scrap_quantity,
                    })
                    .await;
            }
        }

        info!(
            "Work order {}: +{} produced, +{} scrap{}",
            updated.order_number,
            produced_delta,
            scrap_delta,
            if completing { ", completed" } else { "" }
        );
        Ok(updated)
    }

    #[instrument(skip(self, reason))]
    pub async fn pause(
        &self,
        id: i64,
        reason: Option<String>,
        actor: Uuid,
    ) -> Result<work_order::Model, ServiceError> {
        let updated = self
            .transition(
                id,
                WorkOrderStatus::InProgress,
                WorkOrderStatus::Paused,
                OperationKind::Paused,
                reason.clone(),
                actor,
            )
            .await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::WorkOrderPaused {
                    work_order_id: id,
                    reason,
                })
                .await;
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn resume(&self, id: i64, actor: Uuid) -> Result<work_order::Model, ServiceError> {
        let updated = self
            .transition(
                id,
                WorkOrderStatus::Paused,
                WorkOrderStatus::InProgress,
                OperationKind::Resumed,
                None,
                actor,
            )
            .await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::WorkOrderResumed { work_order_id: id })
                .await;
        }
        Ok(updated)
    }

    /// Cancels from any non-terminal state.
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        id: i64,
        reason: Option<String>,
        actor: Uuid,
    ) -> Result<work_order::Model, ServiceError> {
        let _guard = self.locks.acquire(LockDomain::WorkOrder, id).await;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let order = WorkOrderEntity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("work order {} not found", id)))?;

        if !order.status.can_transition_to(WorkOrderStatus::Cancelled) {
            return Err(ServiceError::Validation(format!(
                "work order {} cannot be cancelled from {:?}",
                order.order_number, order.status
            )));
        }

        let mut active: work_order::ActiveModel = order.into();
        active.status = Set(WorkOrderStatus::Cancelled);
        active.actual_end = Set(Some(Utc::now()));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        self.append_operation(&txn, id, OperationKind::Cancelled, Some(actor), reason.clone())
            .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("work_orders.cancelled", 1);

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::WorkOrderCancelled {
                    work_order_id: id,
                    reason,
                })
                .await;
        }

        info!("Work order {} cancelled", updated.order_number);
        Ok(updated)
    }

    /// The ordered operation log of one order.
    #[instrument(skip(self))]
    pub async fn timeline(
        &self,
        id: i64,
    ) -> Result<Vec<work_order_operation::Model>, ServiceError> {
        self.get(id).await?;
        WorkOrderOperationEntity::find()
            .filter(work_order_operation::Column::WorkOrderId.eq(id))
            .order_by_asc(work_order_operation::Column::Sequence)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get(&self, id: i64) -> Result<work_order::Model, ServiceError> {
        WorkOrderEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("work order {} not found", id)))
    }

    /// Work orders in one status, newest first, with the total count.
    #[instrument(skip(self))]
    pub async fn list_by_status(
        &self,
        status: WorkOrderStatus,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<work_order::Model>, u64), ServiceError> {
        let filter = work_order::Column::Status.eq(status);

        let total = WorkOrderEntity::find()
            .filter(filter.clone())
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let orders = WorkOrderEntity::find()
            .filter(filter)
            .order_by_desc(work_order::Column::CreatedAt)
            .offset(page.saturating_sub(1) * page_size)
            .limit(page_size)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((orders, total))
    }

    async fn transition(
        &self,
        id: i64,
        expected: WorkOrderStatus,
        next: WorkOrderStatus,
        kind: OperationKind,
        notes: Option<String>,
        actor: Uuid,
    ) -> Result<work_order::Model, ServiceError> {
        let _guard = self.locks.acquire(LockDomain::WorkOrder, id).await;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let order = WorkOrderEntity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("work order {} not found", id)))?;
        self.require_status(&order, expected)?;

        let mut active: work_order::ActiveModel = order.into();
        active.status = Set(next);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        self.append_operation(&txn, id, kind, Some(actor), notes)
            .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(updated)
    }

    fn require_status(
        &self,
        order: &work_order::Model,
        expected: WorkOrderStatus,
    ) -> Result<(), ServiceError> {
        if order.status != expected {
            return Err(ServiceError::Validation(format!(
                "work order {} is {:?}, expected {:?}",
                order.order_number, order.status, expected
            )));
        }
        Ok(())
    }

    async fn append_operation<C: ConnectionTrait>(
        &self,
        conn: &C,
        work_order_id: i64,
        kind: OperationKind,
        operator: Option<Uuid>,
        notes: Option<String>,
    ) -> Result<(), ServiceError> {
        let sequence = self.next_sequence(conn, work_order_id).await?;
        work_order_operation::ActiveModel {
            work_order_id: Set(work_order_id),
            sequence: Set(sequence),
            kind: Set(kind),
            produced_delta: Set(Decimal::ZERO),
            scrap_delta: Set(Decimal::ZERO),
            operator_id: Set(operator),
            notes: Set(notes),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;
        Ok(())
    }

    async fn append_report<C: ConnectionTrait>(
        &self,
        conn: &C,
        work_order_id: i64,
        produced_delta: Decimal,
        scrap_delta: Decimal,
        operator: Uuid,
    ) -> Result<(), ServiceError> {
        let sequence = self.next_sequence(conn, work_order_id).await?;
        work_order_operation::ActiveModel {
            work_order_id: Set(work_order_id),
            sequence: Set(sequence),
            kind: Set(OperationKind::ProductionReport),
            produced_delta: Set(produced_delta),
            scrap_delta: Set(scrap_delta),
            operator_id: Set(Some(operator)),
            notes: Set(None),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;
        Ok(())
    }

    async fn next_sequence<C: ConnectionTrait>(
        &self,
        conn: &C,
        work_order_id: i64,
    ) -> Result<i32, ServiceError> {
        let count = WorkOrderOperationEntity::find()
            .filter(work_order_operation::Column::WorkOrderId.eq(work_order_id))
            .count(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(count as i32 + 1)
    }

    async fn next_order_number<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<String, ServiceError> {
        let count = WorkOrderEntity::find()
            .count(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(format!("WO-{:06}", count + 1))
    }
}
