use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{info, instrument};

use crate::{
    entities::{
        bom_item::{self, Entity as BomItemEntity},
        product::Entity as ProductEntity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::lot_ledger::LotLedgerService,
};

/// Attributes of a new recipe edge.
#[derive(Debug, Clone)]
pub struct NewBomEdge {
    pub parent_product_id: i64,
    pub child_product_id: i64,
    pub quantity_per: Decimal,
    pub scrap_rate: Decimal,
    pub sequence_order: i32,
    pub operation_type: Option<String>,
    pub machine_type: Option<String>,
    pub cycle_time_secs: Option<i32>,
    pub setup_time_secs: Option<i32>,
}

/// One node of a flattened recipe tree: the edge reaching `product_id`,
/// tagged with its depth and the quantity accumulated down the branch.
#[derive(Debug, Clone)]
pub struct BomTreeNode {
    pub bom_item_id: i64,
    pub parent_product_id: i64,
    pub product_id: i64,
    pub level: i32,
    pub sequence_order: i32,
    pub quantity_per: Decimal,
    pub scrap_rate: Decimal,
    pub cumulative_quantity: Decimal,
    pub operation_type: Option<String>,
    pub machine_type: Option<String>,
}

/// A `BomTreeNode` extended with scrap-compensated requirements.
#[derive(Debug, Clone)]
pub struct RequirementNode {
    pub node: BomTreeNode,
    pub required: Decimal,
    pub required_with_scrap: Decimal,
    pub is_leaf: bool,
}

/// Aggregated requirement for one leaf material across all branches.
#[derive(Debug, Clone)]
pub struct MaterialRequirement {
    pub product_id: i64,
    pub required: Decimal,
    pub required_with_scrap: Decimal,
    pub available: Decimal,
    pub shortage: Decimal,
}

/// Result of a full requirements explosion.
#[derive(Debug, Clone)]
pub struct RequirementsExplosion {
    pub nodes: Vec<RequirementNode>,
    pub materials: Vec<MaterialRequirement>,
}

/// Single-level work-order proposal for one child edge: building
/// `quantity` of the parent calls for `planned_quantity` of this child.
#[derive(Debug, Clone)]
pub struct PlannedWorkOrder {
    pub product_id: i64,
    pub source_bom_item_id: i64,
    pub planned_quantity: Decimal,
    pub sequence_order: i32,
    pub machine_type: Option<String>,
    pub sales_order_id: Option<i64>,
}

/// Owns and queries the recipe DAG; guarantees it stays acyclic and
/// computes multi-level material requirements.
#[derive(Clone)]
pub struct BomService {
    db: Arc<DatabaseConnection>,
    ledger: Arc<LotLedgerService>,
    event_sender: Option<EventSender>,
}

impl BomService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        ledger: Arc<LotLedgerService>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            ledger,
            event_sender,
        }
    }

    /// Active edges of one product, in recipe sequence.
    #[instrument(skip(self))]
    pub async fn get_children(&self, product_id: i64) -> Result<Vec<bom_item::Model>, ServiceError> {
        self.get_children_in(&*self.db, product_id).await
    }

    async fn get_children_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: i64,
    ) -> Result<Vec<bom_item::Model>, ServiceError> {
        BomItemEntity::find()
            .filter(bom_item::Column::ParentProductId.eq(product_id))
            .filter(bom_item::Column::IsActive.eq(true))
            .order_by_asc(bom_item::Column::SequenceOrder)
            .order_by_asc(bom_item::Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Full recursive explosion of a product's recipe as a flattened,
    /// level-tagged preorder list. Each branch carries the path of product
    /// ids above it; meeting a product already on its own branch fails
    /// `Conflict` rather than descending forever — soft-deleted edges can
    /// resurrect a cycle the edge-creation check rejected long ago.
    #[instrument(skip(self))]
    pub async fn explode_tree(&self, product_id: i64) -> Result<Vec<BomTreeNode>, ServiceError> {
        let db = &*self.db;
        self.ensure_product(db, product_id).await?;

        let mut out = Vec::new();
        let roots = self.get_children_in(db, product_id).await?;
        let mut stack: Vec<(bom_item::Model, Decimal, i32, Vec<i64>)> = roots
            .into_iter()
            .rev()
            .map(|edge| (edge, Decimal::ONE, 1, vec![product_id]))
            .collect();

        while let Some((edge, parent_cumulative, level, path)) = stack.pop() {
            if path.contains(&edge.child_product_id) {
                return Err(ServiceError::Conflict(format!(
                    "circular reference: product {} already appears on this branch",
                    edge.child_product_id
                )));
            }

            let cumulative = parent_cumulative * edge.quantity_per;
            let child_id = edge.child_product_id;
            out.push(Self::tree_node(&edge, level, cumulative));

            let children = self.get_children_in(db, child_id).await?;
            if !children.is_empty() {
                let mut child_path = path.clone();
                child_path.push(child_id);
                for child in children.into_iter().rev() {
                    stack.push((child, cumulative, level + 1, child_path.clone()));
                }
            }
        }

        Ok(out)
    }

    /// Multi-level requirements for building `quantity` of a product.
    ///
    /// Per node: `required = parent base x quantity_per` and
    /// `required_with_scrap = required x (1 + scrap_rate/100)`. The
    /// scrap-inflated quantity becomes the base for the node's own
    /// children — compounding down levels, never re-inflating within one.
    /// Leaf requirements are summed per product and checked against the
    /// ledger; `shortage = max(0, required_with_scrap - available)`.
    #[instrument(skip(self))]
    pub async fn explode_requirements(
        &self,
        product_id: i64,
        quantity: Decimal,
    ) -> Result<RequirementsExplosion, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::Validation(format!(
                "explosion quantity must be positive, got {}",
                quantity
            )));
        }

        let db = &*self.db;
        self.ensure_product(db, product_id).await?;

        let mut nodes = Vec::new();
        // product -> (required, required_with_scrap), summed over branches
        let mut leaf_totals: BTreeMap<i64, (Decimal, Decimal)> = BTreeMap::new();

        let roots = self.get_children_in(db, product_id).await?;
        let mut stack: Vec<(bom_item::Model, Decimal, i32, Vec<i64>)> = roots
            .into_iter()
            .rev()
            .map(|edge| (edge, quantity, 1, vec![product_id]))
            .collect();

        while let Some((edge, parent_base, level, path)) = stack.pop() {
            if path.contains(&edge.child_product_id) {
                return Err(ServiceError::Conflict(format!(
                    "circular reference: product {} already appears on this branch",
                    edge.child_product_id
                )));
            }

            let required = parent_base * edge.quantity_per;
            let required_with_scrap =
                required * (Decimal::ONE + edge.scrap_rate / dec!(100));
            let child_id = edge.child_product_id;

            let children = self.get_children_in(db, child_id).await?;
            let is_leaf = children.is_empty();

            nodes.push(RequirementNode {
                node: Self::tree_node(&edge, level, required_with_scrap),
                required,
                required_with_scrap,
                is_leaf,
            });

            if is_leaf {
                let entry = leaf_totals
                    .entry(child_id)
                    .or_insert((Decimal::ZERO, Decimal::ZERO));
                entry.0 += required;
                entry.1 += required_with_scrap;
            } else {
                let mut child_path = path.clone();
                child_path.push(child_id);
                for child in children.into_iter().rev() {
                    stack.push((child, required_with_scrap, level + 1, child_path.clone()));
                }
            }
        }

        let mut materials = Vec::with_capacity(leaf_totals.len());
        for (leaf_product_id, (required, required_with_scrap)) in leaf_totals {
            let available = self.ledger.available_quantity(leaf_product_id).await?;
            let shortage = (required_with_scrap - available).max(Decimal::ZERO);
            materials.push(MaterialRequirement {
                product_id: leaf_product_id,
                required,
                required_with_scrap,
                available,
                shortage,
            });
        }

        Ok(RequirementsExplosion { nodes, materials })
    }

    /// Inserts a recipe edge after proving it cannot close a cycle: the
    /// parent must not be reachable from the child over active edges.
    #[instrument(skip(self, edge))]
    pub async fn add_edge(&self, edge: NewBomEdge) -> Result<bom_item::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let created = self.add_edge_in(&txn, &edge).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::BomEdgeAdded {
                    bom_item_id: created.id,
                    parent_product_id: created.parent_product_id,
                    child_product_id: created.child_product_id,
                })
                .await;
        }

        info!(
            "BOM edge added: {} -> {} x{}",
            created.parent_product_id, created.child_product_id, created.quantity_per
        );
        Ok(created)
    }

    async fn add_edge_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        edge: &NewBomEdge,
    ) -> Result<bom_item::Model, ServiceError> {
        if edge.quantity_per <= Decimal::ZERO {
            return Err(ServiceError::Validation(format!(
                "edge quantity must be positive, got {}",
                edge.quantity_per
            )));
        }
        if edge.scrap_rate < Decimal::ZERO {
            return Err(ServiceError::Validation(format!(
                "scrap rate must not be negative, got {}",
                edge.scrap_rate
            )));
        }
        if edge.parent_product_id == edge.child_product_id {
            return Err(ServiceError::Conflict(
                "circular dependency: a product cannot be its own component".to_string(),
            ));
        }

        self.ensure_product(conn, edge.parent_product_id).await?;
        self.ensure_product(conn, edge.child_product_id).await?;

        if self
            .is_reachable(conn, edge.child_product_id, edge.parent_product_id)
            .await?
        {
            return Err(ServiceError::Conflict(format!(
                "circular dependency: product {} is already an ancestor of product {}",
                edge.child_product_id, edge.parent_product_id
            )));
        }

        let level = self.incoming_level(conn, edge.parent_product_id).await? + 1;

        let now = Utc::now();
        bom_item::ActiveModel {
            parent_product_id: Set(edge.parent_product_id),
            child_product_id: Set(edge.child_product_id),
            quantity_per: Set(edge.quantity_per),
            scrap_rate: Set(edge.scrap_rate),
            sequence_order: Set(edge.sequence_order),
            level: Set(level),
            operation_type: Set(edge.operation_type.clone()),
            machine_type: Set(edge.machine_type.clone()),
            cycle_time_secs: Set(edge.cycle_time_secs),
            setup_time_secs: Set(edge.setup_time_secs),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)
    }

    /// Soft-deletes an edge. Historical explosions and past recipe
    /// versions stay referenceable; nothing is physically removed.
    #[instrument(skip(self))]
    pub async fn deactivate_edge(&self, bom_item_id: i64) -> Result<bom_item::Model, ServiceError> {
        let edge = BomItemEntity::find_by_id(bom_item_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("BOM edge {} not found", bom_item_id))
            })?;

        let mut active: bom_item::ActiveModel = edge.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let updated = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::BomEdgeDeactivated {
                    bom_item_id: updated.id,
                })
                .await;
        }

        Ok(updated)
    }

    /// Copies the source product's direct edges onto the target —
    /// deliberately one level only, never the source's own subtree. The
    /// cycle check runs per copied edge and the whole copy is atomic.
    #[instrument(skip(self))]
    pub async fn copy_edges(
        &self,
        from_product_id: i64,
        to_product_id: i64,
    ) -> Result<Vec<bom_item::Model>, ServiceError> {
        if from_product_id == to_product_id {
            return Err(ServiceError::Validation(
                "cannot copy a recipe onto itself".to_string(),
            ));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        self.ensure_product(&txn, from_product_id).await?;
        self.ensure_product(&txn, to_product_id).await?;

        let source_edges = self.get_children_in(&txn, from_product_id).await?;
        let mut copied = Vec::with_capacity(source_edges.len());
        for edge in source_edges {
            let created = self
                .add_edge_in(
                    &txn,
                    &NewBomEdge {
                        parent_product_id: to_product_id,
                        child_product_id: edge.child_product_id,
                        quantity_per: edge.quantity_per,
                        scrap_rate: edge.scrap_rate,
                        sequence_order: edge.sequence_order,
                        operation_type: edge.operation_type.clone(),
                        machine_type: edge.machine_type.clone(),
                        cycle_time_secs: edge.cycle_time_secs,
                        setup_time_secs: edge.setup_time_secs,
                    },
                )
                .await?;
            copied.push(created);
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            "Copied {} BOM edges from product {} to product {}",
            copied.len(),
            from_product_id,
            to_product_id
        );
        Ok(copied)
    }

    /// Flat single-level planning: one work-order proposal per direct
    /// child edge, `planned_quantity = quantity x quantity_per`. No
    /// multi-level explosion and no persistence; the caller decides which
    /// proposals become orders.
    #[instrument(skip(self))]
    pub async fn plan_work_orders(
        &self,
        product_id: i64,
        quantity: Decimal,
        sales_order_id: Option<i64>,
    ) -> Result<Vec<PlannedWorkOrder>, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::Validation(format!(
                "planning quantity must be positive, got {}",
                quantity
            )));
        }
        self.ensure_product(&*self.db, product_id).await?;

        let children = self.get_children(product_id).await?;
        Ok(children
            .into_iter()
            .map(|edge| PlannedWorkOrder {
                product_id: edge.child_product_id,
                source_bom_item_id: edge.id,
                planned_quantity: quantity * edge.quantity_per,
                sequence_order: edge.sequence_order,
                machine_type: edge.machine_type,
                sales_order_id,
            })
            .collect())
    }

    pub async fn get_edge(&self, bom_item_id: i64) -> Result<bom_item::Model, ServiceError> {
        BomItemEntity::find_by_id(bom_item_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM edge {} not found", bom_item_id)))
    }

    fn tree_node(edge: &bom_item::Model, level: i32, cumulative: Decimal) -> BomTreeNode {
        BomTreeNode {
            bom_item_id: edge.id,
            parent_product_id: edge.parent_product_id,
            product_id: edge.child_product_id,
            level,
            sequence_order: edge.sequence_order,
            quantity_per: edge.quantity_per,
            scrap_rate: edge.scrap_rate,
            cumulative_quantity: cumulative,
            operation_type: edge.operation_type.clone(),
            machine_type: edge.machine_type.clone(),
        }
    }

    async fn ensure_product<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: i64,
    ) -> Result<(), ServiceError> {
        ProductEntity::find_by_id(product_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("product {} not found", product_id)))?;
        Ok(())
    }

    // Breadth-first reachability over active edges.
    async fn is_reachable<C: ConnectionTrait>(
        &self,
        conn: &C,
        from: i64,
        to: i64,
    ) -> Result<bool, ServiceError> {
        let mut queue = VecDeque::from([from]);
        let mut seen: HashSet<i64> = HashSet::from([from]);

        while let Some(current) = queue.pop_front() {
            if current == to {
                return Ok(true);
            }
            for edge in self.get_children_in(conn, current).await? {
                if seen.insert(edge.child_product_id) {
                    queue.push_back(edge.child_product_id);
                }
            }
        }
        Ok(false)
    }

    // An edge's level is one past the deepest active edge arriving at its
    // parent; root edges are level 1.
    async fn incoming_level<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: i64,
    ) -> Result<i32, ServiceError> {
        let incoming = BomItemEntity::find()
            .filter(bom_item::Column::ChildProductId.eq(product_id))
            .filter(bom_item::Column::IsActive.eq(true))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(incoming.iter().map(|e| e.level).max().unwrap_or(0))
    }
}
