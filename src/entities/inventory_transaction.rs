use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a ledger mutation. `quantity` on the row is always
/// non-negative; the direction carries the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
pub enum TransactionDirection {
    #[sea_orm(string_value = "IN")]
    In,
    #[sea_orm(string_value = "OUT")]
    Out,
    #[sea_orm(string_value = "ADJUST")]
    Adjust,
}

/// Kind of entity that caused a ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    WorkOrder,
    SupplierReceipt,
    ManualAdjustment,
}

/// Reference to the entity that caused a mutation, stored denormalized as
/// `(reference_type, reference_id)` on the transaction row.
#[derive(Debug, Clone, Copy)]
pub struct TransactionRef {
    pub kind: ReferenceType,
    pub id: Option<i64>,
}

impl TransactionRef {
    pub fn work_order(id: i64) -> Self {
        Self {
            kind: ReferenceType::WorkOrder,
            id: Some(id),
        }
    }

    pub fn supplier_receipt(id: Option<i64>) -> Self {
        Self {
            kind: ReferenceType::SupplierReceipt,
            id,
        }
    }

    pub fn manual() -> Self {
        Self {
            kind: ReferenceType::ManualAdjustment,
            id: None,
        }
    }
}

/// Append-only record of a lot mutation. Rows are never updated or
/// deleted; the signed sum per lot reconciles against the lot's
/// `initial_quantity - current_quantity`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub lot_id: i64,
    pub product_id: i64,
    pub direction: TransactionDirection,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity: Decimal,
    pub reference_type: Option<String>,
    pub reference_id: Option<i64>,
    pub reason: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_lot::Entity",
        from = "Column::LotId",
        to = "super::inventory_lot::Column::Id"
    )]
    InventoryLot,
}

impl Related<super::inventory_lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryLot.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.id {
            active_model.id = Set(Uuid::new_v4());
        }
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
