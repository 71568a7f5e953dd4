use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One directed edge of the recipe graph: building one unit of the parent
/// product consumes `quantity_per` units of the child, inflated by
/// `scrap_rate` percent for expected waste at this step.
///
/// Edges are soft-deleted via `is_active`; the active edge set must stay
/// acyclic.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bom_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub parent_product_id: i64,
    pub child_product_id: i64,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity_per: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub scrap_rate: Decimal,
    pub sequence_order: i32,
    pub level: i32,
    pub operation_type: Option<String>,
    pub machine_type: Option<String>,
    pub cycle_time_secs: Option<i32>,
    pub setup_time_secs: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ParentProductId",
        to = "super::product::Column::Id"
    )]
    ParentProduct,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ChildProductId",
        to = "super::product::Column::Id"
    )]
    ChildProduct,
}

impl ActiveModelBehavior for ActiveModel {}
