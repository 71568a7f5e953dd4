use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use tracing::{info, instrument};

use crate::{
    entities::{
        machine::{self, Entity as MachineEntity},
        product::{self, Entity as ProductEntity, ProductKind},
    },
    errors::ServiceError,
};

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    pub kind: ProductKind,
    pub is_stock_tracked: bool,
}

#[derive(Debug, Clone)]
pub struct NewMachine {
    pub code: String,
    pub name: String,
    pub machine_type: Option<String>,
}

/// The catalog seam: product and machine registration and lookup. The
/// ledger, resolver and orchestrator consult it for existence, kind and
/// stock-tracking; richer catalog management lives outside the core.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_product(
        &self,
        input: NewProduct,
    ) -> Result<product::Model, ServiceError> {
        if input.code.trim().is_empty() {
            return Err(ServiceError::Validation(
                "product code cannot be empty".to_string(),
            ));
        }

        let existing = ProductEntity::find()
            .filter(product::Column::Code.eq(input.code.clone()))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "duplicate product code {}",
                input.code
            )));
        }

        let now = Utc::now();
        let created = product::ActiveModel {
            code: Set(input.code),
            name: Set(input.name),
            kind: Set(input.kind),
            is_stock_tracked: Set(input.is_stock_tracked),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!("Product {} registered", created.code);
        Ok(created)
    }

    pub async fn get_product(&self, id: i64) -> Result<product::Model, ServiceError> {
        ProductEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("product {} not found", id)))
    }

    pub async fn find_product_by_code(
        &self,
        code: &str,
    ) -> Result<Option<product::Model>, ServiceError> {
        ProductEntity::find()
            .filter(product::Column::Code.eq(code))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Soft-deactivates a product; nothing referencing it breaks.
    #[instrument(skip(self))]
    pub async fn deactivate_product(&self, id: i64) -> Result<product::Model, ServiceError> {
        let found = self.get_product(id).await?;
        let mut active: product::ActiveModel = found.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_machine(
        &self,
        input: NewMachine,
    ) -> Result<machine::Model, ServiceError> {
        let existing = MachineEntity::find()
            .filter(machine::Column::Code.eq(input.code.clone()))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "duplicate machine code {}",
                input.code
            )));
        }

        let now = Utc::now();
        let created = machine::ActiveModel {
            code: Set(input.code),
            name: Set(input.name),
            machine_type: Set(input.machine_type),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!("Machine {} registered", created.code);
        Ok(created)
    }

    pub async fn get_machine(&self, id: i64) -> Result<machine::Model, ServiceError> {
        MachineEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("machine {} not found", id)))
    }

    /// Soft-deactivates a machine so new work orders cannot be assigned
    /// to it.
    #[instrument(skip(self))]
    pub async fn deactivate_machine(&self, id: i64) -> Result<machine::Model, ServiceError> {
        let found = self.get_machine(id).await?;
        let mut active: machine::ActiveModel = found.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}
