use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_catalog_tables::Migration),
            Box::new(m20240301_000002_create_lot_ledger_tables::Migration),
            Box::new(m20240301_000003_create_bom_items_table::Migration),
            Box::new(m20240301_000004_create_work_order_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Code).string().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Kind).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Products::IsStockTracked)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_code")
                        .table(Products::Table)
                        .col(Products::Code)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Machines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Machines::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Machines::Code).string().not_null())
                        .col(ColumnDef::new(Machines::Name).string().not_null())
                        .col(ColumnDef::new(Machines::MachineType).string().null())
                        .col(
                            ColumnDef::new(Machines::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Machines::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Machines::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_machines_code")
                        .table(Machines::Table)
                        .col(Machines::Code)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Machines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Code,
        Name,
        Kind,
        IsStockTracked,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Machines {
        Table,
        Id,
        Code,
        Name,
        MachineType,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_lot_ledger_tables {
    use sea_orm_migration::prelude::*;

    use super::m20240301_000001_create_catalog_tables::Products;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_lot_ledger_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryLots::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryLots::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLots::LotNumber).string().not_null())
                        .col(
                            ColumnDef::new(InventoryLots::InitialQuantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::CurrentQuantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::UnitCost)
                                .decimal()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryLots::SupplierId).big_integer().null())
                        .col(ColumnDef::new(InventoryLots::ReceivedDate).date().not_null())
                        .col(
                            ColumnDef::new(InventoryLots::Status)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLots::Notes).string().null())
                        .col(
                            ColumnDef::new(InventoryLots::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_lots_product")
                                .from(InventoryLots::Table, InventoryLots::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_lots_lot_number")
                        .table(InventoryLots::Table)
                        .col(InventoryLots::LotNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Covering index for the FIFO walk
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_lots_fifo")
                        .table(InventoryLots::Table)
                        .col(InventoryLots::ProductId)
                        .col(InventoryLots::ReceivedDate)
                        .col(InventoryLots::Id)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryTransactions::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::LotId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Direction)
                                .string_len(8)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Quantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ReferenceType)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ReferenceId)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryTransactions::Reason).string().null())
                        .col(
                            ColumnDef::new(InventoryTransactions::CreatedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_transactions_lot")
                                .from(InventoryTransactions::Table, InventoryTransactions::LotId)
                                .to(InventoryLots::Table, InventoryLots::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_lot_id")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::LotId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryTransactions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryLots::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryLots {
        Table,
        Id,
        ProductId,
        LotNumber,
        InitialQuantity,
        CurrentQuantity,
        UnitCost,
        SupplierId,
        ReceivedDate,
        Status,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryTransactions {
        Table,
        Id,
        LotId,
        ProductId,
        Direction,
        Quantity,
        ReferenceType,
        ReferenceId,
        Reason,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240301_000003_create_bom_items_table {
    use sea_orm_migration::prelude::*;

    use super::m20240301_000001_create_catalog_tables::Products;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_bom_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BomItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BomItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(BomItems::ParentProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomItems::ChildProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomItems::QuantityPer)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomItems::ScrapRate)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BomItems::SequenceOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(BomItems::Level).integer().not_null().default(1))
                        .col(ColumnDef::new(BomItems::OperationType).string().null())
                        .col(ColumnDef::new(BomItems::MachineType).string().null())
                        .col(ColumnDef::new(BomItems::CycleTimeSecs).integer().null())
                        .col(ColumnDef::new(BomItems::SetupTimeSecs).integer().null())
                        .col(
                            ColumnDef::new(BomItems::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(BomItems::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(BomItems::UpdatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_items_parent_product")
                                .from(BomItems::Table, BomItems::ParentProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_items_child_product")
                                .from(BomItems::Table, BomItems::ChildProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_items_parent")
                        .table(BomItems::Table)
                        .col(BomItems::ParentProductId)
                        .col(BomItems::SequenceOrder)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_items_child")
                        .table(BomItems::Table)
                        .col(BomItems::ChildProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BomItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum BomItems {
        Table,
        Id,
        ParentProductId,
        ChildProductId,
        QuantityPer,
        ScrapRate,
        SequenceOrder,
        Level,
        OperationType,
        MachineType,
        CycleTimeSecs,
        SetupTimeSecs,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_work_order_tables {
    use sea_orm_migration::prelude::*;

    use super::m20240301_000001_create_catalog_tables::{Machines, Products};

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_work_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WorkOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WorkOrders::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(WorkOrders::OrderNumber).string().not_null())
                        .col(
                            ColumnDef::new(WorkOrders::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WorkOrders::BomItemId).big_integer().null())
                        .col(ColumnDef::new(WorkOrders::SalesOrderId).big_integer().null())
                        .col(ColumnDef::new(WorkOrders::MachineId).big_integer().null())
                        .col(
                            ColumnDef::new(WorkOrders::PlannedQuantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::ProducedQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::ScrapQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(WorkOrders::Status).string_len(16).not_null())
                        .col(ColumnDef::new(WorkOrders::ActualStart).timestamp().null())
                        .col(ColumnDef::new(WorkOrders::ActualEnd).timestamp().null())
                        .col(ColumnDef::new(WorkOrders::Notes).string().null())
                        .col(ColumnDef::new(WorkOrders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(WorkOrders::UpdatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_work_orders_product")
                                .from(WorkOrders::Table, WorkOrders::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_work_orders_machine")
                                .from(WorkOrders::Table, WorkOrders::MachineId)
                                .to(Machines::Table, Machines::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_order_number")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_status")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WorkOrderOperations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WorkOrderOperations::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(WorkOrderOperations::WorkOrderId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrderOperations::Sequence)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrderOperations::Kind)
                                .string_len(24)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrderOperations::ProducedDelta)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(WorkOrderOperations::ScrapDelta)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(WorkOrderOperations::OperatorId).uuid().null())
                        .col(ColumnDef::new(WorkOrderOperations::Notes).string().null())
                        .col(
                            ColumnDef::new(WorkOrderOperations::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_work_order_operations_work_order")
                                .from(
                                    WorkOrderOperations::Table,
                                    WorkOrderOperations::WorkOrderId,
                                )
                                .to(WorkOrders::Table, WorkOrders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_order_operations_sequence")
                        .table(WorkOrderOperations::Table)
                        .col(WorkOrderOperations::WorkOrderId)
                        .col(WorkOrderOperations::Sequence)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WorkOrderOperations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(WorkOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WorkOrders {
        Table,
        Id,
        OrderNumber,
        ProductId,
        BomItemId,
        SalesOrderId,
        MachineId,
        PlannedQuantity,
        ProducedQuantity,
        ScrapQuantity,
        Status,
        ActualStart,
        ActualEnd,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum WorkOrderOperations {
        Table,
        Id,
        WorkOrderId,
        Sequence,
        Kind,
        ProducedDelta,
        ScrapDelta,
        OperatorId,
        Notes,
        CreatedAt,
    }
}
