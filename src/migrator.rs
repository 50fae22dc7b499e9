use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_picking_tables::Migration),
            Box::new(m20240301_000002_create_batch_ledger_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_picking_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_picking_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::picking_order
            manager
                .create_table(
                    Table::create()
                        .table(PickingOrders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(PickingOrders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(PickingOrders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(PickingOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(PickingOrders::PickingInProgress)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(PickingOrders::IsPicked)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(PickingOrders::BatchNumber).string().null())
                        .col(
                            ColumnDef::new(PickingOrders::BatchNumbers)
                                .text()
                                .not_null()
                                .default("[]"),
                        )
                        .col(
                            ColumnDef::new(PickingOrders::NextBoxNumber)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(PickingOrders::Revision)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PickingOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_picking_orders_order_number")
                        .table(PickingOrders::Table)
                        .col(PickingOrders::OrderNumber)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PickingOrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PickingOrderLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PickingOrderLines::OrderId).uuid().not_null())
                        .col(ColumnDef::new(PickingOrderLines::Position).integer().not_null())
                        .col(ColumnDef::new(PickingOrderLines::ProductId).uuid().not_null())
                        .col(ColumnDef::new(PickingOrderLines::ProductName).string().not_null())
                        .col(
                            ColumnDef::new(PickingOrderLines::OrderedQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PickingOrderLines::PickedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PickingOrderLines::OriginalQuantity)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PickingOrderLines::Checked)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(PickingOrderLines::BatchNumber).string().null())
                        .col(
                            ColumnDef::new(PickingOrderLines::PickedWeight)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PickingOrderLines::ManualWeight)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(PickingOrderLines::BoxNumber).integer().null())
                        .col(
                            ColumnDef::new(PickingOrderLines::RequiresWeightInput)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(PickingOrderLines::UnitWeight)
                                .big_integer()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_picking_order_lines_order")
                                .from(PickingOrderLines::Table, PickingOrderLines::OrderId)
                                .to(PickingOrders::Table, PickingOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_picking_order_lines_order_id")
                        .table(PickingOrderLines::Table)
                        .col(PickingOrderLines::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ShippingBoxes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(ShippingBoxes::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(ShippingBoxes::OrderId).uuid().not_null())
                        .col(ColumnDef::new(ShippingBoxes::BoxNumber).integer().not_null())
                        .col(
                            ColumnDef::new(ShippingBoxes::Completed)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ShippingBoxes::Saved)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(ShippingBoxes::BatchNumber).string().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_shipping_boxes_order")
                                .from(ShippingBoxes::Table, ShippingBoxes::OrderId)
                                .to(PickingOrders::Table, PickingOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // Box numbers are unique per order
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_shipping_boxes_order_box")
                        .table(ShippingBoxes::Table)
                        .col(ShippingBoxes::OrderId)
                        .col(ShippingBoxes::BoxNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ShippingBoxItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ShippingBoxItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ShippingBoxItems::BoxId).uuid().not_null())
                        .col(ColumnDef::new(ShippingBoxItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(ShippingBoxItems::Position).integer().not_null())
                        .col(ColumnDef::new(ShippingBoxItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ShippingBoxItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(ShippingBoxItems::Weight)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ShippingBoxItems::BatchNumber).string().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_shipping_box_items_box")
                                .from(ShippingBoxItems::Table, ShippingBoxItems::BoxId)
                                .to(ShippingBoxes::Table, ShippingBoxes::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_shipping_box_items_order_id")
                        .table(ShippingBoxItems::Table)
                        .col(ShippingBoxItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(MissingItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(MissingItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(MissingItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(MissingItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(MissingItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(MissingItems::Date)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MissingItems::Status).string().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_missing_items_order")
                                .from(MissingItems::Table, MissingItems::OrderId)
                                .to(PickingOrders::Table, PickingOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // At most one shortage record per product and order
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_missing_items_order_product")
                        .table(MissingItems::Table)
                        .col(MissingItems::OrderId)
                        .col(MissingItems::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderBatchSummaries::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderBatchSummaries::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderBatchSummaries::BatchNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderBatchSummaries::TotalWeight)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .primary_key(
                            Index::create()
                                .col(OrderBatchSummaries::OrderId)
                                .col(OrderBatchSummaries::BatchNumber),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_batch_summaries_order")
                                .from(OrderBatchSummaries::Table, OrderBatchSummaries::OrderId)
                                .to(PickingOrders::Table, PickingOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderBatchSummaries::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(MissingItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ShippingBoxItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ShippingBoxes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PickingOrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PickingOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PickingOrders {
        Table,
        Id,
        OrderNumber,
        Status,
        PickingInProgress,
        IsPicked,
        BatchNumber,
        BatchNumbers,
        NextBoxNumber,
        Revision,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PickingOrderLines {
        Table,
        Id,
        OrderId,
        Position,
        ProductId,
        ProductName,
        OrderedQuantity,
        PickedQuantity,
        OriginalQuantity,
        Checked,
        BatchNumber,
        PickedWeight,
        ManualWeight,
        BoxNumber,
        RequiresWeightInput,
        UnitWeight,
    }

    #[derive(DeriveIden)]
    enum ShippingBoxes {
        Table,
        Id,
        OrderId,
        BoxNumber,
        Completed,
        Saved,
        BatchNumber,
    }

    #[derive(DeriveIden)]
    enum ShippingBoxItems {
        Table,
        Id,
        BoxId,
        OrderId,
        Position,
        ProductId,
        Quantity,
        Weight,
        BatchNumber,
    }

    #[derive(DeriveIden)]
    enum MissingItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        Date,
        Status,
    }

    #[derive(DeriveIden)]
    enum OrderBatchSummaries {
        Table,
        OrderId,
        BatchNumber,
        TotalWeight,
    }
}

mod m20240301_000002_create_batch_ledger_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_batch_ledger_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::batch_usage
            manager
                .create_table(
                    Table::create()
                        .table(BatchUsages::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(BatchUsages::BatchNumber).string().not_null())
                        .col(ColumnDef::new(BatchUsages::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(BatchUsages::TotalWeight)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BatchUsages::UsedWeight)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BatchUsages::OrdersCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BatchUsages::FirstUsed)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BatchUsages::LastUsed)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(BatchUsages::BatchNumber)
                                .col(BatchUsages::ProductId),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BatchUsageContributions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BatchUsageContributions::OrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BatchUsageContributions::BatchNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BatchUsageContributions::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BatchUsageContributions::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BatchUsageContributions::Weight)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BatchUsageContributions::RecordedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(BatchUsageContributions::OrderId)
                                .col(BatchUsageContributions::BatchNumber)
                                .col(BatchUsageContributions::ProductId),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BatchUsageContributions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(BatchUsages::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum BatchUsages {
        Table,
        BatchNumber,
        ProductId,
        TotalWeight,
        UsedWeight,
        OrdersCount,
        FirstUsed,
        LastUsed,
    }

    #[derive(DeriveIden)]
    enum BatchUsageContributions {
        Table,
        OrderId,
        BatchNumber,
        ProductId,
        Quantity,
        Weight,
        RecordedAt,
    }
}

// Database migration CLI runner
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
