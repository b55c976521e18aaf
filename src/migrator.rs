use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_tenancy_tables::Migration),
            Box::new(m20240301_000002_create_catalog_tables::Migration),
            Box::new(m20240301_000003_create_sales_tables::Migration),
            Box::new(m20240301_000004_create_alerting_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_tenancy_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_tenancy_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Businesses::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Businesses::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Businesses::Name).string().not_null())
                        .col(ColumnDef::new(Businesses::Email).string().null())
                        .col(ColumnDef::new(Businesses::Phone).string().null())
                        .col(
                            ColumnDef::new(Businesses::Currency)
                                .string_len(3)
                                .not_null()
                                .default("USD"),
                        )
                        .col(
                            ColumnDef::new(Businesses::AlertChannel)
                                .string_len(16)
                                .not_null()
                                .default("email"),
                        )
                        .col(
                            ColumnDef::new(Businesses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Businesses::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Locations::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Locations::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Locations::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(Locations::Name).string().not_null())
                        .col(ColumnDef::new(Locations::Address).string().null())
                        .col(
                            ColumnDef::new(Locations::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Locations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Locations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_locations_business")
                                .from(Locations::Table, Locations::BusinessId)
                                .to(Businesses::Table, Businesses::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_locations_business_id")
                        .table(Locations::Table)
                        .col(Locations::BusinessId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Locations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Businesses::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Businesses {
        Table,
        Id,
        Name,
        Email,
        Phone,
        Currency,
        AlertChannel,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum Locations {
        Table,
        Id,
        BusinessId,
        Name,
        Address,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_catalog_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Suppliers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Suppliers::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(Suppliers::Name).string().not_null())
                        .col(ColumnDef::new(Suppliers::ContactName).string().null())
                        .col(ColumnDef::new(Suppliers::Email).string().null())
                        .col(ColumnDef::new(Suppliers::Phone).string().null())
                        .col(ColumnDef::new(Suppliers::Address).string().null())
                        .col(
                            ColumnDef::new(Suppliers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Suppliers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_suppliers_business_id")
                        .table(Suppliers::Table)
                        .col(Suppliers::BusinessId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Sku).string_len(64).not_null())
                        .col(ColumnDef::new(Products::Category).string().null())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::CostPrice).decimal_len(12, 2).null())
                        .col(
                            ColumnDef::new(Products::ReorderLevel)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::SupplierId).uuid().null())
                        .col(ColumnDef::new(Products::ExpiryDate).date().null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_business_sku")
                        .table(Products::Table)
                        .col(Products::BusinessId)
                        .col(Products::Sku)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductStock::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductStock::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductStock::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ProductStock::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(ProductStock::Quantity)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(ProductStock::Quantity).gte(0)),
                        )
                        .col(
                            ColumnDef::new(ProductStock::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_stock_product")
                                .from(ProductStock::Table, ProductStock::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_stock_product_location")
                        .table(ProductStock::Table)
                        .col(ProductStock::ProductId)
                        .col(ProductStock::LocationId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::LocationId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::Delta).integer().not_null())
                        .col(
                            ColumnDef::new(StockMovements::QuantityAfter)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::Reason)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::ReferenceId).uuid().null())
                        .col(ColumnDef::new(StockMovements::Note).string().null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_product_id")
                        .table(StockMovements::Table)
                        .col(StockMovements::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductStock::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Suppliers {
        Table,
        Id,
        BusinessId,
        Name,
        ContactName,
        Email,
        Phone,
        Address,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum Products {
        Table,
        Id,
        BusinessId,
        Name,
        Sku,
        Category,
        Description,
        Price,
        CostPrice,
        ReorderLevel,
        SupplierId,
        ExpiryDate,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum ProductStock {
        Table,
        Id,
        ProductId,
        LocationId,
        Quantity,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum StockMovements {
        Table,
        Id,
        BusinessId,
        ProductId,
        LocationId,
        Delta,
        QuantityAfter,
        Reason,
        ReferenceId,
        Note,
        CreatedAt,
    }
}

mod m20240301_000003_create_sales_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Transactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Transactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Transactions::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(Transactions::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(Transactions::ReceiptNumber)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::PaymentMethod)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::Subtotal)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::Total)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::AmountReceived)
                                .decimal_len(12, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::ChangeGiven)
                                .decimal_len(12, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::Status)
                                .string_len(16)
                                .not_null()
                                .default("completed"),
                        )
                        .col(
                            ColumnDef::new(Transactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::VoidedAt)
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
                        .name("idx_transactions_business_created")
                        .table(Transactions::Table)
                        .col(Transactions::BusinessId)
                        .col(Transactions::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TransactionItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TransactionItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionItems::TransactionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransactionItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(TransactionItems::ProductName).string().not_null())
                        .col(ColumnDef::new(TransactionItems::Sku).string_len(64).not_null())
                        .col(ColumnDef::new(TransactionItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(TransactionItems::UnitPrice)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionItems::LineTotal)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_transaction_items_transaction")
                                .from(TransactionItems::Table, TransactionItems::TransactionId)
                                .to(Transactions::Table, Transactions::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transaction_items_transaction_id")
                        .table(TransactionItems::Table)
                        .col(TransactionItems::TransactionId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TransactionItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Transactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Transactions {
        Table,
        Id,
        BusinessId,
        LocationId,
        ReceiptNumber,
        PaymentMethod,
        Subtotal,
        Total,
        AmountReceived,
        ChangeGiven,
        Status,
        CreatedAt,
        VoidedAt,
    }

    #[derive(DeriveIden)]
    pub enum TransactionItems {
        Table,
        Id,
        TransactionId,
        ProductId,
        ProductName,
        Sku,
        Quantity,
        UnitPrice,
        LineTotal,
    }
}

mod m20240301_000004_create_alerting_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_alerting_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockAlerts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(StockAlerts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(StockAlerts::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(StockAlerts::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockAlerts::LocationId).uuid().null())
                        .col(ColumnDef::new(StockAlerts::Message).text().not_null())
                        .col(ColumnDef::new(StockAlerts::Channel).string_len(16).not_null())
                        .col(
                            ColumnDef::new(StockAlerts::Status)
                                .string_len(16)
                                .not_null()
                                .default("unread"),
                        )
                        .col(ColumnDef::new(StockAlerts::Quantity).integer().not_null())
                        .col(ColumnDef::new(StockAlerts::ReorderLevel).integer().not_null())
                        .col(
                            ColumnDef::new(StockAlerts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAlerts::ReadAt)
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
                        .name("idx_stock_alerts_business_status")
                        .table(StockAlerts::Table)
                        .col(StockAlerts::BusinessId)
                        .col(StockAlerts::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(NotificationOutbox::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(NotificationOutbox::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(NotificationOutbox::AlertId).uuid().null())
                        .col(
                            ColumnDef::new(NotificationOutbox::Channel)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(NotificationOutbox::Recipient).string().not_null())
                        .col(ColumnDef::new(NotificationOutbox::Subject).string().not_null())
                        .col(ColumnDef::new(NotificationOutbox::Body).text().not_null())
                        .col(
                            ColumnDef::new(NotificationOutbox::Status)
                                .string_len(16)
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(NotificationOutbox::Attempts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(NotificationOutbox::AvailableAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(NotificationOutbox::LastError).text().null())
                        .col(
                            ColumnDef::new(NotificationOutbox::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NotificationOutbox::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NotificationOutbox::DeliveredAt)
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
                        .name("idx_notification_outbox_status_available")
                        .table(NotificationOutbox::Table)
                        .col(NotificationOutbox::Status)
                        .col(NotificationOutbox::AvailableAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(NotificationOutbox::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockAlerts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum StockAlerts {
        Table,
        Id,
        BusinessId,
        ProductId,
        LocationId,
        Message,
        Channel,
        Status,
        Quantity,
        ReorderLevel,
        CreatedAt,
        ReadAt,
    }

    #[derive(DeriveIden)]
    pub enum NotificationOutbox {
        Table,
        Id,
        AlertId,
        Channel,
        Recipient,
        Subject,
        Body,
        Status,
        Attempts,
        AvailableAt,
        LastError,
        CreatedAt,
        UpdatedAt,
        DeliveredAt,
    }
}
