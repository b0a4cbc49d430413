use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_catalog_tables::Migration),
            Box::new(m20240301_000002_create_customer_tables::Migration),
            Box::new(m20240301_000003_create_pending_carts_table::Migration),
            Box::new(m20240301_000004_create_orders_tables::Migration),
        ]
    }
}

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
                        .col(ColumnDef::new(Products::Name).string_len(255).not_null())
                        .col(ColumnDef::new(Products::ImageUrl).string().null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::SalesCount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Toppings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Toppings::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Toppings::Name).string_len(120).not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Fillings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Fillings::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Fillings::Name).string_len(120).not_null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Fillings::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Toppings::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        ImageUrl,
        Price,
        SalesCount,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Toppings {
        Table,
        Id,
        Name,
    }

    #[derive(DeriveIden)]
    enum Fillings {
        Table,
        Id,
        Name,
    }
}

mod m20240301_000002_create_customer_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_customer_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Customers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Customers::Email).string_len(255).not_null())
                        .col(ColumnDef::new(Customers::FullName).string().null())
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Owner ids come from the identity provider, so there is no FK to customers.
            manager
                .create_table(
                    Table::create()
                        .table(PushDestinations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PushDestinations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PushDestinations::OwnerId).uuid().not_null())
                        .col(ColumnDef::new(PushDestinations::Token).string().not_null())
                        .col(
                            ColumnDef::new(PushDestinations::Platform)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PushDestinations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PushDestinations::UpdatedAt)
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
                        .name("ux_push_destinations_owner_id")
                        .table(PushDestinations::Table)
                        .col(PushDestinations::OwnerId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PushDestinations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Customers {
        Table,
        Id,
        Email,
        FullName,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum PushDestinations {
        Table,
        Id,
        OwnerId,
        Token,
        Platform,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_pending_carts_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_pending_carts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PendingCarts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PendingCarts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PendingCarts::OwnerId).uuid().null())
                        .col(
                            ColumnDef::new(PendingCarts::DeliveryType)
                                .string_len(10)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PendingCarts::DeliveryDetails).json().null())
                        .col(ColumnDef::new(PendingCarts::Lines).json().not_null())
                        .col(
                            ColumnDef::new(PendingCarts::Total)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PendingCarts::Status)
                                .string_len(10)
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(PendingCarts::GatewayToken).string().null())
                        .col(
                            ColumnDef::new(PendingCarts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PendingCarts::PaidAt)
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
                        .name("idx_pending_carts_gateway_token")
                        .table(PendingCarts::Table)
                        .col(PendingCarts::GatewayToken)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PendingCarts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PendingCarts {
        Table,
        Id,
        OwnerId,
        DeliveryType,
        DeliveryDetails,
        Lines,
        Total,
        Status,
        GatewayToken,
        CreatedAt,
        PaidAt,
    }
}

mod m20240301_000004_create_orders_tables {
    use super::m20240301_000003_create_pending_carts_table::PendingCarts;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::PendingCartId).uuid().not_null())
                        .col(ColumnDef::new(Orders::OwnerId).uuid().null())
                        .col(
                            ColumnDef::new(Orders::DeliveryType)
                                .string_len(10)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::DeliveryDetails).json().null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::Total).decimal().not_null())
                        .col(ColumnDef::new(Orders::AuthorizationCode).string().null())
                        .col(ColumnDef::new(Orders::BuyOrder).string_len(26).null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DeliveryDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_pending_cart_id")
                                .from(Orders::Table, Orders::PendingCartId)
                                .to(PendingCarts::Table, PendingCarts::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            // The idempotency guard of payment commits relies on this index.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("ux_orders_pending_cart_id")
                        .table(Orders::Table)
                        .col(Orders::PendingCartId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_owner_id")
                        .table(Orders::Table)
                        .col(Orders::OwnerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderLines::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderLines::ProductId).big_integer().not_null())
                        .col(ColumnDef::new(OrderLines::ToppingId).big_integer().null())
                        .col(ColumnDef::new(OrderLines::FillingId).big_integer().null())
                        .col(ColumnDef::new(OrderLines::CustomMessage).string().null())
                        .col(ColumnDef::new(OrderLines::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderLines::UnitPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderLines::ProductNameSnapshot)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderLines::ProductImageSnapshot)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OrderLines::ToppingNameSnapshot)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OrderLines::FillingNameSnapshot)
                                .string()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_lines_order_id")
                                .from(OrderLines::Table, OrderLines::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_lines_order_id")
                        .table(OrderLines::Table)
                        .col(OrderLines::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        PendingCartId,
        OwnerId,
        DeliveryType,
        DeliveryDetails,
        Status,
        Total,
        AuthorizationCode,
        BuyOrder,
        CreatedAt,
        UpdatedAt,
        DeliveryDate,
    }

    #[derive(DeriveIden)]
    enum OrderLines {
        Table,
        Id,
        OrderId,
        ProductId,
        ToppingId,
        FillingId,
        CustomMessage,
        Quantity,
        UnitPrice,
        ProductNameSnapshot,
        ProductImageSnapshot,
        ToppingNameSnapshot,
        FillingNameSnapshot,
    }
}
