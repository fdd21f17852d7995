use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        create_tables(manager).await?;
        create_indexes(manager).await?;
        create_sqlite_updated_at_trigger(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Telemetry::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Commands::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Devices::Table).to_owned())
            .await?;
        Ok(())
    }
}

async fn create_tables(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(Devices::Table)
                .if_not_exists()
                .col(ColumnDef::new(Devices::Id).string_len(64).primary_key())
                .col(ColumnDef::new(Devices::Name).string_len(120).not_null())
                .col(ColumnDef::new(Devices::Kind).string_len(20).not_null())
                .col(ColumnDef::new(Devices::Transport).string_len(20).not_null())
                .col(ColumnDef::new(Devices::Capabilities).json().not_null())
                .col(ColumnDef::new(Devices::Status).string_len(10).not_null())
                .col(ColumnDef::new(Devices::LastSeen).timestamp_with_time_zone())
                .col(ColumnDef::new(Devices::Firmware).string_len(64).not_null())
                .col(ColumnDef::new(Devices::Location).string_len(200).not_null())
                .col(
                    ColumnDef::new(Devices::Version)
                        .integer()
                        .not_null()
                        .default(0),
                )
                .col(
                    ColumnDef::new(Devices::CreatedAt)
                        .timestamp_with_time_zone()
                        .default(Expr::current_timestamp()),
                )
                .col(ColumnDef::new(Devices::UpdatedAt).timestamp_with_time_zone())
                .to_owned(),
        )
        .await?;

    manager
        .create_table(
            Table::create()
                .table(Commands::Table)
                .if_not_exists()
                .col(ColumnDef::new(Commands::Id).string_len(64).primary_key())
                .col(ColumnDef::new(Commands::DeviceId).string_len(64).not_null())
                .col(
                    ColumnDef::new(Commands::IdempotencyKey)
                        .string_len(200)
                        .not_null(),
                )
                .col(ColumnDef::new(Commands::Verb).string_len(100).not_null())
                .col(ColumnDef::new(Commands::Status).string_len(10).not_null())
                .col(ColumnDef::new(Commands::Result).text())
                .col(ColumnDef::new(Commands::LatencyMs).big_integer())
                .col(
                    ColumnDef::new(Commands::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .to_owned(),
        )
        .await?;

    manager
        .create_table(
            Table::create()
                .table(Telemetry::Table)
                .if_not_exists()
                .col(ColumnDef::new(Telemetry::Id).string_len(64).primary_key())
                .col(
                    ColumnDef::new(Telemetry::DeviceId)
                        .string_len(64)
                        .not_null(),
                )
                .col(
                    ColumnDef::new(Telemetry::Ts)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .col(ColumnDef::new(Telemetry::Payload).text().not_null())
                .to_owned(),
        )
        .await?;

    Ok(())
}

async fn create_indexes(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    // The authoritative deduplication mechanism: one command per
    // (device_id, idempotency_key), enforced by the database.
    manager
        .create_index(
            Index::create()
                .name("uidx_commands_device_key")
                .table(Commands::Table)
                .col(Commands::DeviceId)
                .col(Commands::IdempotencyKey)
                .unique()
                .if_not_exists()
                .to_owned(),
        )
        .await?;

    // Serves the startup reconciliation scan over stale pending commands.
    manager
        .create_index(
            Index::create()
                .name("idx_commands_status_created")
                .table(Commands::Table)
                .col(Commands::Status)
                .col(Commands::CreatedAt)
                .if_not_exists()
                .to_owned(),
        )
        .await?;

    // Serves the rolling-window pruning and the recent-telemetry read.
    manager
        .create_index(
            Index::create()
                .name("idx_telemetry_device_ts")
                .table(Telemetry::Table)
                .col(Telemetry::DeviceId)
                .col(Telemetry::Ts)
                .if_not_exists()
                .to_owned(),
        )
        .await?;

    Ok(())
}

/// SQLite column defaults do not support `ON UPDATE CURRENT_TIMESTAMP`, so an
/// `AFTER UPDATE` trigger maintains `devices.updated_at`. The `WHEN` clause
/// prevents infinite recursion.
async fn create_sqlite_updated_at_trigger(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    if manager.get_database_backend() != sea_orm::DatabaseBackend::Sqlite {
        return Ok(());
    }

    let sql = r#"
        CREATE TRIGGER IF NOT EXISTS "trg_devices_updated_at"
        AFTER UPDATE ON "devices"
        FOR EACH ROW
        WHEN NEW."updated_at" IS OLD."updated_at"
        BEGIN
            UPDATE "devices" SET "updated_at" = CURRENT_TIMESTAMP WHERE rowid = NEW.rowid;
        END;
        "#;

    manager
        .get_connection()
        .execute(sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Sqlite,
            sql.to_string(),
        ))
        .await?;

    Ok(())
}

#[derive(DeriveIden)]
enum Devices {
    Table,
    Id,
    Name,
    Kind,
    Transport,
    Capabilities,
    Status,
    LastSeen,
    Firmware,
    Location,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Commands {
    Table,
    Id,
    DeviceId,
    IdempotencyKey,
    Verb,
    Status,
    Result,
    LatencyMs,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Telemetry {
    Table,
    Id,
    DeviceId,
    Ts,
    Payload,
}
