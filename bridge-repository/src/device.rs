use crate::get_db_connection;
use bridge_error::{storage::StorageError, StorageResult};
use bridge_models::{
    domain::prelude::{CursorPage, DevicePageParams, UpdateDevice},
    entities::prelude::{Device, DeviceColumn, DeviceModel},
    enums::common::DeviceStatus,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, QueryTrait,
};

/// Repository for device operations
pub struct DeviceRepository;

impl DeviceRepository {
    /// Find device by ID
    pub async fn find_by_id<C>(id: &str, db: Option<&C>) -> StorageResult<Option<DeviceModel>>
    where
        C: ConnectionTrait,
    {
        match db {
            Some(conn) => Ok(Device::find_by_id(id).one(conn).await?),
            None => {
                let conn = get_db_connection().await?;
                Ok(Device::find_by_id(id).one(&conn).await?)
            }
        }
    }

    /// Find all devices (used by the liveness sweep)
    pub async fn find_all<C>(db: Option<&C>) -> StorageResult<Vec<DeviceModel>>
    where
        C: ConnectionTrait,
    {
        let query = Device::find().order_by(DeviceColumn::Id, Order::Asc);
        match db {
            Some(conn) => Ok(query.all(conn).await?),
            None => {
                let conn = get_db_connection().await?;
                Ok(query.all(&conn).await?)
            }
        }
    }

    /// Keyset-paginated listing on device id with optional filters.
    pub async fn list_page(params: DevicePageParams) -> StorageResult<CursorPage<DeviceModel>> {
        let conn = get_db_connection().await?;
        let page_size = params.page_size.unwrap_or(25).min(100);

        let mut items = Device::find()
            .apply_if(params.status, |q, status| {
                q.filter(DeviceColumn::Status.eq(status))
            })
            .apply_if(params.kind, |q, kind| q.filter(DeviceColumn::Kind.eq(kind)))
            .apply_if(params.name.as_ref(), |q, name| {
                q.filter(DeviceColumn::Name.like(format!("%{name}%")))
            })
            .apply_if(params.after.clone(), |q, after| {
                q.filter(DeviceColumn::Id.gt(after))
            })
            .order_by(DeviceColumn::Id, Order::Asc)
            .limit(page_size + 1)
            .all(&conn)
            .await?;

        // One extra row tells us whether another page exists.
        let next = if items.len() as u64 > page_size {
            items.truncate(page_size as usize);
            items.last().map(|d| d.id.clone())
        } else {
            None
        };

        Ok(CursorPage { items, next })
    }

    /// Refresh the last-seen mark; optionally force the device online (the
    /// explicit heartbeat path). Returns false when the device is unknown.
    pub async fn touch_last_seen<C>(
        id: &str,
        force_online: bool,
        db: Option<&C>,
    ) -> StorageResult<bool>
    where
        C: ConnectionTrait,
    {
        let mut update = Device::update_many()
            .col_expr(DeviceColumn::LastSeen, Expr::value(Some(Utc::now())))
            .filter(DeviceColumn::Id.eq(id));
        if force_online {
            update = update.col_expr(DeviceColumn::Status, Expr::value(DeviceStatus::Online));
        }
        let res = match db {
            Some(conn) => update.exec(conn).await?,
            None => {
                let conn = get_db_connection().await?;
                update.exec(&conn).await?
            }
        };
        Ok(res.rows_affected > 0)
    }

    /// Set reachability status inside a caller-provided transaction (the
    /// sweep batches its writes) or on a fresh connection.
    pub async fn set_status<C>(id: &str, status: DeviceStatus, db: Option<&C>) -> StorageResult<()>
    where
        C: ConnectionTrait,
    {
        let update = Device::update_many()
            .col_expr(DeviceColumn::Status, Expr::value(status))
            .filter(DeviceColumn::Id.eq(id));
        match db {
            Some(conn) => {
                update.exec(conn).await?;
            }
            None => {
                let conn = get_db_connection().await?;
                update.exec(&conn).await?;
            }
        }
        Ok(())
    }

    /// Apply an operator update with optimistic-concurrency protection: the
    /// write only lands when the caller's version token is current.
    pub async fn apply_update(id: &str, update: UpdateDevice) -> StorageResult<DeviceModel> {
        let conn = get_db_connection().await?;
        let expected_version = update.version;

        let mut stmt = Device::update_many()
            .col_expr(
                DeviceColumn::Version,
                Expr::col(DeviceColumn::Version).add(1),
            )
            .filter(DeviceColumn::Id.eq(id))
            .filter(DeviceColumn::Version.eq(expected_version));
        if let Some(name) = update.name {
            stmt = stmt.col_expr(DeviceColumn::Name, Expr::value(name));
        }
        if let Some(location) = update.location {
            stmt = stmt.col_expr(DeviceColumn::Location, Expr::value(location));
        }
        if let Some(firmware) = update.firmware {
            stmt = stmt.col_expr(DeviceColumn::Firmware, Expr::value(firmware));
        }

        let res = stmt.exec(&conn).await?;
        if res.rows_affected == 0 {
            // Distinguish a missing device from a stale token.
            return match Device::find_by_id(id).one(&conn).await? {
                None => Err(StorageError::EntityNotFound(format!("device {id}"))),
                Some(current) => Err(StorageError::VersionConflict(format!(
                    "device {id}: expected version {expected_version}, found {}",
                    current.version
                ))),
            };
        }

        Device::find_by_id(id)
            .one(&conn)
            .await?
            .ok_or_else(|| StorageError::EntityNotFound(format!("device {id}")))
    }

    /// Count all devices
    pub async fn count_total() -> StorageResult<u64> {
        let conn = get_db_connection().await?;
        Ok(Device::find().count(&conn).await?)
    }

    /// Count devices in a given reachability status
    pub async fn count_by_status(status: DeviceStatus) -> StorageResult<u64> {
        let conn = get_db_connection().await?;
        Ok(Device::find()
            .filter(DeviceColumn::Status.eq(status))
            .count(&conn)
            .await?)
    }
}
