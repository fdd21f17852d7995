use crate::get_db_connection;
use bridge_error::StorageResult;
use bridge_models::entities::prelude::{
    Telemetry, TelemetryActiveModel, TelemetryColumn, TelemetryModel,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

/// Repository for the rolling per-device telemetry window.
pub struct TelemetryRepository;

impl TelemetryRepository {
    /// Persist one sample and prune everything beyond the newest `window`
    /// rows for the device.
    pub async fn append<C>(
        device_id: &str,
        payload: &str,
        window: u64,
        db: Option<&C>,
    ) -> StorageResult<TelemetryModel>
    where
        C: ConnectionTrait,
    {
        match db {
            Some(conn) => Self::append_on(device_id, payload, window, conn).await,
            None => {
                let conn = get_db_connection().await?;
                Self::append_on(device_id, payload, window, &conn).await
            }
        }
    }

    async fn append_on<C>(
        device_id: &str,
        payload: &str,
        window: u64,
        conn: &C,
    ) -> StorageResult<TelemetryModel>
    where
        C: ConnectionTrait,
    {
        let sample = TelemetryActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            device_id: Set(device_id.to_string()),
            ts: Set(Utc::now()),
            payload: Set(payload.to_string()),
        };
        let inserted = sample.insert(conn).await?;

        // Keep the newest `window` ids (ts desc, id desc as a tiebreak) and
        // drop the rest for this device.
        let keep: Vec<String> = Telemetry::find()
            .select_only()
            .column(TelemetryColumn::Id)
            .filter(TelemetryColumn::DeviceId.eq(device_id))
            .order_by_desc(TelemetryColumn::Ts)
            .order_by_desc(TelemetryColumn::Id)
            .limit(window)
            .into_tuple()
            .all(conn)
            .await?;

        Telemetry::delete_many()
            .filter(TelemetryColumn::DeviceId.eq(device_id))
            .filter(TelemetryColumn::Id.is_not_in(keep))
            .exec(conn)
            .await?;

        Ok(inserted)
    }

    /// Newest samples for a device, newest first.
    pub async fn recent(device_id: &str, limit: u64) -> StorageResult<Vec<TelemetryModel>> {
        let conn = get_db_connection().await?;
        Ok(Telemetry::find()
            .filter(TelemetryColumn::DeviceId.eq(device_id))
            .order_by_desc(TelemetryColumn::Ts)
            .order_by_desc(TelemetryColumn::Id)
            .limit(limit)
            .all(&conn)
            .await?)
    }

    /// Retained sample count for a device.
    pub async fn count_for(device_id: &str) -> StorageResult<u64> {
        let conn = get_db_connection().await?;
        Ok(Telemetry::find()
            .filter(TelemetryColumn::DeviceId.eq(device_id))
            .count(&conn)
            .await?)
    }
}
