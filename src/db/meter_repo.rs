use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::{from_db_timestamp, parse_column, to_db_timestamp};
use crate::models::{LatestReading, Meter, MeterUpdate, MeterWithLatestReading, NewMeter};

#[derive(Clone)]
pub struct MeterRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct MeterRow {
    id: i64,
    name: String,
    location: Option<String>,
    meter_type: String,
    unit: String,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct MeterListRow {
    #[sqlx(flatten)]
    meter: MeterRow,
    latest_value: Option<f64>,
    latest_reading_date: Option<String>,
}

impl MeterRow {
    fn into_meter(self) -> Result<Meter, sqlx::Error> {
        Ok(Meter {
            id: self.id,
            name: self.name,
            location: self.location,
            meter_type: parse_column(&self.meter_type)?,
            unit: self.unit,
            created_at: from_db_timestamp(&self.created_at)?,
            updated_at: from_db_timestamp(&self.updated_at)?,
        })
    }
}

impl MeterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, meter: &NewMeter) -> Result<Meter, sqlx::Error> {
        let now = to_db_timestamp(&Utc::now());
        let location = meter.location.as_deref().filter(|l| !l.is_empty());

        let result = sqlx::query(
            r#"
            INSERT INTO meters (name, location, meter_type, unit, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&meter.name)
        .bind(location)
        .bind(meter.meter_type.to_string())
        .bind(&meter.unit)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Meter>, sqlx::Error> {
        let row: Option<MeterRow> = sqlx::query_as("SELECT * FROM meters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MeterRow::into_meter).transpose()
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Meter>, sqlx::Error> {
        let row: Option<MeterRow> = sqlx::query_as("SELECT * FROM meters WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MeterRow::into_meter).transpose()
    }

    pub async fn exists(&self, id: i64) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM meters WHERE id = ? LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// All meters ordered by name, each with its most recent reading.
    pub async fn list(&self) -> Result<Vec<MeterWithLatestReading>, sqlx::Error> {
        let rows: Vec<MeterListRow> = sqlx::query_as(
            r#"
            SELECT
                m.*,
                (SELECT r.value FROM readings r WHERE r.meter_id = m.id
                 ORDER BY r.reading_date DESC, r.created_at DESC, r.id DESC LIMIT 1) AS latest_value,
                (SELECT r.reading_date FROM readings r WHERE r.meter_id = m.id
                 ORDER BY r.reading_date DESC, r.created_at DESC, r.id DESC LIMIT 1) AS latest_reading_date
            FROM meters m
            ORDER BY m.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut meters = Vec::with_capacity(rows.len());
        for row in rows {
            let latest_reading = match (row.latest_value, row.latest_reading_date) {
                (Some(value), Some(date)) => Some(LatestReading {
                    value,
                    reading_date: from_db_timestamp(&date)?,
                }),
                _ => None,
            };
            meters.push(MeterWithLatestReading {
                meter: row.meter.into_meter()?,
                latest_reading,
            });
        }
        Ok(meters)
    }

    /// Applies a partial update. Returns `None` if the meter does not exist.
    pub async fn update(&self, id: i64, update: &MeterUpdate) -> Result<Option<Meter>, sqlx::Error> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE meters SET updated_at = ");
        builder.push_bind(to_db_timestamp(&Utc::now()));

        if let Some(name) = &update.name {
            builder.push(", name = ").push_bind(name.clone());
        }
        if let Some(location) = &update.location {
            let location = (!location.is_empty()).then(|| location.clone());
            builder.push(", location = ").push_bind(location);
        }
        if let Some(meter_type) = update.meter_type {
            builder.push(", meter_type = ").push_bind(meter_type.to_string());
        }
        if let Some(unit) = &update.unit {
            builder.push(", unit = ").push_bind(unit.clone());
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Deletes a meter; its readings go with it (ON DELETE CASCADE).
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM meters WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_db;
    use crate::db::ReadingRepository;
    use crate::models::{MeterType, NewReading};
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_create_and_get_meter() {
        let db = setup_db().await;
        let repo = MeterRepository::new(db.pool.clone());

        let created = repo
            .create(&NewMeter::new("Lader").with_location("Garasje"))
            .await
            .unwrap();
        assert_eq!(created.name, "Lader");
        assert_eq!(created.meter_type, MeterType::Electric);
        assert_eq!(created.unit, "kWh");
        assert_eq!(created.location.as_deref(), Some("Garasje"));

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);

        let by_name = repo.get_by_name("Lader").await.unwrap();
        assert_eq!(by_name.map(|m| m.id), Some(created.id));
        assert!(repo.exists(created.id).await.unwrap());
        assert!(!repo.exists(created.id + 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_location_is_stored_as_none() {
        let db = setup_db().await;
        let repo = MeterRepository::new(db.pool.clone());

        let created = repo
            .create(&NewMeter::new("Vann").with_location(""))
            .await
            .unwrap();
        assert!(created.location.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_unique_violation() {
        let db = setup_db().await;
        let repo = MeterRepository::new(db.pool.clone());

        repo.create(&NewMeter::new("Lader")).await.unwrap();
        let err = repo.create(&NewMeter::new("Lader")).await.unwrap_err();
        match err {
            sqlx::Error::Database(db_err) => assert!(db_err.is_unique_violation()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_sorted_with_latest_reading() {
        let db = setup_db().await;
        let repo = MeterRepository::new(db.pool.clone());
        let readings = ReadingRepository::new(db.pool.clone());

        let water = repo
            .create(&NewMeter::new("Vann").with_meter_type(MeterType::Water))
            .await
            .unwrap();
        repo.create(&NewMeter::new("Lader")).await.unwrap();

        let older = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap();
        readings
            .create(&NewReading::new(water.id, 10.0).with_reading_date(newer))
            .await
            .unwrap();
        readings
            .create(&NewReading::new(water.id, 5.0).with_reading_date(older))
            .await
            .unwrap();

        let meters = repo.list().await.unwrap();
        assert_eq!(meters.len(), 2);
        assert_eq!(meters[0].meter.name, "Lader");
        assert!(meters[0].latest_reading.is_none());
        assert_eq!(meters[1].meter.name, "Vann");

        let latest = meters[1].latest_reading.as_ref().unwrap();
        assert_eq!(latest.value, 10.0);
        assert_eq!(latest.reading_date, newer);
    }

    #[tokio::test]
    async fn test_partial_update() {
        let db = setup_db().await;
        let repo = MeterRepository::new(db.pool.clone());

        let created = repo
            .create(&NewMeter::new("Varmepumpe").with_location("Stue"))
            .await
            .unwrap();

        let update = MeterUpdate {
            meter_type: Some(MeterType::Heat),
            location: Some(String::new()),
            ..Default::default()
        };
        let updated = repo.update(created.id, &update).await.unwrap().unwrap();
        assert_eq!(updated.name, "Varmepumpe");
        assert_eq!(updated.meter_type, MeterType::Heat);
        assert!(updated.location.is_none());
        assert!(updated.updated_at >= created.updated_at);

        let missing = repo.update(9999, &update).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_meter_cascades() {
        let db = setup_db().await;
        let repo = MeterRepository::new(db.pool.clone());
        let readings = ReadingRepository::new(db.pool.clone());

        let meter = repo.create(&NewMeter::new("Gass")).await.unwrap();
        let reading = readings
            .create(&NewReading::new(meter.id, 42.0))
            .await
            .unwrap();

        assert!(repo.delete(meter.id).await.unwrap());
        assert!(repo.get_by_id(meter.id).await.unwrap().is_none());
        assert!(readings.get_by_id(reading.id).await.unwrap().is_none());

        assert!(!repo.delete(meter.id).await.unwrap());
    }
}
