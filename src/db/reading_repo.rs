use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::{from_db_timestamp, parse_column, to_db_timestamp};
use crate::models::{
    NewReading, PaginatedReadings, Pagination, Reading, ReadingFilters, ReadingStatistics,
    ReadingUpdate, ReadingWithMeter,
};

const SELECT_WITH_METER: &str = r#"
    SELECT
        r.id, r.meter_id, r.value, r.reading_date, r.image_path, r.input_method,
        r.synced_to_sheets, r.notes, r.created_at,
        m.name AS meter_name,
        m.location AS meter_location,
        m.unit AS meter_unit
    FROM readings r
    INNER JOIN meters m ON r.meter_id = m.id
"#;

#[derive(Clone)]
pub struct ReadingRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ReadingRow {
    id: i64,
    meter_id: i64,
    value: f64,
    reading_date: String,
    image_path: Option<String>,
    input_method: String,
    synced_to_sheets: bool,
    notes: Option<String>,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct ReadingWithMeterRow {
    #[sqlx(flatten)]
    reading: ReadingRow,
    meter_name: String,
    meter_location: Option<String>,
    meter_unit: String,
}

#[derive(sqlx::FromRow)]
struct StatisticsRow {
    total_readings: i64,
    latest_reading_date: Option<String>,
    average_value: Option<f64>,
    min_value: Option<f64>,
    max_value: Option<f64>,
}

impl ReadingRow {
    fn into_reading(self) -> Result<Reading, sqlx::Error> {
        Ok(Reading {
            id: self.id,
            meter_id: self.meter_id,
            value: self.value,
            reading_date: from_db_timestamp(&self.reading_date)?,
            image_path: self.image_path,
            input_method: parse_column(&self.input_method)?,
            synced_to_sheets: self.synced_to_sheets,
            notes: self.notes,
            created_at: from_db_timestamp(&self.created_at)?,
        })
    }
}

impl ReadingWithMeterRow {
    fn into_reading_with_meter(self) -> Result<ReadingWithMeter, sqlx::Error> {
        Ok(ReadingWithMeter {
            reading: self.reading.into_reading()?,
            meter_name: self.meter_name,
            meter_location: self.meter_location,
            meter_unit: self.meter_unit,
        })
    }
}

fn hydrate_all(rows: Vec<ReadingWithMeterRow>) -> Result<Vec<ReadingWithMeter>, sqlx::Error> {
    rows.into_iter()
        .map(ReadingWithMeterRow::into_reading_with_meter)
        .collect()
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filters: &ReadingFilters) {
    builder.push(" WHERE 1 = 1");

    if let Some(meter_id) = filters.meter_id {
        builder.push(" AND r.meter_id = ").push_bind(meter_id);
    }
    if let Some(start) = &filters.start_date {
        builder
            .push(" AND r.reading_date >= ")
            .push_bind(to_db_timestamp(start));
    }
    if let Some(end) = &filters.end_date {
        builder
            .push(" AND r.reading_date <= ")
            .push_bind(to_db_timestamp(end));
    }
    if let Some(synced) = filters.synced_to_sheets {
        builder.push(" AND r.synced_to_sheets = ").push_bind(synced);
    }
    if let Some(method) = filters.input_method {
        builder
            .push(" AND r.input_method = ")
            .push_bind(method.to_string());
    }
}

impl ReadingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, reading: &NewReading) -> Result<Reading, sqlx::Error> {
        let now = Utc::now();
        let reading_date = reading.reading_date.unwrap_or(now);

        let result = sqlx::query(
            r#"
            INSERT INTO readings (meter_id, value, reading_date, image_path, input_method, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(reading.meter_id)
        .bind(reading.value)
        .bind(to_db_timestamp(&reading_date))
        .bind(&reading.image_path)
        .bind(reading.input_method.to_string())
        .bind(reading.notes.as_deref().filter(|n| !n.is_empty()))
        .bind(to_db_timestamp(&now))
        .execute(&self.pool)
        .await?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Reading>, sqlx::Error> {
        let row: Option<ReadingRow> = sqlx::query_as("SELECT * FROM readings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ReadingRow::into_reading).transpose()
    }

    /// Filtered, paginated listing, newest first.
    pub async fn find_all(
        &self,
        filters: &ReadingFilters,
        pagination: Pagination,
    ) -> Result<PaginatedReadings, sqlx::Error> {
        let mut count = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM readings r INNER JOIN meters m ON r.meter_id = m.id",
        );
        push_filters(&mut count, filters);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(SELECT_WITH_METER);
        push_filters(&mut select, filters);
        select
            .push(" ORDER BY r.reading_date DESC, r.created_at DESC, r.id DESC LIMIT ")
            .push_bind(pagination.limit)
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let rows: Vec<ReadingWithMeterRow> =
            select.build_query_as().fetch_all(&self.pool).await?;

        Ok(PaginatedReadings {
            readings: hydrate_all(rows)?,
            total,
            page: pagination.page,
            limit: pagination.limit,
            total_pages: pagination.total_pages(total),
        })
    }

    pub async fn find_by_meter(
        &self,
        meter_id: i64,
        pagination: Pagination,
    ) -> Result<PaginatedReadings, sqlx::Error> {
        let filters = ReadingFilters {
            meter_id: Some(meter_id),
            ..Default::default()
        };
        self.find_all(&filters, pagination).await
    }

    pub async fn latest_for_meter(&self, meter_id: i64) -> Result<Option<Reading>, sqlx::Error> {
        let row: Option<ReadingRow> = sqlx::query_as(
            r#"
            SELECT * FROM readings
            WHERE meter_id = ?
            ORDER BY reading_date DESC, created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(meter_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReadingRow::into_reading).transpose()
    }

    /// Applies a partial update. Returns `None` if the reading does not exist.
    pub async fn update(
        &self,
        id: i64,
        update: &ReadingUpdate,
    ) -> Result<Option<Reading>, sqlx::Error> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE readings SET ");
        let mut columns = builder.separated(", ");
        if let Some(value) = update.value {
            columns.push("value = ").push_bind_unseparated(value);
        }
        if let Some(reading_date) = &update.reading_date {
            columns
                .push("reading_date = ")
                .push_bind_unseparated(to_db_timestamp(reading_date));
        }
        if let Some(image_path) = &update.image_path {
            columns
                .push("image_path = ")
                .push_bind_unseparated(image_path.clone());
        }
        if let Some(method) = update.input_method {
            columns
                .push("input_method = ")
                .push_bind_unseparated(method.to_string());
        }
        if update.mark_synced {
            columns.push("synced_to_sheets = 1");
        }
        if let Some(notes) = &update.notes {
            let notes = (!notes.is_empty()).then(|| notes.clone());
            columns.push("notes = ").push_bind_unseparated(notes);
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM readings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn statistics(&self, meter_id: Option<i64>) -> Result<ReadingStatistics, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                COUNT(*) AS total_readings,
                MAX(reading_date) AS latest_reading_date,
                AVG(value) AS average_value,
                MIN(value) AS min_value,
                MAX(value) AS max_value
            FROM readings
            "#,
        );
        if let Some(meter_id) = meter_id {
            builder.push(" WHERE meter_id = ").push_bind(meter_id);
        }

        let row: StatisticsRow = builder.build_query_as().fetch_one(&self.pool).await?;

        Ok(ReadingStatistics {
            total_readings: row.total_readings,
            latest_reading_date: row
                .latest_reading_date
                .as_deref()
                .map(from_db_timestamp)
                .transpose()?,
            average_value: row.average_value,
            min_value: row.min_value,
            max_value: row.max_value,
        })
    }

    /// Oldest-first batch of readings not yet pushed to the remote sheet.
    pub async fn find_unsynced(&self, limit: i64) -> Result<Vec<ReadingWithMeter>, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_WITH_METER);
        builder
            .push(" WHERE r.synced_to_sheets = 0 ORDER BY r.reading_date ASC, r.id ASC LIMIT ")
            .push_bind(limit);

        let rows: Vec<ReadingWithMeterRow> =
            builder.build_query_as().fetch_all(&self.pool).await?;
        hydrate_all(rows)
    }

    /// Flags exactly `ids` as synced in a single statement.
    ///
    /// Returns the number of readings that were newly flagged; already synced
    /// ids are left alone, so repeating the call is harmless.
    pub async fn mark_as_synced(&self, ids: &[i64]) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "UPDATE readings SET synced_to_sheets = 1 WHERE synced_to_sheets = 0 AND id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn count_unsynced(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM readings WHERE synced_to_sheets = 0")
            .fetch_one(&self.pool)
            .await
    }
}
