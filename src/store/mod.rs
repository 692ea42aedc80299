pub mod schema;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{Any, AnyPool, FromRow, Transaction, any::AnyPoolOptions};
use tracing::{debug, info, instrument};

use crate::error::AppError;
use crate::model::batch::{AttendanceRecord, Batch, EmployeeAttendance, MonthAttendance, NewBatch};
use crate::model::row::{RowData, project_of};
use schema::Backend;

/// Handle to the attendance tables. Cloning is cheap: clones share one pool.
#[derive(Clone)]
pub struct AttendanceStore {
    pool: AnyPool,
    backend: Backend,
}

#[derive(FromRow)]
struct BatchRow {
    id: i64,
    period: String,
    holidays: String,
    working_days: i64,
    created_at: String,
}

#[derive(FromRow)]
struct RecordRow {
    employee_name: String,
    month_total: f64,
    row_data: String,
}

#[derive(FromRow)]
struct EmployeeRow {
    period: String,
    holidays: String,
    working_days: i64,
    row_data: String,
}

impl TryFrom<BatchRow> for Batch {
    type Error = AppError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| {
                tracing::error!(error = %e, period = %row.period, "Corrupt batch timestamp");
                AppError::Internal(e.to_string())
            })?
            .with_timezone(&Utc);

        Ok(Batch {
            id: row.id,
            holidays: serde_json::from_str(&row.holidays)?,
            period: row.period,
            working_days: row.working_days,
            created_at,
        })
    }
}

impl TryFrom<RecordRow> for AttendanceRecord {
    type Error = AppError;

    // `project` is read back from row_data: the Any driver can't decode a NULL column
    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let row_data = serde_json::from_str::<RowData>(&row.row_data)?;
        Ok(AttendanceRecord {
            employee_name: row.employee_name,
            project: project_of(&row_data),
            month_total: row.month_total,
            row_data,
        })
    }
}

impl TryFrom<EmployeeRow> for EmployeeAttendance {
    type Error = AppError;

    fn try_from(row: EmployeeRow) -> Result<Self, Self::Error> {
        Ok(EmployeeAttendance {
            period: row.period,
            holidays: serde_json::from_str(&row.holidays)?,
            working_days: row.working_days,
            row_data: serde_json::from_str(&row.row_data)?,
        })
    }
}

impl AttendanceStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        sqlx::any::install_default_drivers();

        let backend = Backend::from_url(database_url)
            .context("DATABASE_URL must start with mysql://, mariadb:// or sqlite:")?;

        let mut options = AnyPoolOptions::new().max_connections(max_connections.max(1));
        if backend == Backend::Sqlite && database_url.contains(":memory:") {
            // every connection to :memory: is its own database, keep exactly one alive
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let backend_name: &str = backend.as_ref();
        info!(backend = backend_name, "Database pool ready");
        Ok(Self { pool, backend })
    }

    /// Creates the tables and indexes if they don't exist yet.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        for statement in self.backend.schema() {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        Ok(())
    }

    /// Upserts the batch for `batch.period` and replaces all of its records, atomically.
    #[instrument(name = "save_batch", skip(self, batch), fields(period = %batch.period, rows = batch.rows.len()))]
    pub async fn save_batch(&self, batch: &NewBatch) -> Result<(), AppError> {
        let rows = batch.normalized_rows()?;
        let holidays = serde_json::to_string(&batch.holidays)?;
        let encoded = rows
            .iter()
            .map(|r| serde_json::to_string(&r.row_data))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await?;

        let batch_id = self
            .upsert_batch(&mut tx, &batch.period, &holidays, batch.working_days)
            .await?;

        let deleted = sqlx::query("DELETE FROM attendance_record WHERE batch_id = ?")
            .bind(batch_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for (row, row_data) in rows.iter().zip(&encoded) {
            sqlx::query(
                r#"
                INSERT INTO attendance_record
                    (batch_id, employee_name, project, month_total, row_data)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(batch_id)
            .bind(row.employee_name.as_str())
            .bind(row.project.as_deref())
            .bind(row.month_total)
            .bind(row_data.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(batch_id, deleted, inserted = rows.len(), "Attendance batch saved");
        Ok(())
    }

    async fn upsert_batch(
        &self,
        tx: &mut Transaction<'_, Any>,
        period: &str,
        holidays: &str,
        working_days: i64,
    ) -> Result<i64, sqlx::Error> {
        if let Some(id) = self.lock_batch(tx, period).await? {
            self.update_batch(tx, id, holidays, working_days).await?;
            return Ok(id);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO batch (period, holidays, working_days, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(period)
        .bind(holidays)
        .bind(working_days)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut **tx)
        .await;

        match inserted {
            Ok(_) => {}
            // a concurrent save created the period first; overwrite its row instead
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                debug!(period, "Batch created concurrently, updating instead");
                let id = self
                    .lock_batch(tx, period)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                self.update_batch(tx, id, holidays, working_days).await?;
                return Ok(id);
            }
            Err(e) => return Err(e),
        }

        self.lock_batch(tx, period)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Looks up the batch id, holding a row lock until commit on MySQL/MariaDB.
    /// On SQLite a no-op write takes the database write lock first, so a second
    /// saver waits here instead of failing on a stale read.
    async fn lock_batch(
        &self,
        tx: &mut Transaction<'_, Any>,
        period: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        let sql = if self.backend.locks_rows() {
            "SELECT id FROM batch WHERE period = ? FOR UPDATE"
        } else {
            sqlx::query("UPDATE batch SET period = period WHERE period = ?")
                .bind(period)
                .execute(&mut **tx)
                .await?;
            "SELECT id FROM batch WHERE period = ?"
        };
        sqlx::query_scalar::<_, i64>(sql)
            .bind(period)
            .fetch_optional(&mut **tx)
            .await
    }

    async fn update_batch(
        &self,
        tx: &mut Transaction<'_, Any>,
        id: i64,
        holidays: &str,
        working_days: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE batch SET holidays = ?, working_days = ? WHERE id = ?")
            .bind(holidays)
            .bind(working_days)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Every record of `employee_name` across all periods, ordered by the period
    /// string (byte order, not calendar order).
    pub async fn get_by_employee(
        &self,
        employee_name: &str,
    ) -> Result<Vec<EmployeeAttendance>, AppError> {
        let rows = sqlx::query_as::<_, EmployeeRow>(
            r#"
            SELECT b.period, b.holidays, b.working_days, r.row_data
            FROM attendance_record r
            JOIN batch b ON b.id = r.batch_id
            WHERE r.employee_name = ?
            ORDER BY b.period ASC, r.id ASC
            "#,
        )
        .bind(employee_name)
        .fetch_all(&self.pool)
        .await?;

        debug!(employee_name, found = rows.len(), "Employee attendance fetched");
        rows.into_iter().map(EmployeeAttendance::try_from).collect()
    }

    pub async fn get_by_period(&self, period: &str) -> Result<MonthAttendance, AppError> {
        // both reads in one transaction so metadata and records come from the same snapshot
        let mut tx = self.pool.begin().await?;

        let batch = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, period, holidays, working_days, created_at
            FROM batch
            WHERE period = ?
            "#,
        )
        .bind(period)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(batch) = batch else {
            return Err(AppError::NotFound("No data for this month".to_string()));
        };
        let batch = Batch::try_from(batch)?;

        let records = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT employee_name, month_total, row_data
            FROM attendance_record
            WHERE batch_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(batch.id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let records = records
            .into_iter()
            .map(AttendanceRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MonthAttendance::from_parts(batch, records))
    }
}
