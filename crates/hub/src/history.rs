//! SQLite time-series store of accepted weather readings.
//!
//! Every validated reading is appended here best-effort; in observation
//! mode B the daily rollover queries the prior day's window back out and
//! re-validates it into means. Zone state never touches the database.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

use adaptive_irrigation_engine::WeatherVariable;

#[derive(Clone)]
pub struct History {
    pool: Pool<Sqlite>,
}

impl History {
    /// db_url examples:
    /// - "sqlite:/var/lib/irrigation/history.db?mode=rwc"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weather_readings (
              ts       INTEGER NOT NULL,
              variable TEXT    NOT NULL,
              value    REAL    NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create weather_readings table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_weather_readings_variable_ts
             ON weather_readings (variable, ts)",
        )
        .execute(&self.pool)
        .await
        .context("failed to create weather_readings index")?;

        Ok(())
    }

    pub async fn insert_reading(
        &self,
        ts: i64,
        variable: WeatherVariable,
        value: f64,
    ) -> Result<()> {
        sqlx::query("INSERT INTO weather_readings (ts, variable, value) VALUES (?, ?, ?)")
            .bind(ts)
            .bind(variable.key())
            .bind(value)
            .execute(&self.pool)
            .await
            .context("insert_reading failed")?;
        Ok(())
    }

    /// Ordered (ts, value) points for one variable in [start, end).
    pub async fn window(
        &self,
        variable: WeatherVariable,
        start: i64,
        end: i64,
    ) -> Result<Vec<(i64, f64)>> {
        sqlx::query_as::<_, (i64, f64)>(
            "SELECT ts, value FROM weather_readings
             WHERE variable = ? AND ts >= ? AND ts < ?
             ORDER BY ts",
        )
        .bind(variable.key())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("window query failed")
    }

    /// Drop readings older than `ts`. Returns how many rows went away.
    pub async fn prune_before(&self, ts: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM weather_readings WHERE ts < ?")
            .bind(ts)
            .execute(&self.pool)
            .await
            .context("prune_before failed")?;
        Ok(result.rows_affected())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
