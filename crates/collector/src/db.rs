use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::str::FromStr;

use crate::reading::{from_unix, to_unix, HeatStatus, Reading};

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

/// Row as stored: timestamp in UNIX seconds, heat status as text.
#[derive(Debug, FromRow)]
struct ReadingRow {
    ts: i64,
    methane: f64,
    temperature: f64,
    ph: f64,
    heat_status: String,
}

impl TryFrom<ReadingRow> for Reading {
    type Error = anyhow::Error;

    fn try_from(row: ReadingRow) -> Result<Self> {
        let heat_status = HeatStatus::from_str(&row.heat_status).map_err(anyhow::Error::msg)?;
        let timestamp =
            from_unix(row.ts).with_context(|| format!("stored ts {} out of range", row.ts))?;
        Ok(Reading {
            methane: row.methane,
            temperature: row.temperature,
            ph: row.ph,
            heat_status,
            timestamp,
        })
    }
}

impl Db {
    /// db_url examples:
    /// - "sqlite:/home/pi/biogas/biogas.db"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal);

        // Each connection to an in-memory database is a separate database,
        // so keep exactly one alive for the pool's lifetime.
        let pool_options = if db_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    // ----------------------------
    // Readings
    // ----------------------------

    /// Append a reading.  Returns the surrogate id assigned to it.
    pub async fn insert_reading(&self, r: &Reading) -> Result<i64> {
        let id = sqlx::query(
            r#"
            INSERT INTO readings (ts, methane, temperature, ph, heat_status)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(to_unix(r.timestamp))
        .bind(r.methane)
        .bind(r.temperature)
        .bind(r.ph)
        .bind(r.heat_status.as_str())
        .execute(&self.pool)
        .await
        .context("insert_reading failed")?
        .last_insert_rowid();
        Ok(id)
    }

    /// Newest reading by timestamp; ties go to the most recently inserted.
    pub async fn latest_reading(&self) -> Result<Option<Reading>> {
        let row = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT ts, methane, temperature, ph, heat_status
            FROM readings
            ORDER BY ts DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("latest_reading failed")?;

        row.map(Reading::try_from).transpose()
    }

    /// Every reading with `ts >= since`, oldest first.
    pub async fn readings_since(&self, since: i64) -> Result<Vec<Reading>> {
        let rows = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT ts, methane, temperature, ph, heat_status
            FROM readings
            WHERE ts >= ?
            ORDER BY ts ASC, id ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("readings_since failed")?;

        rows.into_iter().map(Reading::try_from).collect()
    }

    pub async fn count_readings(&self) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM readings")
            .fetch_one(&self.pool)
            .await
            .context("count_readings failed")?;
        Ok(n)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use time::macros::datetime;
    use time::PrimitiveDateTime;

    pub(crate) async fn memory_db() -> Db {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    pub(crate) fn reading_at(ts: PrimitiveDateTime, methane: f64) -> Reading {
        Reading {
            methane,
            temperature: 30.5,
            ph: 7.01,
            heat_status: HeatStatus::Off,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn empty_store() {
        let db = memory_db().await;
        assert_eq!(db.count_readings().await.unwrap(), 0);
        assert!(db.latest_reading().await.unwrap().is_none());
        assert!(db.readings_since(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let db = memory_db().await;
        let r = reading_at(datetime!(2024-05-01 12:00:00), 100.0);
        let a = db.insert_reading(&r).await.unwrap();
        let b = db.insert_reading(&r).await.unwrap();
        assert!(b > a);
        // Duplicates are kept.
        assert_eq!(db.count_readings().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stored_reading_round_trips() {
        let db = memory_db().await;
        let mut r = reading_at(datetime!(2024-05-01 12:00:00), 433.87);
        r.heat_status = HeatStatus::On;
        r.ph = 11.93;
        db.insert_reading(&r).await.unwrap();
        assert_eq!(db.latest_reading().await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn latest_is_max_timestamp_not_last_inserted() {
        let db = memory_db().await;
        // Inserted out of order.
        db.insert_reading(&reading_at(datetime!(2024-05-01 12:00:03), 3.0)).await.unwrap();
        db.insert_reading(&reading_at(datetime!(2024-05-01 12:00:01), 1.0)).await.unwrap();
        db.insert_reading(&reading_at(datetime!(2024-05-01 12:00:02), 2.0)).await.unwrap();

        let latest = db.latest_reading().await.unwrap().unwrap();
        assert_eq!(latest.methane, 3.0);
    }

    #[tokio::test]
    async fn latest_tie_goes_to_highest_id() {
        let db = memory_db().await;
        let ts = datetime!(2024-05-01 12:00:00);
        db.insert_reading(&reading_at(ts, 1.0)).await.unwrap();
        db.insert_reading(&reading_at(ts, 2.0)).await.unwrap();

        assert_eq!(db.latest_reading().await.unwrap().unwrap().methane, 2.0);
    }

    #[tokio::test]
    async fn readings_since_is_inclusive_and_ascending() {
        let db = memory_db().await;
        let t1 = datetime!(2024-05-01 10:00:00);
        let t2 = datetime!(2024-05-01 11:00:00);
        let t3 = datetime!(2024-05-01 12:00:00);
        db.insert_reading(&reading_at(t3, 3.0)).await.unwrap();
        db.insert_reading(&reading_at(t1, 1.0)).await.unwrap();
        db.insert_reading(&reading_at(t2, 2.0)).await.unwrap();

        let all: Vec<f64> = db
            .readings_since(0)
            .await
            .unwrap()
            .iter()
            .map(|r| r.methane)
            .collect();
        assert_eq!(all, vec![1.0, 2.0, 3.0]);

        let recent = db.readings_since(to_unix(t2)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp, t2);

        assert!(db.readings_since(to_unix(t3) + 1).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_and_reads_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("biogas.db").display());
        let db = Db::connect(&url).await.unwrap();
        db.migrate().await.unwrap();

        const N: i64 = 64;
        let base = to_unix(datetime!(2024-05-01 00:00:00));

        let mut tasks = Vec::new();
        for i in 0..N {
            let db = db.clone();
            // Timestamps deliberately arrive out of order.
            let ts = from_unix(base + (i * 37) % N).unwrap();
            tasks.push(tokio::spawn(async move {
                db.insert_reading(&reading_at(ts, i as f64)).await.unwrap();
            }));
        }
        for _ in 0..8 {
            let db = db.clone();
            tasks.push(tokio::spawn(async move {
                let seen = db.readings_since(base).await.unwrap();
                assert!(seen.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        assert_eq!(db.count_readings().await.unwrap(), N);
        let all = db.readings_since(base).await.unwrap();
        assert_eq!(all.len() as i64, N);
        assert!(all.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn invalid_url_is_an_error() {
        assert!(Db::connect("postgres://nope").await.is_err());
    }
}
