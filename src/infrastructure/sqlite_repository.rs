// SQLite repository implementation
use crate::application::traffic_repository::{HistoryFilter, TrafficRepository};
use crate::domain::decision::{Decision, SignalPlan};
use crate::domain::reading::{timestamp_format, Reading, ReadingPayload};
use crate::infrastructure::migrations::run_migrations;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, Row, Transaction};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const IN_MEMORY_PATH: &str = ":memory:";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One writer connection plus a pool of read-only connections.
///
/// Ingestions are serialized on the writer, each in its own transaction.
/// File-backed stores run in WAL mode so readers see the last committed
/// snapshot without waiting on the writer. An in-memory store has no read
/// pool and reads go through the writer.
#[derive(Clone)]
pub struct SqliteRepository {
    write_connection: Arc<Mutex<Connection>>,
    read_connections: Arc<Vec<Mutex<Connection>>>,
    read_cursor: Arc<AtomicUsize>,
}

impl SqliteRepository {
    pub fn open(path: &str, read_pool_size: usize) -> Result<Self> {
        if path == IN_MEMORY_PATH {
            return Self::open_in_memory();
        }

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open SQLite database at {}", path))?;

        match conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        }) {
            Ok(mode) => tracing::debug!("SQLite journal mode: {}", mode),
            Err(e) => tracing::warn!("Failed to enable WAL mode: {}", e),
        }

        let write_connection = Self::prepare_writer(conn)?;

        let mut read_connections = Vec::with_capacity(read_pool_size);
        for _ in 0..read_pool_size {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
                    | OpenFlags::SQLITE_OPEN_URI,
            )
            .with_context(|| format!("failed to open read connection to {}", path))?;
            conn.busy_timeout(BUSY_TIMEOUT)
                .context("failed to set busy timeout")?;
            read_connections.push(Mutex::new(conn));
        }
        tracing::debug!("Opened {} SQLite read connections", read_pool_size);

        Ok(Self {
            write_connection,
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory SQLite database")?;
        Ok(Self {
            write_connection: Self::prepare_writer(conn)?,
            read_connections: Arc::new(Vec::new()),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn prepare_writer(mut conn: Connection) -> Result<Arc<Mutex<Connection>>> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("failed to set busy timeout")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("failed to enable foreign keys")?;
        run_migrations(&mut conn).context("failed to run database migrations")?;
        Ok(Arc::new(Mutex::new(conn)))
    }

    async fn execute_write<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.write_connection.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow!("database write connection lock poisoned"))?;
            task(&mut *guard)
        })
        .await
        .context("database task failed to complete")?
    }

    /// Runs `task` on the next read connection, round-robin. Falls back to the
    /// writer when there is no read pool.
    async fn execute_read<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        if self.read_connections.is_empty() {
            return self.execute_write(move |conn| task(conn)).await;
        }

        let pool = self.read_connections.clone();
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % pool.len();
        tokio::task::spawn_blocking(move || {
            let guard = pool[index]
                .lock()
                .map_err(|_| anyhow!("database read connection lock poisoned"))?;
            task(&*guard)
        })
        .await
        .context("database task failed to complete")?
    }
}

fn append_reading(tx: &Transaction<'_>, payload: ReadingPayload) -> Result<Reading> {
    let vehicle_count = i64::try_from(payload.vehicle_count)
        .map_err(|_| anyhow!("vehicle_count {} exceeds SQLite INTEGER range", payload.vehicle_count))?;
    tx.execute(
        "INSERT INTO readings (timestamp, junction_id, vehicle_count, avg_speed_kmh)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            timestamp_format::to_storage(&payload.timestamp),
            payload.junction_id,
            vehicle_count,
            payload.avg_speed_kmh,
        ],
    )
    .context("failed to insert reading")?;

    Ok(Reading::from_payload(tx.last_insert_rowid(), payload))
}

fn append_decision(tx: &Transaction<'_>, reading: &Reading, plan: SignalPlan) -> Result<Decision> {
    tx.execute(
        "INSERT INTO decisions (reading_id, timestamp, junction_id, green_seconds, reason)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            reading.id,
            timestamp_format::to_storage(&reading.timestamp),
            reading.junction_id,
            plan.green_seconds,
            plan.reason,
        ],
    )
    .context("failed to insert decision")?;

    Ok(Decision {
        id: tx.last_insert_rowid(),
        reading_id: reading.id,
        timestamp: reading.timestamp,
        junction_id: reading.junction_id.clone(),
        green_seconds: plan.green_seconds,
        reason: plan.reason,
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let raw: String = row.get(idx)?;
    timestamp_format::parse(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn count_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn map_reading(row: &Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        id: row.get(0)?,
        timestamp: timestamp_column(row, 1)?,
        junction_id: row.get(2)?,
        vehicle_count: count_column(row, 3)?,
        avg_speed_kmh: row.get(4)?,
    })
}

fn map_decision(row: &Row<'_>) -> rusqlite::Result<Decision> {
    Ok(Decision {
        id: row.get(0)?,
        reading_id: row.get(1)?,
        timestamp: timestamp_column(row, 2)?,
        junction_id: row.get(3)?,
        green_seconds: row.get(4)?,
        reason: row.get(5)?,
    })
}

#[async_trait]
impl TrafficRepository for SqliteRepository {
    async fn record_ingestion(
        &self,
        reading: ReadingPayload,
        plan: SignalPlan,
    ) -> Result<(Reading, Decision)> {
        self.execute_write(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to begin ingestion transaction")?;
            // Dropping `tx` on any error below rolls back both inserts
            let reading = append_reading(&tx, reading)?;
            let decision = append_decision(&tx, &reading, plan)?;
            tx.commit().context("failed to commit ingestion")?;
            Ok((reading, decision))
        })
        .await
    }

    async fn list_readings(&self, filter: HistoryFilter) -> Result<Vec<Reading>> {
        self.execute_read(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, timestamp, junction_id, vehicle_count, avg_speed_kmh
                 FROM readings
                 WHERE (?1 IS NULL OR junction_id = ?1)
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![filter.junction_id, filter.limit], map_reading)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("failed to read readings")?;
            Ok(rows)
        })
        .await
    }

    async fn list_decisions(&self, filter: HistoryFilter) -> Result<Vec<Decision>> {
        self.execute_read(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, reading_id, timestamp, junction_id, green_seconds, reason
                 FROM decisions
                 WHERE (?1 IS NULL OR junction_id = ?1)
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![filter.junction_id, filter.limit], map_decision)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("failed to read decisions")?;
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal_policy::decide;
    use chrono::{Duration, TimeZone, Utc};

    fn payload(junction_id: &str, offset_secs: i64, vehicle_count: u64) -> ReadingPayload {
        ReadingPayload {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
                + Duration::seconds(offset_secs),
            junction_id: junction_id.to_string(),
            vehicle_count,
            avg_speed_kmh: 42.5,
        }
    }

    fn all(junction_id: Option<&str>, limit: u32) -> HistoryFilter {
        HistoryFilter {
            junction_id: junction_id.map(str::to_string),
            limit,
        }
    }

    async fn ingest(repo: &SqliteRepository, p: ReadingPayload) -> (Reading, Decision) {
        let plan = decide(p.vehicle_count, p.avg_speed_kmh);
        repo.record_ingestion(p, plan).await.unwrap()
    }

    #[tokio::test]
    async fn test_record_ingestion_assigns_increasing_ids() {
        let repo = SqliteRepository::open_in_memory().unwrap();

        let (r1, d1) = ingest(&repo, payload("J1", 0, 10)).await;
        let (r2, d2) = ingest(&repo, payload("J1", 0, 50)).await;

        assert!(r2.id > r1.id);
        assert!(d2.id > d1.id);
        assert_eq!(d1.reading_id, r1.id);
        assert_eq!(d2.reading_id, r2.id);
        assert_eq!(d2.green_seconds, 55);

        let stored = repo.list_readings(all(None, 10)).await.unwrap();
        assert_eq!(stored[0], r2);
        assert_eq!(stored[1], r1);
    }

    #[tokio::test]
    async fn test_equal_timestamps_ordered_by_latest_insert() {
        let repo = SqliteRepository::open_in_memory().unwrap();

        let (first, _) = ingest(&repo, payload("J1", 0, 1)).await;
        let (second, _) = ingest(&repo, payload("J1", 0, 2)).await;
        let (third, _) = ingest(&repo, payload("J1", 0, 3)).await;

        let ids: Vec<i64> = repo
            .list_readings(all(Some("J1"), 10))
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);

        let decisions = repo.list_decisions(all(Some("J1"), 10)).await.unwrap();
        let reading_ids: Vec<i64> = decisions.iter().map(|d| d.reading_id).collect();
        assert_eq!(reading_ids, vec![third.id, second.id, first.id]);
    }

    #[tokio::test]
    async fn test_limit_and_junction_filter() {
        let repo = SqliteRepository::open_in_memory().unwrap();

        for i in 0..12 {
            let junction = if i % 3 == 0 { "J2" } else { "J1" };
            ingest(&repo, payload(junction, i, 20)).await;
        }

        assert_eq!(repo.list_readings(all(None, 5)).await.unwrap().len(), 5);
        assert_eq!(repo.list_decisions(all(None, 100)).await.unwrap().len(), 12);

        let j2 = repo.list_readings(all(Some("J2"), 100)).await.unwrap();
        assert_eq!(j2.len(), 4);
        assert!(j2.iter().all(|r| r.junction_id == "J2"));

        // Exact match only
        assert!(repo.list_readings(all(Some("j2"), 100)).await.unwrap().is_empty());
        assert!(repo.list_readings(all(Some("J"), 100)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_decision_write_leaves_no_orphan_reading() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        ingest(&repo, payload("J1", 0, 10)).await;

        repo.write_connection
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER fail_decisions BEFORE INSERT ON decisions
                 BEGIN SELECT RAISE(ABORT, 'decision write failed'); END;",
            )
            .unwrap();

        let p = payload("J1", 60, 70);
        let plan = decide(p.vehicle_count, p.avg_speed_kmh);
        let err = repo.record_ingestion(p, plan).await.unwrap_err();
        assert!(format!("{:#}", err).contains("decision write failed"));

        let readings = repo.list_readings(all(None, 10)).await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].vehicle_count, 10);
        assert_eq!(repo.list_decisions(all(None, 10)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ingestion_loses_no_writes() {
        let repo = SqliteRepository::open_in_memory().unwrap();

        let tasks = (0..32).map(|i| {
            let repo = repo.clone();
            tokio::spawn(async move {
                let p = payload(&format!("J{}", i % 4), i, i as u64);
                let plan = decide(p.vehicle_count, p.avg_speed_kmh);
                repo.record_ingestion(p, plan).await
            })
        });

        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let readings = repo.list_readings(all(None, 100)).await.unwrap();
        let decisions = repo.list_decisions(all(None, 100)).await.unwrap();
        assert_eq!(readings.len(), 32);
        assert_eq!(decisions.len(), 32);
    }

    fn temp_db_path(name: &str) -> (std::path::PathBuf, String) {
        let dir = std::env::temp_dir().join(format!(
            "traffic-signal-{}-{}-{}",
            name,
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let path = dir.join("traffic.db").to_str().unwrap().to_string();
        (dir, path)
    }

    #[tokio::test]
    async fn test_file_database_persists_across_reopen() {
        let (dir, path) = temp_db_path("reopen");

        {
            let repo = SqliteRepository::open(&path, 2).unwrap();
            ingest(&repo, payload("J4", 0, 61)).await;
        }

        let repo = SqliteRepository::open(&path, 2).unwrap();
        let decisions = repo.list_decisions(all(Some("J4"), 1)).await.unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].green_seconds, 70);

        drop(repo);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_reads_do_not_wait_for_the_writer() {
        let (dir, path) = temp_db_path("read-pool");
        let repo = SqliteRepository::open(&path, 3).unwrap();
        assert_eq!(repo.read_connections.len(), 3);

        for i in 0..4 {
            ingest(&repo, payload("J1", i, 30)).await;
        }

        // Writer busy for the whole block; reads still complete from the pool
        {
            let _writer = repo.write_connection.lock().unwrap();
            let reads = (0..6).map(|_| {
                let repo = repo.clone();
                async move {
                    let readings = repo.list_readings(all(Some("J1"), 10)).await?;
                    let decisions = repo.list_decisions(all(Some("J1"), 10)).await?;
                    anyhow::Ok((readings.len(), decisions.len()))
                }
            });
            let results = tokio::time::timeout(
                std::time::Duration::from_secs(5),
                futures::future::join_all(reads),
            )
            .await
            .expect("reads blocked behind the writer lock");
            for result in results {
                assert_eq!(result.unwrap(), (4, 4));
            }
        }

        // Commits are visible to pooled readers
        ingest(&repo, payload("J1", 10, 70)).await;
        for _ in 0..3 {
            let latest = repo.list_readings(all(Some("J1"), 1)).await.unwrap();
            assert_eq!(latest[0].vehicle_count, 70);
        }

        drop(repo);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_vehicle_count_round_trips_at_i64_width() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let max = u64::try_from(i64::MAX).unwrap();

        let (reading, decision) = ingest(&repo, payload("J1", 0, max)).await;
        assert_eq!(reading.vehicle_count, max);
        assert_eq!(decision.green_seconds, 70);
        assert_eq!(repo.list_readings(all(None, 1)).await.unwrap()[0], reading);

        let p = payload("J1", 1, max + 1);
        let plan = decide(p.vehicle_count, p.avg_speed_kmh);
        assert!(repo.record_ingestion(p, plan).await.is_err());
        assert_eq!(repo.list_decisions(all(None, 10)).await.unwrap().len(), 1);
    }
}
