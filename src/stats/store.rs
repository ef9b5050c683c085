/// SQLite-backed queue of playback records awaiting upload.
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::DateTime;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::record::{RecordDto, RecordType};
use super::schema::stats;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open database {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("database migration failed: {0}")]
    Migration(String),

    #[error("database {operation} failed: {source}")]
    Query {
        operation: &'static str,
        source: diesel::result::Error,
    },

    #[error("database connection lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn domain(&self) -> &'static str {
        "database"
    }
}

fn query_error(operation: &'static str) -> impl FnOnce(diesel::result::Error) -> StoreError {
    move |source| StoreError::Query { operation, source }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = stats)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct StatRow {
    id: i64,
    record_type: String,
    started: i64,
    finished: i64,
    schedule_id: i32,
    layout_id: i32,
    media_id: Option<i32>,
    #[allow(dead_code)]
    duration: i64,
    play_count: i32,
}

impl StatRow {
    fn into_record(self) -> Option<RecordDto> {
        let record_type = RecordType::parse(&self.record_type)?;
        let started = DateTime::from_timestamp(self.started, 0)?;
        let finished = DateTime::from_timestamp(self.finished, 0)?;
        RecordDto::new(
            record_type,
            started,
            finished,
            self.schedule_id,
            self.layout_id,
            self.media_id,
            self.play_count,
        )
        .ok()
        .map(|record| record.with_id(self.id))
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = stats)]
struct NewStatRow<'a> {
    record_type: &'a str,
    started: i64,
    finished: i64,
    schedule_id: i32,
    layout_id: i32,
    media_id: Option<i32>,
    duration: i64,
    play_count: i32,
}

impl<'a> From<&'a RecordDto> for NewStatRow<'a> {
    fn from(record: &'a RecordDto) -> Self {
        Self {
            record_type: record.record_type().as_str(),
            started: record.started().timestamp(),
            finished: record.finished().timestamp(),
            schedule_id: record.schedule_id(),
            layout_id: record.layout_id(),
            media_id: record.media_id(),
            duration: record.duration(),
            play_count: record.count(),
        }
    }
}

/// Records read from the head of the queue. `rows` counts every row read,
/// including malformed ones that were skipped; removing `rows` afterwards
/// drops exactly what was read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub records: Vec<RecordDto>,
    pub rows: usize,
}

/// All access goes through one connection behind a mutex, so each call is
/// serialized against the others.
pub struct StatsStore {
    conn: Mutex<SqliteConnection>,
}

impl StatsStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::Open {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        let store = Self::establish(&path.to_string_lossy())?;
        info!("Statistics store opened at {}", path.display());
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::establish(":memory:")
    }

    fn establish(url: &str) -> Result<Self, StoreError> {
        let mut conn = SqliteConnection::establish(url).map_err(|e| StoreError::Open {
            path: url.to_string(),
            reason: e.to_string(),
        })?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, SqliteConnection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn save(&self, record: &RecordDto) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        diesel::insert_into(stats::table)
            .values(NewStatRow::from(record))
            .execute(&mut *conn)
            .map_err(query_error("insert"))?;
        Ok(())
    }

    /// Insert all records in one transaction; on failure nothing is kept.
    pub fn save_all(&self, records: &[RecordDto]) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            for record in records {
                diesel::insert_into(stats::table)
                    .values(NewStatRow::from(record))
                    .execute(conn)?;
            }
            Ok(())
        })
        .map_err(query_error("transaction"))?;

        debug!("Saved {} playback records", records.len());
        Ok(())
    }

    /// Up to `limit` oldest rows, with malformed ones skipped.
    pub fn peek_batch(&self, limit: usize) -> Result<Batch, StoreError> {
        let mut conn = self.connection()?;
        let rows = stats::table
            .order(stats::id.asc())
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .select(StatRow::as_select())
            .load(&mut *conn)
            .map_err(query_error("retrieve"))?;

        let read = rows.len();
        let records: Vec<_> = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                let record = row.into_record();
                if record.is_none() {
                    warn!("Skipping malformed stats row {}", id);
                }
                record
            })
            .collect();

        Ok(Batch {
            records,
            rows: read,
        })
    }

    pub fn retrieve(&self, limit: usize) -> Result<Vec<RecordDto>, StoreError> {
        Ok(self.peek_batch(limit)?.records)
    }

    /// Delete the `count` oldest rows. Returns how many were deleted.
    pub fn remove(&self, count: usize) -> Result<usize, StoreError> {
        let mut conn = self.connection()?;
        let removed = diesel::sql_query(
            "DELETE FROM stats WHERE id IN (SELECT id FROM stats ORDER BY id LIMIT ?)",
        )
        .bind::<BigInt, _>(i64::try_from(count).unwrap_or(i64::MAX))
        .execute(&mut *conn)
        .map_err(query_error("remove"))?;
        Ok(removed)
    }

    pub fn remove_all(&self) -> Result<usize, StoreError> {
        let mut conn = self.connection()?;
        let removed = diesel::delete(stats::table)
            .execute(&mut *conn)
            .map_err(query_error("remove all"))?;
        info!("Cleared {} playback records", removed);
        Ok(removed)
    }

    pub fn records_count(&self) -> Result<usize, StoreError> {
        let mut conn = self.connection()?;
        let count: i64 = stats::table
            .count()
            .get_result(&mut *conn)
            .map_err(query_error("count"))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn layout(schedule_id: i32, started: i64) -> RecordDto {
        RecordDto::layout(at(started), at(started + 10), schedule_id, 7).unwrap()
    }

    fn execute(store: &StatsStore, sql: &str) {
        let mut conn = store.connection().unwrap();
        diesel::sql_query(sql).execute(&mut *conn).unwrap();
    }

    #[test]
    fn test_batch_save_counts() {
        let store = StatsStore::in_memory().unwrap();
        store.save(&layout(1, 100)).unwrap();

        let batch: Vec<_> = (0..5).map(|i| layout(i, 200 + i as i64)).collect();
        store.save_all(&batch).unwrap();
        assert_eq!(store.records_count().unwrap(), 6);
    }

    #[test]
    fn test_failed_batch_leaves_nothing() {
        let store = StatsStore::in_memory().unwrap();
        store.save(&layout(1, 100)).unwrap();
        execute(
            &store,
            "CREATE TRIGGER reject_bad BEFORE INSERT ON stats WHEN NEW.scheduleId = 99 \
             BEGIN SELECT RAISE(ABORT, 'induced failure'); END",
        );

        let batch = vec![layout(2, 200), layout(3, 300), layout(99, 400), layout(4, 500)];
        let err = store.save_all(&batch).unwrap_err();
        assert!(err.to_string().contains("induced failure"));
        assert_eq!(err.domain(), "database");
        assert_eq!(store.records_count().unwrap(), 1);
    }

    #[test]
    fn test_retrieve_oldest_first_then_remove() {
        let store = StatsStore::in_memory().unwrap();
        let media = RecordDto::media(at(50), at(55), 2, 7, 11).unwrap();
        let records = vec![layout(1, 100), media.clone(), layout(3, 300), layout(4, 400)];
        store.save_all(&records).unwrap();

        let first = store.retrieve(2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].schedule_id(), 1);
        assert_eq!(first[1].media_id(), Some(11));
        assert_eq!(first[1].started(), media.started());
        assert!(first[0].id() < first[1].id());

        assert_eq!(store.remove(2).unwrap(), 2);
        assert_eq!(store.records_count().unwrap(), 2);

        let next: Vec<_> = store.retrieve(2).unwrap().iter().map(|r| r.schedule_id()).collect();
        assert_eq!(next, [3, 4]);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let store = StatsStore::in_memory().unwrap();
        store.save(&layout(1, 100)).unwrap();
        execute(
            &store,
            "INSERT INTO stats (type, started, finished, scheduleId, layoutId, mediaId, duration, count) \
             VALUES ('widget', 1, 2, 5, 6, NULL, 1, 1)",
        );
        store.save(&layout(3, 300)).unwrap();

        let batch = store.peek_batch(10).unwrap();
        assert_eq!(batch.rows, 3);
        let schedules: Vec<_> = batch.records.iter().map(|r| r.schedule_id()).collect();
        assert_eq!(schedules, [1, 3]);

        store.remove(batch.rows).unwrap();
        assert_eq!(store.records_count().unwrap(), 0);
    }

    #[test]
    fn test_remove_all_and_oversized_remove() {
        let store = StatsStore::in_memory().unwrap();
        store.save_all(&[layout(1, 1), layout(2, 2)]).unwrap();
        assert_eq!(store.remove(10).unwrap(), 2);

        store.save_all(&[layout(1, 1), layout(2, 2)]).unwrap();
        assert_eq!(store.remove_all().unwrap(), 2);
        assert!(store.retrieve(5).unwrap().is_empty());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("stats.db");

        StatsStore::open(&path).unwrap().save(&layout(8, 100)).unwrap();
        let store = StatsStore::open(&path).unwrap();
        assert_eq!(store.records_count().unwrap(), 1);
        assert_eq!(store.retrieve(1).unwrap()[0].schedule_id(), 8);
    }

    #[test]
    fn test_concurrent_writers_and_reader() {
        let store = Arc::new(StatsStore::in_memory().unwrap());

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.save(&layout(w, i)).unwrap();
                    }
                })
            })
            .collect();

        let uploader = {
            let store = store.clone();
            std::thread::spawn(move || {
                let mut removed = 0;
                for _ in 0..10 {
                    let batch = store.peek_batch(5).unwrap();
                    removed += store.remove(batch.rows).unwrap();
                }
                removed
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        let removed = uploader.join().unwrap();
        assert_eq!(store.records_count().unwrap() + removed, 100);
    }
}
