//! In-memory SQLite store of translation entries.

use crate::criteria::FilterCriteria;
use crate::models::{EntryRecord, EntryStatistics, ReviewData};
use crate::{PoviewError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::events::{BulkOp, ChangeEvent, ChangeListener, ListenerId};
use super::fts5::{FTS5Config, FTS5Manager, FTS5Stats};
use super::query::{QueryEngine, FOLD_FUNCTION};

const SELECT_COLUMNS: &str = "e.key, e.position, e.msgctxt, e.msgid, e.msgid_plural, e.msgstr, \
     e.msgstr_plural_json, e.flags_json, e.obsolete, e.comment, e.tcomment, \
     e.references_json, e.review_json, e.updated_at";

/// Create the `entries` table and its indexes.
pub(crate) fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS entries (
            key TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            msgctxt TEXT,
            msgid TEXT NOT NULL,
            msgid_plural TEXT,
            msgstr TEXT NOT NULL,
            msgstr_plural_json TEXT NOT NULL,
            flags_json TEXT NOT NULL,
            fuzzy INTEGER NOT NULL,
            obsolete INTEGER NOT NULL,
            comment TEXT,
            tcomment TEXT,
            references_json TEXT NOT NULL,
            review_json TEXT,
            score INTEGER,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_position ON entries(position)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_status ON entries(fuzzy, obsolete)",
        [],
    )?;

    Ok(())
}

/// Column values of a record, JSON fields already encoded.
struct EncodedRecord<'a> {
    record: &'a EntryRecord,
    msgstr_plural_json: String,
    flags_json: String,
    references_json: String,
    review_json: Option<String>,
    score: Option<u32>,
}

impl<'a> EncodedRecord<'a> {
    fn new(record: &'a EntryRecord) -> Result<Self> {
        Ok(Self {
            record,
            msgstr_plural_json: serde_json::to_string(&record.msgstr_plural)?,
            flags_json: serde_json::to_string(&record.flags)?,
            references_json: serde_json::to_string(&record.references)?,
            review_json: record.review.as_ref().map(serde_json::to_string).transpose()?,
            score: record.review.as_ref().and_then(|r| r.score),
        })
    }

    fn insert(&self, conn: &Connection, updated_at: &str) -> rusqlite::Result<usize> {
        let r = self.record;
        conn.execute(
            "INSERT INTO entries (key, position, msgctxt, msgid, msgid_plural, msgstr,
                                  msgstr_plural_json, flags_json, fuzzy, obsolete, comment,
                                  tcomment, references_json, review_json, score, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                r.key,
                r.position,
                r.msgctxt,
                r.msgid,
                r.msgid_plural,
                r.msgstr,
                self.msgstr_plural_json,
                self.flags_json,
                r.is_fuzzy(),
                r.obsolete,
                r.comment,
                r.tcomment,
                self.references_json,
                self.review_json,
                self.score,
                updated_at,
            ],
        )
    }

    fn update(&self, conn: &Connection, updated_at: &str) -> rusqlite::Result<usize> {
        let r = self.record;
        conn.execute(
            "UPDATE entries SET
                 position=?2, msgctxt=?3, msgid=?4, msgid_plural=?5, msgstr=?6,
                 msgstr_plural_json=?7, flags_json=?8, fuzzy=?9, obsolete=?10, comment=?11,
                 tcomment=?12, references_json=?13, review_json=?14, score=?15, updated_at=?16
             WHERE key=?1",
            params![
                r.key,
                r.position,
                r.msgctxt,
                r.msgid,
                r.msgid_plural,
                r.msgstr,
                self.msgstr_plural_json,
                self.flags_json,
                r.is_fuzzy(),
                r.obsolete,
                r.comment,
                r.tcomment,
                self.references_json,
                self.review_json,
                self.score,
                updated_at,
            ],
        )
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Decode a JSON column, logging and discarding unreadable values.
fn decode_column<T>(key: &str, column: &str, json: &str) -> Option<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_str(json)
        .map_err(|e| warn!("Discarding unreadable {} of {}: {}", column, key, e))
        .ok()
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Indexed, queryable collection of [`EntryRecord`]s.
///
/// The connection sits behind its own mutex so background prefetch reads
/// can run alongside the caller. Change listeners are invoked after the
/// write has committed and the connection lock has been released.
pub struct EntryStore {
    conn: Arc<Mutex<Connection>>,
    fts5_config: FTS5Config,
    engine: QueryEngine,
    listeners: RwLock<Vec<(ListenerId, ChangeListener)>>,
    next_listener_id: AtomicU64,
    reads: AtomicU64,
}

impl EntryStore {
    /// Create an empty in-memory store with the default query engine.
    pub fn new() -> Result<Self> {
        Self::with_engine(QueryEngine::new())
    }

    /// Create an empty in-memory store answering queries with `engine`.
    pub fn with_engine(engine: QueryEngine) -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        Self::configure_connection(&conn)?;
        create_schema(&conn)?;

        let fts5_config = FTS5Config::default();
        FTS5Manager::new(&fts5_config).ensure_setup(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            fts5_config,
            engine,
            listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            reads: AtomicU64::new(0),
        })
    }

    /// Configure connection settings and register the case-fold function.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA temp_store=MEMORY;")?;
        conn.create_scalar_function(
            FOLD_FUNCTION,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let text: Option<String> = ctx.get(0)?;
                Ok(text.map(|t| t.to_lowercase()))
            },
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| PoviewError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of read round-trips served so far.
    pub fn query_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    // ========================================
    // Change notification
    // ========================================

    /// Register a listener for committed writes.
    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.push((id, Arc::new(listener)));
        id
    }

    /// Detach a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    fn emit(&self, event: ChangeEvent) {
        let listeners: Vec<ChangeListener> = {
            let guard = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            guard.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        debug!("Store change: {:?} ({} listeners)", event, listeners.len());
        for listener in listeners {
            listener(&event);
        }
    }

    // ========================================
    // Reads
    // ========================================

    /// Get an entry by key.
    pub fn get(&self, key: &str) -> Result<Option<EntryRecord>> {
        let conn = self.lock()?;
        self.record_read();

        let sql = format!("SELECT {} FROM entries e WHERE e.key = ?1", SELECT_COLUMNS);
        let result = conn
            .query_row(&sql, params![key], Self::row_to_record)
            .optional()?;

        Ok(result)
    }

    /// Get several entries in one round-trip.
    ///
    /// Results follow the order of `keys`; missing keys are skipped.
    pub fn get_many(&self, keys: &[String]) -> Result<Vec<EntryRecord>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys_json = serde_json::to_string(keys)?;

        let conn = self.lock()?;
        self.record_read();

        let sql = format!(
            "SELECT {} FROM entries e WHERE e.key IN (SELECT value FROM json_each(?1))",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![keys_json], Self::row_to_record)?;

        let mut by_key = HashMap::new();
        for row in rows {
            let record = row?;
            by_key.insert(record.key.clone(), record);
        }

        Ok(keys.iter().filter_map(|k| by_key.remove(k)).collect())
    }

    /// Get the entry at `index` in display order (position, then key).
    pub fn get_at(&self, index: usize) -> Result<Option<EntryRecord>> {
        let conn = self.lock()?;
        self.record_read();

        let sql = format!(
            "SELECT {} FROM entries e ORDER BY e.position, e.key LIMIT 1 OFFSET ?1",
            SELECT_COLUMNS
        );
        let result = conn
            .query_row(&sql, params![index as i64], Self::row_to_record)
            .optional()?;

        Ok(result)
    }

    /// Entries matching `criteria`, ordered and paged.
    pub fn query(&self, criteria: &FilterCriteria) -> Result<Vec<EntryRecord>> {
        let start = Instant::now();
        let plan = self.engine.plan(criteria);

        let conn = self.lock()?;
        self.record_read();

        let mut stmt = conn.prepare(&plan.select_sql(SELECT_COLUMNS))?;
        let rows = stmt.query_map(params_from_iter(plan.params.iter()), Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        debug!(
            "Query via {:?} returned {} entries in {:.2}ms",
            plan.text_index,
            records.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(records)
    }

    /// Keys of entries matching `criteria`, ordered and paged.
    pub fn query_keys(&self, criteria: &FilterCriteria) -> Result<Vec<String>> {
        let plan = self.engine.plan(criteria);

        let conn = self.lock()?;
        self.record_read();

        let mut stmt = conn.prepare(&plan.select_sql("e.key"))?;
        let rows = stmt.query_map(params_from_iter(plan.params.iter()), |row| row.get(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    /// Number of entries matching `criteria`, ignoring paging.
    pub fn count_matching(&self, criteria: &FilterCriteria) -> Result<usize> {
        let plan = self.engine.plan(criteria);

        let conn = self.lock()?;
        self.record_read();

        let count: usize = conn.query_row(
            &plan.count_sql(),
            params_from_iter(plan.params.iter()),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get the count of entries.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;

        let count: usize = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;

        Ok(count)
    }

    /// Translation progress over every entry.
    pub fn statistics(&self) -> Result<EntryStatistics> {
        let conn = self.lock()?;

        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN msgstr <> '' AND fuzzy = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN fuzzy = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN msgstr = '' AND fuzzy = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN obsolete = 1 THEN 1 ELSE 0 END), 0)
             FROM entries",
            [],
            |row| {
                Ok(EntryStatistics::new(
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )?;

        Ok(stats)
    }

    /// Number of entries carrying each flag.
    pub fn flag_counts(&self) -> Result<BTreeMap<String, usize>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT f.value, COUNT(*) FROM entries e, json_each(e.flags_json) f
             GROUP BY f.value",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get(1)?)))?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (flag, count) = row?;
            counts.insert(flag, count);
        }
        Ok(counts)
    }

    /// Convert a row to an EntryRecord.
    fn row_to_record(row: &Row) -> rusqlite::Result<EntryRecord> {
        let msgstr_plural_json: String = row.get(6)?;
        let flags_json: String = row.get(7)?;
        let references_json: String = row.get(11)?;
        let review_json: Option<String> = row.get(12)?;
        let updated_at: String = row.get(13)?;

        let key: String = row.get(0)?;
        let msgstr_plural: BTreeMap<u32, String> =
            decode_column(&key, "msgstr_plural", &msgstr_plural_json).unwrap_or_default();
        let flags: Vec<String> = decode_column(&key, "flags", &flags_json).unwrap_or_default();
        let references: Vec<String> =
            decode_column(&key, "references", &references_json).unwrap_or_default();
        let review: Option<ReviewData> =
            review_json.and_then(|json| decode_column(&key, "review", &json));
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));

        Ok(EntryRecord {
            key,
            position: row.get(1)?,
            msgctxt: row.get(2)?,
            msgid: row.get(3)?,
            msgid_plural: row.get(4)?,
            msgstr: row.get(5)?,
            msgstr_plural,
            flags,
            obsolete: row.get(8)?,
            comment: row.get(9)?,
            tcomment: row.get(10)?,
            references,
            review,
            updated_at,
        })
    }

    // ========================================
    // Writes
    // ========================================

    /// Insert a new entry. Fails with `DuplicateKey` if the key exists.
    pub fn insert(&self, record: &EntryRecord) -> Result<()> {
        let encoded = EncodedRecord::new(record)?;
        {
            let conn = self.lock()?;
            encoded.insert(&conn, &timestamp()).map_err(|e| {
                if is_constraint_violation(&e) {
                    PoviewError::DuplicateKey {
                        key: record.key.clone(),
                    }
                } else {
                    e.into()
                }
            })?;
        }

        debug!("Inserted entry: {}", record.key);
        self.emit(ChangeEvent::Inserted(record.key.clone()));
        Ok(())
    }

    /// Replace an existing entry. Fails with `EntryNotFound` if absent.
    pub fn update(&self, record: &EntryRecord) -> Result<()> {
        let encoded = EncodedRecord::new(record)?;
        let rows_affected = {
            let conn = self.lock()?;
            encoded.update(&conn, &timestamp())?
        };

        if rows_affected == 0 {
            return Err(PoviewError::EntryNotFound {
                key: record.key.clone(),
            });
        }

        debug!("Updated entry: {}", record.key);
        self.emit(ChangeEvent::Updated(record.key.clone()));
        Ok(())
    }

    /// Insert or replace an entry.
    pub fn upsert(&self, record: &EntryRecord) -> Result<()> {
        let encoded = EncodedRecord::new(record)?;
        let updated = {
            let conn = self.lock()?;
            let now = timestamp();
            if encoded.update(&conn, &now)? > 0 {
                true
            } else {
                encoded.insert(&conn, &now)?;
                false
            }
        };

        debug!("Upserted entry: {}", record.key);
        self.emit(if updated {
            ChangeEvent::Updated(record.key.clone())
        } else {
            ChangeEvent::Inserted(record.key.clone())
        });
        Ok(())
    }

    /// Delete an entry by key. Fails with `EntryNotFound` if absent.
    pub fn delete(&self, key: &str) -> Result<()> {
        let rows_affected = {
            let conn = self.lock()?;
            conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?
        };

        if rows_affected == 0 {
            return Err(PoviewError::EntryNotFound {
                key: key.to_string(),
            });
        }

        debug!("Deleted entry: {}", key);
        self.emit(ChangeEvent::Deleted(key.to_string()));
        Ok(())
    }

    /// Insert many entries in one transaction.
    ///
    /// A duplicate key rolls back the whole batch and fires no event.
    pub fn insert_bulk(&self, records: &[EntryRecord]) -> Result<usize> {
        let count = self.write_batch(records, false)?;
        info!("Bulk inserted {} entries", count);
        self.emit(ChangeEvent::Bulk(BulkOp::Inserted { count }));
        Ok(count)
    }

    /// Replace the whole collection in one transaction.
    pub fn replace_all(&self, records: &[EntryRecord]) -> Result<usize> {
        let count = self.write_batch(records, true)?;
        info!("Replaced store contents with {} entries", count);
        self.emit(ChangeEvent::Bulk(BulkOp::Replaced { count }));
        Ok(count)
    }

    fn write_batch(&self, records: &[EntryRecord], clear_first: bool) -> Result<usize> {
        let encoded = records
            .iter()
            .map(EncodedRecord::new)
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if clear_first {
            tx.execute("DELETE FROM entries", [])?;
        }

        let now = timestamp();
        for entry in &encoded {
            entry.insert(&tx, &now).map_err(|e| {
                if is_constraint_violation(&e) {
                    PoviewError::DuplicateKey {
                        key: entry.record.key.clone(),
                    }
                } else {
                    e.into()
                }
            })?;
        }
        tx.commit()?;

        Ok(encoded.len())
    }

    /// Replace many existing entries in one transaction.
    ///
    /// A missing key fails with `EntryNotFound`, rolls back the whole batch
    /// and fires no event.
    pub fn update_bulk(&self, records: &[EntryRecord]) -> Result<usize> {
        let encoded = records
            .iter()
            .map(EncodedRecord::new)
            .collect::<Result<Vec<_>>>()?;

        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let now = timestamp();
            for entry in &encoded {
                if entry.update(&tx, &now)? == 0 {
                    return Err(PoviewError::EntryNotFound {
                        key: entry.record.key.clone(),
                    });
                }
            }
            tx.commit()?;
        }

        let count = encoded.len();
        info!("Bulk updated {} entries", count);
        self.emit(ChangeEvent::Bulk(BulkOp::Updated { count }));
        Ok(count)
    }

    /// Insert or replace many entries in one transaction.
    ///
    /// Returns `(inserted, updated)`.
    pub fn upsert_bulk(&self, records: &[EntryRecord]) -> Result<(usize, usize)> {
        let encoded = records
            .iter()
            .map(EncodedRecord::new)
            .collect::<Result<Vec<_>>>()?;

        let mut inserted = 0;
        let mut updated = 0;
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let now = timestamp();
            for entry in &encoded {
                if entry.update(&tx, &now)? > 0 {
                    updated += 1;
                } else {
                    entry.insert(&tx, &now)?;
                    inserted += 1;
                }
            }
            tx.commit()?;
        }

        info!("Imported {} entries ({} new, {} updated)", encoded.len(), inserted, updated);
        self.emit(ChangeEvent::Bulk(BulkOp::Imported {
            count: encoded.len(),
        }));
        Ok((inserted, updated))
    }

    /// Rewrite display positions in one transaction.
    ///
    /// `keys` take positions `0..keys.len()` in the given order; entries not
    /// listed follow in their previous relative order. An unknown key fails
    /// with `EntryNotFound` and a repeated key with `InvalidParams`; either
    /// leaves positions untouched.
    pub fn reorder(&self, keys: &[String]) -> Result<usize> {
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;

            let current: Vec<String> = {
                let mut stmt = tx.prepare("SELECT key FROM entries ORDER BY position, key")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            let known: HashSet<&str> = current.iter().map(String::as_str).collect();

            let mut listed: HashSet<&str> = HashSet::with_capacity(keys.len());
            for key in keys {
                if !known.contains(key.as_str()) {
                    return Err(PoviewError::EntryNotFound { key: key.clone() });
                }
                if !listed.insert(key.as_str()) {
                    return Err(PoviewError::InvalidParams {
                        message: format!("key listed twice in new order: {}", key),
                    });
                }
            }

            let order = keys
                .iter()
                .map(String::as_str)
                .chain(current.iter().map(String::as_str).filter(|k| !listed.contains(k)));
            {
                let mut stmt = tx.prepare("UPDATE entries SET position = ?2 WHERE key = ?1")?;
                for (position, key) in order.enumerate() {
                    stmt.execute(params![key, position as i64])?;
                }
            }
            tx.commit()?;
        }

        info!("Reordered {} entries", keys.len());
        self.emit(ChangeEvent::Bulk(BulkOp::Reordered { count: keys.len() }));
        Ok(keys.len())
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<()> {
        {
            let conn = self.lock()?;
            conn.execute("DELETE FROM entries", [])?;
        }
        debug!("Cleared entry store");
        self.emit(ChangeEvent::Bulk(BulkOp::Cleared));
        Ok(())
    }

    // ========================================
    // Index maintenance
    // ========================================

    /// Rebuild the FTS5 index.
    pub fn rebuild_fts5(&self) -> Result<()> {
        {
            let conn = self.lock()?;
            FTS5Manager::new(&self.fts5_config).rebuild(&conn)?;
        }
        self.emit(ChangeEvent::Bulk(BulkOp::Reindexed));
        Ok(())
    }

    /// Optimize the FTS5 index.
    pub fn optimize_fts5(&self) -> Result<()> {
        let conn = self.lock()?;
        FTS5Manager::new(&self.fts5_config).optimize(&conn)
    }

    pub fn fts5_stats(&self) -> Result<FTS5Stats> {
        let conn = self.lock()?;
        FTS5Manager::new(&self.fts5_config).get_stats(&conn)
    }
}
