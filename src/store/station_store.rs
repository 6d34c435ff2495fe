//! StationStore: SQLite tables with a JSONL journal.
//!
//! The store persists requests, piles, users and bills using a dual approach:
//! - **SQLite database**: the working set, with indexed columns for the queries
//!   the scheduler and monitor run every tick
//! - **JSONL journal**: append-only log of committed writes, replayed into an
//!   empty database on open
//!
//! All reads and writes happen inside [`StationStore::transaction`]; a closure
//! returning `Err` rolls back every write it made.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{info, warn};
use rusqlite::{Connection, Transaction, params, params_from_iter};
use serde::de::DeserializeOwned;

use super::journal::{Journal, JournalEntry, JournalOp};
use super::query::RequestQuery;
use crate::capacity::PileQueue;
use crate::domain::{Bill, ChargeMode, ChargeRequest, Pile, PileType, RequestStatus, User};
use crate::error::{Result, StationError};
use crate::id;

const REQUESTS: &str = "requests";
const PILES: &str = "piles";
const USERS: &str = "users";
const BILLS: &str = "bills";
const META: &str = "meta";

/// Persistent station state
pub struct StationStore {
    /// Directory holding the database and journal; None for in-memory stores
    base_dir: Option<PathBuf>,

    journal: Option<Journal>,

    db: Connection,
}

impl StationStore {
    /// Open or create a store in `base_dir`.
    pub fn open_at(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir)?;

        let db_path = base_dir.join("station.db");
        let db = Connection::open(&db_path)?;
        Self::init_schema(&db)?;

        let store = Self {
            base_dir: Some(base_dir.to_path_buf()),
            journal: Some(Journal::new(base_dir.join("journal.jsonl"))),
            db,
        };
        store.rebuild_if_needed()?;

        info!("Opened station store at {}", db_path.display());
        Ok(store)
    }

    /// Open a throwaway store with no journal.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self {
            base_dir: None,
            journal: None,
            db,
        })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                mode TEXT NOT NULL,
                status TEXT NOT NULL,
                pile_id TEXT,
                queue_position INTEGER,
                created_at INTEGER NOT NULL,
                json_data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status);
            CREATE INDEX IF NOT EXISTS idx_requests_user ON requests(user_id);
            CREATE INDEX IF NOT EXISTS idx_requests_pile ON requests(pile_id);
            CREATE INDEX IF NOT EXISTS idx_requests_created ON requests(created_at);

            CREATE TABLE IF NOT EXISTS piles (
                id TEXT PRIMARY KEY,
                pile_type TEXT NOT NULL,
                status TEXT NOT NULL,
                json_data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                json_data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS bills (
                number TEXT PRIMARY KEY,
                request_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                issued_at INTEGER NOT NULL,
                json_data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_bills_user ON bills(user_id);

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Replay the journal into an empty database.
    fn rebuild_if_needed(&self) -> Result<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        if !journal.exists() {
            return Ok(());
        }

        let rows: i64 = self.db.query_row(
            "SELECT (SELECT COUNT(*) FROM requests) + (SELECT COUNT(*) FROM piles) + (SELECT COUNT(*) FROM users)",
            [],
            |row| row.get(0),
        )?;
        if rows > 0 {
            return Ok(());
        }

        let entries = journal.read_all()?;
        let tx = self.db.unchecked_transaction()?;
        for entry in &entries {
            apply_entry(&tx, entry)?;
        }
        tx.commit()?;

        info!("Rebuilt station store from {} journal entries", entries.len());
        Ok(())
    }

    /// Run `f` in a single SQLite transaction.
    ///
    /// The transaction commits only if `f` returns `Ok`. Journal entries are
    /// appended after the commit; a journal write failure is logged, since the
    /// database already holds the committed state.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut StoreTx<'_>) -> Result<T>) -> Result<T> {
        let tx = self.db.unchecked_transaction()?;
        let mut store_tx = StoreTx {
            tx,
            journal: Vec::new(),
        };

        let value = f(&mut store_tx)?;
        let entries = store_tx.commit()?;

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&entries) {
                warn!("Failed to append {} entries to {}: {}", entries.len(), journal.path().display(), e);
            }
        }
        Ok(value)
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }
}

/// A single store transaction with typed record access.
pub struct StoreTx<'a> {
    tx: Transaction<'a>,
    journal: Vec<JournalEntry>,
}

impl StoreTx<'_> {
    fn commit(self) -> Result<Vec<JournalEntry>> {
        let StoreTx { tx, journal } = self;
        tx.commit()?;
        Ok(journal)
    }

    //=== Requests ===

    pub fn get_request(&self, id: &str) -> Result<Option<ChargeRequest>> {
        get_json(&self.tx, "SELECT json_data FROM requests WHERE id = ?1", id)
    }

    pub fn require_request(&self, id: &str) -> Result<ChargeRequest> {
        self.get_request(id)?
            .ok_or_else(|| StationError::NotFound(format!("request {}", id)))
    }

    pub fn save_request(&mut self, request: &ChargeRequest) -> Result<()> {
        write_request(&self.tx, request)?;
        self.journal
            .push(JournalEntry::upsert(REQUESTS, &request.id, serde_json::to_value(request)?));
        Ok(())
    }

    /// Insert a new request; an existing request with the same id is an error
    pub fn create_request(&mut self, request: &ChargeRequest) -> Result<()> {
        if self.get_request(&request.id)?.is_some() {
            return Err(StationError::Storage(format!("request {} already exists", request.id)));
        }
        self.save_request(request)
    }

    pub fn query_requests(&self, query: &RequestQuery) -> Result<Vec<ChargeRequest>> {
        let (sql, values) = query.to_sql("SELECT json_data");
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(serde_json::from_str(&row?)?);
        }
        Ok(requests)
    }

    pub fn count_requests(&self, query: &RequestQuery) -> Result<usize> {
        let (sql, values) = query.to_sql("SELECT COUNT(*)");
        let count: i64 = self
            .tx
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count as usize)
    }

    /// The user's waiting, priority-waiting or charging request, if any
    pub fn active_request_for_user(&self, user_id: &str) -> Result<Option<ChargeRequest>> {
        Ok(self
            .query_requests(&RequestQuery::active().user(user_id).limit(1))?
            .into_iter()
            .next())
    }

    /// Active requests pointing at a pile that no longer exists
    pub fn orphaned_requests(&self) -> Result<Vec<ChargeRequest>> {
        let mut stmt = self.tx.prepare(
            "SELECT json_data FROM requests
             WHERE pile_id IS NOT NULL
               AND status IN ('WAITING', 'PRIORITY_WAITING', 'CHARGING')
               AND pile_id NOT IN (SELECT id FROM piles)
             ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(serde_json::from_str(&row?)?);
        }
        Ok(requests)
    }

    pub fn next_request_id(&mut self, mode: ChargeMode) -> Result<String> {
        let seq = self.next_sequence(&format!("seq.request.{}", mode.id_prefix()))?;
        Ok(id::request_id(mode, seq))
    }

    //=== Piles ===

    pub fn get_pile(&self, id: &str) -> Result<Option<Pile>> {
        get_json(&self.tx, "SELECT json_data FROM piles WHERE id = ?1", id)
    }

    pub fn require_pile(&self, id: &str) -> Result<Pile> {
        self.get_pile(id)?
            .ok_or_else(|| StationError::NotFound(format!("pile {}", id)))
    }

    pub fn save_pile(&mut self, pile: &Pile) -> Result<()> {
        write_pile(&self.tx, pile)?;
        self.journal
            .push(JournalEntry::upsert(PILES, &pile.id, serde_json::to_value(pile)?));
        Ok(())
    }

    pub fn delete_pile(&mut self, id: &str) -> Result<bool> {
        let removed = self.tx.execute("DELETE FROM piles WHERE id = ?1", [id])? > 0;
        if removed {
            self.journal.push(JournalEntry::delete(PILES, id));
        }
        Ok(removed)
    }

    /// All piles in creation order
    pub fn list_piles(&self) -> Result<Vec<Pile>> {
        let mut stmt = self.tx.prepare("SELECT json_data FROM piles ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut piles = Vec::new();
        for row in rows {
            piles.push(serde_json::from_str(&row?)?);
        }
        Ok(piles)
    }

    pub fn next_pile_id(&mut self, pile_type: PileType) -> Result<String> {
        let seq = self.next_sequence(&format!("seq.pile.{}", pile_type.as_str()))?;
        Ok(id::pile_id(pile_type, seq))
    }

    /// Load a pile together with the requests occupying it
    pub fn pile_queue(&self, pile: &Pile) -> Result<PileQueue> {
        let mut queue = PileQueue::new(pile.clone());
        let occupants = self.query_requests(
            &RequestQuery::statuses(&[RequestStatus::Waiting, RequestStatus::Charging]).at_pile(&pile.id),
        )?;
        for request in occupants {
            if request.status == RequestStatus::Charging {
                queue.charging = Some(request);
            } else {
                queue.push(request);
            }
        }
        Ok(queue)
    }

    /// Queues for every pile, in creation order
    pub fn pile_queues(&self) -> Result<Vec<PileQueue>> {
        self.list_piles()?.iter().map(|p| self.pile_queue(p)).collect()
    }

    /// Close gaps in a pile's queue after a request left it.
    ///
    /// The charging request keeps position 1; waiting requests follow in their
    /// existing order.
    pub fn renumber_queue(&mut self, pile_id: &str) -> Result<()> {
        let occupants = self.query_requests(
            &RequestQuery::statuses(&[RequestStatus::Waiting, RequestStatus::Charging]).at_pile(pile_id),
        )?;
        let (charging, waiting): (Vec<_>, Vec<_>) = occupants
            .into_iter()
            .partition(|r| r.status == RequestStatus::Charging);

        let mut position = 1;
        for mut request in charging.into_iter().chain(waiting) {
            if request.queue_position != Some(position) {
                request.queue_position = Some(position);
                self.save_request(&request)?;
            }
            position += 1;
        }
        Ok(())
    }

    //=== Users ===

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        get_json(&self.tx, "SELECT json_data FROM users WHERE id = ?1", id)
    }

    pub fn require_user(&self, id: &str) -> Result<User> {
        self.get_user(id)?
            .ok_or_else(|| StationError::NotFound(format!("user {}", id)))
    }

    pub fn save_user(&mut self, user: &User) -> Result<()> {
        write_user(&self.tx, user)?;
        self.journal
            .push(JournalEntry::upsert(USERS, &user.id, serde_json::to_value(user)?));
        Ok(())
    }

    //=== Bills ===

    pub fn save_bill(&mut self, bill: &Bill) -> Result<()> {
        write_bill(&self.tx, bill)?;
        self.journal
            .push(JournalEntry::upsert(BILLS, &bill.number, serde_json::to_value(bill)?));
        Ok(())
    }

    pub fn bills_for_user(&self, user_id: &str) -> Result<Vec<Bill>> {
        let mut stmt = self
            .tx
            .prepare("SELECT json_data FROM bills WHERE user_id = ?1 ORDER BY issued_at, rowid")?;
        let rows = stmt.query_map([user_id], |row| row.get::<_, String>(0))?;

        let mut bills = Vec::new();
        for row in rows {
            bills.push(serde_json::from_str(&row?)?);
        }
        Ok(bills)
    }

    pub fn bills_for_pile(&self, pile_id: &str) -> Result<Vec<Bill>> {
        let mut stmt = self
            .tx
            .prepare("SELECT json_data FROM bills WHERE json_extract(json_data, '$.pile_id') = ?1 ORDER BY issued_at, rowid")?;
        let rows = stmt.query_map([pile_id], |row| row.get::<_, String>(0))?;

        let mut bills = Vec::new();
        for row in rows {
            bills.push(serde_json::from_str(&row?)?);
        }
        Ok(bills)
    }

    pub fn bill_for_request(&self, request_id: &str) -> Result<Option<Bill>> {
        get_json(&self.tx, "SELECT json_data FROM bills WHERE request_id = ?1", request_id)
    }

    pub fn next_bill_number(&mut self, date: NaiveDate) -> Result<String> {
        let seq = self.next_sequence(&format!("seq.bill.{}", date.format("%Y%m%d")))?;
        Ok(id::bill_number(date, seq))
    }

    //=== Meta ===

    fn next_sequence(&mut self, key: &str) -> Result<u64> {
        let current: Option<String> = match self
            .tx
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
        {
            Ok(value) => Some(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        let current = match current {
            Some(value) => value
                .parse::<u64>()
                .map_err(|e| StationError::Storage(format!("corrupt counter {}: {}", key, e)))?,
            None => 0,
        };
        let next = current + 1;

        write_meta(&self.tx, key, &next.to_string())?;
        self.journal
            .push(JournalEntry::upsert(META, key, serde_json::json!({ "value": next.to_string() })));
        Ok(next)
    }
}

fn get_json<T: DeserializeOwned>(db: &Connection, sql: &str, key: &str) -> Result<Option<T>> {
    let result = db.query_row(sql, [key], |row| {
        let json: String = row.get(0)?;
        Ok(json)
    });

    match result {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_request(db: &Connection, request: &ChargeRequest) -> Result<()> {
    db.execute(
        r#"
        INSERT INTO requests
        (id, user_id, mode, status, pile_id, queue_position, created_at, json_data)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            mode = excluded.mode,
            status = excluded.status,
            pile_id = excluded.pile_id,
            queue_position = excluded.queue_position,
            created_at = excluded.created_at,
            json_data = excluded.json_data
        "#,
        params![
            request.id,
            request.user_id,
            request.mode.as_str(),
            request.status.as_str(),
            request.pile_id,
            request.queue_position,
            id::timestamp_ms(request.created_at),
            serde_json::to_string(request)?,
        ],
    )?;
    Ok(())
}

fn write_pile(db: &Connection, pile: &Pile) -> Result<()> {
    db.execute(
        r#"
        INSERT INTO piles (id, pile_type, status, json_data)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO UPDATE SET
            pile_type = excluded.pile_type,
            status = excluded.status,
            json_data = excluded.json_data
        "#,
        params![
            pile.id,
            pile.pile_type.as_str(),
            pile.status.as_str(),
            serde_json::to_string(pile)?,
        ],
    )?;
    Ok(())
}

fn write_user(db: &Connection, user: &User) -> Result<()> {
    db.execute(
        r#"
        INSERT INTO users (id, json_data) VALUES (?1, ?2)
        ON CONFLICT(id) DO UPDATE SET json_data = excluded.json_data
        "#,
        params![user.id, serde_json::to_string(user)?],
    )?;
    Ok(())
}

fn write_bill(db: &Connection, bill: &Bill) -> Result<()> {
    db.execute(
        r#"
        INSERT INTO bills (number, request_id, user_id, issued_at, json_data)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(number) DO UPDATE SET
            request_id = excluded.request_id,
            user_id = excluded.user_id,
            issued_at = excluded.issued_at,
            json_data = excluded.json_data
        "#,
        params![
            bill.number,
            bill.request_id,
            bill.user_id,
            id::timestamp_ms(bill.issued_at),
            serde_json::to_string(bill)?,
        ],
    )?;
    Ok(())
}

fn write_meta(db: &Connection, key: &str, value: &str) -> Result<()> {
    db.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Apply one journal entry without re-journaling it
fn apply_entry(db: &Connection, entry: &JournalEntry) -> Result<()> {
    match (entry.table.as_str(), entry.op) {
        (REQUESTS, JournalOp::Upsert) => write_request(db, &serde_json::from_value(entry.record.clone())?),
        (PILES, JournalOp::Upsert) => write_pile(db, &serde_json::from_value(entry.record.clone())?),
        (USERS, JournalOp::Upsert) => write_user(db, &serde_json::from_value(entry.record.clone())?),
        (BILLS, JournalOp::Upsert) => write_bill(db, &serde_json::from_value(entry.record.clone())?),
        (META, JournalOp::Upsert) => {
            let value = entry.record.get("value").and_then(|v| v.as_str()).ok_or_else(|| {
                StationError::Storage(format!("journal meta entry {} has no value", entry.key))
            })?;
            write_meta(db, &entry.key, value)
        }
        (table @ (REQUESTS | PILES | USERS | BILLS | META), JournalOp::Delete) => {
            let key_column = match table {
                BILLS => "number",
                META => "key",
                _ => "id",
            };
            db.execute(&format!("DELETE FROM {} WHERE {} = ?1", table, key_column), [&entry.key])?;
            Ok(())
        }
        (other, _) => Err(StationError::Storage(format!("unknown journal table: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PileStatus;
    use chrono::{Duration, NaiveDateTime};
    use tempfile::TempDir;

    fn create_temp_store() -> (StationStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = StationStore::open_at(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn at(minute: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(8, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn waiting(id: &str, user: &str, mode: ChargeMode, minute: i64) -> ChargeRequest {
        ChargeRequest::new(id.to_string(), user, mode, 10.0, at(minute))
    }

    #[test]
    fn test_open_creates_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = StationStore::open_at(temp_dir.path()).unwrap();
        assert!(temp_dir.path().join("station.db").exists());
        assert_eq!(store.base_dir(), Some(temp_dir.path()));
    }

    #[test]
    fn test_save_and_get_request() {
        let (store, _temp) = create_temp_store();
        let request = waiting("F1", "alice", ChargeMode::Fast, 0);

        store.transaction(|tx| tx.save_request(&request)).unwrap();

        let loaded = store.transaction(|tx| tx.get_request("F1")).unwrap().unwrap();
        assert_eq!(loaded, request);
        assert!(store.transaction(|tx| tx.get_request("F9")).unwrap().is_none());
    }

    #[test]
    fn test_create_request_refuses_existing_id() {
        let (store, _temp) = create_temp_store();
        let first = waiting("F1", "alice", ChargeMode::Fast, 0);
        store.transaction(|tx| tx.create_request(&first)).unwrap();

        let clash = waiting("F1", "bob", ChargeMode::Fast, 3);
        let err = store.transaction(|tx| tx.create_request(&clash)).unwrap_err();
        assert!(matches!(err, StationError::Storage(_)));

        let loaded = store.transaction(|tx| tx.require_request("F1")).unwrap();
        assert_eq!(loaded.user_id, "alice");
    }

    #[test]
    fn test_require_missing_is_not_found() {
        let (store, _temp) = create_temp_store();
        let err = store.transaction(|tx| tx.require_pile("F001")).unwrap_err();
        assert!(matches!(err, StationError::NotFound(_)));
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let (store, _temp) = create_temp_store();
        let result: Result<()> = store.transaction(|tx| {
            tx.save_request(&waiting("F1", "alice", ChargeMode::Fast, 0))?;
            Err(StationError::Precondition("abort".to_string()))
        });
        assert!(result.is_err());
        assert!(store.transaction(|tx| tx.get_request("F1")).unwrap().is_none());
    }

    #[test]
    fn test_query_holding_area_oldest_first() {
        let (store, _temp) = create_temp_store();
        store
            .transaction(|tx| {
                tx.save_request(&waiting("F2", "bob", ChargeMode::Fast, 5))?;
                tx.save_request(&waiting("F1", "alice", ChargeMode::Fast, 1))?;
                tx.save_request(&waiting("T1", "carol", ChargeMode::Slow, 0))?;
                let mut queued = waiting("F3", "dave", ChargeMode::Fast, 0);
                queued.assign("F001", 1)?;
                tx.save_request(&queued)
            })
            .unwrap();

        let fast = store
            .transaction(|tx| {
                tx.query_requests(&RequestQuery::status(RequestStatus::Waiting).unassigned().mode(ChargeMode::Fast))
            })
            .unwrap();
        let ids: Vec<_> = fast.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["F1", "F2"]);

        let count = store
            .transaction(|tx| tx.count_requests(&RequestQuery::status(RequestStatus::Waiting).unassigned()))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order_across_updates() {
        let (store, _temp) = create_temp_store();
        store
            .transaction(|tx| {
                tx.save_request(&waiting("F1", "a", ChargeMode::Fast, 0))?;
                tx.save_request(&waiting("F2", "b", ChargeMode::Fast, 0))?;
                let mut first = tx.require_request("F1")?;
                first.amount = 12.0;
                tx.save_request(&first)
            })
            .unwrap();

        let all = store.transaction(|tx| tx.query_requests(&RequestQuery::all())).unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["F1", "F2"]);
    }

    #[test]
    fn test_active_request_for_user() {
        let (store, _temp) = create_temp_store();
        store
            .transaction(|tx| {
                let mut done = waiting("F1", "alice", ChargeMode::Fast, 0);
                done.status = RequestStatus::Completed;
                tx.save_request(&done)?;
                tx.save_request(&waiting("F2", "alice", ChargeMode::Fast, 1))
            })
            .unwrap();

        let active = store.transaction(|tx| tx.active_request_for_user("alice")).unwrap();
        assert_eq!(active.map(|r| r.id), Some("F2".to_string()));
        assert!(store.transaction(|tx| tx.active_request_for_user("bob")).unwrap().is_none());
    }

    #[test]
    fn test_sequences_are_per_mode_and_monotonic() {
        let (store, _temp) = create_temp_store();
        let ids = store
            .transaction(|tx| {
                Ok(vec![
                    tx.next_request_id(ChargeMode::Fast)?,
                    tx.next_request_id(ChargeMode::Slow)?,
                    tx.next_request_id(ChargeMode::Fast)?,
                    tx.next_pile_id(PileType::Slow)?,
                ])
            })
            .unwrap();
        assert_eq!(ids, vec!["F1", "T1", "F2", "T001"]);
    }

    #[test]
    fn test_bill_numbers_restart_each_day() {
        let (store, _temp) = create_temp_store();
        let day1 = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let numbers = store
            .transaction(|tx| {
                Ok(vec![
                    tx.next_bill_number(day1)?,
                    tx.next_bill_number(day1)?,
                    tx.next_bill_number(day2)?,
                ])
            })
            .unwrap();
        assert_eq!(numbers, vec!["BILL202406010001", "BILL202406010002", "BILL202406020001"]);
    }

    #[test]
    fn test_pile_queue_splits_charging_and_waiting() {
        let (store, _temp) = create_temp_store();
        let pile = Pile::new("F001", PileType::Fast, 30.0);
        let queue = store
            .transaction(|tx| {
                tx.save_pile(&pile)?;
                let mut charging = waiting("F1", "a", ChargeMode::Fast, 0);
                charging.assign("F001", 1)?;
                charging.transition(RequestStatus::Charging)?;
                tx.save_request(&charging)?;
                let mut next = waiting("F2", "b", ChargeMode::Fast, 1);
                next.assign("F001", 2)?;
                tx.save_request(&next)?;
                tx.pile_queue(&pile)
            })
            .unwrap();

        assert_eq!(queue.charging.as_ref().map(|r| r.id.as_str()), Some("F1"));
        assert_eq!(queue.waiting.len(), 1);
        assert_eq!(queue.next_position(), 3);
    }

    #[test]
    fn test_renumber_queue_closes_gaps() {
        let (store, _temp) = create_temp_store();
        store
            .transaction(|tx| {
                tx.save_pile(&Pile::new("F001", PileType::Fast, 30.0))?;
                let mut a = waiting("F1", "a", ChargeMode::Fast, 0);
                a.assign("F001", 2)?;
                tx.save_request(&a)?;
                let mut b = waiting("F2", "b", ChargeMode::Fast, 1);
                b.assign("F001", 4)?;
                tx.save_request(&b)?;
                tx.renumber_queue("F001")
            })
            .unwrap();

        let positions: Vec<_> = store
            .transaction(|tx| tx.query_requests(&RequestQuery::active().at_pile("F001")))
            .unwrap()
            .into_iter()
            .map(|r| r.queue_position)
            .collect();
        assert_eq!(positions, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_list_piles_in_creation_order() {
        let (store, _temp) = create_temp_store();
        store
            .transaction(|tx| {
                tx.save_pile(&Pile::new("T001", PileType::Slow, 7.0))?;
                tx.save_pile(&Pile::new("F001", PileType::Fast, 30.0))?;
                let mut first = tx.require_pile("T001")?;
                first.status = PileStatus::Unavailable;
                tx.save_pile(&first)
            })
            .unwrap();

        let ids: Vec<_> = store
            .transaction(|tx| tx.list_piles())
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["T001", "F001"]);
    }

    #[test]
    fn test_orphaned_requests() {
        let (store, _temp) = create_temp_store();
        store
            .transaction(|tx| {
                let mut r = waiting("F1", "a", ChargeMode::Fast, 0);
                r.assign("F404", 1)?;
                tx.save_request(&r)
            })
            .unwrap();
        let orphans = store.transaction(|tx| tx.orphaned_requests()).unwrap();
        assert_eq!(orphans.len(), 1);
    }

    #[test]
    fn test_rebuild_from_journal() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = StationStore::open_at(temp_dir.path()).unwrap();
            store
                .transaction(|tx| {
                    tx.save_pile(&Pile::new("F001", PileType::Fast, 30.0))?;
                    tx.save_user(&User::new("alice", "Alice", 60.0))?;
                    let id = tx.next_request_id(ChargeMode::Fast)?;
                    tx.save_request(&waiting(&id, "alice", ChargeMode::Fast, 0))
                })
                .unwrap();
        }

        fs::remove_file(temp_dir.path().join("station.db")).unwrap();

        let store = StationStore::open_at(temp_dir.path()).unwrap();
        let (pile, user, request, next) = store
            .transaction(|tx| {
                Ok((
                    tx.get_pile("F001")?,
                    tx.get_user("alice")?,
                    tx.get_request("F1")?,
                    tx.next_request_id(ChargeMode::Fast)?,
                ))
            })
            .unwrap();
        assert!(pile.is_some());
        assert!(user.is_some());
        assert!(request.is_some());
        assert_eq!(next, "F2");
    }

    #[test]
    fn test_rebuild_applies_deletes() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = StationStore::open_at(temp_dir.path()).unwrap();
            store
                .transaction(|tx| {
                    tx.save_pile(&Pile::new("F001", PileType::Fast, 30.0))?;
                    tx.save_pile(&Pile::new("F002", PileType::Fast, 30.0))?;
                    tx.delete_pile("F001")
                })
                .unwrap();
        }
        fs::remove_file(temp_dir.path().join("station.db")).unwrap();

        let store = StationStore::open_at(temp_dir.path()).unwrap();
        let piles = store.transaction(|tx| tx.list_piles()).unwrap();
        assert_eq!(piles.len(), 1);
        assert_eq!(piles[0].id, "F002");
    }

    #[test]
    fn test_in_memory_store() {
        let store = StationStore::open_in_memory().unwrap();
        assert!(store.base_dir().is_none());
        store.transaction(|tx| tx.save_user(&User::new("u", "U", 40.0))).unwrap();
        assert!(store.transaction(|tx| tx.get_user("u")).unwrap().is_some());
    }
}
