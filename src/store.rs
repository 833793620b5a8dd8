//! SQLite persistence for extracted records.
//!
//! One flat `bank_records` table, created idempotently at open. Column
//! names mirror the wire's camelCase so stored rows serialize to API
//! responses without a renaming layer in between. `createdAt` is assigned
//! by SQLite at insert time; the pipeline never supplies it.
//!
//! The store is synchronous (rusqlite) behind a mutex; async callers hop
//! onto the blocking pool for each operation. One process owns the file.

use crate::error::StoreError;
use crate::record::{ExtractedRecord, RecordFields};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS bank_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    accountName TEXT NOT NULL DEFAULT '',
    accountNumber TEXT NOT NULL DEFAULT '',
    routingNumber TEXT NOT NULL DEFAULT '',
    checkNumber TEXT NOT NULL DEFAULT '',
    ifsc TEXT NOT NULL DEFAULT '',
    bankName TEXT NOT NULL DEFAULT '',
    branch TEXT NOT NULL DEFAULT '',
    rawText TEXT NOT NULL DEFAULT '',
    createdAt DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_bank_records_account ON bank_records(accountNumber);
CREATE INDEX IF NOT EXISTS idx_bank_records_created ON bank_records(createdAt);
";

const COLUMNS: &str = "id, accountName, accountNumber, routingNumber, checkNumber, \
                       ifsc, bankName, branch, rawText, createdAt";

/// Columns a client may sort on. Anything else falls back to `createdAt`.
const SORT_COLUMNS: &[&str] = &[
    "id",
    "accountName",
    "accountNumber",
    "routingNumber",
    "checkNumber",
    "ifsc",
    "bankName",
    "branch",
    "createdAt",
];

/// Columns the free-text search matches against.
const SEARCH_COLUMNS: &[&str] = &[
    "accountName",
    "accountNumber",
    "bankName",
    "branch",
    "ifsc",
];

/// A persisted row: the extracted values plus table id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: i64,
    pub account_name: String,
    pub account_number: String,
    pub routing_number: String,
    pub check_number: String,
    pub ifsc: String,
    pub bank_name: String,
    pub branch: String,
    pub raw_text: String,
    pub created_at: String,
}

/// Listing parameters, straight off the query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListQuery {
    pub search: Option<String>,
    #[serde(rename = "sort")]
    pub sort_by: Option<String>,
    pub order: SortOrder,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// One page of records plus the unpaged total.
#[derive(Debug, Clone)]
pub struct RecordPage {
    pub records: Vec<StoredRecord>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    /// Open (or create) the database at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            // Best effort; Connection::open reports the real failure.
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoning panic happened under the lock; the connection itself
        // is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert one extracted record, returning the stored row with its
    /// server-assigned id and timestamp.
    pub fn insert(&self, record: &ExtractedRecord) -> Result<StoredRecord, StoreError> {
        let id = {
            let conn = self.conn();
            conn.execute(
                "INSERT INTO bank_records
                 (accountName, accountNumber, routingNumber, checkNumber, ifsc, bankName, branch, rawText)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.account_name,
                    record.account_number,
                    record.routing_number,
                    record.check_number,
                    record.ifsc,
                    record.bank_name,
                    record.branch,
                    record.raw_text,
                ],
            )?;
            conn.last_insert_rowid()
        };
        debug!(id, "record persisted");
        self.get(id)?
            .ok_or_else(|| StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Fetch one row by id.
    pub fn get(&self, id: i64) -> Result<Option<StoredRecord>, StoreError> {
        let conn = self.conn();
        let sql = format!("SELECT {COLUMNS} FROM bank_records WHERE id = ?1");
        let row = conn
            .query_row(&sql, params![id], row_to_record)
            .optional()?;
        Ok(row)
    }

    /// Filtered, sorted, paged listing.
    ///
    /// The sort column is validated against [`SORT_COLUMNS`]; unknown input
    /// silently falls back to `createdAt` rather than erroring, so a stale
    /// client keeps working after a schema change.
    pub fn list(&self, query: &ListQuery) -> Result<RecordPage, StoreError> {
        let conn = self.conn();
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
        let sort = sort_column(query.sort_by.as_deref());
        let dir = query.order.sql();
        let limit = i64::from(per_page);
        let offset = i64::from((page - 1) * per_page);

        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{q}%"));

        let (records, total) = if let Some(pattern) = &pattern {
            let clause = search_clause();
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM bank_records WHERE {clause}"),
                params![pattern],
                |row| row.get(0),
            )?;
            let sql = format!(
                "SELECT {COLUMNS} FROM bank_records WHERE {clause} \
                 ORDER BY {sort} {dir} LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![pattern, limit, offset], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            (rows, total)
        } else {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM bank_records", [], |row| row.get(0))?;
            let sql = format!(
                "SELECT {COLUMNS} FROM bank_records ORDER BY {sort} {dir} LIMIT ?1 OFFSET ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit, offset], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            (rows, total)
        };

        Ok(RecordPage {
            records,
            total,
            page,
            per_page,
        })
    }

    /// Manual-edit path: replace the seven banking fields of one row.
    ///
    /// Transcript and timestamp are not editable. Returns the updated row,
    /// or `None` when the id does not exist.
    pub fn update_fields(
        &self,
        id: i64,
        fields: &RecordFields,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let changed = {
            let conn = self.conn();
            conn.execute(
                "UPDATE bank_records SET
                 accountName = ?1, accountNumber = ?2, routingNumber = ?3,
                 checkNumber = ?4, ifsc = ?5, bankName = ?6, branch = ?7
                 WHERE id = ?8",
                params![
                    fields.account_name,
                    fields.account_number,
                    fields.routing_number,
                    fields.check_number,
                    fields.ifsc,
                    fields.bank_name,
                    fields.branch,
                    id,
                ],
            )?
        };
        if changed == 0 {
            return Ok(None);
        }
        debug!(id, "record fields updated");
        self.get(id)
    }

    /// Every record, newest first. The legacy history view.
    pub fn history(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let conn = self.conn();
        let sql = format!("SELECT {COLUMNS} FROM bank_records ORDER BY id DESC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM bank_records", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn sort_column(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|name| SORT_COLUMNS.iter().find(|c| **c == name))
        .copied()
        .unwrap_or("createdAt")
}

fn search_clause() -> String {
    SEARCH_COLUMNS
        .iter()
        .map(|c| format!("{c} LIKE ?1"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        account_name: row.get(1)?,
        account_number: row.get(2)?,
        routing_number: row.get(3)?,
        check_number: row.get(4)?,
        ifsc: row.get(5)?,
        bank_name: row.get(6)?,
        branch: row.get(7)?,
        raw_text: row.get(8)?,
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, bank: &str) -> ExtractedRecord {
        ExtractedRecord {
            account_name: name.to_string(),
            account_number: "123456789012".to_string(),
            routing_number: "021000021".to_string(),
            check_number: "0456".to_string(),
            ifsc: "ABCD0123456".to_string(),
            bank_name: bank.to_string(),
            branch: "LA JOLLA".to_string(),
            raw_text: "raw transcript • with unicode".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let store = RecordStore::in_memory().unwrap();
        let record = sample("THE CANTER GROUP LLC", "CALPRIVATE BANK");

        let stored = store.insert(&record).unwrap();
        assert!(stored.id > 0);
        assert!(!stored.created_at.is_empty(), "store assigns createdAt");

        let fetched = store.get(stored.id).unwrap().unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(fetched.account_name, record.account_name);
        assert_eq!(fetched.account_number, record.account_number);
        assert_eq!(fetched.routing_number, record.routing_number);
        assert_eq!(fetched.check_number, record.check_number);
        assert_eq!(fetched.ifsc, record.ifsc);
        assert_eq!(fetched.bank_name, record.bank_name);
        assert_eq!(fetched.branch, record.branch);
        assert_eq!(fetched.raw_text, record.raw_text);
    }

    #[test]
    fn get_missing_id_is_none() {
        let store = RecordStore::in_memory().unwrap();
        assert!(store.get(9999).unwrap().is_none());
    }

    #[test]
    fn list_paginates_deterministically_by_id() {
        let store = RecordStore::in_memory().unwrap();
        for n in 0..5 {
            store.insert(&sample(&format!("NAME {n}"), "ACME BANK")).unwrap();
        }

        let page = store
            .list(&ListQuery {
                sort_by: Some("id".to_string()),
                order: SortOrder::Asc,
                page: Some(2),
                per_page: Some(2),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.page, 2);
        assert_eq!(page.per_page, 2);
        let ids: Vec<i64> = page.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn list_search_filters_across_columns() {
        let store = RecordStore::in_memory().unwrap();
        store.insert(&sample("THE CANTER GROUP LLC", "CALPRIVATE BANK")).unwrap();
        store.insert(&sample("MR JOHN SMITH", "OTHER BANK")).unwrap();

        let hits = store
            .list(&ListQuery {
                search: Some("calprivate".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.records[0].bank_name, "CALPRIVATE BANK");

        let by_name = store
            .list(&ListQuery {
                search: Some("SMITH".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_name.total, 1);
        assert_eq!(by_name.records[0].account_name, "MR JOHN SMITH");
    }

    #[test]
    fn unknown_sort_column_falls_back_to_created_at() {
        let store = RecordStore::in_memory().unwrap();
        store.insert(&sample("A", "B BANK")).unwrap();

        // Injection-shaped input degrades to the default sort, untouched.
        let page = store
            .list(&ListQuery {
                sort_by: Some("createdAt; DROP TABLE bank_records".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn sorting_by_whitelisted_column_works() {
        let store = RecordStore::in_memory().unwrap();
        store.insert(&sample("ZEBRA LLC", "Z BANK")).unwrap();
        store.insert(&sample("ALPHA LLC", "A BANK")).unwrap();

        let page = store
            .list(&ListQuery {
                sort_by: Some("accountName".to_string()),
                order: SortOrder::Asc,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.records[0].account_name, "ALPHA LLC");
        assert_eq!(page.records[1].account_name, "ZEBRA LLC");
    }

    #[test]
    fn update_replaces_fields_but_not_transcript() {
        let store = RecordStore::in_memory().unwrap();
        let stored = store.insert(&sample("OLD NAME", "OLD BANK")).unwrap();

        let edited = RecordFields {
            account_name: "NEW NAME".to_string(),
            account_number: "987654321".to_string(),
            routing_number: "121000358".to_string(),
            check_number: "0001".to_string(),
            ifsc: "".to_string(),
            bank_name: "NEW BANK".to_string(),
            branch: "ELSEWHERE".to_string(),
        };
        let updated = store.update_fields(stored.id, &edited).unwrap().unwrap();
        assert_eq!(updated.account_name, "NEW NAME");
        assert_eq!(updated.bank_name, "NEW BANK");
        assert_eq!(updated.ifsc, "");
        assert_eq!(updated.raw_text, stored.raw_text, "transcript untouched");
        assert_eq!(updated.created_at, stored.created_at);

        assert!(store.update_fields(424242, &edited).unwrap().is_none());
    }

    #[test]
    fn history_returns_newest_first() {
        let store = RecordStore::in_memory().unwrap();
        for n in 0..3 {
            store.insert(&sample(&format!("N{n}"), "BANK")).unwrap();
        }
        let rows = store.history().unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
