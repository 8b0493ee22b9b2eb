//! SQLite-backed submission ledger.
//!
//! Each `submit` runs in one transaction that deletes whatever the new record
//! supersedes and inserts it, so a crash leaves either the previous state or
//! the new one. The store is a single writer: mutation takes `&mut self`, and
//! shared owners wrap it in a mutex.
//!
//! # Dedup
//!
//! A record supersedes every stored record with the same prover and cell whose
//! timestamp is strictly less than `dedup_window` away from its own. Records
//! further apart coexist.

use geoproof_core::{validate_prefix, GeoCell, LedgerConfig, PublicInputHash};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Result, SubmitError};
use crate::record::SubmissionRecord;

/// Counters for the ledger
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerMetrics {
    pub submissions_accepted_total: u64,
    pub submissions_superseded_total: u64,
    pub submissions_rejected_total: u64,
    pub records_pruned_total: u64,
}

/// Result of an accepted submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub id: i64,
    /// Records removed by the dedup rule
    pub superseded: usize,
    pub public_input_hash: Option<PublicInputHash>,
}

const SELECT_COLUMNS: &str = "geo_cell, prover_id, categories, rating, text, timestamp_unix, \
     proof_bytes, public_input_bytes, expires_at_unix";

/// Raw row, converted outside the rusqlite closure so decode failures keep their cause.
struct StoredRow {
    geo_cell: String,
    prover_id: Vec<u8>,
    categories: String,
    rating: i64,
    text: String,
    timestamp_unix: i64,
    proof_bytes: Option<Vec<u8>>,
    public_input_bytes: Option<Vec<u8>>,
    expires_at_unix: Option<i64>,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            geo_cell: row.get(0)?,
            prover_id: row.get(1)?,
            categories: row.get(2)?,
            rating: row.get(3)?,
            text: row.get(4)?,
            timestamp_unix: row.get(5)?,
            proof_bytes: row.get(6)?,
            public_input_bytes: row.get(7)?,
            expires_at_unix: row.get(8)?,
        })
    }

    fn into_record(self, precision: usize) -> Result<SubmissionRecord> {
        let geo_cell = GeoCell::parse(&self.geo_cell, precision)
            .map_err(|e| SubmitError::Corrupted(format!("geo_cell {}: {e}", self.geo_cell)))?;
        let categories: BTreeSet<String> = serde_json::from_str(&self.categories)
            .map_err(|e| SubmitError::Corrupted(format!("categories: {e}")))?;
        let rating = u8::try_from(self.rating)
            .map_err(|_| SubmitError::Corrupted(format!("rating {}", self.rating)))?;

        Ok(SubmissionRecord {
            prover_id: self.prover_id,
            geo_cell,
            categories,
            rating,
            text: self.text,
            timestamp_unix: self.timestamp_unix,
            proof_bytes: self.proof_bytes,
            public_input_bytes: self.public_input_bytes,
            expires_at_unix: self.expires_at_unix,
        })
    }
}

pub struct SubmissionLedger {
    conn: Connection,
    dedup_window_secs: i64,
    precision: usize,
    metrics: LedgerMetrics,
}

impl SubmissionLedger {
    /// Create or open a ledger at `path`.
    pub fn open(path: impl AsRef<Path>, config: &LedgerConfig) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening submission ledger");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn, config)
    }

    /// Volatile ledger for tests and local development.
    pub fn open_in_memory(config: &LedgerConfig) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, config)
    }

    fn with_connection(conn: Connection, config: &LedgerConfig) -> Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn,
            dedup_window_secs: i64::try_from(config.dedup_window_secs).unwrap_or(i64::MAX),
            precision: config.geo_cell_precision,
            metrics: LedgerMetrics::default(),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS submissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prover_id BLOB NOT NULL,
                geo_cell TEXT NOT NULL,
                categories TEXT NOT NULL,
                rating INTEGER NOT NULL,
                text TEXT NOT NULL,
                timestamp_unix INTEGER NOT NULL,
                proof_bytes BLOB,
                public_input_bytes BLOB,
                public_input_hash BLOB,
                expires_at_unix INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_submissions_prover_cell
                ON submissions(prover_id, geo_cell);
            CREATE INDEX IF NOT EXISTS idx_submissions_geo_cell ON submissions(geo_cell);
            CREATE INDEX IF NOT EXISTS idx_submissions_pih ON submissions(public_input_hash);
            "#,
        )?;
        Ok(())
    }

    /// Validate and store a record, superseding same-prover same-cell records
    /// inside the dedup window. Invalid records are never persisted.
    pub fn submit(&mut self, record: SubmissionRecord) -> Result<SubmitReceipt> {
        let public_input_hash = match record.validate(self.precision) {
            Ok(hash) => hash,
            Err(e) => {
                self.metrics.submissions_rejected_total += 1;
                debug!(error = %e, "Submission rejected");
                return Err(e);
            }
        };

        let categories = serde_json::to_string(&record.categories)
            .map_err(|e| SubmitError::invalid("categories", e.to_string()))?;

        let tx = self.conn.transaction()?;

        let superseded = tx.execute(
            r#"
            DELETE FROM submissions
            WHERE prover_id = ?1 AND geo_cell = ?2 AND abs(timestamp_unix - ?3) < ?4
            "#,
            params![
                record.prover_id,
                record.geo_cell.as_str(),
                record.timestamp_unix,
                self.dedup_window_secs,
            ],
        )?;

        tx.execute(
            r#"
            INSERT INTO submissions (
                prover_id, geo_cell, categories, rating, text, timestamp_unix,
                proof_bytes, public_input_bytes, public_input_hash, expires_at_unix
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.prover_id,
                record.geo_cell.as_str(),
                categories,
                i64::from(record.rating),
                record.text,
                record.timestamp_unix,
                record.proof_bytes,
                record.public_input_bytes,
                public_input_hash.map(|h| h.0.to_vec()),
                record.expires_at_unix,
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.commit()?;

        self.metrics.submissions_accepted_total += 1;
        self.metrics.submissions_superseded_total += superseded as u64;

        info!(
            id,
            geo_cell = %record.geo_cell,
            prover = %hex::encode(&record.prover_id),
            superseded,
            "Submission stored"
        );

        Ok(SubmitReceipt {
            id,
            superseded,
            public_input_hash,
        })
    }

    /// All records, or those whose cell starts with `prefix`, oldest first.
    ///
    /// Expired records are returned; pruning is explicit.
    pub fn query(&self, prefix: Option<&str>) -> Result<Vec<SubmissionRecord>> {
        let rows = match prefix {
            Some(prefix) => {
                validate_prefix(prefix)
                    .map_err(|e| SubmitError::invalid("prefix", e.to_string()))?;
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM submissions \
                     WHERE substr(geo_cell, 1, length(?1)) = ?1 \
                     ORDER BY timestamp_unix ASC, id ASC"
                ))?;
                let rows = stmt
                    .query_map([prefix], StoredRow::from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM submissions \
                     ORDER BY timestamp_unix ASC, id ASC"
                ))?;
                let rows = stmt
                    .query_map([], StoredRow::from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };

        rows.into_iter()
            .map(|row| row.into_record(self.precision))
            .collect()
    }

    /// Most recent record carrying these public inputs.
    pub fn get_by_public_input_hash(
        &self,
        hash: &PublicInputHash,
    ) -> Result<Option<SubmissionRecord>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM submissions \
                     WHERE public_input_hash = ?1 \
                     ORDER BY timestamp_unix DESC, id DESC LIMIT 1"
                ),
                [hash.0.to_vec()],
                StoredRow::from_row,
            )
            .optional()?;

        row.map(|row| row.into_record(self.precision)).transpose()
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Delete records whose expiry is at or before `now_unix`.
    pub fn prune_expired(&mut self, now_unix: i64) -> Result<usize> {
        let pruned = self.conn.execute(
            "DELETE FROM submissions WHERE expires_at_unix IS NOT NULL AND expires_at_unix <= ?1",
            [now_unix],
        )?;
        if pruned > 0 {
            warn!(pruned, now_unix, "Pruned expired submissions");
        }
        self.metrics.records_pruned_total += pruned as u64;
        Ok(pruned)
    }

    pub fn metrics(&self) -> &LedgerMetrics {
        &self.metrics
    }

    pub fn precision(&self) -> usize {
        self.precision
    }
}
