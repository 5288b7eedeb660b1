//! SQLite storage for the name index (sqlx async with sync wrappers)
//!
//! Provides sync methods that internally use a tokio runtime to execute async
//! sqlx operations. Callers use the Store synchronously while reads go through
//! sqlx's connection pool. Batch application is a single SQLite transaction,
//! so readers observe either the full pre-batch or full post-batch state.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tokio::runtime::Runtime;

// Schema version for migrations
// v1: names + metadata tables
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Reserved byte used as the exclusive upper bound of a prefix range scan.
///
/// Sorts after every printable ASCII byte, so `[prefix, prefix + RANGE_SENTINEL)`
/// covers exactly the keys that start with `prefix`. Registry names are ASCII;
/// see [`Store::find`] for the caveat on non-ASCII keys.
pub const RANGE_SENTINEL: char = '\u{ff}';

/// Reserved value stored in the `description` column when the remote record
/// carried no description. Same byte as [`RANGE_SENTINEL`], but an unrelated
/// use: this one is a value-level absence marker, not a range bound.
pub const NO_DESCRIPTION: &str = "\u{ff}";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Schema version mismatch: index is v{0}, namedex expects v{1}. Delete the database file to rebuild.")]
    SchemaMismatch(i32, i32),
    #[error("Index created by newer namedex version (schema v{0}). Please upgrade.")]
    SchemaNewerThanUs(i32),
}

/// A single indexed name with its decoded description.
///
/// `description` is `None` when the remote feed had no description for this
/// name; the on-disk sentinel never leaks out of the store API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub description: Option<String>,
}

/// One operation of a diff plan, applied via [`Store::apply_batch`].
///
/// `Put` carries the raw stored value (description text, or [`NO_DESCRIPTION`]
/// when absent) so the diff can compare against enumerated raw values without
/// decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOp {
    Put(String, String),
    Delete(String),
}

/// Index statistics
#[derive(Debug)]
pub struct IndexStats {
    pub total_entries: u64,
    pub index_size_bytes: u64,
    pub created_at: String,
    pub updated_at: String,
    pub last_refresh: Option<String>,
    pub schema_version: i32,
}

/// Thread-safe SQLite store for the ordered name index
///
/// Uses sqlx connection pooling and WAL mode so concurrent readers never
/// block each other. All methods are synchronous but internally use an async
/// runtime to execute sqlx operations.
///
/// # Example
///
/// ```no_run
/// use namedex::Store;
/// use std::path::Path;
///
/// let store = Store::open(Path::new("names.db"))?;
/// for entry in store.find("serde", Some(10))? {
///     println!("{}", entry.name);
/// }
/// # Ok::<(), namedex::StoreError>(())
/// ```
pub struct Store {
    pool: SqlitePool,
    rt: Runtime,
}

impl Store {
    /// Open (creating if necessary) the index at `path`.
    ///
    /// Creates the schema on first open and verifies the schema version on
    /// every open after that.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let rt = Runtime::new().map_err(|e| StoreError::Runtime(e.to_string()))?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = rt.block_on(async {
            SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(options)
                .await
        })?;

        let store = Self { pool, rt };
        store.init_schema()?;
        store.check_schema_version()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.rt.block_on(async {
            // sqlx::query() only handles single statements
            let schema = include_str!("schema.sql");
            for statement in schema.split(';') {
                let stmt: String = statement
                    .lines()
                    .filter(|line| !line.trim().starts_with("--"))
                    .collect::<Vec<_>>()
                    .join("\n");
                let stmt = stmt.trim().to_string();
                if stmt.is_empty() {
                    continue;
                }
                sqlx::query(&stmt).execute(&self.pool).await?;
            }

            let now = chrono::Utc::now().to_rfc3339();
            for (key, value) in [
                ("schema_version", CURRENT_SCHEMA_VERSION.to_string()),
                ("created_at", now.clone()),
                ("updated_at", now),
            ] {
                sqlx::query("INSERT OR IGNORE INTO metadata (key, value) VALUES (?1, ?2)")
                    .bind(key)
                    .bind(value)
                    .execute(&self.pool)
                    .await?;
            }

            Ok(())
        })
    }

    fn check_schema_version(&self) -> Result<(), StoreError> {
        let version: i32 = self
            .get_metadata("schema_version")?
            .parse()
            .map_err(|e| StoreError::Runtime(format!("unparsable schema_version: {e}")))?;

        if version < CURRENT_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch(version, CURRENT_SCHEMA_VERSION));
        }
        if version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::SchemaNewerThanUs(version));
        }
        Ok(())
    }

    /// Retrieve a single metadata value by key.
    pub fn get_metadata(&self, key: &str) -> Result<String, StoreError> {
        self.rt.block_on(async {
            let row: Option<(String,)> = sqlx::query_as("SELECT value FROM metadata WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
            row.map(|(v,)| v)
                .ok_or_else(|| StoreError::Runtime(format!("metadata key '{}' not found", key)))
        })
    }

    /// Prefix search: all entries whose name starts with `prefix`, in
    /// ascending byte-lexicographic order, truncated to `limit` (`None` =
    /// unbounded).
    ///
    /// Implemented as a range scan over `[prefix, prefix + RANGE_SENTINEL)`.
    /// SQLite compares TEXT with memcmp, which matches the byte ordering the
    /// sentinel bound assumes for ASCII keys (the sentinel's UTF-8 encoding
    /// still sorts above ASCII, but keys containing code points at or above
    /// U+00FF would escape the range; the feed does not produce such names).
    /// No match is `Ok(vec![])`, not an error; a database failure is a real
    /// `Err` so callers can tell "nothing found" from "query failed".
    pub fn find(&self, prefix: &str, limit: Option<usize>) -> Result<Vec<Entry>, StoreError> {
        let upper = format!("{prefix}{RANGE_SENTINEL}");
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(|n| n as i64).unwrap_or(-1);

        self.rt.block_on(async {
            let rows = sqlx::query(
                "SELECT name, description FROM names
                 WHERE name >= ?1 AND name < ?2
                 ORDER BY name ASC
                 LIMIT ?3",
            )
            .bind(prefix)
            .bind(&upper)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

            Ok(rows
                .into_iter()
                .map(|row| {
                    let name: String = row.get(0);
                    let description: String = row.get(1);
                    Entry {
                        name,
                        description: decode_description(description),
                    }
                })
                .collect())
        })
    }

    /// Full ordered enumeration of raw (name, stored value) pairs.
    ///
    /// Used by the refresh engine to build its existing-keys snapshot; values
    /// are returned undecoded so they compare directly against encoded remote
    /// values. Walks the whole table, so keep it off hot request paths.
    pub fn all_entries(&self) -> Result<Vec<(String, String)>, StoreError> {
        self.rt.block_on(async {
            let rows = sqlx::query("SELECT name, description FROM names ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows
                .into_iter()
                .map(|row| (row.get(0), row.get(1)))
                .collect())
        })
    }

    /// Apply a diff plan as one atomic batch.
    ///
    /// All deletes and puts run in a single transaction together with the
    /// metadata timestamp updates; a concurrent `find` sees either none or all
    /// of the batch. On error the transaction rolls back, so a failed refresh
    /// cycle can be retried from scratch without leaving partial state.
    pub fn apply_batch(&self, plan: &[DiffOp]) -> Result<(), StoreError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;

            for op in plan {
                match op {
                    DiffOp::Delete(name) => {
                        sqlx::query("DELETE FROM names WHERE name = ?1")
                            .bind(name)
                            .execute(&mut *tx)
                            .await?;
                    }
                    DiffOp::Put(name, value) => {
                        sqlx::query(
                            "INSERT OR REPLACE INTO names (name, description) VALUES (?1, ?2)",
                        )
                        .bind(name)
                        .bind(value)
                        .execute(&mut *tx)
                        .await?;
                    }
                }
            }

            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES ('updated_at', ?1)")
                .bind(&now)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES ('last_refresh', ?1)")
                .bind(&now)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            tracing::debug!(ops = plan.len(), "Applied batch");
            Ok(())
        })
    }

    /// Index statistics for the CLI `stats` command.
    pub fn stats(&self) -> Result<IndexStats, StoreError> {
        let (total_entries, index_size_bytes) = self.rt.block_on(async {
            let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM names")
                .fetch_one(&self.pool)
                .await?;
            let size: (i64,) = sqlx::query_as(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            )
            .fetch_one(&self.pool)
            .await?;
            Ok::<_, StoreError>((count.0 as u64, size.0 as u64))
        })?;

        Ok(IndexStats {
            total_entries,
            index_size_bytes,
            created_at: self.get_metadata("created_at")?,
            updated_at: self.get_metadata("updated_at")?,
            last_refresh: self.get_metadata("last_refresh").ok(),
            schema_version: CURRENT_SCHEMA_VERSION,
        })
    }

    /// Close the connection pool. Idempotent; later calls are no-ops.
    pub fn close(&self) {
        self.rt.block_on(self.pool.close());
    }
}

/// Map a stored description back to the public shape: the reserved sentinel
/// means the feed supplied no description.
fn decode_description(raw: String) -> Option<String> {
    if raw == NO_DESCRIPTION {
        None
    } else {
        Some(raw)
    }
}

/// Encode a remote description for storage.
///
/// The feed cannot express empty-but-present descriptions, so both empty and
/// absent collapse to the sentinel.
pub fn encode_description(description: Option<&str>) -> String {
    match description {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => NO_DESCRIPTION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("names.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_schema() {
        let (_dir, store) = open_temp();
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.schema_version, 1);
        assert!(stats.last_refresh.is_none());
    }

    #[test]
    fn test_reopen_is_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("names.db");
        {
            let store = Store::open(&path).unwrap();
            store
                .apply_batch(&[DiffOp::Put("serde".into(), "serialization".into())])
                .unwrap();
            store.close();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.find("serde", None).unwrap().len(), 1);
    }

    #[test]
    fn test_sentinel_round_trip() {
        let (_dir, store) = open_temp();
        store
            .apply_batch(&[DiffOp::Put("left-pad".into(), encode_description(None))])
            .unwrap();

        let results = store.find("left", None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].description, None);

        // Raw enumeration sees the sentinel, not the decoded form
        let raw = store.all_entries().unwrap();
        assert_eq!(raw[0].1, NO_DESCRIPTION);
    }

    #[test]
    fn test_close_idempotent() {
        let (_dir, store) = open_temp();
        store.close();
        store.close();
    }
}
