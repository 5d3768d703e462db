//! Embedded SQL store: schema/migrations, generic CRUD, backup rotation, and the
//! startup integrity check with auto-restore from the newest backup.

use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::value::{json_to_sql, row_to_record, Record};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("initialization error: {0}")]
    Init(String),
    #[error("lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Single-writer / multi-reader embedded store.
///
/// All methods take `&self`; interior mutability comes from the writer/reader
/// mutexes, so `Storage` is `Send + Sync` and the daemon holds it behind an `Arc`.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    path: PathBuf,
}

impl Storage {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "mneme", "memory")
            .ok_or_else(|| StorageError::Init("could not determine project directories".to_string()))?;
        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(data_dir, std::fs::Permissions::from_mode(0o700));
        }
        Ok(data_dir.join("memory.db"))
    }

    /// Computes `~/.claudia/memory/<project_hash>.db` for a given project directory,
    /// where `project_hash` is the first 12 hex chars of SHA-256 of the canonical path.
    pub fn project_db_path(project_dir: &Path, home: &Path) -> PathBuf {
        let hash = crate::extract::sha256_hex(project_dir.to_string_lossy().as_bytes());
        home.join(".claudia").join("memory").join(format!("{}.db", &hash[..12]))
    }

    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => Self::default_path()?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        check_and_repair_database(&path);

        let writer_conn = Connection::open(&path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
        }
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer.lock().map_err(|_| StorageError::Lock("writer".to_string()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader.lock().map_err(|_| StorageError::Lock("reader".to_string()))
    }

    // ------------------------------------------------------------------
    // Generic CRUD — the Store contract (§4.1)
    // ------------------------------------------------------------------

    /// Inserts a row built from a column->value map and returns its rowid.
    pub fn insert(&self, table: &str, values: &Record) -> Result<i64> {
        let columns: Vec<&String> = values.keys().collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", "),
            placeholders.join(", ")
        );
        let sql_values: Vec<rusqlite::types::Value> = columns.iter().map(|c| json_to_sql(&values[*c])).collect();

        let conn = self.writer()?;
        conn.execute(&sql, params_from_iter(sql_values))?;
        Ok(conn.last_insert_rowid())
    }

    /// Updates rows matching `where_clause` (a raw fragment with `?N` placeholders)
    /// and returns the number of rows affected.
    pub fn update(&self, table: &str, values: &Record, where_clause: &str, where_params: &[rusqlite::types::Value]) -> Result<usize> {
        let columns: Vec<&String> = values.keys().collect();
        let assignments: Vec<String> = columns.iter().enumerate().map(|(i, c)| format!("{} = ?{}", c, i + 1)).collect();
        let offset = columns.len();
        let rewritten_where = reindex_placeholders(where_clause, offset);
        let sql = format!("UPDATE {} SET {} WHERE {}", table, assignments.join(", "), rewritten_where);

        let mut sql_values: Vec<rusqlite::types::Value> = columns.iter().map(|c| json_to_sql(&values[*c])).collect();
        sql_values.extend(where_params.iter().cloned());

        let conn = self.writer()?;
        let affected = conn.execute(&sql, params_from_iter(sql_values))?;
        Ok(affected)
    }

    pub fn delete(&self, table: &str, where_clause: &str, where_params: &[rusqlite::types::Value]) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE {}", table, where_clause);
        let conn = self.writer()?;
        let affected = conn.execute(&sql, params_from_iter(where_params.to_vec()))?;
        Ok(affected)
    }

    pub fn get_one(&self, table: &str, where_clause: &str, where_params: &[rusqlite::types::Value]) -> Result<Option<Record>> {
        let sql = format!("SELECT * FROM {} WHERE {} LIMIT 1", table, where_clause);
        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let record = stmt
            .query_row(params_from_iter(where_params.to_vec()), row_to_record)
            .optional()?;
        Ok(record)
    }

    pub fn query(
        &self,
        table: &str,
        where_clause: Option<&str>,
        where_params: &[rusqlite::types::Value],
        order_by: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        let mut sql = format!("SELECT * FROM {}", table);
        if let Some(w) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(w);
        }
        if let Some(o) = order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(o);
        }
        if let Some(l) = limit {
            sql.push_str(&format!(" LIMIT {}", l));
        }

        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(where_params.to_vec()), row_to_record)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Raw SQL escape hatch for statements the dict-shaped helpers above can't express
    /// (joins, aggregates, `MATCH` queries against the FTS table).
    pub fn execute(&self, sql: &str, params: &[rusqlite::types::Value], fetch: bool) -> Result<Vec<Record>> {
        if fetch {
            let conn = self.reader()?;
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params_from_iter(params.to_vec()), row_to_record)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        } else {
            let conn = self.writer()?;
            conn.execute(sql, params_from_iter(params.to_vec()))?;
            Ok(Vec::new())
        }
    }

    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.reader()?;
        Ok(super::migrations::get_current_version(&conn)?)
    }

    // ------------------------------------------------------------------
    // Backup / integrity / lifecycle (§4.1, §4.11)
    // ------------------------------------------------------------------

    /// Produces `<db>.backup-YYYY-MM-DD[-HHMMSS].db` and prunes to `retention_count`.
    pub fn backup(&self, retention_count: usize) -> Result<PathBuf> {
        let now = Utc::now();
        let mut dest = backup_path_for(&self.path, now, false);
        if dest.exists() {
            dest = backup_path_for(&self.path, now, true);
        }

        {
            let conn = self.writer()?;
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        }
        std::fs::copy(&self.path, &dest)?;

        prune_backups(&self.path, retention_count)?;
        Ok(dest)
    }

    /// Forces the WAL to be committed into the main database file.
    pub fn flush(&self) -> Result<()> {
        let conn = self.writer()?;
        conn.execute_batch("PRAGMA wal_checkpoint(FULL);")?;
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.flush()
    }
}

fn reindex_placeholders(fragment: &str, offset: usize) -> String {
    // Where-clause fragments are written with plain `?` placeholders by callers;
    // shift them past the SET clause's own numbered placeholders.
    let mut out = String::with_capacity(fragment.len());
    let mut next = offset + 1;
    for ch in fragment.chars() {
        if ch == '?' {
            out.push_str(&format!("?{}", next));
            next += 1;
        } else {
            out.push(ch);
        }
    }
    out
}

fn backup_path_for(db_path: &Path, now: chrono::DateTime<Utc>, with_time: bool) -> PathBuf {
    let suffix = if with_time {
        now.format("%Y-%m-%d-%H%M%S").to_string()
    } else {
        now.format("%Y-%m-%d").to_string()
    };
    let file_name = db_path.file_name().and_then(|f| f.to_str()).unwrap_or("memory.db");
    db_path.with_file_name(format!("{}.backup-{}.db", file_name, suffix))
}

fn list_backups(db_path: &Path) -> Vec<PathBuf> {
    let dir = match db_path.parent() {
        Some(d) => d,
        None => return Vec::new(),
    };
    let file_name = db_path.file_name().and_then(|f| f.to_str()).unwrap_or("");
    let prefix = format!("{}.backup-", file_name);

    let mut backups: Vec<PathBuf> = std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|f| f.to_str())
                .map(|f| f.starts_with(&prefix) && f.ends_with(".db"))
                .unwrap_or(false)
        })
        .collect();
    backups.sort();
    backups
}

fn prune_backups(db_path: &Path, retention_count: usize) -> Result<()> {
    let backups = list_backups(db_path);
    if backups.len() <= retention_count {
        return Ok(());
    }
    let to_remove = backups.len() - retention_count;
    for path in backups.into_iter().take(to_remove) {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Startup integrity check (§4.1, §4.11). Never raises: a missing file is a no-op,
/// a healthy file is a no-op, and a corrupt file is replaced from the newest backup
/// (or removed so the caller starts fresh) with a critical log entry either way.
pub fn check_and_repair_database(db_path: &Path) {
    if !db_path.exists() {
        return;
    }

    let healthy = is_healthy(db_path);
    if healthy {
        return;
    }

    let backups = list_backups(db_path);
    match backups.last() {
        Some(newest) => {
            tracing::error!(db = %db_path.display(), backup = %newest.display(), "database corrupt, restoring from newest backup");
            if let Err(e) = atomic_replace(newest, db_path) {
                tracing::error!(error = %e, "failed to restore database from backup");
            }
        }
        None => {
            tracing::error!(db = %db_path.display(), "database corrupt and no backup available, continuing with a fresh database");
            let _ = std::fs::remove_file(db_path);
        }
    }
}

fn is_healthy(db_path: &Path) -> bool {
    let conn = match Connection::open(db_path) {
        Ok(c) => c,
        Err(_) => return false,
    };
    let result: rusqlite::Result<String> = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0));
    matches!(result, Ok(ref s) if s.eq_ignore_ascii_case("ok"))
}

fn atomic_replace(source: &Path, dest: &Path) -> std::io::Result<()> {
    let tmp = dest.with_extension("restoring.tmp");
    std::fs::copy(source, &tmp)?;
    std::fs::rename(&tmp, dest)
}
