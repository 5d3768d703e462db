//! Interface-only surface for the vault/canvas exporters that mirror
//! entities to Markdown: the write-through hook contract and the
//! hash-based user-edit detection those exporters need, without the
//! Markdown rendering or filesystem writes themselves (an external
//! collaborator).

use crate::extract::sha256_hex;
use crate::storage::{Record, Storage, StorageError};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, VaultError>;

/// One entity's exported form, as produced by an external exporter. This
/// crate never renders Markdown itself -- it only tracks whether a render
/// is safe to write.
pub trait CanvasExporter {
    /// Renders `entity` to the exported text that would be written to disk.
    fn render(&self, entity: &Record) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteDecision {
    /// No conflict: safe to write `content` and record its hash.
    Write(String),
    /// The on-disk file's hash no longer matches what was last recorded,
    /// meaning a human edited it since the last sync -- the exporter must
    /// not silently overwrite it.
    SkipUserEdited,
}

/// Renders `entity` via `exporter` and decides whether it's safe to write:
/// compares `current_file_hash` (the hash of whatever's on disk right now,
/// or `None` if the file doesn't exist yet) against the hash this engine
/// last recorded for `name` in `canvas_hashes`.
pub fn write_through(
    storage: &Storage,
    exporter: &impl CanvasExporter,
    name: &str,
    entity: &Record,
    current_file_hash: Option<&str>,
) -> Result<WriteDecision> {
    let last_recorded = get_canvas_hash(storage, name)?;

    if let (Some(on_disk), Some(recorded)) = (current_file_hash, &last_recorded) {
        if on_disk != recorded {
            return Ok(WriteDecision::SkipUserEdited);
        }
    }

    let rendered = exporter.render(entity);
    Ok(WriteDecision::Write(rendered))
}

/// Call after actually writing `content` for `name`, to record the hash
/// this engine is now responsible for.
pub fn record_canvas_write(storage: &Storage, name: &str, content: &str) -> Result<()> {
    let hash = sha256_hex(content.as_bytes());
    set_canvas_hash(storage, name, &hash)
}

fn canvas_hashes(storage: &Storage) -> Result<HashMap<String, String>> {
    let row = storage.get_one("_meta", "key = ?1", &[rusqlite::types::Value::Text("canvas_hashes".to_string())])?;
    let Some(row) = row else { return Ok(HashMap::new()) };
    let Some(raw) = row.get("value").and_then(|v| v.as_str()) else { return Ok(HashMap::new()) };
    let parsed: JsonValue = serde_json::from_str(raw).unwrap_or_default();
    Ok(parsed.as_object().map(|obj| obj.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect()).unwrap_or_default())
}

fn get_canvas_hash(storage: &Storage, name: &str) -> Result<Option<String>> {
    Ok(canvas_hashes(storage)?.get(name).cloned())
}

fn set_canvas_hash(storage: &Storage, name: &str, hash: &str) -> Result<()> {
    let mut hashes = canvas_hashes(storage)?;
    hashes.insert(name.to_string(), hash.to_string());
    let encoded = serde_json::to_string(&hashes).unwrap_or_default();

    let mut values = Record::new();
    values.insert("key".to_string(), serde_json::json!("canvas_hashes"));
    values.insert("value".to_string(), serde_json::json!(encoded));
    if storage.get_one("_meta", "key = ?1", &[rusqlite::types::Value::Text("canvas_hashes".to_string())])?.is_some() {
        storage.update("_meta", &values, "key = ?", &[rusqlite::types::Value::Text("canvas_hashes".to_string())])?;
    } else {
        storage.insert("_meta", &values)?;
    }
    Ok(())
}
