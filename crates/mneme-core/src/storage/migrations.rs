//! Database migrations
//!
//! Schema migration definitions for the storage layer. Migrations are forward-only
//! and applied inside a transaction per version, each one idempotent at the outcome
//! level (tables/columns are created with `IF NOT EXISTS` / existence checks).

use rusqlite::Connection;

/// A single forward-only schema migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: entities, memories, relationships, episodes",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "FTS5 full-text index over memories.content with porter stemming",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Reflections table (observations, patterns, learnings, questions)",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "Predictions table with pattern-name grouping for feedback",
        up: MIGRATION_V4_UP,
    },
    Migration {
        version: 5,
        description: "Agent dispatches with dispatch_tier column",
        up: MIGRATION_V5_UP,
    },
    Migration {
        version: 6,
        description: "Memory embeddings and merge tracking",
        up: MIGRATION_V6_UP,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    canonical_name TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL DEFAULT 'other',
    importance REAL NOT NULL DEFAULT 0.5,
    metadata TEXT,
    last_contact_at TEXT,
    contact_frequency_days REAL,
    contact_trend TEXT,
    attention_tier TEXT NOT NULL DEFAULT 'active',
    deleted_at TEXT,
    deleted_reason TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(type);
CREATE INDEX IF NOT EXISTS idx_entities_attention_tier ON entities(attention_tier);
CREATE INDEX IF NOT EXISTS idx_entities_deleted_at ON entities(deleted_at);

CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT 'fact',
    importance REAL NOT NULL DEFAULT 0.5,
    confidence REAL NOT NULL DEFAULT 1.0,
    access_count INTEGER NOT NULL DEFAULT 0,
    source_channel TEXT,
    deadline_at TEXT,
    corrected_at TEXT,
    corrected_from TEXT,
    invalidated_at TEXT,
    invalidated_reason TEXT,
    verification_status TEXT NOT NULL DEFAULT 'pending',
    verified_at TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_memories_content_hash ON memories(content_hash);
CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(type);
CREATE INDEX IF NOT EXISTS idx_memories_invalidated_at ON memories(invalidated_at);
CREATE INDEX IF NOT EXISTS idx_memories_deadline_at ON memories(deadline_at);
CREATE INDEX IF NOT EXISTS idx_memories_verification_status ON memories(verification_status);
CREATE INDEX IF NOT EXISTS idx_memories_created_at ON memories(created_at);

CREATE TABLE IF NOT EXISTS memory_entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id INTEGER NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    relationship TEXT NOT NULL DEFAULT 'about'
);

CREATE INDEX IF NOT EXISTS idx_memory_entities_memory ON memory_entities(memory_id);
CREATE INDEX IF NOT EXISTS idx_memory_entities_entity ON memory_entities(entity_id);

CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    target_entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    relationship_type TEXT NOT NULL DEFAULT 'related_to',
    direction TEXT NOT NULL DEFAULT 'bidirectional',
    strength REAL NOT NULL DEFAULT 0.5,
    origin_type TEXT NOT NULL DEFAULT 'inferred',
    valid_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_entity_id);
CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_entity_id);
CREATE INDEX IF NOT EXISTS idx_relationships_strength ON relationships(strength);

CREATE TABLE IF NOT EXISTS episodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    ended_at TEXT,
    turn_count INTEGER NOT NULL DEFAULT 0,
    is_summarized INTEGER NOT NULL DEFAULT 0,
    narrative TEXT
);

CREATE INDEX IF NOT EXISTS idx_episodes_is_summarized ON episodes(is_summarized);

CREATE TABLE IF NOT EXISTS turn_buffer (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    episode_id INTEGER NOT NULL REFERENCES episodes(id) ON DELETE CASCADE,
    turn_number INTEGER NOT NULL,
    user_content TEXT,
    assistant_content TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_turn_buffer_episode ON turn_buffer(episode_id);

CREATE TABLE IF NOT EXISTS _meta (
    key TEXT PRIMARY KEY,
    value TEXT
);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL DEFAULT (datetime('now')),
    operation TEXT NOT NULL,
    entity_id INTEGER,
    memory_id INTEGER,
    session_id TEXT,
    user_initiated INTEGER NOT NULL DEFAULT 0,
    details TEXT
);

CREATE INDEX IF NOT EXISTS idx_audit_log_operation ON audit_log(operation);
CREATE INDEX IF NOT EXISTS idx_audit_log_entity ON audit_log(entity_id);
CREATE INDEX IF NOT EXISTS idx_audit_log_memory ON audit_log(memory_id);
CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);

CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL DEFAULT (datetime('now')),
    metric_name TEXT NOT NULL,
    metric_value REAL NOT NULL,
    dimensions TEXT
);

CREATE INDEX IF NOT EXISTS idx_metrics_name ON metrics(metric_name);
CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content,
    content='memories',
    content_rowid='id',
    tokenize='porter ascii'
);

INSERT INTO memories_fts(rowid, content) SELECT id, content FROM memories;

CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, content) VALUES (NEW.id, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content) VALUES ('delete', OLD.id, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content) VALUES ('delete', OLD.id, OLD.content);
    INSERT INTO memories_fts(rowid, content) VALUES (NEW.id, NEW.content);
END;
"#;

const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS reflections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    reflection_type TEXT NOT NULL DEFAULT 'observation',
    importance REAL NOT NULL DEFAULT 0.5,
    confidence REAL NOT NULL DEFAULT 0.8,
    decay_rate REAL NOT NULL DEFAULT 0.999,
    aggregation_count INTEGER NOT NULL DEFAULT 1,
    episode_id INTEGER REFERENCES episodes(id) ON DELETE SET NULL,
    about_entity_id INTEGER REFERENCES entities(id) ON DELETE SET NULL,
    first_observed_at TEXT NOT NULL DEFAULT (datetime('now')),
    last_confirmed_at TEXT NOT NULL DEFAULT (datetime('now')),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_reflections_type ON reflections(reflection_type);
CREATE INDEX IF NOT EXISTS idx_reflections_content_hash ON reflections(content_hash);
"#;

const MIGRATION_V4_UP: &str = r#"
CREATE TABLE IF NOT EXISTS predictions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    prediction_type TEXT NOT NULL DEFAULT 'suggestion',
    priority REAL NOT NULL DEFAULT 0.5,
    is_shown INTEGER NOT NULL DEFAULT 0,
    is_acted_on INTEGER NOT NULL DEFAULT 0,
    prediction_pattern_name TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_predictions_pattern ON predictions(prediction_pattern_name);
CREATE INDEX IF NOT EXISTS idx_predictions_type ON predictions(prediction_type);
"#;

const MIGRATION_V5_UP: &str = r#"
CREATE TABLE IF NOT EXISTS agent_dispatches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_name TEXT NOT NULL,
    dispatch_category TEXT NOT NULL,
    task_summary TEXT,
    success INTEGER NOT NULL DEFAULT 0,
    dispatch_tier TEXT NOT NULL DEFAULT 'task',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_agent_dispatches_tier ON agent_dispatches(dispatch_tier);
"#;

const MIGRATION_V6_UP: &str = r#"
ALTER TABLE memories ADD COLUMN embedding TEXT;
ALTER TABLE memories ADD COLUMN merged_into INTEGER REFERENCES memories(id);
"#;

/// Current max applied version, or 0 on a fresh database.
pub fn get_current_version(conn: &Connection) -> rusqlite::Result<u32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations'",
            [],
            |_| Ok(true),
        )
        .unwrap_or(false);
    if !table_exists {
        return Ok(0);
    }
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
}

/// Applies every migration newer than the current version, in ascending order,
/// recording each one exactly once in `schema_migrations`.
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        tracing::info!(version = migration.version, description = migration.description, "applying migration");
        conn.execute_batch(migration.up)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, datetime('now'))",
            rusqlite::params![migration.version, migration.description],
        )?;
        applied += 1;
    }

    Ok(applied)
}
