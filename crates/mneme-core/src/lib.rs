//! mneme-core: a durable local memory engine.
//!
//! Ingests conversational turns, facts, commitments, and entities into a
//! typed knowledge graph backed by content-addressed records with dense
//! embeddings, and serves hybrid retrieval (semantic + lexical + graph +
//! importance + recency) queries. Designed to run unattended as a
//! background daemon: crash-safe storage, scheduled consolidation, and a
//! single-writer concurrency model.

pub mod audit;
pub mod config;
pub mod consolidate;
pub mod embeddings;
pub mod entities;
pub mod extract;
pub mod guards;
pub mod health;
pub mod memory;
pub mod recall;
pub mod remember;
pub mod scheduler;
pub mod search;
pub mod storage;
pub mod vault;
pub mod verify;

pub use config::MemoryConfig;
pub use storage::{Storage, StorageError};

/// Commonly used types, re-exported for downstream crates.
pub mod prelude {
    pub use crate::config::MemoryConfig;
    pub use crate::memory::{
        AgentDispatch, AttentionTier, ContactTrend, DispatchTier, Direction, Entity, EntityType, Episode, Memory,
        MemoryLike, MemoryType, OriginType, Prediction, Reflection, ReflectionType, Relationship, TurnBuffer,
        VerificationStatus,
    };
    pub use crate::storage::{Record, Storage, StorageError};
}
