//! Typed domain model over the store's rows: entities, memories, relationships,
//! episodes, reflections, predictions, and agent dispatches, plus the small
//! enums their columns are drawn from.

use crate::storage::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:expr),+ $(,)? }, default = $default:ident) => {
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $(#[allow(missing_docs)] $variant,)+
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($name::$variant => write!(f, $text),)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!(concat!("unknown ", stringify!($name), ": {}"), s)),
                }
            }
        }
    };
}

string_enum!(EntityType {
    Person => "person",
    Organization => "organization",
    Project => "project",
    Concept => "concept",
    Other => "other",
}, default = Other);

string_enum!(ContactTrend {
    Accelerating => "accelerating",
    Stable => "stable",
    Decelerating => "decelerating",
    Dormant => "dormant",
}, default = Stable);

string_enum!(AttentionTier {
    Active => "active",
    Watch => "watch",
    Dormant => "dormant",
    Archive => "archive",
}, default = Active);

string_enum!(MemoryType {
    Fact => "fact",
    Preference => "preference",
    Observation => "observation",
    Commitment => "commitment",
    Insight => "insight",
}, default = Fact);

string_enum!(VerificationStatus {
    Pending => "pending",
    Verified => "verified",
    Flagged => "flagged",
}, default = Pending);

string_enum!(Direction {
    Unidirectional => "unidirectional",
    Bidirectional => "bidirectional",
}, default = Bidirectional);

string_enum!(OriginType {
    UserStated => "user_stated",
    Corrected => "corrected",
    Extracted => "extracted",
    Inferred => "inferred",
}, default = Inferred);

string_enum!(DispatchTier {
    Task => "task",
    NativeTeam => "native_team",
}, default = Task);

string_enum!(ReflectionType {
    Observation => "observation",
    Pattern => "pattern",
    Learning => "learning",
    Question => "question",
}, default = Observation);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    pub canonical_name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub importance: f64,
    pub metadata: Option<JsonValue>,
    pub last_contact_at: Option<DateTime<Utc>>,
    pub contact_frequency_days: Option<f64>,
    pub contact_trend: Option<ContactTrend>,
    pub attention_tier: AttentionTier,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    pub content: String,
    pub content_hash: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub importance: f64,
    pub confidence: f64,
    pub access_count: i64,
    pub source_channel: Option<String>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub corrected_at: Option<DateTime<Utc>>,
    pub corrected_from: Option<String>,
    pub invalidated_at: Option<DateTime<Utc>>,
    pub invalidated_reason: Option<String>,
    pub verification_status: VerificationStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// A memory is live iff it has not been invalidated. All retrieval paths
    /// filter to live memories.
    pub fn is_live(&self) -> bool {
        self.invalidated_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub source_entity_id: i64,
    pub target_entity_id: i64,
    pub relationship_type: String,
    pub direction: Direction,
    pub strength: f64,
    pub origin_type: OriginType,
    pub valid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub turn_count: i64,
    pub is_summarized: bool,
    pub narrative: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnBuffer {
    pub id: i64,
    pub episode_id: i64,
    pub turn_number: i64,
    pub user_content: Option<String>,
    pub assistant_content: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    pub id: i64,
    pub content: String,
    pub content_hash: String,
    pub reflection_type: ReflectionType,
    pub importance: f64,
    pub confidence: f64,
    pub decay_rate: f64,
    pub aggregation_count: i64,
    pub episode_id: Option<i64>,
    pub about_entity_id: Option<i64>,
    pub first_observed_at: DateTime<Utc>,
    pub last_confirmed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reflection {
    /// Well-confirmed patterns decay slower: `aggregation_count >= 3` earns 0.9995
    /// instead of the default 0.999.
    pub fn decay_rate_for_aggregation(aggregation_count: i64) -> f64 {
        if aggregation_count >= 3 {
            0.9995
        } else {
            0.999
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: i64,
    pub content: String,
    pub prediction_type: String,
    pub priority: f64,
    pub is_shown: bool,
    pub is_acted_on: bool,
    pub prediction_pattern_name: Option<String>,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDispatch {
    pub id: i64,
    pub agent_name: String,
    pub dispatch_category: String,
    pub task_summary: Option<String>,
    pub success: bool,
    pub dispatch_tier: DispatchTier,
    pub created_at: DateTime<Utc>,
}

/// A polymorphic "memory-like" result: the three retrievable record kinds
/// recall can surface, kept as distinct tables but unified at the result edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryLike {
    Memory(Memory),
    Reflection(Reflection),
    Prediction(Prediction),
}

impl MemoryLike {
    pub fn content(&self) -> &str {
        match self {
            MemoryLike::Memory(m) => &m.content,
            MemoryLike::Reflection(r) => &r.content,
            MemoryLike::Prediction(p) => &p.content,
        }
    }

    pub fn importance(&self) -> f64 {
        match self {
            MemoryLike::Memory(m) => m.importance,
            MemoryLike::Reflection(r) => r.importance,
            MemoryLike::Prediction(p) => p.priority,
        }
    }
}

fn parse_ts(record: &Record, key: &str) -> Option<DateTime<Utc>> {
    record
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)))
        .or_else(|| {
            record
                .get(key)
                .and_then(|v| v.as_str())
                .and_then(|s| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
                .map(|n| n.and_utc())
        })
}

impl Entity {
    pub fn from_record(record: &Record) -> Result<Self, String> {
        Ok(Self {
            id: record.get("id").and_then(|v| v.as_i64()).ok_or("missing id")?,
            name: record.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            canonical_name: record.get("canonical_name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            entity_type: record
                .get("type")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            importance: record.get("importance").and_then(|v| v.as_f64()).unwrap_or(0.5),
            metadata: record.get("metadata").and_then(|v| v.as_str()).and_then(|s| serde_json::from_str(s).ok()),
            last_contact_at: parse_ts(record, "last_contact_at"),
            contact_frequency_days: record.get("contact_frequency_days").and_then(|v| v.as_f64()),
            contact_trend: record
                .get("contact_trend")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok()),
            attention_tier: record
                .get("attention_tier")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            deleted_at: parse_ts(record, "deleted_at"),
            deleted_reason: record.get("deleted_reason").and_then(|v| v.as_str()).map(|s| s.to_string()),
            created_at: parse_ts(record, "created_at").unwrap_or_else(Utc::now),
            updated_at: parse_ts(record, "updated_at").unwrap_or_else(Utc::now),
        })
    }
}

impl Memory {
    pub fn from_record(record: &Record) -> Result<Self, String> {
        Ok(Self {
            id: record.get("id").and_then(|v| v.as_i64()).ok_or("missing id")?,
            content: record.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            content_hash: record.get("content_hash").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            memory_type: record
                .get("type")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            importance: record.get("importance").and_then(|v| v.as_f64()).unwrap_or(0.5),
            confidence: record.get("confidence").and_then(|v| v.as_f64()).unwrap_or(1.0),
            access_count: record.get("access_count").and_then(|v| v.as_i64()).unwrap_or(0),
            source_channel: record.get("source_channel").and_then(|v| v.as_str()).map(|s| s.to_string()),
            deadline_at: parse_ts(record, "deadline_at"),
            corrected_at: parse_ts(record, "corrected_at"),
            corrected_from: record.get("corrected_from").and_then(|v| v.as_str()).map(|s| s.to_string()),
            invalidated_at: parse_ts(record, "invalidated_at"),
            invalidated_reason: record.get("invalidated_reason").and_then(|v| v.as_str()).map(|s| s.to_string()),
            verification_status: record
                .get("verification_status")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            verified_at: parse_ts(record, "verified_at"),
            metadata: record.get("metadata").and_then(|v| v.as_str()).and_then(|s| serde_json::from_str(s).ok()),
            created_at: parse_ts(record, "created_at").unwrap_or_else(Utc::now),
            updated_at: parse_ts(record, "updated_at").unwrap_or_else(Utc::now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_round_trips_through_display_and_from_str() {
        for t in [EntityType::Person, EntityType::Organization, EntityType::Project, EntityType::Concept, EntityType::Other] {
            let s = t.to_string();
            let parsed: EntityType = s.parse().unwrap();
            assert_eq!(parsed, t);
        }
    }

    #[test]
    fn memory_is_live_iff_not_invalidated() {
        let mut record = Record::new();
        record.insert("id".to_string(), JsonValue::from(1));
        record.insert("content".to_string(), JsonValue::String("hi".to_string()));
        record.insert("content_hash".to_string(), JsonValue::String("h".to_string()));
        let memory = Memory::from_record(&record).unwrap();
        assert!(memory.is_live());
    }

    #[test]
    fn reflection_decay_rate_slows_after_three_confirmations() {
        assert_eq!(Reflection::decay_rate_for_aggregation(1), 0.999);
        assert_eq!(Reflection::decay_rate_for_aggregation(3), 0.9995);
    }
}
