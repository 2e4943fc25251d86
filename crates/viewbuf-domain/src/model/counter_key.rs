//! CounterKey - Identity of one buffered counter
//!
//! The buffer is shaped like a hash-of-hashes:
//!
//! ```text
//! "post::42"  ──►  { "views": 1337, "likes": 12 }
//!  └ BufferKey        └ metric fields
//! ```
//!
//! A `CounterKey` is the pair (outer `BufferKey`, inner metric field).

/// Separator between entity kind and entity id in the outer key
pub const KEY_SEPARATOR: &str = "::";

/// Why a raw outer key could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    /// No `::` in the key
    MissingSeparator { raw: String },
    /// Nothing in front of `::`
    EmptyEntityKind { raw: String },
    /// The part after `::` is not an integer id
    InvalidEntityId { raw: String },
}

impl core::fmt::Display for KeyParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KeyParseError::MissingSeparator { raw } => {
                write!(f, "Key '{}' has no '{}' separator", raw, KEY_SEPARATOR)
            }
            KeyParseError::EmptyEntityKind { raw } => {
                write!(f, "Key '{}' has an empty entity kind", raw)
            }
            KeyParseError::InvalidEntityId { raw } => {
                write!(f, "Key '{}' does not end in an integer entity id", raw)
            }
        }
    }
}

impl std::error::Error for KeyParseError {}

/// Outer key of a buffered hash: `"<entityKind>::<entityId>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferKey {
    entity_kind: String,
    entity_id: i64,
}

impl BufferKey {
    pub fn new(entity_kind: impl Into<String>, entity_id: i64) -> Self {
        Self {
            entity_kind: entity_kind.into(),
            entity_id,
        }
    }

    /// Parse a raw outer key as read back from the buffer
    pub fn parse(raw: &str) -> Result<Self, KeyParseError> {
        let (kind, id) = raw
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| KeyParseError::MissingSeparator {
                raw: raw.to_string(),
            })?;

        if kind.is_empty() {
            return Err(KeyParseError::EmptyEntityKind {
                raw: raw.to_string(),
            });
        }

        let entity_id = id
            .parse::<i64>()
            .map_err(|_| KeyParseError::InvalidEntityId {
                raw: raw.to_string(),
            })?;

        Ok(Self::new(kind, entity_id))
    }

    /// Scan prefix matching every entity of one kind
    pub fn prefix_for(entity_kind: &str) -> String {
        format!("{}{}", entity_kind, KEY_SEPARATOR)
    }

    pub fn entity_kind(&self) -> &str {
        &self.entity_kind
    }

    pub fn entity_id(&self) -> i64 {
        self.entity_id
    }

    /// Encoded form stored in the buffer
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl core::fmt::Display for BufferKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{}{}", self.entity_kind, KEY_SEPARATOR, self.entity_id)
    }
}

/// Identifies one pending-increment slot: `(entityKind, entityId, metric)`
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    entity: BufferKey,
    metric: String,
}

impl CounterKey {
    pub fn new(entity_kind: impl Into<String>, entity_id: i64, metric: impl Into<String>) -> Self {
        Self {
            entity: BufferKey::new(entity_kind, entity_id),
            metric: metric.into(),
        }
    }

    pub fn from_parts(entity: BufferKey, metric: impl Into<String>) -> Self {
        Self {
            entity,
            metric: metric.into(),
        }
    }

    pub fn entity(&self) -> &BufferKey {
        &self.entity
    }

    pub fn entity_kind(&self) -> &str {
        self.entity.entity_kind()
    }

    pub fn entity_id(&self) -> i64 {
        self.entity.entity_id()
    }

    /// Inner field name inside the outer hash
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Outer hash key, e.g. `post::42`
    pub fn outer_key(&self) -> String {
        self.entity.encode()
    }
}

impl core::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}[{}]", self.entity, self.metric)
    }
}
