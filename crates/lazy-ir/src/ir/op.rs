//! Operator identities recorded on graph nodes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::hashing::{hash_str, HashValue};

/// Opaque tag naming the kind of operation a node performs (e.g. `aten::neg`).
///
/// Equality, ordering, and hashing all derive from the tag; the fingerprint is computed once at
/// construction so nodes can fold it into their hashes without rehashing the string.
#[derive(Clone)]
pub struct OpKind {
    name: Arc<str>,
    hash: HashValue,
}

impl OpKind {
    pub fn new(name: impl Into<String>) -> Self {
        let name = Arc::<str>::from(name.into());
        let hash = hash_str(&name);
        OpKind { name, hash }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Structural fingerprint of the tag.
    pub fn hash(&self) -> HashValue {
        self.hash
    }
}

impl PartialEq for OpKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for OpKind {}

impl PartialOrd for OpKind {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpKind {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl Hash for OpKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OpKind").field(&&*self.name).finish()
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for OpKind {
    fn from(name: &str) -> Self {
        OpKind::new(name)
    }
}

impl Serialize for OpKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for OpKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(OpKind::new(name))
    }
}
