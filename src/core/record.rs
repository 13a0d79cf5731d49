//! Change records delivered to registered callbacks.

use super::ScopeTag;
use crate::store::{KvAction, KvPair};

/// A single observed configuration change.
///
/// Built by the router from a store notification and handed to every
/// callback registered for its scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Scope the key belongs to
    pub scope: ScopeTag,
    /// Full store key
    pub key: String,
    /// Object id relative to the scope prefix
    pub id: String,
    /// Raw value bytes; for deletes, the last value held by the key
    pub value: Vec<u8>,
    /// Store-assigned mutation kind
    pub action: KvAction,
    /// Store version of the mutation
    pub modified_index: u64,
}

impl ChangeRecord {
    pub(crate) fn from_pair(scope: ScopeTag, id: &str, pair: &KvPair) -> Self {
        Self {
            scope,
            key: pair.key.clone(),
            id: id.to_string(),
            value: pair.value.clone(),
            action: pair.action,
            modified_index: pair.modified_index,
        }
    }

    /// Returns true if the object was removed.
    pub fn is_delete(&self) -> bool {
        self.action == KvAction::Delete
    }

    /// The value as UTF-8, if it is valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    /// Decode the value as JSON.
    #[cfg(feature = "json")]
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> crate::error::Result<T> {
        Ok(serde_json::from_slice(&self.value)?)
    }
}
