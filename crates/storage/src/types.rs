//! Common types used across storage operations.

use std::time::Duration;

use bytes::Bytes;

/// Key-value pair returned from range queries.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use taskhub_storage::KeyValue;
///
/// let kv = KeyValue::new(Bytes::from("refresh/record/1"), Bytes::from("{}"));
/// assert_eq!(kv.key, Bytes::from("refresh/record/1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The key identifying this entry.
    pub key: Bytes,

    /// The value stored at this key.
    pub value: Bytes,
}

impl KeyValue {
    /// Creates a new key-value pair.
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// Result of an atomic counter increment.
///
/// Returned by [`StorageBackend::increment_with_ttl`](crate::StorageBackend::increment_with_ttl).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    /// Value after the increment (1 for a freshly created counter).
    pub count: u64,
    /// Time left until the counter expires.
    pub expires_in: Duration,
}

/// Macro to define a newtype wrapper around `i64` with standard trait
/// implementations.
///
/// Each generated type:
/// - Is a transparent wrapper around `i64`
/// - Derives `Copy`, `Clone`, `Debug`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Derives `Serialize` and `Deserialize` (transparent)
/// - Implements `From<i64>`, `Into<i64>` and `Display`
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identity (user) ID, owned by the user-management subsystem.
    ///
    /// # Examples
    ///
    /// ```
    /// use taskhub_storage::SubjectId;
    ///
    /// let subject = SubjectId::from(42);
    /// assert_eq!(i64::from(subject), 42);
    /// assert_eq!(subject.to_string(), "42");
    /// ```
    SubjectId
);

define_id!(
    /// Workspace ID, the scope checked by the authorization gate.
    WorkspaceId
);

define_id!(
    /// Refresh-record ID in the revocation ledger.
    ///
    /// Generated randomly at record creation; uniqueness is enforced by an
    /// insert-if-absent write, never assumed.
    RecordId
);

impl RecordId {
    /// Generates a fresh random, strictly positive record ID.
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        Self(rand::rng().random_range(1..i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct_types_with_transparent_serde() {
        let subject = SubjectId::from(7);
        assert_eq!(serde_json::to_string(&subject).ok().as_deref(), Some("7"));

        let workspace: WorkspaceId = serde_json::from_str("12").unwrap_or(WorkspaceId(0));
        assert_eq!(workspace, WorkspaceId(12));
    }

    #[test]
    fn test_generated_record_ids_are_positive() {
        for _ in 0..64 {
            assert!(RecordId::generate().0 > 0);
        }
    }
}
