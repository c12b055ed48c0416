//! Cache Record Module
//!
//! The unit of storage shared by every backing store.

use chrono::{DateTime, Utc};

// == Record Address ==
/// Where a record lives.
///
/// Collection-style stores address documents by `key` alone and keep the
/// namespace as a field; tree-style stores nest `key` under `namespace`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordAddress {
    /// Key prefix active when the address was derived
    pub namespace: String,
    /// Address key (identity or hashed form of the folded cache key)
    pub key: String,
}

impl RecordAddress {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

// == Cache Record ==
/// A stored cache entry.
///
/// Used both as the payload of a write and the result of a read. On a
/// merge write only the populated optional fields are sent; `expires` is
/// always written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    /// Encoded payload, absent on touch-only writes
    pub value: Option<String>,
    /// Absolute expiry, whole-second resolution
    pub expires: DateTime<Utc>,
    /// Namespace tag used to scope bulk clear (collection-style only)
    pub namespace: Option<String>,
}

impl CacheRecord {
    /// Full record written by `add` and `set`.
    pub fn new(value: String, expires: DateTime<Utc>, namespace: impl Into<String>) -> Self {
        Self {
            value: Some(value),
            expires,
            namespace: Some(namespace.into()),
        }
    }

    /// Partial record written by `touch`.
    pub fn expiry_only(expires: DateTime<Utc>) -> Self {
        Self {
            value: None,
            expires,
            namespace: None,
        }
    }

    /// Applies the populated fields of `self` on top of `existing`.
    pub fn merge_into(&self, existing: &mut CacheRecord) {
        if let Some(value) = &self.value {
            existing.value = Some(value.clone());
        }
        if let Some(namespace) = &self.namespace {
            existing.namespace = Some(namespace.clone());
        }
        existing.expires = self.expires;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let later = DateTime::from_timestamp(1_700_000_060, 0).unwrap();

        let mut existing = CacheRecord::new("payload".into(), now, "ns");
        CacheRecord::expiry_only(later).merge_into(&mut existing);

        assert_eq!(existing.value.as_deref(), Some("payload"));
        assert_eq!(existing.namespace.as_deref(), Some("ns"));
        assert_eq!(existing.expires, later);
    }
}
