use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;

use crate::error::CacheError;

/// A persisted cache entry.
///
/// Field names are serialized in camelCase (`ownerId`), which is what other
/// clients of the same store expect to find.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// The cached value.
    pub data: T,

    /// Unix timestamp in milliseconds of the last write.
    /// The TTL is measured from here; reads never extend it.
    pub timestamp: i64,

    /// The user this entry belongs to.
    pub owner_id: String,

    /// Cache format version the entry was written with.
    pub version: String,
}

/// Type-erased entry as handled by stores.
///
/// Stores never see `T`; the payload travels as a JSON value so any
/// backend (memory, moka, redis) can hold any resource.
pub type RawEntry = CacheEntry<serde_json::Value>;

/// Why an entry was rejected on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalid {
    Expired,
    OwnerMismatch,
    VersionMismatch,
}

impl<T> CacheEntry<T> {
    /// Create a new cache entry.
    pub fn new(
        data: T,
        timestamp: i64,
        owner_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        CacheEntry {
            data,
            timestamp,
            owner_id: owner_id.into(),
            version: version.into(),
        }
    }

    /// Check if the entry is older than the TTL.
    pub fn is_expired(&self, now_ms: i64, ttl: Duration) -> bool {
        now_ms - self.timestamp >= ttl.as_millis() as i64
    }

    /// Validate the entry against the reader's owner and version.
    pub fn validate(
        &self,
        now_ms: i64,
        ttl: Duration,
        owner_id: &str,
        version: &str,
    ) -> Result<(), Invalid> {
        if self.version != version {
            return Err(Invalid::VersionMismatch);
        }
        if self.owner_id != owner_id {
            return Err(Invalid::OwnerMismatch);
        }
        if self.is_expired(now_ms, ttl) {
            return Err(Invalid::Expired);
        }
        Ok(())
    }
}

impl<T: Serialize> CacheEntry<T> {
    /// Convert to the store representation.
    pub fn into_raw(self) -> Result<RawEntry, CacheError> {
        let data = serde_json::to_value(&self.data)
            .map_err(|e| CacheError::Serialization(format!("Serialization failed: {}", e)))?;
        Ok(CacheEntry {
            data,
            timestamp: self.timestamp,
            owner_id: self.owner_id,
            version: self.version,
        })
    }
}

impl RawEntry {
    /// Convert the stored JSON payload back into `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<CacheEntry<T>, CacheError> {
        let data = serde_json::from_value(self.data)
            .map_err(|e| CacheError::Serialization(format!("Deserialization failed: {}", e)))?;
        Ok(CacheEntry {
            data,
            timestamp: self.timestamp,
            owner_id: self.owner_id,
            version: self.version,
        })
    }
}
