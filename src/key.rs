//! Structured cache keys.
//!
//! A key is the triple `(resource, owner, suffix)`. The persisted form also
//! carries the cache version:
//!
//! ```text
//! {version}:{resource}:{owner}[:{suffix}]
//! ```
//!
//! Every segment is escaped, so a resource or owner containing `-` or `:`
//! can never shift segment boundaries. The hyphenated legacy form
//! (`gastos-user1-2024-05`) is still accepted through [`FromStr`] and
//! produced by [`Display`](fmt::Display) for logging.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::{KEY_SEPARATOR, escape_segment, unescape_segment};

/// Identifies one cacheable resource for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    resource: String,
    owner: String,
    suffix: Option<String>,
}

/// Error returned when a legacy key string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cache key '{0}': expected '{{resource}}-{{owner}}[-{{suffix}}]'")]
pub struct ParseKeyError(String);

impl CacheKey {
    /// Key for a whole resource, e.g. every subscription plan of a user.
    pub fn new(resource: impl Into<String>, owner: impl Into<String>) -> Self {
        CacheKey {
            resource: resource.into(),
            owner: owner.into(),
            suffix: None,
        }
    }

    /// Key for a parameterized query, e.g. the expenses of one month.
    pub fn with_suffix(
        resource: impl Into<String>,
        owner: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        CacheKey {
            resource: resource.into(),
            owner: owner.into(),
            suffix: Some(suffix.into()),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Version-independent identity, used by the in-memory registries.
    pub fn id(&self) -> String {
        let mut id = format!(
            "{}{}{}",
            escape_segment(&self.resource),
            KEY_SEPARATOR,
            escape_segment(&self.owner)
        );
        if let Some(suffix) = &self.suffix {
            id.push(KEY_SEPARATOR);
            id.push_str(&escape_segment(suffix));
        }
        id
    }

    /// Key under which the entry is persisted for the given cache version.
    pub fn storage_key(&self, version: &str) -> String {
        format!("{}{}{}", escape_segment(version), KEY_SEPARATOR, self.id())
    }

    /// Parse a persisted key back into `(version, key)`.
    ///
    /// Returns `None` for keys this crate did not write.
    pub fn from_storage_key(raw: &str) -> Option<(String, CacheKey)> {
        let mut parts = raw.split(KEY_SEPARATOR);
        let version = unescape_segment(parts.next()?)?;
        let resource = unescape_segment(parts.next()?)?;
        let owner = unescape_segment(parts.next()?)?;
        let suffix = match parts.next() {
            Some(s) => Some(unescape_segment(s)?),
            None => None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some((
            version,
            CacheKey {
                resource,
                owner,
                suffix,
            },
        ))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.resource, self.owner)?;
        if let Some(suffix) = &self.suffix {
            write!(f, "-{}", suffix)?;
        }
        Ok(())
    }
}

impl FromStr for CacheKey {
    type Err = ParseKeyError;

    /// The first two hyphen-delimited segments are the resource and the
    /// owner; anything after the second hyphen is the suffix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '-');
        let resource = parts.next().filter(|p| !p.is_empty());
        let owner = parts.next().filter(|p| !p.is_empty());
        let (Some(resource), Some(owner)) = (resource, owner) else {
            return Err(ParseKeyError(s.to_string()));
        };
        let suffix = parts.next().filter(|p| !p.is_empty());
        Ok(CacheKey {
            resource: resource.to_string(),
            owner: owner.to_string(),
            suffix: suffix.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_legacy_key_with_suffix() {
        let key: CacheKey = "gastos-user1-2024-05".parse().unwrap();
        assert_eq!(key.resource(), "gastos");
        assert_eq!(key.owner(), "user1");
        assert_eq!(key.suffix(), Some("2024-05"));
        assert_eq!(key.to_string(), "gastos-user1-2024-05");
    }

    #[test]
    fn test_parse_legacy_key_without_suffix() {
        let key: CacheKey = "reportes-user1".parse().unwrap();
        assert_eq!(key, CacheKey::new("reportes", "user1"));
    }

    #[test]
    fn test_parse_rejects_missing_owner() {
        assert!("gastos".parse::<CacheKey>().is_err());
        assert!("gastos-".parse::<CacheKey>().is_err());
        assert!("-user1".parse::<CacheKey>().is_err());
    }

    #[test]
    fn test_storage_key_roundtrip() {
        let key = CacheKey::with_suffix("metas", "user1", "2024:05");
        let raw = key.storage_key("v1");
        assert_eq!(raw, "v1:metas:user1:2024%3A05");

        let (version, parsed) = CacheKey::from_storage_key(&raw).unwrap();
        assert_eq!(version, "v1");
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_hyphenated_segments_do_not_collide() {
        // Both render as "a-b-c" in legacy form but must persist apart.
        let first = CacheKey::with_suffix("a-b", "c", "d");
        let second = CacheKey::with_suffix("a", "b-c", "d");
        assert_eq!(first.to_string(), second.to_string());
        assert_ne!(first.storage_key("v1"), second.storage_key("v1"));
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_suffix_distinguishes_keys() {
        let plain = CacheKey::new("gastos", "user1");
        let month = CacheKey::with_suffix("gastos", "user1", "2024-05");
        assert_ne!(plain.storage_key("v1"), month.storage_key("v1"));
    }

    #[test]
    fn test_from_storage_key_rejects_foreign_keys() {
        assert!(CacheKey::from_storage_key("session").is_none());
        assert!(CacheKey::from_storage_key("v1:gastos").is_none());
        assert!(CacheKey::from_storage_key("v1:a:b:c:d").is_none());
    }
}
