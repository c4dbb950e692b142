//! Registry records and references.
//!
//! A registry is an independently namespaced package catalog. The same
//! package name on two registries names two unrelated packages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LodeError;

/// Alias of the built-in default registry
pub const DEFAULT_REGISTRY_ALIAS: &str = "pypi";

/// Index URL of the built-in default registry
pub const DEFAULT_REGISTRY_URL: &str = "https://pypi.org/simple";

/// A configured package registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    /// Locally unique nickname
    pub alias: String,
    /// Index root URL
    pub url: String,
    /// Whether the registry needs credentials
    #[serde(default)]
    pub private: bool,
    /// Globally unique registry identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
}

impl Registry {
    /// Create a public registry without a UUID
    pub fn new(alias: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            url: normalize_url(&url.into()),
            private: false,
            uuid: None,
        }
    }

    /// The public default registry
    pub fn default_index() -> Self {
        Self::new(DEFAULT_REGISTRY_ALIAS, DEFAULT_REGISTRY_URL)
    }

    /// Attach a UUID to this registry
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    /// Mark this registry as private
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// The most specific reference to this registry
    pub fn reference(&self) -> RegistryRef {
        match self.uuid {
            Some(uuid) => RegistryRef::Uuid(uuid),
            None => RegistryRef::Url(self.url.clone()),
        }
    }

    /// Full lookup record (every known field)
    pub fn lookup(&self) -> RegistryLookup {
        RegistryLookup {
            alias: Some(self.alias.clone()),
            url: Some(self.url.clone()),
            uuid: self.uuid,
        }
    }
}

// `private` is a property of the registry, not part of its identity.
impl PartialEq for Registry {
    fn eq(&self, other: &Self) -> bool {
        self.alias == other.alias && self.url == other.url && self.uuid == other.uuid
    }
}

impl Eq for Registry {}

impl Hash for Registry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.alias.hash(state);
        self.url.hash(state);
        self.uuid.hash(state);
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.alias, self.url)
    }
}

/// Strip trailing slashes so equal index roots compare equal
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// A reference to a registry by one of its keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegistryRef {
    Alias(String),
    Url(String),
    Uuid(Uuid),
}

impl RegistryRef {
    /// Convert into a lookup with exactly one field set
    pub fn to_lookup(&self) -> RegistryLookup {
        match self {
            RegistryRef::Alias(alias) => RegistryLookup {
                alias: Some(alias.clone()),
                ..RegistryLookup::default()
            },
            RegistryRef::Url(url) => RegistryLookup {
                url: Some(url.clone()),
                ..RegistryLookup::default()
            },
            RegistryRef::Uuid(uuid) => RegistryLookup {
                uuid: Some(*uuid),
                ..RegistryLookup::default()
            },
        }
    }
}

impl FromStr for RegistryRef {
    type Err = LodeError;

    /// UUIDs and URLs are recognized by shape; anything else is an alias
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(LodeError::UnknownRegistry {
                reference: s.to_string(),
            });
        }
        if let Ok(uuid) = Uuid::parse_str(input) {
            return Ok(RegistryRef::Uuid(uuid));
        }
        if input.contains("://") {
            let parsed = url::Url::parse(input).map_err(|e| LodeError::UnknownRegistry {
                reference: format!("{} ({})", input, e),
            })?;
            return Ok(RegistryRef::Url(normalize_url(parsed.as_str())));
        }
        Ok(RegistryRef::Alias(input.to_string()))
    }
}

impl fmt::Display for RegistryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryRef::Alias(alias) => write!(f, "{}", alias),
            RegistryRef::Url(url) => write!(f, "{}", url),
            RegistryRef::Uuid(uuid) => write!(f, "{}", uuid),
        }
    }
}

/// Lookup request with any combination of keys.
///
/// Keys are tried in the order UUID, URL, alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryLookup {
    pub alias: Option<String>,
    pub url: Option<String>,
    pub uuid: Option<Uuid>,
}

impl RegistryLookup {
    /// Check if no key is set
    pub fn is_empty(&self) -> bool {
        self.alias.is_none() && self.url.is_none() && self.uuid.is_none()
    }

    /// The most specific key, for error messages
    pub fn describe(&self) -> String {
        if let Some(uuid) = self.uuid {
            uuid.to_string()
        } else if let Some(ref url) = self.url {
            url.clone()
        } else {
            self.alias.clone().unwrap_or_default()
        }
    }
}

impl From<RegistryRef> for RegistryLookup {
    fn from(reference: RegistryRef) -> Self {
        reference.to_lookup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_ref_parsing() {
        assert_eq!(
            "corp".parse::<RegistryRef>().unwrap(),
            RegistryRef::Alias("corp".to_string())
        );
        assert_eq!(
            "https://pypi.org/simple/".parse::<RegistryRef>().unwrap(),
            RegistryRef::Url("https://pypi.org/simple".to_string())
        );

        let uuid = Uuid::new_v4();
        assert_eq!(
            uuid.to_string().parse::<RegistryRef>().unwrap(),
            RegistryRef::Uuid(uuid)
        );

        assert!("".parse::<RegistryRef>().is_err());
        assert!("http://[bad".parse::<RegistryRef>().is_err());
    }

    #[test]
    fn test_registry_equality_ignores_private_flag() {
        let public = Registry::new("corp", "https://corp.example/simple/");
        let private = Registry::new("corp", "https://corp.example/simple").private();
        assert_eq!(public, private);
        assert_eq!(public.url, "https://corp.example/simple");

        let other = Registry::new("mirror", "https://corp.example/simple");
        assert_ne!(public, other);
    }

    #[test]
    fn test_registry_reference_prefers_uuid() {
        let uuid = Uuid::new_v4();
        let registry = Registry::default_index().with_uuid(uuid);
        assert_eq!(registry.reference(), RegistryRef::Uuid(uuid));
        assert_eq!(
            Registry::default_index().reference(),
            RegistryRef::Url(DEFAULT_REGISTRY_URL.to_string())
        );
    }
}
