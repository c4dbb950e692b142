//! Requirement strings and registry-bound requirements.
//!
//! `RequirementSpec` is the parsed form of a `name[extra,...] constraint ; marker`
//! string. It becomes a `Requirement` once its registry is known and an
//! origin has been recorded.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::constraint::VersionConstraint;
use super::identity::PackageIdentity;
use super::version::Version;
use crate::error::{LodeError, LodeResult};
use crate::utils::{is_valid_name, normalize_name};

/// A parsed requirement string, not yet bound to a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementSpec {
    pub name: String,
    pub extras: BTreeSet<String>,
    pub constraint: VersionConstraint,
    pub marker: Option<String>,
}

impl RequirementSpec {
    /// Parse `name[extra,...] cmp ver, cmp ver ; marker`
    pub fn parse(input: &str) -> LodeResult<Self> {
        let invalid = |reason: &str| LodeError::InvalidRequirement {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (body, marker) = match input.split_once(';') {
            Some((body, marker)) => {
                let marker = marker.trim();
                if marker.is_empty() {
                    return Err(invalid("empty environment marker"));
                }
                (body.trim(), Some(marker.to_string()))
            },
            None => (input.trim(), None),
        };

        let name_end = body
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(body.len());
        let name = &body[..name_end];
        if !is_valid_name(name) {
            return Err(invalid("missing or malformed package name"));
        }

        let mut rest = body[name_end..].trim_start();
        let mut extras = BTreeSet::new();
        if let Some(after_bracket) = rest.strip_prefix('[') {
            let (list, after) = after_bracket
                .split_once(']')
                .ok_or_else(|| invalid("unterminated extras list"))?;
            for extra in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                if !is_valid_name(extra) {
                    return Err(invalid(&format!("malformed extra '{}'", extra)));
                }
                extras.insert(normalize_name(extra));
            }
            rest = after.trim_start();
        }

        if rest.starts_with('@') {
            return Err(invalid("direct URL references are not supported"));
        }

        let rest = match rest.strip_prefix('(') {
            Some(inner) => inner
                .strip_suffix(')')
                .ok_or_else(|| invalid("unbalanced parentheses"))?,
            None => rest,
        };

        let constraint = VersionConstraint::parse(rest).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            extras,
            constraint,
            marker,
        })
    }

    /// Normalized package name
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// The extra group named by an `extra == "..."` marker, if any
    pub fn extra_group(&self) -> Option<String> {
        let marker = self.marker.as_deref()?;
        let mut search = marker;
        while let Some(pos) = search.find("extra") {
            let before_ok = search[..pos]
                .chars()
                .next_back()
                .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_'));
            let after = search[pos + "extra".len()..].trim_start();
            if before_ok {
                if let Some(value) = after.strip_prefix("==") {
                    let value = value.trim_start();
                    if let Some(quote) = value.chars().next().filter(|q| *q == '"' || *q == '\'') {
                        if let Some(end) = value[1..].find(quote) {
                            return Some(normalize_name(&value[1..1 + end]));
                        }
                    }
                }
            }
            search = &search[pos + "extra".len()..];
        }
        None
    }
}

impl FromStr for RequirementSpec {
    type Err = LodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RequirementSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if !self.constraint.is_any() {
            write!(f, "{}", self.constraint)?;
        }
        if let Some(ref marker) = self.marker {
            write!(f, "; {}", marker)?;
        }
        Ok(())
    }
}

/// Where a requirement came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Declared by the project itself
    Direct,
    /// Declared by a selected package
    TransitiveOf(PackageIdentity),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Direct => write!(f, "project"),
            Origin::TransitiveOf(parent) => write!(f, "{}", parent),
        }
    }
}

/// A requirement bound to a registry-scoped identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub identity: PackageIdentity,
    pub constraint: VersionConstraint,
    pub extras: BTreeSet<String>,
    pub origin: Origin,
    pub marker: Option<String>,
}

impl Requirement {
    /// Create a requirement with no extras or marker
    pub fn new(identity: PackageIdentity, constraint: VersionConstraint, origin: Origin) -> Self {
        Self {
            identity,
            constraint,
            extras: BTreeSet::new(),
            origin,
            marker: None,
        }
    }

    /// Bind a parsed spec to an identity
    pub fn bind(spec: &RequirementSpec, identity: PackageIdentity, origin: Origin) -> Self {
        Self {
            identity,
            constraint: spec.constraint.clone(),
            extras: spec.extras.clone(),
            origin,
            marker: spec.marker.clone(),
        }
    }

    /// Request extras of the target package
    pub fn with_extras<I, S>(mut self, extras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extras
            .extend(extras.into_iter().map(|e| normalize_name(e.as_ref())));
        self
    }

    /// Check if the project declared this requirement
    pub fn is_direct(&self) -> bool {
        matches!(self.origin, Origin::Direct)
    }

    /// The package that introduced this requirement
    pub fn requester(&self) -> Option<&PackageIdentity> {
        match self.origin {
            Origin::Direct => None,
            Origin::TransitiveOf(ref parent) => Some(parent),
        }
    }

    /// Check a concrete version against this requirement
    pub fn satisfied_by(&self, version: &Version) -> bool {
        self.constraint.matches(version)
    }

    /// Key used to de-duplicate the resolution frontier
    pub fn frontier_key(&self) -> (PackageIdentity, String) {
        (self.identity.clone(), self.constraint.fingerprint())
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity.label())?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        write!(f, " {} (required by {})", self.constraint, self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Registry;
    use std::sync::Arc;

    #[test]
    fn test_parse_simple_requirement() {
        let spec = RequirementSpec::parse("requests>=2.28").unwrap();
        assert_eq!(spec.name, "requests");
        assert!(spec.extras.is_empty());
        assert_eq!(spec.constraint.to_string(), ">=2.28");
        assert_eq!(spec.marker, None);
    }

    #[test]
    fn test_parse_full_requirement() {
        let spec =
            RequirementSpec::parse("Requests[Socks, security] >= 2.0, < 3 ; python_version >= '3.8'")
                .unwrap();
        assert_eq!(spec.normalized_name(), "requests");
        assert!(spec.extras.contains("socks"));
        assert!(spec.extras.contains("security"));
        assert_eq!(spec.constraint.comparators.len(), 2);
        assert_eq!(spec.marker.as_deref(), Some("python_version >= '3.8'"));
    }

    #[test]
    fn test_parse_parenthesized_and_bare() {
        let spec = RequirementSpec::parse("idna (>=2.5,<4)").unwrap();
        assert_eq!(spec.constraint.comparators.len(), 2);

        let bare = RequirementSpec::parse("six").unwrap();
        assert!(bare.constraint.is_any());
    }

    #[test]
    fn test_parse_errors() {
        assert!(RequirementSpec::parse("").is_err());
        assert!(RequirementSpec::parse(">=1.0").is_err());
        assert!(RequirementSpec::parse("pkg[extra").is_err());
        assert!(RequirementSpec::parse("pkg @ https://example.com/pkg.whl").is_err());
        assert!(RequirementSpec::parse("pkg ^1.0").is_err());
        assert!(RequirementSpec::parse("pkg>=1.0;").is_err());
    }

    #[test]
    fn test_extra_group_from_marker() {
        let spec = RequirementSpec::parse("PySocks>=1.5.6; extra == \"socks\"").unwrap();
        assert_eq!(spec.extra_group(), Some("socks".to_string()));

        let spec =
            RequirementSpec::parse("pytest; python_version >= '3.8' and extra=='Test_Suite'")
                .unwrap();
        assert_eq!(spec.extra_group(), Some("test-suite".to_string()));

        let spec = RequirementSpec::parse("colorama; platform_system == 'Windows'").unwrap();
        assert_eq!(spec.extra_group(), None);

        let spec = RequirementSpec::parse("x; myextra == 'a'").unwrap();
        assert_eq!(spec.extra_group(), None);
    }

    #[test]
    fn test_display_round_trip() {
        let spec = RequirementSpec::parse("pkg[b,a]>=1.0, <2; os_name == 'nt'").unwrap();
        assert_eq!(spec.to_string(), "pkg[a,b]>=1.0, <2; os_name == 'nt'");
        assert_eq!(RequirementSpec::parse(&spec.to_string()).unwrap(), spec);
    }

    #[test]
    fn test_bound_requirement() {
        let registry = Arc::new(Registry::default_index());
        let identity = PackageIdentity::new("idna", registry.clone()).unwrap();
        let parent = PackageIdentity::new("requests", registry).unwrap();
        let spec = RequirementSpec::parse("idna>=2.5,<4").unwrap();

        let requirement = Requirement::bind(&spec, identity.clone(), Origin::TransitiveOf(parent.clone()));
        assert!(!requirement.is_direct());
        assert_eq!(requirement.requester(), Some(&parent));
        assert!(requirement.satisfied_by(&"3.6".parse().unwrap()));
        assert!(!requirement.satisfied_by(&"4.0".parse().unwrap()));
        assert_eq!(requirement.frontier_key(), (identity, "<4,>=2.5".to_string()));
    }
}
