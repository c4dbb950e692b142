//! Version constraint expressions.
//!
//! A constraint is a conjunction of comparator clauses such as
//! `>=1.0, !=1.3.*, <2`. Combining the constraints of several requirements
//! is again a conjunction, so the combined constraint for an identity is
//! simply the union of the clauses.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::version::{Version, VersionError};

/// Conjunction of comparator clauses
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VersionConstraint {
    pub comparators: Vec<Comparator>,
}

/// Individual version comparator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Comparator {
    pub op: Op,
    pub version: Version,
    /// `==1.2.*` and `!=1.2.*` prefix forms
    pub wildcard: bool,
}

/// Comparison operator for version constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Equal,      // ==1.0
    NotEqual,   // !=1.0
    GreaterEq,  // >=1.0
    LessEq,     // <=1.0
    Greater,    // >1.0
    Less,       // <1.0
    Compatible, // ~=1.4.2
    Arbitrary,  // ===1.0
}

impl Op {
    fn symbol(&self) -> &'static str {
        match self {
            Op::Equal => "==",
            Op::NotEqual => "!=",
            Op::GreaterEq => ">=",
            Op::LessEq => "<=",
            Op::Greater => ">",
            Op::Less => "<",
            Op::Compatible => "~=",
            Op::Arbitrary => "===",
        }
    }
}

impl VersionConstraint {
    /// The constraint that allows every version
    pub fn any() -> Self {
        Self::default()
    }

    /// A single `==version` constraint
    pub fn exact(version: Version) -> Self {
        Self {
            comparators: vec![Comparator {
                op: Op::Equal,
                version,
                wildcard: false,
            }],
        }
    }

    /// Parse a comma-separated constraint expression
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        let comparators = trimmed
            .split(',')
            .map(|clause| Comparator::parse(input, clause.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { comparators })
    }

    /// Check if the constraint allows every version
    pub fn is_any(&self) -> bool {
        self.comparators.is_empty()
    }

    /// Check if a version satisfies every clause
    pub fn matches(&self, version: &Version) -> bool {
        self.comparators.iter().all(|comp| comp.matches(version))
    }

    /// Conjunction of two constraints, with duplicate clauses removed
    pub fn intersect(&self, other: &Self) -> Self {
        let mut comparators = self.comparators.clone();
        for comp in &other.comparators {
            if !comparators.contains(comp) {
                comparators.push(comp.clone());
            }
        }
        Self { comparators }
    }

    /// Whether pre-releases were asked for explicitly
    pub fn allows_prereleases(&self) -> bool {
        self.comparators
            .iter()
            .any(|comp| comp.op != Op::NotEqual && comp.version.is_prerelease())
    }

    /// Canonical form: sorted, de-duplicated clauses
    pub fn fingerprint(&self) -> String {
        if self.is_any() {
            return "*".to_string();
        }
        let mut clauses: Vec<String> = self.comparators.iter().map(|c| c.to_string()).collect();
        clauses.sort();
        clauses.dedup();
        clauses.join(",")
    }
}

impl Comparator {
    fn parse(expression: &str, clause: &str) -> Result<Self, VersionError> {
        let invalid = |reason: &str| VersionError::InvalidConstraint {
            input: expression.to_string(),
            reason: reason.to_string(),
        };

        if clause.is_empty() {
            return Err(invalid("empty clause"));
        }

        // Longest operators first
        let (op, rest) = if let Some(stripped) = clause.strip_prefix("===") {
            (Op::Arbitrary, stripped)
        } else if let Some(stripped) = clause.strip_prefix("~=") {
            (Op::Compatible, stripped)
        } else if let Some(stripped) = clause.strip_prefix("==") {
            (Op::Equal, stripped)
        } else if let Some(stripped) = clause.strip_prefix("!=") {
            (Op::NotEqual, stripped)
        } else if let Some(stripped) = clause.strip_prefix(">=") {
            (Op::GreaterEq, stripped)
        } else if let Some(stripped) = clause.strip_prefix("<=") {
            (Op::LessEq, stripped)
        } else if let Some(stripped) = clause.strip_prefix('>') {
            (Op::Greater, stripped)
        } else if let Some(stripped) = clause.strip_prefix('<') {
            (Op::Less, stripped)
        } else if clause.starts_with(|c: char| c.is_ascii_digit() || c == 'v') {
            (Op::Equal, clause)
        } else {
            return Err(invalid(&format!("unknown operator in '{}'", clause)));
        };

        let rest = rest.trim();
        let (version_text, wildcard) = match rest.strip_suffix(".*") {
            Some(prefix) => (prefix, true),
            None => (rest, false),
        };

        if wildcard && !matches!(op, Op::Equal | Op::NotEqual) {
            return Err(invalid("prefix wildcards are only allowed with == and !="));
        }

        let version: Version = version_text.parse()?;

        if wildcard && (version.is_prerelease() || version.is_postrelease() || version.local.is_some()) {
            return Err(invalid("prefix wildcards apply to release segments only"));
        }
        if op == Op::Compatible && version.release.len() < 2 {
            return Err(invalid("~= needs at least two release segments"));
        }

        Ok(Self {
            op,
            version,
            wildcard,
        })
    }

    /// Check if a version matches this comparator
    pub fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            Op::Equal if self.wildcard => self.prefix_matches(candidate),
            Op::NotEqual if self.wildcard => !self.prefix_matches(candidate),
            Op::Equal => self.equals(candidate),
            Op::NotEqual => !self.equals(candidate),
            Op::GreaterEq => candidate.precedence_cmp(&self.version).is_ge(),
            Op::LessEq => candidate.precedence_cmp(&self.version).is_le(),
            Op::Greater => {
                // >V never admits post-releases of V itself unless V is one
                candidate.precedence_cmp(&self.version).is_gt()
                    && !(candidate.same_release(&self.version)
                        && candidate.is_postrelease()
                        && !self.version.is_postrelease())
            },
            Op::Less => {
                // <V never admits pre-releases of V itself unless V is one
                candidate.precedence_cmp(&self.version).is_lt()
                    && !(candidate.same_release(&self.version)
                        && candidate.is_prerelease()
                        && !self.version.is_prerelease())
            },
            Op::Compatible => {
                let prefix_len = self.version.release.len() - 1;
                candidate.precedence_cmp(&self.version).is_ge()
                    && candidate.epoch == self.version.epoch
                    && (0..prefix_len).all(|i| candidate.segment(i) == self.version.segment(i))
            },
            Op::Arbitrary => candidate.to_string() == self.version.to_string(),
        }
    }

    fn equals(&self, candidate: &Version) -> bool {
        // A clause without a local label matches every local build of the release.
        let same = candidate.precedence_cmp(&self.version).is_eq();
        match self.version.local {
            Some(_) => same && candidate.local == self.version.local,
            None => same,
        }
    }

    fn prefix_matches(&self, candidate: &Version) -> bool {
        candidate.epoch == self.version.epoch
            && (0..self.version.release.len())
                .all(|i| candidate.segment(i) == self.version.segment(i))
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.symbol(), self.version)?;
        if self.wildcard {
            write!(f, ".*")?;
        }
        Ok(())
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "*");
        }
        let clauses: Vec<String> = self.comparators.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", clauses.join(", "))
    }
}

impl FromStr for VersionConstraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn c(s: &str) -> VersionConstraint {
        VersionConstraint::parse(s).unwrap()
    }

    #[test]
    fn test_constraint_exact() {
        let req = c("==1.2.3");
        assert!(req.matches(&v("1.2.3")));
        assert!(req.matches(&v("1.2.3.0")));
        assert!(req.matches(&v("1.2.3+local")));
        assert!(!req.matches(&v("1.2.4")));

        // Bare versions mean ==
        assert!(c("1.2.3").matches(&v("1.2.3")));
    }

    #[test]
    fn test_constraint_any() {
        let req = c("*");
        assert!(req.is_any());
        assert!(req.matches(&v("0.0.1")));
        assert!(c("").matches(&v("999")));
    }

    #[test]
    fn test_constraint_operators() {
        let req = c(">1.2.3");
        assert!(!req.matches(&v("1.2.3")));
        assert!(req.matches(&v("1.2.4")));
        assert!(!req.matches(&v("1.2.3.post1")));

        let req = c(">=1.2.3");
        assert!(req.matches(&v("1.2.3")));
        assert!(req.matches(&v("1.3.0")));

        let req = c("<2.0");
        assert!(req.matches(&v("1.9.9")));
        assert!(!req.matches(&v("2.0")));
        assert!(!req.matches(&v("2.0rc1")));

        let req = c("<=2.0");
        assert!(req.matches(&v("2.0")));
        assert!(!req.matches(&v("2.0.1")));
    }

    #[test]
    fn test_constraint_compatible_release() {
        let req = c("~=1.4.2");
        assert!(req.matches(&v("1.4.2")));
        assert!(req.matches(&v("1.4.9")));
        assert!(!req.matches(&v("1.5.0")));
        assert!(!req.matches(&v("1.4.1")));

        let req = c("~=2.2");
        assert!(req.matches(&v("2.9")));
        assert!(!req.matches(&v("3.0")));

        assert!(VersionConstraint::parse("~=1").is_err());
    }

    #[test]
    fn test_constraint_wildcards() {
        let req = c("==1.2.*");
        assert!(req.matches(&v("1.2")));
        assert!(req.matches(&v("1.2.7")));
        assert!(!req.matches(&v("1.3.0")));

        let req = c("!=1.2.*");
        assert!(!req.matches(&v("1.2.7")));
        assert!(req.matches(&v("1.3.0")));

        assert!(VersionConstraint::parse(">=1.*").is_err());
    }

    #[test]
    fn test_constraint_conjunction() {
        let req = c(">=1.0, <2.0, !=1.5");
        assert!(req.matches(&v("1.4")));
        assert!(!req.matches(&v("1.5")));
        assert!(!req.matches(&v("2.0")));
    }

    #[test]
    fn test_constraint_intersection() {
        let combined = c(">=1.0").intersect(&c("<2.0")).intersect(&c(">=1.0"));
        assert_eq!(combined.comparators.len(), 2);
        assert!(combined.matches(&v("1.5")));
        assert!(!combined.matches(&v("2.0")));
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        assert_eq!(c(">=1.0, <2").fingerprint(), c("<2,>=1.0").fingerprint());
        assert_eq!(c("*").fingerprint(), "*");
        assert_ne!(c(">=1.0").fingerprint(), c(">1.0").fingerprint());
    }

    #[test]
    fn test_prerelease_opt_in() {
        assert!(!c(">=1.0").allows_prereleases());
        assert!(c(">=1.0b1").allows_prereleases());
        assert!(!c("!=1.0b1").allows_prereleases());
    }

    #[test]
    fn test_invalid_constraints() {
        assert!(VersionConstraint::parse(">=").is_err());
        assert!(VersionConstraint::parse(">=1.0,").is_err());
        assert!(VersionConstraint::parse("^1.0").is_err());
    }
}
