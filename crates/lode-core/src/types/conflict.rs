//! Conflict explanations for failed resolutions.
//!
//! A report names every identity whose combined constraint could not be
//! met, each constraint involved and the chain of packages that led from
//! the project to that constraint.

use std::fmt;

use super::constraint::VersionConstraint;
use super::identity::PackageIdentity;
use super::version::Version;

/// Full explanation of an unresolvable requirement set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub clauses: Vec<ConflictClause>,
}

/// One identity and the constraints that could not be satisfied together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictClause {
    pub identity: PackageIdentity,
    pub constraints: Vec<ConstraintOrigin>,
    /// Versions the registry offered for this identity
    pub available: Vec<Version>,
}

/// A constraint and the dependency path that introduced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintOrigin {
    pub constraint: VersionConstraint,
    /// Packages and the versions selected for them, from the project root
    /// down to the direct requester; empty when the project itself declared
    /// the constraint
    pub chain: Vec<(PackageIdentity, Version)>,
}

impl ConflictReport {
    /// Check if the report names an identity
    pub fn mentions(&self, identity: &PackageIdentity) -> bool {
        self.clauses.iter().any(|clause| {
            clause.identity == *identity
                || clause
                    .constraints
                    .iter()
                    .any(|origin| origin.chain.iter().any(|(link, _)| link == identity))
        })
    }

    /// Clause for an identity, if present
    pub fn clause(&self, identity: &PackageIdentity) -> Option<&ConflictClause> {
        self.clauses.iter().find(|clause| clause.identity == *identity)
    }
}

impl ConflictClause {
    /// Add constraints from a later conflict on the same identity.
    ///
    /// Origins already present are skipped, so repeated conflicts after
    /// backtracking only ever grow the clause.
    pub fn merge(&mut self, other: ConflictClause) {
        for origin in other.constraints {
            if !self.constraints.contains(&origin) {
                self.constraints.push(origin);
            }
        }
        for version in other.available {
            if !self.available.contains(&version) {
                self.available.push(version);
            }
        }
        self.available.sort();
    }
}

impl ConstraintOrigin {
    /// `project -> a@pypi 2.0 -> b@pypi 1.1`
    pub fn render_chain(&self) -> String {
        let mut parts = vec!["project".to_string()];
        parts.extend(
            self.chain
                .iter()
                .map(|(identity, version)| format!("{} {}", identity.label(), version)),
        );
        parts.join(" -> ")
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return write!(f, "  no conflict recorded");
        }
        for (index, clause) in self.clauses.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", clause)?;
        }
        Ok(())
    }
}

impl fmt::Display for ConflictClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {} cannot satisfy all of:", self.identity)?;
        for origin in &self.constraints {
            writeln!(f, "    {} (via {})", origin.constraint, origin.render_chain())?;
        }
        if self.available.is_empty() {
            write!(f, "    no versions available")
        } else {
            let versions: Vec<String> = self.available.iter().map(|v| v.to_string()).collect();
            write!(f, "    available: {}", versions.join(", "))
        }
    }
}
