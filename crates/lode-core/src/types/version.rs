//! Version numbers with PEP 440 ordering.
//!
//! Provides the `Version` type used to sort candidate lists. Precedence is
//! decided by the epoch, the numeric release segments and then the release
//! phase (`dev < pre < final < post`). The local label (`+build`) never
//! changes precedence but is part of equality.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// A concrete version (`[N!]N(.N)*[{a|b|rc}N][.postN][.devN][+local]`)
#[derive(Debug, Clone)]
pub struct Version {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<PreRelease>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Option<String>,
}

/// Pre-release tag and number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PreRelease {
    pub kind: PreKind,
    pub number: u64,
}

/// Pre-release phase, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreKind {
    Alpha,
    Beta,
    Rc,
}

/// Version and constraint parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version format")]
    InvalidFormat { input: String },

    #[error("invalid number '{component}'")]
    InvalidNumber { input: String, component: String },

    #[error("unknown or misplaced label '{label}'")]
    InvalidLabel { input: String, label: String },

    #[error("invalid local label '{local}'")]
    InvalidLocal { input: String, local: String },

    #[error("invalid constraint: {reason}")]
    InvalidConstraint { input: String, reason: String },
}

impl VersionError {
    /// The text that failed to parse
    pub fn input(&self) -> &str {
        match self {
            VersionError::InvalidFormat { input }
            | VersionError::InvalidNumber { input, .. }
            | VersionError::InvalidLabel { input, .. }
            | VersionError::InvalidLocal { input, .. }
            | VersionError::InvalidConstraint { input, .. } => input,
        }
    }
}

impl Version {
    /// Create a final release `major.minor.patch`
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self::from_release(vec![major, minor, patch])
    }

    /// Create a final release from arbitrary release segments
    pub fn from_release(release: Vec<u64>) -> Self {
        Self {
            epoch: 0,
            release,
            pre: None,
            post: None,
            dev: None,
            local: None,
        }
    }

    /// Check if this is a pre-release or development release
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// Check if this is a post-release
    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    /// Release segment at `index`, zero when absent
    pub fn segment(&self, index: usize) -> u64 {
        self.release.get(index).copied().unwrap_or(0)
    }

    /// Same epoch and release segments, ignoring every suffix
    pub fn same_release(&self, other: &Self) -> bool {
        self.epoch == other.epoch && compare_release(&self.release, &other.release).is_eq()
    }

    /// Compare precedence only, ignoring the local label
    pub fn precedence_cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| self.phase_key().cmp(&other.phase_key()))
    }

    /// Ordering key for the suffixes of a release.
    ///
    /// A bare dev release sorts before any pre-release of the same release,
    /// a pre-release before the final, and post-releases after it.
    fn phase_key(&self) -> ((u8, u8, u64), (u8, u64), (u8, u64)) {
        let pre = match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => (0, 0, 0),
            (Some(pre), _, _) => (1, pre.kind as u8, pre.number),
            _ => (2, 0, 0),
        };
        let post = match self.post {
            Some(n) => (1, n),
            None => (0, 0),
        };
        let dev = match self.dev {
            Some(n) => (0, n),
            None => (1, 0),
        };
        (pre, post, dev)
    }
}

fn compare_release(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let left = a.get(i).copied().unwrap_or(0);
        let right = b.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

const SEPARATORS: &[char] = &['.', '-', '_'];

fn parse_number(input: &str, component: &str) -> Result<u64, VersionError> {
    if component.is_empty() || !component.chars().all(|c| c.is_ascii_digit()) {
        return Err(VersionError::InvalidNumber {
            input: input.to_string(),
            component: component.to_string(),
        });
    }
    component.parse().map_err(|_| VersionError::InvalidNumber {
        input: input.to_string(),
        component: component.to_string(),
    })
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }

        let lowered = input.to_ascii_lowercase();
        let body = lowered.strip_prefix('v').unwrap_or(&lowered);

        // Split on '+' for the local label
        let (body, local) = match body.split_once('+') {
            Some((b, l)) => {
                let valid = !l.is_empty()
                    && l.split(SEPARATORS)
                        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()));
                if !valid {
                    return Err(VersionError::InvalidLocal {
                        input: input.to_string(),
                        local: l.to_string(),
                    });
                }
                (b, Some(l.replace(&['-', '_'][..], ".")))
            },
            None => (body, None),
        };

        // Split on '!' for the epoch
        let (epoch, body) = match body.split_once('!') {
            Some((e, b)) => (parse_number(input, e)?, b),
            None => (0, body),
        };

        let release_end = body
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(body.len());
        let (release_part, mut rest) = body.split_at(release_end);
        let release_part = release_part.strip_suffix('.').unwrap_or(release_part);
        if release_part.is_empty() {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }
        let release = release_part
            .split('.')
            .map(|part| parse_number(input, part))
            .collect::<Result<Vec<_>, _>>()?;

        let mut version = Version {
            epoch,
            release,
            pre: None,
            post: None,
            dev: None,
            local,
        };

        // Suffixes must appear as pre, post, dev
        let mut stage = 0u8;
        while !rest.is_empty() {
            let implicit_post = rest.starts_with('-')
                && rest[1..].starts_with(|c: char| c.is_ascii_digit());
            let trimmed = rest.trim_start_matches(SEPARATORS);
            let label_end = trimmed
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(trimmed.len());
            let (label, after) = trimmed.split_at(label_end);
            let after = if label.is_empty() { after } else { after.trim_start_matches(SEPARATORS) };
            let digits_end = after.find(|c: char| !c.is_ascii_digit()).unwrap_or(after.len());
            let (digits, after) = after.split_at(digits_end);
            let number = if digits.is_empty() {
                0
            } else {
                parse_number(input, digits)?
            };

            let misplaced = || VersionError::InvalidLabel {
                input: input.to_string(),
                label: label.to_string(),
            };
            match label {
                "a" | "alpha" | "b" | "beta" | "c" | "rc" | "pre" | "preview" if stage < 1 => {
                    let kind = match label {
                        "a" | "alpha" => PreKind::Alpha,
                        "b" | "beta" => PreKind::Beta,
                        _ => PreKind::Rc,
                    };
                    version.pre = Some(PreRelease { kind, number });
                    stage = 1;
                },
                "post" | "rev" | "r" if stage < 2 => {
                    version.post = Some(number);
                    stage = 2;
                },
                "" if implicit_post && stage < 2 && !digits.is_empty() => {
                    version.post = Some(number);
                    stage = 2;
                },
                "dev" if stage < 3 => {
                    version.dev = Some(number);
                    stage = 3;
                },
                _ => return Err(misplaced()),
            }

            if after.len() == rest.len() {
                return Err(VersionError::InvalidFormat {
                    input: input.to_string(),
                });
            }
            rest = after;
        }

        Ok(version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }

        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        write!(f, "{}", release.join("."))?;

        if let Some(pre) = self.pre {
            let tag = match pre.kind {
                PreKind::Alpha => "a",
                PreKind::Beta => "b",
                PreKind::Rc => "rc",
            };
            write!(f, "{}{}", tag, pre.number)?;
        }

        if let Some(post) = self.post {
            write!(f, ".post{}", post)?;
        }

        if let Some(dev) = self.dev {
            write!(f, ".dev{}", dev)?;
        }

        if let Some(ref local) = self.local {
            write!(f, "+{}", local)?;
        }

        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.precedence_cmp(other).is_eq() && self.local == other.local
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Trailing zeros do not change equality, so they must not change the hash.
        let significant = self
            .release
            .iter()
            .rposition(|n| *n != 0)
            .map_or(0, |i| i + 1);
        self.epoch.hash(state);
        self.release[..significant].hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence_cmp(other)
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
