//! Project kind declared in the metadata file.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::LodeError;

/// Kind of project described by a metadata file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProjectType {
    /// A distributable library
    #[default]
    Package,
    /// An end-user application
    Application,
    /// A collection of member projects
    Workspace,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Package => "package",
            ProjectType::Application => "application",
            ProjectType::Workspace => "workspace",
        }
    }
}

impl FromStr for ProjectType {
    type Err = LodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "package" => Ok(ProjectType::Package),
            "application" => Ok(ProjectType::Application),
            "workspace" => Ok(ProjectType::Workspace),
            other => Err(LodeError::invalid_metadata(
                "tool.lode.project.type",
                format!(
                    "unknown project type '{}', expected package, application or workspace",
                    other
                ),
            )),
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProjectType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProjectType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
