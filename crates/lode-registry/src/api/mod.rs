//! JSON simple-repository API response types

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use lode_core::types::Version;
use lode_core::utils::normalize_name;

/// Media type of the JSON simple API, version 1
pub const SIMPLE_JSON_V1: &str = "application/vnd.pypi.simple.v1+json";

/// Project page returned by `GET <index>/<name>/`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectPage {
    /// Normalized project name
    pub name: String,
    /// Published versions, when the index lists them
    #[serde(default)]
    pub versions: Vec<String>,
    /// Distribution files
    #[serde(default)]
    pub files: Vec<DistributionFile>,
}

/// One distribution file on a project page
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DistributionFile {
    /// File name, e.g. `requests-2.31.0-py3-none-any.whl`
    pub filename: String,
    /// Download URL, possibly relative to the project page
    pub url: String,
    /// Hash name to hex digest
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
    /// Interpreter requirement
    #[serde(rename = "requires-python", default)]
    pub requires_python: Option<String>,
    /// Whether the file was withdrawn
    #[serde(default)]
    pub yanked: Yanked,
    /// Whether `<url>.metadata` is served
    #[serde(rename = "core-metadata", alias = "dist-info-metadata", default)]
    pub core_metadata: CoreMetadata,
}

/// `yanked` is either a flag or a reason string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Yanked {
    Flag(bool),
    Reason(String),
}

impl Default for Yanked {
    fn default() -> Self {
        Yanked::Flag(false)
    }
}

impl Yanked {
    pub fn is_yanked(&self) -> bool {
        match self {
            Yanked::Flag(flag) => *flag,
            Yanked::Reason(_) => true,
        }
    }
}

/// `core-metadata` is either a flag or the hashes of the metadata file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CoreMetadata {
    Flag(bool),
    Hashes(BTreeMap<String, String>),
}

impl Default for CoreMetadata {
    fn default() -> Self {
        CoreMetadata::Flag(false)
    }
}

impl CoreMetadata {
    pub fn is_available(&self) -> bool {
        match self {
            CoreMetadata::Flag(flag) => *flag,
            CoreMetadata::Hashes(_) => true,
        }
    }
}

impl DistributionFile {
    pub fn is_wheel(&self) -> bool {
        self.filename.ends_with(".whl")
    }

    pub fn is_sdist(&self) -> bool {
        self.filename.ends_with(".tar.gz") || self.filename.ends_with(".zip")
    }

    /// SHA-256 digest rendered as `sha256:<hex>`
    pub fn sha256(&self) -> Option<String> {
        self.hashes
            .get("sha256")
            .map(|hex| format!("sha256:{}", hex.to_ascii_lowercase()))
    }

    /// Version encoded in the file name, if it can be read
    pub fn version(&self, project: &str) -> Option<Version> {
        version_from_filename(&self.filename, project)
    }
}

impl ProjectPage {
    /// Versions from the `versions` list, else from file names.
    ///
    /// Files that are all yanked do not contribute a version.
    pub fn available_versions(&self) -> Vec<Version> {
        let mut versions: Vec<Version> = if self.versions.is_empty() {
            self.files
                .iter()
                .filter(|file| !file.yanked.is_yanked())
                .filter_map(|file| file.version(&self.name))
                .collect()
        } else {
            self.versions
                .iter()
                .filter_map(|raw| raw.parse::<Version>().ok())
                .filter(|version| {
                    let files = self.files_for(version);
                    files.is_empty() || files.iter().any(|file| !file.yanked.is_yanked())
                })
                .collect()
        };
        versions.sort();
        versions.dedup();
        versions
    }

    /// Files published for a version
    pub fn files_for(&self, version: &Version) -> Vec<&DistributionFile> {
        self.files
            .iter()
            .filter(|file| file.version(&self.name).as_ref() == Some(version))
            .collect()
    }

    /// Preferred distribution for a version: first wheel by file name,
    /// else first sdist
    pub fn preferred_file(&self, version: &Version) -> Option<&DistributionFile> {
        let mut files: Vec<&DistributionFile> = self
            .files_for(version)
            .into_iter()
            .filter(|file| !file.yanked.is_yanked())
            .collect();
        files.sort_by(|a, b| a.filename.cmp(&b.filename));

        files
            .iter()
            .find(|file| file.is_wheel())
            .or_else(|| files.iter().find(|file| file.is_sdist()))
            .copied()
    }
}

/// Read the version out of a wheel or sdist file name
pub fn version_from_filename(filename: &str, project: &str) -> Option<Version> {
    if let Some(stem) = filename.strip_suffix(".whl") {
        // name-version(-build)?-python-abi-platform
        return stem.split('-').nth(1)?.parse().ok();
    }

    let stem = filename
        .strip_suffix(".tar.gz")
        .or_else(|| filename.strip_suffix(".zip"))?;

    // The sdist name may itself contain dashes, so match it against the project
    let project = normalize_name(project);
    let (name, version) = stem.rsplit_once('-')?;
    if normalize_name(name) != project {
        return None;
    }
    version.parse().ok()
}

/// `Requires-Dist` values from a core metadata document
pub fn requires_dist(metadata: &str) -> Vec<String> {
    metadata
        .lines()
        // Headers end at the first blank line; the body is the description
        .take_while(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.trim().eq_ignore_ascii_case("requires-dist") {
                Some(value.trim().to_string())
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(filename: &str, yanked: bool) -> DistributionFile {
        DistributionFile {
            filename: filename.to_string(),
            url: format!("https://files.example/{}", filename),
            hashes: BTreeMap::from([("sha256".to_string(), "ABCD".to_string())]),
            requires_python: None,
            yanked: Yanked::Flag(yanked),
            core_metadata: CoreMetadata::Flag(true),
        }
    }

    #[test]
    fn test_version_from_filename() {
        assert_eq!(
            version_from_filename("requests-2.31.0-py3-none-any.whl", "requests"),
            Some("2.31.0".parse().unwrap())
        );
        assert_eq!(
            version_from_filename("zope.interface-6.1.tar.gz", "zope-interface"),
            Some("6.1".parse().unwrap())
        );
        assert_eq!(
            version_from_filename("my-pkg-1.0rc1.zip", "my_pkg"),
            Some("1.0rc1".parse().unwrap())
        );
        assert_eq!(version_from_filename("other-1.0.tar.gz", "mine"), None);
        assert_eq!(version_from_filename("README.md", "mine"), None);
    }

    #[test]
    fn test_available_versions_skip_yanked() {
        let page = ProjectPage {
            name: "demo".to_string(),
            versions: Vec::new(),
            files: vec![
                file("demo-1.0.tar.gz", false),
                file("demo-1.1-py3-none-any.whl", true),
                file("demo-2.0-py3-none-any.whl", false),
            ],
        };
        let versions: Vec<String> = page
            .available_versions()
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(versions, vec!["1.0", "2.0"]);
    }

    #[test]
    fn test_preferred_file_is_first_wheel() {
        let page = ProjectPage {
            name: "demo".to_string(),
            versions: vec!["1.0".to_string()],
            files: vec![
                file("demo-1.0.tar.gz", false),
                file("demo-1.0-py3-none-win32.whl", false),
                file("demo-1.0-py3-none-any.whl", false),
            ],
        };
        let version = "1.0".parse().unwrap();
        let preferred = page.preferred_file(&version).unwrap();
        assert_eq!(preferred.filename, "demo-1.0-py3-none-any.whl");
        assert_eq!(preferred.sha256().as_deref(), Some("sha256:abcd"));
    }

    #[test]
    fn test_yanked_and_core_metadata_shapes() {
        let json = serde_json::json!({
            "name": "demo",
            "files": [
                {
                    "filename": "demo-1.0.tar.gz",
                    "url": "demo-1.0.tar.gz",
                    "hashes": {"sha256": "00"},
                    "yanked": "broken build",
                    "core-metadata": {"sha256": "11"}
                },
                {
                    "filename": "demo-1.1.tar.gz",
                    "url": "demo-1.1.tar.gz",
                    "dist-info-metadata": true
                }
            ]
        });
        let page: ProjectPage = serde_json::from_value(json).unwrap();
        assert!(page.files[0].yanked.is_yanked());
        assert!(page.files[0].core_metadata.is_available());
        assert!(!page.files[1].yanked.is_yanked());
        assert!(page.files[1].core_metadata.is_available());
        assert_eq!(page.available_versions().len(), 1);
    }

    #[test]
    fn test_requires_dist_parsing() {
        let metadata = "Metadata-Version: 2.1\n\
                        Name: requests\n\
                        Requires-Dist: idna (<4,>=2.5)\n\
                        requires-dist: PySocks!=1.5.7,>=1.5.6; extra == \"socks\"\n\
                        \n\
                        Requires-Dist: not-a-header\n";
        assert_eq!(
            requires_dist(metadata),
            vec![
                "idna (<4,>=2.5)".to_string(),
                "PySocks!=1.5.7,>=1.5.6; extra == \"socks\"".to_string(),
            ]
        );
    }
}
