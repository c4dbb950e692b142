//! Project discovery and configuration layering

use std::collections::HashMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use lode_core::error::LodeError;
use lode_core::RegistryDirectory;

use crate::manifest::MANIFEST_FILE;
use crate::metadata::{ProjectMetadata, METADATA_FILE};
use crate::registries::{lode_home, load_registries_file, RegistriesFile, RegistrySettings, REGISTRIES_FILE};
use crate::ConfigResult;

/// Environment variable holding the resolution timeout in seconds
pub const TIMEOUT_VARIABLE: &str = "LODE_TIMEOUT_SECS";

/// Main configuration loading interface
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Directory the search starts from
    cwd: Utf8PathBuf,
    /// Lode home; `lode_home()` when unset
    home: Option<Utf8PathBuf>,
}

/// A discovered project
#[derive(Debug, Clone)]
pub struct Project {
    pub root: Utf8PathBuf,
    pub metadata_path: Utf8PathBuf,
    pub manifest_path: Utf8PathBuf,
    pub metadata: ProjectMetadata,
}

/// Process settings taken from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub timeout: Option<Duration>,
}

impl ConfigLoader {
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd, home: None }
    }

    /// Loader rooted at the process working directory
    pub fn from_current_dir() -> ConfigResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| LodeError::io("Failed to read the working directory".to_string(), e))?;
        let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| {
            LodeError::configuration("cwd", format!("Working directory is not UTF-8: {}", e))
        })?;
        Ok(Self::new(cwd))
    }

    /// Use a specific lode home instead of `$LODE_HOME` or `~/.lode`
    pub fn with_home(mut self, home: Utf8PathBuf) -> Self {
        self.home = Some(home);
        self
    }

    pub fn cwd(&self) -> &Utf8Path {
        &self.cwd
    }

    /// Walk up from the working directory to the first `pyproject.toml`
    pub fn find_project_root(&self) -> ConfigResult<Utf8PathBuf> {
        let mut current = Some(self.cwd.as_path());
        while let Some(dir) = current {
            if dir.join(METADATA_FILE).is_file() {
                debug!("Found project at {}", dir);
                return Ok(dir.to_path_buf());
            }
            current = dir.parent();
        }

        Err(LodeError::io(
            format!(
                "No {} found in {} or any parent directory",
                METADATA_FILE, self.cwd
            ),
            std::io::Error::new(std::io::ErrorKind::NotFound, "project not found"),
        ))
    }

    /// Find and load the enclosing project
    pub async fn load_project(&self) -> ConfigResult<Project> {
        let root = self.find_project_root()?;
        let metadata_path = root.join(METADATA_FILE);
        let metadata = ProjectMetadata::load(&metadata_path).await?;
        Ok(Project {
            manifest_path: root.join(MANIFEST_FILE),
            metadata_path,
            root,
            metadata,
        })
    }

    /// Path of the global registry file
    pub fn global_registries_path(&self) -> ConfigResult<Utf8PathBuf> {
        let home = match self.home {
            Some(ref home) => home.clone(),
            None => lode_home()?,
        };
        Ok(home.join(REGISTRIES_FILE))
    }

    /// Load the global registry file, if present
    pub async fn load_global_registries(&self) -> ConfigResult<Option<RegistriesFile>> {
        load_registries_file(&self.global_registries_path()?).await
    }

    /// Layer built-in, global, project and environment registry settings
    pub async fn registry_settings(
        &self,
        project: Option<&Project>,
        env_overrides: &HashMap<String, String>,
    ) -> ConfigResult<RegistrySettings> {
        let mut settings = RegistrySettings::new();
        if let Some(global) = self.load_global_registries().await? {
            settings.layer_global(&global);
        }
        if let Some(project) = project {
            settings.layer_project(project.metadata.registries());
        }
        settings.apply_env_overrides(env_overrides);
        Ok(settings)
    }

    /// Build the registry directory for a project
    pub async fn registry_directory(
        &self,
        project: Option<&Project>,
        env_overrides: &HashMap<String, String>,
    ) -> ConfigResult<RegistryDirectory> {
        self.registry_settings(project, env_overrides).await?.build()
    }
}

impl Settings {
    /// Read settings from collected `LODE_*` variables
    pub fn from_env(env_overrides: &HashMap<String, String>) -> ConfigResult<Self> {
        let timeout = env_overrides
            .get(TIMEOUT_VARIABLE)
            .map(|raw| {
                raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| {
                    LodeError::configuration(
                        TIMEOUT_VARIABLE,
                        format!("'{}' is not a whole number of seconds", raw),
                    )
                })
            })
            .transpose()?;
        Ok(Self { timeout })
    }
}
