//! In-place version stamping of the package manifest.
//!
//! The checked-in manifest carries a placeholder version; right before
//! publishing it is replaced textually so formatting, comments and key order
//! survive byte for byte.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Version;
use crate::error::{ReleaseError, Result};

/// A manifest file held in memory until written back
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    text: String,
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = fs::read_to_string(&path).map_err(|e| {
            ReleaseError::manifest(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Ok(Manifest { path, text })
    }

    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Manifest {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace every occurrence of `placeholder` with `version`.
    ///
    /// Fails when the placeholder is missing or the result does not declare
    /// `version` as its package version.
    pub fn stamp(&mut self, placeholder: &str, version: &Version) -> Result<usize> {
        let occurrences = self.text.matches(placeholder).count();
        if occurrences == 0 {
            return Err(ReleaseError::manifest(format!(
                "Placeholder '{}' not found in {}",
                placeholder,
                self.path.display()
            )));
        }

        let stamped = self.text.replace(placeholder, &version.to_string());
        let declared = declared_version(&stamped)?;
        if declared.as_deref() != Some(version.to_string().as_str()) {
            return Err(ReleaseError::manifest(format!(
                "{} declares version {:?} after stamping, expected {}",
                self.path.display(),
                declared,
                version
            )));
        }

        self.text = stamped;
        Ok(occurrences)
    }

    pub fn write(&self) -> Result<()> {
        fs::write(&self.path, &self.text)?;
        Ok(())
    }
}

/// `package.version`, falling back to `workspace.package.version`.
fn declared_version(text: &str) -> Result<Option<String>> {
    let doc: toml::Table = toml::from_str(text)
        .map_err(|e| ReleaseError::manifest(format!("Stamped manifest is not valid TOML: {}", e)))?;

    let package_version = doc
        .get("package")
        .and_then(|p| p.get("version"))
        .and_then(|v| v.as_str());
    let workspace_version = doc
        .get("workspace")
        .and_then(|w| w.get("package"))
        .and_then(|p| p.get("version"))
        .and_then(|v| v.as_str());

    Ok(package_version.or(workspace_version).map(|v| v.to_string()))
}
