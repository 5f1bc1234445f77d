use std::path::{Path, PathBuf};

use anyhow::Context;

pub const API_KEY_PREFIX: &str = "AIza";
pub const API_KEY_MIN_LEN: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("API key cannot be empty")]
    Empty,

    #[error("Invalid API key format. Gemini API keys should start with \"AIza\"")]
    InvalidPrefix,

    #[error("API key appears too short (expected at least 30 characters)")]
    TooShort,
}

/// Checks the shape of a candidate key and returns it trimmed.
pub fn validate_api_key(candidate: &str) -> Result<String, CredentialError> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return Err(CredentialError::Empty);
    }
    if !trimmed.starts_with(API_KEY_PREFIX) {
        return Err(CredentialError::InvalidPrefix);
    }
    if trimmed.chars().count() < API_KEY_MIN_LEN {
        return Err(CredentialError::TooShort);
    }
    Ok(trimmed.to_string())
}

/// Where the composer looks for a user-supplied key before the process default.
pub trait CredentialSource: Send + Sync {
    fn stored_api_key(&self) -> Option<String>;
}

/// Custom key persisted as a single-line file in the data directory.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("api_key"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Invalid keys are rejected before anything touches disk.
    pub fn save(&self, candidate: &str) -> anyhow::Result<()> {
        let key = validate_api_key(candidate)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, format!("{key}\n"))
            .with_context(|| format!("failed to save API key to {}", self.path.display()))?;
        restrict_permissions(&self.path)?;
        Ok(())
    }

    /// Returns whether a stored key existed.
    pub fn clear(&self) -> anyhow::Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)
            .with_context(|| format!("failed to clear API key at {}", self.path.display()))?;
        Ok(true)
    }

    pub fn is_custom(&self) -> bool {
        self.load().is_some()
    }
}

impl CredentialSource for FileCredentialStore {
    fn stored_api_key(&self) -> Option<String> {
        self.load()
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

/// Masks all but the last four characters for display.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}
