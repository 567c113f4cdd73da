use std::path::{Path, PathBuf};
use chrono::Utc;
use tracing::{debug, info};

use super::{builtin_profile, builtin_profile_names, CompressionProfile};
use crate::error::{Result, CompressifyError};

const MAX_PROFILE_NAME_LEN: usize = 50;

/// Built-in profiles plus user profiles stored as JSON files
pub struct ProfileManager {
    profiles_dir: PathBuf,
}

impl ProfileManager {
    pub fn new<P: AsRef<Path>>(profiles_dir: P) -> Self {
        Self {
            profiles_dir: profiles_dir.as_ref().to_path_buf(),
        }
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(format!("{}.json", name))
    }

    /// Load a built-in or custom profile by name
    pub fn load_profile(&self, name: &str) -> Result<CompressionProfile> {
        if let Some(profile) = builtin_profile(name) {
            return Ok(profile);
        }

        let path = self.profile_path(name);
        if !path.exists() {
            return Err(CompressifyError::Profile(format!(
                "Profile '{}' not found (built-in: {})",
                name,
                builtin_profile_names().join(", ")
            )));
        }

        let content = std::fs::read_to_string(&path)?;
        let profile: CompressionProfile = serde_json::from_str(&content).map_err(|e| {
            CompressifyError::Profile(format!("Failed to parse profile {}: {}", path.display(), e))
        })?;
        debug!("Loaded custom profile '{}' from {}", name, path.display());
        Ok(profile)
    }

    pub fn save_profile(&self, profile: &CompressionProfile) -> Result<PathBuf> {
        validate_profile_name(&profile.name)?;
        // Catch bad encoder values before they reach a job
        profile.resolve()?;

        std::fs::create_dir_all(&self.profiles_dir)?;
        let mut profile = profile.clone();
        profile.created_at.get_or_insert_with(Utc::now);

        let path = self.profile_path(&profile.name);
        std::fs::write(&path, serde_json::to_string_pretty(&profile)?)?;
        info!("Saved profile '{}' to {}", profile.name, path.display());
        Ok(path)
    }

    pub fn delete_profile(&self, name: &str) -> Result<()> {
        if builtin_profile(name).is_some() {
            return Err(CompressifyError::Profile(format!(
                "Cannot delete built-in profile '{}'",
                name
            )));
        }
        let path = self.profile_path(name);
        if !path.exists() {
            return Err(CompressifyError::Profile(format!("Profile '{}' not found", name)));
        }
        std::fs::remove_file(&path)?;
        info!("Deleted profile '{}'", name);
        Ok(())
    }

    pub fn list_custom_profiles(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if !self.profiles_dir.is_dir() {
            return Ok(names);
        }
        for entry in std::fs::read_dir(&self.profiles_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Import a profile from a JSON or TOML file, optionally renaming it
    pub fn import_profile<P: AsRef<Path>>(&self, path: P, new_name: Option<&str>) -> Result<String> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_toml = path.extension().is_some_and(|ext| ext == "toml");

        let mut profile: CompressionProfile = if is_toml {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        if let Some(name) = new_name {
            profile.name = name.to_string();
        }
        profile.created_at = None;

        self.save_profile(&profile)?;
        Ok(profile.name)
    }
}

pub fn validate_profile_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CompressifyError::Profile("Profile name cannot be empty".to_string()));
    }
    if name.len() > MAX_PROFILE_NAME_LEN {
        return Err(CompressifyError::Profile(format!(
            "Profile name too long (max {} characters)",
            MAX_PROFILE_NAME_LEN
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(CompressifyError::Profile(
            "Profile name can only contain letters, numbers, hyphens, and underscores".to_string(),
        ));
    }
    if builtin_profile(name).is_some() {
        return Err(CompressifyError::Profile(format!(
            "Profile name '{}' is reserved for a built-in profile",
            name
        )));
    }
    Ok(())
}
