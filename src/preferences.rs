//! Operator preferences storage
//!
//! Handles saving and loading operator preferences to a JSON file
//! in the application config directory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{error, info};

/// Folder name used under the platform config and documents directories
pub(crate) const APP_DIR_NAME: &str = "InspectionStation";

/// Shown in reports when a field was never set
pub(crate) const UNSET_FIELD: &str = "N/A";

/// Operator preferences
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Preferences {
    /// Inspector name printed on reports
    pub inspector_name: Option<String>,
    /// Model name printed on reports
    pub model_name: Option<String>,
    /// Where finished reports are mailed (None = no email)
    pub recipient_email: Option<String>,
    /// Custom capture storage location (None = use default)
    pub storage_location: Option<PathBuf>,
    /// Profile to use instead of the configured `active_profile`
    pub profile: Option<String>,
}

/// A preference that can be changed from the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreferenceKey {
    Inspector,
    Model,
    Email,
    Storage,
    Profile,
}

impl FromStr for PreferenceKey {
    type Err = PreferencesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inspector" => Ok(PreferenceKey::Inspector),
            "model" => Ok(PreferenceKey::Model),
            "email" | "recipient" => Ok(PreferenceKey::Email),
            "storage" => Ok(PreferenceKey::Storage),
            "profile" => Ok(PreferenceKey::Profile),
            other => Err(PreferencesError::UnknownKey(other.to_string())),
        }
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreferenceKey::Inspector => write!(f, "inspector"),
            PreferenceKey::Model => write!(f, "model"),
            PreferenceKey::Email => write!(f, "email"),
            PreferenceKey::Storage => write!(f, "storage"),
            PreferenceKey::Profile => write!(f, "profile"),
        }
    }
}

impl Preferences {
    /// Set or clear (`None` / empty value) one preference
    pub fn apply(&mut self, key: PreferenceKey, value: Option<&str>) {
        let value = value.map(str::trim).filter(|v| !v.is_empty());
        match key {
            PreferenceKey::Inspector => self.inspector_name = value.map(str::to_string),
            PreferenceKey::Model => self.model_name = value.map(str::to_string),
            PreferenceKey::Email => self.recipient_email = value.map(str::to_string),
            PreferenceKey::Storage => self.storage_location = value.map(PathBuf::from),
            PreferenceKey::Profile => self.profile = value.map(str::to_string),
        }
    }

    pub fn inspector_or_default(&self) -> String {
        self.inspector_name
            .clone()
            .unwrap_or_else(|| UNSET_FIELD.to_string())
    }

    pub fn model_or_default(&self) -> String {
        self.model_name
            .clone()
            .unwrap_or_else(|| UNSET_FIELD.to_string())
    }
}

/// Application config directory (`<config_dir>/InspectionStation`)
pub(crate) fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Get the preferences file path
fn preferences_path() -> Option<PathBuf> {
    app_config_dir().map(|d| d.join("preferences.json"))
}

/// Load preferences from disk
///
/// Returns default preferences if the file doesn't exist or can't be read
pub(crate) fn load_preferences() -> Preferences {
    match preferences_path() {
        Some(path) => load_from(&path),
        None => Preferences::default(),
    }
}

fn load_from(path: &Path) -> Preferences {
    if !path.exists() {
        return Preferences::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(prefs) => prefs,
            Err(e) => {
                error!("Failed to parse preferences: {}", e);
                Preferences::default()
            }
        },
        Err(e) => {
            error!("Failed to read preferences file: {}", e);
            Preferences::default()
        }
    }
}

/// Save preferences to disk
pub(crate) fn save_preferences(prefs: &Preferences) -> Result<(), PreferencesError> {
    let path = preferences_path().ok_or(PreferencesError::NoConfigDir)?;
    save_to(&path, prefs)
}

fn save_to(path: &Path, prefs: &Preferences) -> Result<(), PreferencesError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            info!("Created preferences directory: {:?}", parent);
        }
    }

    let json = serde_json::to_string_pretty(prefs)?;
    fs::write(path, json)?;
    info!("Saved preferences to: {:?}", path);

    Ok(())
}

/// Change one preference and persist the result
pub(crate) fn update_preference(
    key: PreferenceKey,
    value: Option<&str>,
) -> Result<Preferences, PreferencesError> {
    let mut prefs = load_preferences();
    prefs.apply(key, value);
    save_preferences(&prefs)?;
    Ok(prefs)
}

/// Get the custom storage location, if set
pub(crate) fn get_storage_location() -> Option<PathBuf> {
    load_preferences().storage_location
}

/// Get the default capture location in Documents
pub(crate) fn default_storage_location() -> Option<PathBuf> {
    dirs::document_dir().map(|d| d.join(APP_DIR_NAME).join("captures"))
}

/// Preferences errors
#[derive(Debug, thiserror::Error)]
pub(crate) enum PreferencesError {
    #[error("Could not find config directory")]
    NoConfigDir,

    #[error("Unknown preference '{0}' (expected inspector, model, email, storage or profile)")]
    UnknownKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
