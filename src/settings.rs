use std::collections::HashMap;

use thiserror::Error;

pub const CAMERA_LIVE_VIEWPORT_KEY: &str = "camera_live_viewport";

const ENV_PREFIX: &str = "SWING_VISION_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("setting `{key}` is not a boolean: {value:?}")]
    InvalidBool { key: String, value: String },
}

/// Persisted key-value preferences.
pub trait PreferenceStore {
    /// `Ok(None)` when the key is unset.
    fn get_bool(&self, key: &str) -> Result<Option<bool>, SettingsError>;
}

/// Whether the camera preview is drawn under the overlay. Unset or unreadable
/// values count as enabled.
pub fn is_camera_live_viewport_enabled(store: &dyn PreferenceStore) -> bool {
    match store.get_bool(CAMERA_LIVE_VIEWPORT_KEY) {
        Ok(value) => value.unwrap_or(true),
        Err(err) => {
            log::warn!("{err}, using default");
            true
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryPreferences {
    values: HashMap<String, bool>,
}

impl MemoryPreferences {
    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), value);
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get_bool(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        Ok(self.values.get(key).copied())
    }
}

/// Reads preferences from `SWING_VISION_<KEY>` environment variables.
pub struct EnvPreferences {
    lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl EnvPreferences {
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }

    pub fn env_name(key: &str) -> String {
        format!("{ENV_PREFIX}{}", key.to_ascii_uppercase())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        (self.lookup)(&Self::env_name(key))
    }
}

impl Default for EnvPreferences {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferenceStore for EnvPreferences {
    fn get_bool(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        let Some(raw) = self.get_string(key) else {
            return Ok(None);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(SettingsError::InvalidBool {
                key: key.to_string(),
                value: raw,
            }),
        }
    }
}
