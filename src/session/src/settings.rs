// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (C) 2025 Jonathan D.A. Jewell

//! Assistant settings: model, sampling temperature, system prompt and
//! provider credentials. Loaded from an optional JSON file; the CLI layers
//! environment and flag overrides on top.

use crate::SessionError;
use model_gateway::{DEFAULT_API_BASE, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Settings file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = ".bbiq/settings.json";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are BasketballIQ, an expert AI assistant specializing in basketball analytics, \
player tracking data, coaching strategies, and sports science. Provide detailed, accurate information with references to \
statistical metrics when relevant. Be friendly but professional, and format your responses in a clear, easy-to-read manner.
Enhance answers with examples from NBA, WNBA, NCAA, and international basketball when appropriate.

IMPORTANT: All your recommendations and responses MUST be strictly related to basketball. If a question is not about basketball, \
politely redirect the conversation back to basketball topics. When asked for recommendations, only provide basketball-related \
recommendations.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub api_base: String,
    /// Optional topic policy JSON replacing the built-in keywords and patterns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_policy: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            topic_policy: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let raw = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&raw)?;
        settings.validate()?;
        debug!(path = %path.display(), model = %settings.model, "loaded settings");
        Ok(settings)
    }

    /// Load `path` when given, else the default location if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, SessionError> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(SessionError::InvalidTemperature(self.temperature));
        }
        if self.model.trim().is_empty() {
            return Err(SessionError::InvalidSettings(
                "model name must not be empty".to_string(),
            ));
        }
        if self.system_prompt.trim().is_empty() {
            return Err(SessionError::EmptySystemPrompt);
        }
        Ok(())
    }

    /// Write default settings to `path`; refuses to overwrite unless `force`
    pub fn write_default(path: &Path, force: bool) -> Result<(), SessionError> {
        if path.exists() && !force {
            return Err(SessionError::InvalidSettings(format!(
                "{} already exists. Use --force to overwrite.",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(&Self::default())?)?;
        info!(path = %path.display(), "wrote default settings");
        Ok(())
    }

    /// Copy safe to print, with the API key masked
    pub fn redacted(&self) -> Self {
        Self {
            api_key: self.api_key.as_ref().map(|_| "********".to_string()),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.model, "gemini-1.5-flash");
        assert_eq!(settings.temperature, 0.7);
        assert!(settings.system_prompt.starts_with("You are BasketballIQ"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"temperature": 0.2, "api_key": "abc"}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.temperature, 0.2);
        assert_eq!(settings.api_key.as_deref(), Some("abc"));
        assert_eq!(settings.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_out_of_range_temperature_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"temperature": 1.5}"#).unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SessionError::InvalidTemperature(_))
        ));
    }

    #[test]
    fn test_write_default_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        Settings::write_default(&path, false).unwrap();
        assert!(Settings::write_default(&path, false).is_err());
        Settings::write_default(&path, true).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }

    #[test]
    fn test_redacted_hides_key() {
        let settings = Settings {
            api_key: Some("secret-key".to_string()),
            ..Settings::default()
        };
        let shown = serde_json::to_string(&settings.redacted()).unwrap();
        assert!(!shown.contains("secret-key"));
        assert!(shown.contains("********"));
    }
}
