//! Platform selector cache: the read-only configuration produced by the
//! offline analyzer and consumed by the browser-facing collaborators.
//!
//! The control loop never looks inside the selector table. It only reads the
//! optional `poll_interval_secs` and `message_cap` overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;

/// CSS selectors for the chat UI elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selectors {
    pub input_field: String,
    pub send_button: String,
    pub message_bubble_user: String,
    #[serde(default)]
    pub message_bubble_bot: Option<String>,
    pub conversation_list: String,
    pub unread_indicator: String,
}

impl Selectors {
    fn required(&self) -> [(&'static str, &str); 5] {
        [
            ("input_field", &self.input_field),
            ("send_button", &self.send_button),
            ("message_bubble_user", &self.message_bubble_user),
            ("conversation_list", &self.conversation_list),
            ("unread_indicator", &self.unread_indicator),
        ]
    }

    /// All selectors as `(name, value)` pairs, optional ones included.
    pub fn entries(&self) -> Vec<(&'static str, Option<&str>)> {
        let mut entries: Vec<_> = self
            .required()
            .into_iter()
            .map(|(name, value)| (name, Some(value)))
            .collect();
        entries.push(("message_bubble_bot", self.message_bubble_bot.as_deref()));
        entries
    }
}

/// Wait bounds in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitTimeouts {
    pub page_load: u64,
    pub element_visible: u64,
    pub message_send: u64,
}

impl Default for WaitTimeouts {
    fn default() -> Self {
        Self {
            page_load: 30,
            element_visible: 10,
            message_send: 5,
        }
    }
}

impl WaitTimeouts {
    pub fn page_load(&self) -> Duration {
        Duration::from_secs(self.page_load)
    }

    pub fn element_visible(&self) -> Duration {
        Duration::from_secs(self.element_visible)
    }

    pub fn message_send(&self) -> Duration {
        Duration::from_secs(self.message_send)
    }
}

/// Cached configuration for one chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub platform_name: String,
    pub url: String,
    #[serde(default)]
    pub last_updated: Option<String>,
    pub selectors: Selectors,
    #[serde(default)]
    pub wait_timeouts: WaitTimeouts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_cap: Option<usize>,
}

impl PlatformConfig {
    /// Check value ranges and required fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidPlatformConfig {
            platform: self.platform_name.clone(),
            reason,
        };

        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(invalid(format!("url '{}' is not an http(s) URL", self.url)));
        }

        for (name, value) in self.selectors.required() {
            if value.trim().is_empty() {
                return Err(invalid(format!("selector '{name}' is empty")));
            }
        }

        let t = &self.wait_timeouts;
        check_range("page_load", t.page_load, 5, 120).map_err(invalid)?;
        check_range("element_visible", t.element_visible, 2, 60).map_err(invalid)?;
        check_range("message_send", t.message_send, 1, 30).map_err(invalid)?;

        if self.message_cap == Some(0) {
            return Err(invalid("message_cap must be at least 1".into()));
        }
        if self.poll_interval_secs == Some(0) {
            return Err(invalid("poll_interval_secs must be non-zero".into()));
        }

        Ok(())
    }
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<(), String> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "wait_timeouts.{name} = {value}s is outside {min}..={max}s"
        ))
    }
}

/// Cache file name for a platform: lowercased, spaces and dashes become underscores.
pub fn cache_file_name(platform_name: &str) -> String {
    let stem: String = platform_name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect();
    format!("{stem}.json")
}

/// Path of the cache file for a platform inside `cache_dir`.
pub fn cache_path(platform_name: &str, cache_dir: &Path) -> PathBuf {
    cache_dir.join(cache_file_name(platform_name))
}

/// Load and validate the cached configuration for `platform_name`.
pub fn load_platform_config(
    platform_name: &str,
    cache_dir: &Path,
) -> Result<PlatformConfig, ConfigError> {
    let path = cache_path(platform_name, cache_dir);
    if !path.exists() {
        return Err(ConfigError::PlatformNotConfigured {
            platform: platform_name.to_string(),
            path,
        });
    }
    load_platform_file(&path)
}

/// Load and validate a platform configuration from an explicit file.
pub fn load_platform_file(path: &Path) -> Result<PlatformConfig, ConfigError> {
    debug!(path = %path.display(), "Loading platform configuration");
    let raw = std::fs::read_to_string(path)?;
    let config: PlatformConfig = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
    config.validate()?;
    info!(platform = %config.platform_name, "Platform configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "platform_name": "WhatsApp Web",
        "url": "https://web.whatsapp.com",
        "last_updated": "2025-01-10T12:00:00",
        "selectors": {
            "input_field": "div[contenteditable='true']",
            "send_button": "button[aria-label='Send']",
            "message_bubble_user": "div.message-in",
            "message_bubble_bot": "div.message-out",
            "conversation_list": "div[role='listitem']",
            "unread_indicator": "span[aria-label*='unread']"
        },
        "archive_selectors": null
    }"#;

    #[test]
    fn cache_file_name_normalises() {
        assert_eq!(cache_file_name("WhatsApp Web"), "whatsapp_web.json");
        assert_eq!(cache_file_name("Some-Chat App"), "some_chat_app.json");
    }

    #[test]
    fn parses_sample_with_default_timeouts() {
        let config: PlatformConfig = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(config.platform_name, "WhatsApp Web");
        assert_eq!(config.wait_timeouts, WaitTimeouts::default());
        assert_eq!(config.poll_interval_secs, None);
        assert!(config.validate().is_ok());
        assert_eq!(config.selectors.entries().len(), 6);
    }

    #[test]
    fn rejects_out_of_range_timeouts() {
        let mut config: PlatformConfig = serde_json::from_str(SAMPLE).unwrap();
        config.wait_timeouts.element_visible = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("element_visible"));
    }

    #[test]
    fn rejects_empty_selector() {
        let mut config: PlatformConfig = serde_json::from_str(SAMPLE).unwrap();
        config.selectors.send_button = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("whatsapp_web.json"), SAMPLE).unwrap();

        let config = load_platform_config("WhatsApp Web", dir.path()).unwrap();
        assert_eq!(config.url, "https://web.whatsapp.com");
    }

    #[test]
    fn missing_cache_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_platform_config("Nowhere", dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::PlatformNotConfigured { .. }));
    }

    #[test]
    fn malformed_cache_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let err = load_platform_config("Broken", dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
