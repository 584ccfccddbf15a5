//! WebDriver session setup.
//!
//! Attaches to an already running driver (chromedriver, geckodriver) through
//! `fantoccini` and hands back the session client.

use fantoccini::{Client, ClientBuilder};
use serde_json::{Map, Value, json};
use tracing::info;

use crate::error::WebDriverError;

const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Connection settings for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebDriverConfig {
    pub url: String,
    /// `chrome` or `firefox`.
    pub browser: String,
    pub headless: bool,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WEBDRIVER_URL.to_string(),
            browser: "chrome".to_string(),
            headless: false,
        }
    }
}

impl WebDriverConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("WEBDRIVER_URL").unwrap_or(defaults.url),
            browser: std::env::var("BROWSER")
                .map(|b| b.to_lowercase())
                .unwrap_or(defaults.browser),
            headless: std::env::var("HEADLESS")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.headless),
        }
    }

    /// `alwaysMatch` capabilities for the new session.
    pub fn capabilities(&self) -> Map<String, Value> {
        let mut caps = Map::new();
        caps.insert("browserName".into(), json!(self.browser));
        if self.headless {
            let (key, arg) = match self.browser.as_str() {
                "firefox" => ("moz:firefoxOptions", "-headless"),
                _ => ("goog:chromeOptions", "--headless=new"),
            };
            caps.insert(key.into(), json!({ "args": [arg] }));
        }
        caps
    }
}

/// Open a new browser session on the configured driver.
pub async fn connect(config: &WebDriverConfig) -> Result<Client, WebDriverError> {
    let mut builder = ClientBuilder::native();
    builder.capabilities(config.capabilities());
    let client = builder.connect(&config.url).await?;

    info!(
        url = %config.url,
        browser = %config.browser,
        headless = config.headless,
        "WebDriver session created"
    );
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_chrome_gets_new_headless_flag() {
        let config = WebDriverConfig {
            headless: true,
            ..WebDriverConfig::default()
        };
        let caps = config.capabilities();
        assert_eq!(caps["browserName"], "chrome");
        assert_eq!(caps["goog:chromeOptions"]["args"][0], "--headless=new");
    }

    #[test]
    fn headed_firefox_has_no_options() {
        let config = WebDriverConfig {
            browser: "firefox".into(),
            ..WebDriverConfig::default()
        };
        let caps = config.capabilities();
        assert_eq!(caps.len(), 1);
        assert_eq!(caps["browserName"], "firefox");
    }
}
