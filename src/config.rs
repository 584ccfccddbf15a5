//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::conversation::DEFAULT_MESSAGE_CAP;
use crate::error::ConfigError;
use crate::platform::PlatformConfig;

/// Upper bound on each externally-supplied step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTimeouts {
    pub poll: Duration,
    pub read: Duration,
    pub generate: Duration,
    pub send: Duration,
}

impl StepTimeouts {
    /// Use the same bound for every step.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            poll: timeout,
            read: timeout,
            generate: timeout,
            send: timeout,
        }
    }
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(30),
            read: Duration::from_secs(30),
            generate: Duration::from_secs(30),
            send: Duration::from_secs(30),
        }
    }
}

/// Control loop configuration.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Sleep between polls when no conversation is waiting.
    pub poll_interval: Duration,
    /// Most-recent messages kept per conversation.
    pub message_cap: usize,
    /// Attempts per UI step before a transient fault becomes structural.
    pub max_attempts: u32,
    /// Delay after each processed conversation.
    pub pacing_delay: Duration,
    /// How long authentication may block on a manual login.
    pub manual_login_wait: Duration,
    pub timeouts: StepTimeouts,
    /// Directory holding `<platform>.json` selector caches.
    pub cache_dir: PathBuf,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            message_cap: DEFAULT_MESSAGE_CAP,
            max_attempts: 3,
            pacing_delay: Duration::from_secs(2),
            manual_login_wait: Duration::from_secs(60),
            timeouts: StepTimeouts::default(),
            cache_dir: PathBuf::from("./cache"),
        }
    }
}

impl OperatorConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let poll_interval = env_parse::<u64>("OPERATOR_POLL_INTERVAL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let message_cap =
            env_parse::<usize>("OPERATOR_MESSAGE_CAP").unwrap_or(defaults.message_cap);

        let max_attempts =
            env_parse::<u32>("OPERATOR_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts);

        let pacing_delay = env_parse::<u64>("OPERATOR_PACING_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.pacing_delay);

        let manual_login_wait = env_parse::<u64>("OPERATOR_MANUAL_WAIT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.manual_login_wait);

        let timeouts = env_parse::<u64>("OPERATOR_STEP_TIMEOUT_SECS")
            .map(|secs| StepTimeouts::uniform(Duration::from_secs(secs)))
            .unwrap_or(defaults.timeouts);

        let cache_dir = std::env::var("OPERATOR_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        Self {
            poll_interval,
            message_cap,
            max_attempts,
            pacing_delay,
            manual_login_wait,
            timeouts,
            cache_dir,
        }
    }

    /// Take the poll interval and message cap from the platform cache when it sets them.
    pub fn apply_platform(mut self, platform: &PlatformConfig) -> Self {
        if let Some(secs) = platform.poll_interval_secs {
            self.poll_interval = Duration::from_secs(secs);
        }
        if let Some(cap) = platform.message_cap {
            self.message_cap = cap;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.message_cap == 0 {
            return Err(ConfigError::InvalidValue {
                key: "message_cap".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_attempts".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "poll_interval".into(),
                message: "must be non-zero".into(),
            });
        }
        let t = &self.timeouts;
        for (key, value) in [
            ("poll_timeout", t.poll),
            ("read_timeout", t.read),
            ("generate_timeout", t.generate),
            ("send_timeout", t.send),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: "must be non-zero".into(),
                });
            }
        }
        Ok(())
    }

    /// Check that read and send can outlast the platform's element waits.
    ///
    /// Both steps wait up to `element_visible` for a selector before acting,
    /// so a step timeout at or below it turns every slow page into a
    /// transient timeout instead of a real element lookup.
    pub fn check_platform_waits(&self, platform: &PlatformConfig) -> Result<(), ConfigError> {
        let needed = platform.wait_timeouts.element_visible() + STEP_WAIT_MARGIN;
        for (key, value) in [
            ("read_timeout", self.timeouts.read),
            ("send_timeout", self.timeouts.send),
        ] {
            if value < needed {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: format!(
                        "{value:?} is too short for '{}' (element_visible {}s, need at least {needed:?}); raise OPERATOR_STEP_TIMEOUT_SECS",
                        platform.platform_name, platform.wait_timeouts.element_visible,
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Headroom a step timeout needs on top of one element wait.
const STEP_WAIT_MARGIN: Duration = Duration::from_secs(1);

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
