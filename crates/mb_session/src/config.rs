use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mb_crypto::keys::{DEFAULT_KEY_BITS, MIN_KEY_BITS};
use mb_proto::SYSTEM_SENDER;

use crate::error::ConfigError;

pub const DEFAULT_HUB_URL: &str = "wss://minber.com/realtime/chat";
pub const DEFAULT_MAX_PENDING_EVENTS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Local identity.
    pub user_id: String,
    pub hub_url: String,
    pub key_bits: usize,
    /// Inbound events held while no private key is bound.
    pub max_pending_events: usize,
    /// Where private keys are persisted; `None` keeps keys in memory only.
    pub key_store_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            hub_url: DEFAULT_HUB_URL.into(),
            key_bits: DEFAULT_KEY_BITS,
            max_pending_events: DEFAULT_MAX_PENDING_EVENTS,
            key_store_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), ..Self::default() }
    }

    /// Defaults overridden by `MB_HUB_URL`, `MB_KEY_BITS`,
    /// `MB_MAX_PENDING_EVENTS` and `MB_KEY_STORE_DIR`.
    pub fn from_env(user_id: impl Into<String>) -> Self {
        let mut config = Self::new(user_id);
        if let Ok(url) = std::env::var("MB_HUB_URL") {
            config.hub_url = url;
        }
        if let Some(bits) = env_parse("MB_KEY_BITS") {
            config.key_bits = bits;
        }
        if let Some(max) = env_parse("MB_MAX_PENDING_EVENTS") {
            config.max_pending_events = max;
        }
        if let Ok(dir) = std::env::var("MB_KEY_STORE_DIR") {
            config.key_store_dir = Some(PathBuf::from(dir));
        }
        config
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_id.is_empty() {
            return Err(ConfigError::Invalid("user_id must not be empty".into()));
        }
        if self.user_id == SYSTEM_SENDER {
            return Err(ConfigError::Invalid(format!("user_id {SYSTEM_SENDER:?} is reserved")));
        }
        if self.key_bits < MIN_KEY_BITS {
            return Err(ConfigError::Invalid(format!(
                "key_bits must be at least {MIN_KEY_BITS}, got {}",
                self.key_bits
            )));
        }
        if self.max_pending_events == 0 {
            return Err(ConfigError::Invalid("max_pending_events must be positive".into()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
