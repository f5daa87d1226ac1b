use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;

pub const DEFAULT_LOCK_TTL_SECS: u64 = 30 * 60;
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 2_000;
pub const MAX_LOCK_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const MAX_AUTOSAVE_DEBOUNCE_MS: u64 = 10 * 60 * 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Age after which a draft stops blocking other editors.
    pub lock_ttl_secs: u64,
    /// Quiet period before an editor session flushes its changes.
    pub autosave_debounce_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
            autosave_debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.lock_ttl_secs == 0 {
            return Err(EngineError::Config("lock_ttl_secs must be positive".into()));
        }
        if self.lock_ttl_secs > MAX_LOCK_TTL_SECS {
            return Err(EngineError::Config(format!(
                "lock_ttl_secs must be at most {MAX_LOCK_TTL_SECS}"
            )));
        }
        if self.autosave_debounce_ms > MAX_AUTOSAVE_DEBOUNCE_MS {
            return Err(EngineError::Config(format!(
                "autosave_debounce_ms must be at most {MAX_AUTOSAVE_DEBOUNCE_MS}"
            )));
        }
        Ok(())
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}
