use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound for every timing field: one day.
pub const MAX_TIMER_SECS: u64 = 24 * 60 * 60;

/// Timing knobs for challenges and turns. Every field has a default, so an
/// empty TOML file is a valid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_challenge_timeout_secs")]
    pub challenge_timeout_secs: u64,
    #[serde(default = "default_symbol_timeout_secs")]
    pub symbol_timeout_secs: u64,
    #[serde(default = "default_turn_limit_secs")]
    pub turn_limit_secs: u64,
    #[serde(default = "default_countdown_delay_secs")]
    pub countdown_delay_secs: u64,
    #[serde(default = "default_countdown_ticks")]
    pub countdown_ticks: u32,
}

fn default_challenge_timeout_secs() -> u64 {
    300
}

fn default_symbol_timeout_secs() -> u64 {
    60
}

fn default_turn_limit_secs() -> u64 {
    20
}

fn default_countdown_delay_secs() -> u64 {
    12
}

fn default_countdown_ticks() -> u32 {
    7
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            challenge_timeout_secs: default_challenge_timeout_secs(),
            symbol_timeout_secs: default_symbol_timeout_secs(),
            turn_limit_secs: default_turn_limit_secs(),
            countdown_delay_secs: default_countdown_delay_secs(),
            countdown_ticks: default_countdown_ticks(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} must be between 1 and {max} seconds, got {value}")]
    OutOfRange { field: &'static str, value: u64, max: u64 },
    #[error("countdown ({delay}s + {ticks} ticks) must finish before the {limit}s turn limit")]
    CountdownTooLong { delay: u64, ticks: u32, limit: u64 },
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Every timer is bounded, and the countdown must end before the deadline
    /// fires, otherwise the last tick would race the forced move.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("challenge_timeout_secs", self.challenge_timeout_secs),
            ("symbol_timeout_secs", self.symbol_timeout_secs),
            ("turn_limit_secs", self.turn_limit_secs),
            ("countdown_delay_secs", self.countdown_delay_secs),
        ];
        for (field, value) in fields {
            if value == 0 || value > MAX_TIMER_SECS {
                return Err(ConfigError::OutOfRange { field, value, max: MAX_TIMER_SECS });
            }
        }
        if self.countdown_delay_secs + u64::from(self.countdown_ticks) >= self.turn_limit_secs {
            return Err(ConfigError::CountdownTooLong {
                delay: self.countdown_delay_secs,
                ticks: self.countdown_ticks,
                limit: self.turn_limit_secs,
            });
        }
        Ok(())
    }

    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_secs(self.challenge_timeout_secs)
    }

    pub fn symbol_timeout(&self) -> Duration {
        Duration::from_secs(self.symbol_timeout_secs)
    }

    pub fn turn_limit(&self) -> Duration {
        Duration::from_secs(self.turn_limit_secs)
    }

    pub fn countdown_delay(&self) -> Duration {
        Duration::from_secs(self.countdown_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::test_case;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.challenge_timeout(), Duration::from_secs(300));
        assert_eq!(config.symbol_timeout(), Duration::from_secs(60));
        assert_eq!(config.turn_limit(), Duration::from_secs(20));
        assert_eq!(config.countdown_delay(), Duration::from_secs(12));
        assert_eq!(config.countdown_ticks, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str("turn_limit_secs = 30\n").unwrap();
        assert_eq!(config.turn_limit_secs, 30);
        assert_eq!(config.challenge_timeout_secs, 300);
    }

    #[test]
    fn test_countdown_overlapping_deadline_rejected() {
        let result = EngineConfig::from_toml_str("turn_limit_secs = 15\n");
        assert!(matches!(result, Err(ConfigError::CountdownTooLong { .. })));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(EngineConfig::from_toml_str("turn_limit_secs = \"soon\""), Err(ConfigError::Parse(_))));
    }

    #[test_case("challenge_timeout_secs")]
    #[test_case("symbol_timeout_secs")]
    #[test_case("turn_limit_secs")]
    #[test_case("countdown_delay_secs")]
    fn huge_timer_rejected(field: &str) {
        let raw = format!("{} = 9223372036854775807\n", field);
        match EngineConfig::from_toml_str(&raw) {
            Err(ConfigError::OutOfRange { field: rejected, value, .. }) => {
                assert_eq!(rejected, field);
                assert_eq!(value, 9223372036854775807);
            }
            other => panic!("expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = EngineConfig::from_toml_str("challenge_timeout_secs = 0\n");
        assert!(matches!(result, Err(ConfigError::OutOfRange { field: "challenge_timeout_secs", .. })));
    }

    #[test]
    fn test_one_day_is_accepted() {
        let config = EngineConfig::from_toml_str("challenge_timeout_secs = 86400\nsymbol_timeout_secs = 86400\n").unwrap();
        assert_eq!(config.challenge_timeout(), Duration::from_secs(MAX_TIMER_SECS));
    }
}
