//! Realtime connection configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Concurrent realtime connections allowed per client address
    #[serde(default = "default_max_connections_per_address")]
    pub max_connections_per_address: usize,

    /// How often closed connections are swept from admission tracking
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Outbound messages queued per connection before drops
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
}

impl RealtimeConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_connections_per_address == 0 {
            return Err(ValidationError::InvalidConnectionLimit);
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        if self.send_buffer == 0 {
            return Err(ValidationError::InvalidSendBuffer);
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_connections_per_address: default_max_connections_per_address(),
            sweep_interval_secs: default_sweep_interval_secs(),
            send_buffer: default_send_buffer(),
        }
    }
}

fn default_max_connections_per_address() -> usize {
    5
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_send_buffer() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_defaults() {
        let config = RealtimeConfig::default();
        assert_eq!(config.max_connections_per_address, 5);
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_fail() {
        let no_connections = RealtimeConfig {
            max_connections_per_address: 0,
            ..Default::default()
        };
        assert_eq!(
            no_connections.validate(),
            Err(ValidationError::InvalidConnectionLimit)
        );

        let no_sweep = RealtimeConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(no_sweep.validate(), Err(ValidationError::InvalidSweepInterval));
    }
}
