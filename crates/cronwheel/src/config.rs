use std::time::Duration;

use crate::error::ConfigError;

/// How expired task bodies are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// Run bodies inline on the wheel's worker task. A long-running body
    /// delays every subsequent tick until it completes.
    Inline,
    /// Spawn each body onto the runtime, one task per firing, so the worker
    /// keeps ticking while bodies run.
    #[default]
    Spawned,
}

/// Constructor parameters for [`Scheduler`](crate::Scheduler) and
/// [`HashedWheelTimer`](crate::HashedWheelTimer).
///
/// Nothing here is read from the environment; embedders pass an explicit
/// config (or use [`Default`]).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Wheel resolution: how much logical time one tick covers.
    pub tick_duration: Duration,
    /// Number of buckets in the wheel ring. Rounded up to the next power of
    /// two at construction.
    pub wheel_size: usize,
    /// Where task bodies run when their timeout expires.
    pub dispatch: Dispatch,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(100),
            wheel_size: 512,
            dispatch: Dispatch::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_duration.is_zero() {
            return Err(ConfigError {
                reason: "tick_duration must be non-zero".into(),
            });
        }
        if self.wheel_size == 0 {
            return Err(ConfigError {
                reason: "wheel_size must be at least 1".into(),
            });
        }
        if self.wheel_size > 1 << 30 {
            return Err(ConfigError {
                reason: format!("wheel_size {} is too large (max 2^30)", self.wheel_size),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_duration, Duration::from_millis(100));
        assert_eq!(config.wheel_size, 512);
        assert_eq!(config.dispatch, Dispatch::Spawned);
    }

    #[test]
    fn zero_tick_duration_is_rejected() {
        let config = SchedulerConfig {
            tick_duration: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().err().unwrap();
        assert!(err.reason.contains("tick_duration"));
    }

    #[test]
    fn zero_wheel_size_is_rejected() {
        let config = SchedulerConfig {
            wheel_size: 0,
            ..Default::default()
        };
        let err = config.validate().err().unwrap();
        assert!(err.reason.contains("wheel_size"));
    }

    #[test]
    fn oversized_wheel_is_rejected() {
        let config = SchedulerConfig {
            wheel_size: (1 << 30) + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
