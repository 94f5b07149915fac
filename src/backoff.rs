use std::cmp::min;
use std::time::Duration;
use crate::config::BackoffConfig;

/// Delay between polls of an idle stream: starts at the configured initial delay and grows by a
///  constant factor (in eighths, to stay in integer arithmetic) up to a maximum. Any progress on
///  the stream resets it.
pub struct ExponentialBackoff {
    current: Duration,

    config_initial_delay: Duration,
    config_max_delay: Duration,
    config_factor_eighths: u32,
}

impl ExponentialBackoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let result = ExponentialBackoff {
            current: config.initial_delay,
            config_initial_delay: config.initial_delay,
            config_max_delay: config.max_delay,
            config_factor_eighths: config.growth_factor_eighths,
        };

        assert!(result.config_factor_eighths >= 8);

        result
    }

    /// the delay to wait now - subsequent calls return growing delays until [Self::reset] is called
    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        let result = self.current;

        self.current = self.current.saturating_mul(self.config_factor_eighths) / 8;
        self.current = min(self.current, self.config_max_delay);
        result
    }

    pub fn reset(&mut self) {
        self.current = self.config_initial_delay;
    }
}
