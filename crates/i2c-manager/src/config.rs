use embassy_time::Duration;

/// SMBus T_TIMEOUT upper bound.
const SMBUS_TIMEOUT_MS: u64 = 35;

/// Timing knobs of the transaction manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// How long a caller waits for its completion before giving up.
    pub completion_timeout: Duration,
    /// Pause after a failed or timed-out transaction so the bus can settle.
    pub recovery_delay: Duration,
}

impl Config {
    /// Both timings at the SMBus T_TIMEOUT bound.
    pub const fn new() -> Self {
        Self {
            completion_timeout: Duration::from_millis(SMBUS_TIMEOUT_MS),
            recovery_delay: Duration::from_millis(SMBUS_TIMEOUT_MS),
        }
    }

    #[must_use]
    pub const fn completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn recovery_delay(mut self, delay: Duration) -> Self {
        self.recovery_delay = delay;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
