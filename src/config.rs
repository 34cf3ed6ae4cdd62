use std::{fmt, num::NonZeroUsize, str::FromStr, thread};

use crate::error::ConfigError;

/// Factor applied to the parallelism to get the ceiling in
/// [`CeilingMode::Soft`].
pub const SOFT_CEILING_MULTIPLIER: usize = 4;

/// Problem sizes at or below this are computed serially instead of forked.
pub const SERIAL_CUTOFF: u32 = 10;

/// How the admission ceiling is derived from the parallelism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CeilingMode {
    /// The ceiling is exactly the parallelism.
    Hard,
    /// The ceiling is the parallelism times [`SOFT_CEILING_MULTIPLIER`].
    #[default]
    Soft,
}

impl FromStr for CeilingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hard" | "limit" => Ok(CeilingMode::Hard),
            "soft" => Ok(CeilingMode::Soft),
            _ => Err(ConfigError::UnknownCeilingMode(s.to_owned())),
        }
    }
}

impl fmt::Display for CeilingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CeilingMode::Hard => write!(f, "hard"),
            CeilingMode::Soft => write!(f, "soft"),
        }
    }
}

/// How the governor decides whether a new execution context fits under the
/// ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Load the active count, compare, then increment. The check and the
    /// increment are separate operations, so racing submitters may briefly
    /// push the count past the ceiling.
    #[default]
    Approximate,
    /// Compare-and-swap the increment, so the ceiling is never exceeded.
    Strict,
}

/// Scheduler configuration.
///
/// ```
/// # use std::num::NonZeroUsize;
/// # use fanout::config::{CeilingMode, Config};
/// let config = Config::new(NonZeroUsize::new(4).unwrap()).with_ceiling_mode(CeilingMode::Hard);
/// assert_eq!(config.ceiling(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    parallelism: NonZeroUsize,
    ceiling_mode: CeilingMode,
    admission: AdmissionPolicy,
    serial_cutoff: u32,
}

impl Config {
    /// Creates a configuration with `parallelism` worker threads and the
    /// default mode, policy and cutoff.
    pub fn new(parallelism: NonZeroUsize) -> Config {
        Config {
            parallelism,
            ceiling_mode: CeilingMode::default(),
            admission: AdmissionPolicy::default(),
            serial_cutoff: SERIAL_CUTOFF,
        }
    }

    pub fn with_ceiling_mode(mut self, ceiling_mode: CeilingMode) -> Config {
        self.ceiling_mode = ceiling_mode;
        self
    }

    pub fn with_admission(mut self, admission: AdmissionPolicy) -> Config {
        self.admission = admission;
        self
    }

    /// Sets the base-case threshold. Values below one are raised to one, so
    /// a forked node always has `n >= 2`.
    pub fn with_serial_cutoff(mut self, serial_cutoff: u32) -> Config {
        self.serial_cutoff = serial_cutoff.max(1);
        self
    }

    pub fn parallelism(&self) -> NonZeroUsize {
        self.parallelism
    }

    pub fn ceiling_mode(&self) -> CeilingMode {
        self.ceiling_mode
    }

    pub fn admission(&self) -> AdmissionPolicy {
        self.admission
    }

    pub fn serial_cutoff(&self) -> u32 {
        self.serial_cutoff
    }

    /// The maximum number of concurrently active execution contexts.
    pub fn ceiling(&self) -> usize {
        match self.ceiling_mode {
            CeilingMode::Hard => self.parallelism.get(),
            CeilingMode::Soft => self.parallelism.get().saturating_mul(SOFT_CEILING_MULTIPLIER),
        }
    }
}

impl Default for Config {
    /// Uses the parallelism detected on the host, or one thread when it
    /// cannot be detected.
    fn default() -> Self {
        let parallelism = thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Config::new(parallelism)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threads(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn ceiling_follows_mode() {
        let config = Config::new(threads(6));
        assert_eq!(config.ceiling_mode(), CeilingMode::Soft);
        assert_eq!(config.ceiling(), 6 * SOFT_CEILING_MULTIPLIER);
        assert_eq!(config.with_ceiling_mode(CeilingMode::Hard).ceiling(), 6);
    }

    #[test]
    fn serial_cutoff_is_at_least_one() {
        let config = Config::new(threads(1)).with_serial_cutoff(0);
        assert_eq!(config.serial_cutoff(), 1);
        assert_eq!(Config::new(threads(1)).serial_cutoff(), SERIAL_CUTOFF);
    }

    #[test]
    fn ceiling_mode_parses() {
        assert_eq!("hard".parse(), Ok(CeilingMode::Hard));
        assert_eq!(" Limit ".parse(), Ok(CeilingMode::Hard));
        assert_eq!("soft".parse(), Ok(CeilingMode::Soft));
        assert_eq!(
            "fast".parse::<CeilingMode>(),
            Err(ConfigError::UnknownCeilingMode("fast".to_owned()))
        );
    }
}
