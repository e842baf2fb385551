//! # Process-wide tunable configuration
//!
//! The frequency range and hybrid-dispatcher thresholds are read far more
//! often than they are written (once per detection call vs. whenever a
//! caller reacts to a settings change), so they live behind a `RwLock`
//! rather than being threaded through every function signature. Detectors
//! never hold the lock across their own computation: they clone a plain
//! value snapshot up front and work from that, so a concurrent setter call
//! can never be observed mid-detection.

use once_cell::sync::Lazy;
use std::sync::RwLock;
use thiserror::Error;

/// A lower/upper bound on fundamental frequencies a detector will consider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRange {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl FrequencyRange {
    pub const DEFAULT_MIN_HZ: f64 = 80.0;
    pub const DEFAULT_MAX_HZ: f64 = 4835.0;

    pub const fn default_range() -> Self {
        Self {
            min_hz: Self::DEFAULT_MIN_HZ,
            max_hz: Self::DEFAULT_MAX_HZ,
        }
    }
}

impl Default for FrequencyRange {
    fn default() -> Self {
        Self::default_range()
    }
}

/// Runtime-tunable thresholds used by the Goertzel-energy hybrid dispatcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridThresholds {
    pub low_freq_hz: f64,
    pub high_freq_hz: f64,
    pub low_energy: f64,
    pub high_energy: f64,
}

impl HybridThresholds {
    pub const fn default_thresholds() -> Self {
        Self {
            low_freq_hz: 275.0,
            high_freq_hz: 900.0,
            low_energy: 750.0,
            high_energy: 400.0,
        }
    }
}

impl Default for HybridThresholds {
    fn default() -> Self {
        Self::default_thresholds()
    }
}

/// Errors raised when a caller tries to push an invalid configuration.
/// Per spec, these never affect the hot detection path — they're only
/// returned from the setters below.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("frequency range must satisfy 0 < min_hz < max_hz, got min={min_hz}, max={max_hz}")]
    InvalidFrequencyRange { min_hz: f64, max_hz: f64 },

    #[error("hybrid thresholds must be finite and positive (low_freq_hz={low_freq_hz}, high_freq_hz={high_freq_hz}, low_energy={low_energy}, high_energy={high_energy})")]
    InvalidHybridThresholds {
        low_freq_hz: f64,
        high_freq_hz: f64,
        low_energy: f64,
        high_energy: f64,
    },
}

static FREQUENCY_RANGE: Lazy<RwLock<FrequencyRange>> =
    Lazy::new(|| RwLock::new(FrequencyRange::default_range()));

static HYBRID_THRESHOLDS: Lazy<RwLock<HybridThresholds>> =
    Lazy::new(|| RwLock::new(HybridThresholds::default_thresholds()));

/// Returns a copy of the currently configured frequency range.
///
/// # Returns
/// * `FrequencyRange` - the process-wide range snapshot at the time of the call
pub fn frequency_range() -> FrequencyRange {
    *FREQUENCY_RANGE
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Overrides the process-wide frequency range. Rejects non-finite or
/// inverted bounds rather than leaving the lock in a broken state.
///
/// # Arguments
/// * `min_hz` - new lower bound in Hz
/// * `max_hz` - new upper bound in Hz
///
/// # Returns
/// * `Ok(())` - the range was accepted and is now active
/// * `Err(ConfigError::InvalidFrequencyRange)` - `min_hz`/`max_hz` are non-finite or not `0 < min_hz < max_hz`
pub fn set_frequency_range(min_hz: f64, max_hz: f64) -> Result<(), ConfigError> {
    if !(min_hz.is_finite() && max_hz.is_finite()) || !(0.0 < min_hz && min_hz < max_hz) {
        return Err(ConfigError::InvalidFrequencyRange { min_hz, max_hz });
    }
    let mut guard = FREQUENCY_RANGE
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = FrequencyRange { min_hz, max_hz };
    log::debug!("frequency range set to [{min_hz}, {max_hz}] Hz");
    Ok(())
}

/// Returns a copy of the currently configured hybrid thresholds.
///
/// # Returns
/// * `HybridThresholds` - the process-wide thresholds snapshot at the time of the call
pub fn hybrid_thresholds() -> HybridThresholds {
    *HYBRID_THRESHOLDS
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Overrides the process-wide hybrid dispatcher thresholds.
///
/// # Arguments
/// * `low_energy` - Goertzel energy threshold at `low_freq_hz` that routes to YIN
/// * `high_energy` - Goertzel energy threshold at `high_freq_hz` that routes to FFT
/// * `low_freq_hz` - probe frequency for the low-energy gate
/// * `high_freq_hz` - probe frequency for the high-energy gate
///
/// # Returns
/// * `Ok(())` - the thresholds were accepted and are now active
/// * `Err(ConfigError::InvalidHybridThresholds)` - any value is non-finite or non-positive
pub fn set_hybrid_thresholds(
    low_energy: f64,
    high_energy: f64,
    low_freq_hz: f64,
    high_freq_hz: f64,
) -> Result<(), ConfigError> {
    let all_finite_and_positive = [low_energy, high_energy, low_freq_hz, high_freq_hz]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0);
    if !all_finite_and_positive {
        return Err(ConfigError::InvalidHybridThresholds {
            low_freq_hz,
            high_freq_hz,
            low_energy,
            high_energy,
        });
    }
    let mut guard = HYBRID_THRESHOLDS
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = HybridThresholds {
        low_freq_hz,
        high_freq_hz,
        low_energy,
        high_energy,
    };
    log::debug!(
        "hybrid thresholds set to low_energy={low_energy}, high_energy={high_energy}, low_freq_hz={low_freq_hz}, high_freq_hz={high_freq_hz}"
    );
    Ok(())
}

/// Resets both the frequency range and the hybrid thresholds to their
/// process-wide defaults.
pub fn restore_defaults() {
    let mut range = FREQUENCY_RANGE
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *range = FrequencyRange::default_range();
    let mut thresholds = HYBRID_THRESHOLDS
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *thresholds = HybridThresholds::default_thresholds();
    log::debug!("configuration restored to defaults");
}

/// Serializes any test anywhere in this crate that mutates the global
/// config — `cargo test` runs tests concurrently by default, and without
/// this lock two tests calling `set_frequency_range`/`restore_defaults`
/// at the same time could observe each other's writes.
#[cfg(test)]
pub(crate) static TEST_CONFIG_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    use super::TEST_CONFIG_LOCK as TEST_LOCK;

    #[test]
    fn set_and_restore_frequency_range() {
        let _guard = TEST_LOCK.lock().unwrap();
        restore_defaults();
        assert_eq!(frequency_range(), FrequencyRange::default_range());
        set_frequency_range(100.0, 2000.0).unwrap();
        assert_eq!(
            frequency_range(),
            FrequencyRange {
                min_hz: 100.0,
                max_hz: 2000.0
            }
        );
        restore_defaults();
        assert_eq!(frequency_range(), FrequencyRange::default_range());
    }

    #[test]
    fn rejects_inverted_frequency_range() {
        let _guard = TEST_LOCK.lock().unwrap();
        let err = set_frequency_range(2000.0, 100.0);
        assert!(err.is_err());
        restore_defaults();
    }

    #[test]
    fn set_and_restore_hybrid_thresholds() {
        let _guard = TEST_LOCK.lock().unwrap();
        restore_defaults();
        set_hybrid_thresholds(1.0, 2.0, 3.0, 4.0).unwrap();
        let t = hybrid_thresholds();
        assert_eq!(t.low_energy, 1.0);
        assert_eq!(t.high_energy, 2.0);
        assert_eq!(t.low_freq_hz, 3.0);
        assert_eq!(t.high_freq_hz, 4.0);
        restore_defaults();
        assert_eq!(hybrid_thresholds(), HybridThresholds::default_thresholds());
    }

    #[test]
    fn rejects_non_positive_hybrid_thresholds() {
        let _guard = TEST_LOCK.lock().unwrap();
        assert!(set_hybrid_thresholds(0.0, 2.0, 3.0, 4.0).is_err());
        restore_defaults();
    }
}
