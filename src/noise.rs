//! # Noise & silence gates
//!
//! Cheap, buffer-local checks detectors run before doing any real work.
//! Both degrade to "treat it as silence/noise" on a zero-length buffer
//! rather than dividing by zero.

use crate::numerics::rms;

/// True if `buffer`'s unscaled RMS falls below `threshold`. The threshold
/// is caller-supplied because different detectors gate at different
/// sensitivities (0.005 for the ZCR detector, 1e-6 for the ML feature
/// extractor).
///
/// # Arguments
/// * `buffer` - samples to test
/// * `threshold` - minimum RMS to be considered non-silent
///
/// # Returns
/// * `bool` - `true` if `buffer` is silent
pub fn is_silent(buffer: &[f64], threshold: f64) -> bool {
    rms(buffer) < threshold
}

/// True if `buffer` looks like noise rather than a tone: the coefficient
/// of variation of its samples exceeds 5.0 *and* its zero-crossing rate
/// exceeds 0.4. Both conditions are required — a loud tone can have a
/// high ZCR (bright harmonics) or a high CV (quiet with a DC wobble)
/// alone without being noise.
///
/// # Arguments
/// * `buffer` - samples to test
///
/// # Returns
/// * `bool` - `true` if `buffer` is classified as noise
pub fn is_noise_like(buffer: &[f64]) -> bool {
    if buffer.len() < 2 {
        return false;
    }
    const EPS: f64 = 1e-12;

    let n = buffer.len() as f64;
    let mean = buffer.iter().sum::<f64>() / n;
    let variance = buffer.iter().map(|&s| (s - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let coefficient_of_variation = (std_dev / (mean.abs() + EPS)).abs();

    let zero_crossing_rate = zero_crossing_rate(buffer);

    coefficient_of_variation > 5.0 && zero_crossing_rate > 0.4
}

/// # Arguments
/// * `buffer` - samples to measure
///
/// # Returns
/// * `f64` - fraction of adjacent-sample pairs that cross sign, in `[0, 1]`
pub(crate) fn zero_crossing_rate(buffer: &[f64]) -> f64 {
    if buffer.len() < 2 {
        return 0.0;
    }
    let crossings = buffer
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f64 / (buffer.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn silence_buffer_is_silent() {
        assert!(is_silent(&[0.0; 512], 0.005));
    }

    #[test]
    fn loud_sine_is_not_silent() {
        let signal: Vec<f64> = (0..512).map(|i| (i as f64 * 0.1).sin()).collect();
        assert!(!is_silent(&signal, 0.005));
    }

    #[test]
    fn pure_tone_is_not_noise_like() {
        let sr = 44100.0;
        let freq = 440.0;
        let signal: Vec<f64> = (0..2048)
            .map(|i| (2.0 * PI * freq * i as f64 / sr).sin())
            .collect();
        assert!(!is_noise_like(&signal));
    }

    #[test]
    fn white_noise_is_noise_like() {
        // Deterministic pseudo-random sequence (LCG) so the test has no
        // external RNG dependency and is fully reproducible.
        let mut state: u64 = 0x2545F4914F6CDD1D;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state as f64 / u64::MAX as f64) * 2.0 - 1.0
        };
        let signal: Vec<f64> = (0..4096).map(|_| next()).collect();
        assert!(is_noise_like(&signal));
    }
}
