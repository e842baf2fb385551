//! # MPM detector
//!
//! McLeod Pitch Method: search a normalized square difference function
//! (NSDF) for the first strong peak, then refine it with parabolic
//! interpolation. MPM is less prone to low-octave errors than plain
//! autocorrelation because it always favors the lowest-lag qualifying
//! peak rather than the single global maximum.

use crate::config::FrequencyRange;
use crate::detector::{preconditions_ok, Detector, PitchResult, NO_PITCH};
use crate::numerics::parabolic_interpolate;

const LAG_MARGIN: f64 = 0.10;
const PEAK_THRESHOLD: f64 = 0.5;

/// Normalized square difference function for lags `0..=max_tau`.
/// `n(tau) = 2 * sum(x_i * x_{i+tau}) / sum(x_i^2 + x_{i+tau}^2)`; a
/// near-zero denominator yields `n(tau) = 0` rather than dividing.
///
/// # Arguments
/// * `signal` - input samples
/// * `max_tau` - largest lag to compute
///
/// # Returns
/// * `Vec<f64>` - `n(tau)` for `tau` in `0..=max_tau`
fn nsdf(signal: &[f64], max_tau: usize) -> Vec<f64> {
    let n = signal.len();
    let mut out = vec![0.0; max_tau + 1];
    for tau in 0..=max_tau {
        let mut cross = 0.0;
        let mut energy = 0.0;
        let limit = n.saturating_sub(tau);
        for i in 0..limit {
            cross += signal[i] * signal[i + tau];
            energy += signal[i] * signal[i] + signal[i + tau] * signal[i + tau];
        }
        out[tau] = if energy.abs() < 1e-12 {
            0.0
        } else {
            2.0 * cross / energy
        };
    }
    out
}

/// Runs MPM over `buffer`, returning [`NO_PITCH`] if no candidate peak in
/// the active lag range exceeds the peak threshold.
///
/// # Arguments
/// * `buffer` - mono PCM samples
/// * `sample_rate` - sample rate of `buffer` in Hz
/// * `range` - frequency bounds the fundamental must fall within
///
/// # Returns
/// * `PitchResult` - the detected pitch and confidence, or [`NO_PITCH`]
pub fn detect(buffer: &[f64], sample_rate: u32, range: FrequencyRange) -> PitchResult {
    if !preconditions_ok(buffer, sample_rate) {
        return NO_PITCH;
    }

    let sr = sample_rate as f64;
    let widened_min_freq = range.min_hz * (1.0 - LAG_MARGIN);
    let widened_max_freq = range.max_hz * (1.0 + LAG_MARGIN);
    if widened_min_freq <= 0.0 || widened_max_freq <= 0.0 {
        return NO_PITCH;
    }

    let min_tau = ((sr / widened_max_freq).floor() as usize).max(1);
    let max_tau = ((sr / widened_min_freq).ceil() as usize).min(buffer.len() - 1);
    if min_tau >= max_tau {
        return NO_PITCH;
    }

    let n = nsdf(buffer, max_tau);

    let mut chosen_tau = None;
    for tau in min_tau..=max_tau {
        if tau == 0 || tau + 1 >= n.len() {
            continue;
        }
        let is_local_max = n[tau] > n[tau - 1] && n[tau] > n[tau + 1];
        if is_local_max && n[tau] > PEAK_THRESHOLD {
            chosen_tau = Some(tau);
            break;
        }
    }

    let Some(tau) = chosen_tau else {
        return NO_PITCH;
    };

    let refined_tau = parabolic_interpolate(&n, tau);
    if refined_tau <= 0.0 {
        return NO_PITCH;
    }

    let pitch_hz = sr / refined_tau;
    let confidence = n[tau].clamp(0.0, 1.0);

    log::trace!("mpm: tau={tau}, refined_tau={refined_tau:.3}, pitch_hz={pitch_hz:.3}, confidence={confidence:.3}");

    PitchResult {
        pitch_hz,
        confidence,
    }
}

/// Zero-sized marker implementing [`Detector`] for polymorphic use by the
/// hybrid dispatcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct MpmDetector;

impl Detector for MpmDetector {
    fn detect(&self, buffer: &[f64], sample_rate: u32, range: FrequencyRange) -> PitchResult {
        detect(buffer, sample_rate, range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, sample_rate: u32, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate as f64).sin())
            .collect()
    }

    #[test]
    fn detects_c4_within_tolerance() {
        let sr = 44100;
        let signal = sine(261.63, sr, 4096);
        let result = detect(&signal, sr, FrequencyRange::default_range());
        assert!(result.is_pitch());
        assert!((result.pitch_hz - 261.63).abs() < 2.0);
        assert!(result.confidence >= 0.6);
    }

    #[test]
    fn detects_a4_within_20_cents() {
        let sr = 44100;
        let signal = sine(440.0, sr, 4096);
        let result = detect(&signal, sr, FrequencyRange::default_range());
        assert!(result.is_pitch());
        assert!(crate::notes::cents(result.pitch_hz, 440.0).abs() < 20.0);
    }

    #[test]
    fn rejects_white_noise() {
        let mut state: u64 = 0x243F6A8885A308D3;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state as f64 / u64::MAX as f64) * 2.0 - 1.0
        };
        let signal: Vec<f64> = (0..4096).map(|_| next()).collect();
        let result = detect(&signal, 44100, FrequencyRange::default_range());
        assert_eq!(result, NO_PITCH);
    }

    #[test]
    fn confidence_always_in_unit_range() {
        let sr = 44100;
        for freq in [100.0, 440.0, 1000.0, 3000.0] {
            let signal = sine(freq, sr, 4096);
            let result = detect(&signal, sr, FrequencyRange::default_range());
            assert!(result.confidence >= 0.0 && result.confidence <= 1.0);
        }
    }
}
