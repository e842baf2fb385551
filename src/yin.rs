//! # YIN detector
//!
//! De Cheveigné & Kawahara's YIN algorithm: a cumulative mean normalized
//! difference function (CMNDF) searched for its first dip below a dynamic
//! threshold, refined to sub-sample precision by parabolic interpolation.

use crate::config::FrequencyRange;
use crate::detector::{preconditions_ok, Detector, PitchResult, NO_PITCH};
use crate::notes::add_cents;
use crate::numerics::{parabolic_interpolate, rms};

const CENTS_MARGIN: f64 = 25.0;

/// The difference function `d(tau) = sum_i (x_i - x_{i+tau})^2` for
/// `tau` in `[0, max_tau]`, computed via the algebraic rewrite
/// `d(tau) = sum x_i^2 + sum x_{i+tau}^2 - 2 sum x_i x_{i+tau}` so the two
/// energy terms reuse a prefix-sum-of-squares instead of being
/// recomputed from scratch for every lag.
///
/// # Arguments
/// * `signal` - input samples
/// * `window` - analysis window length (half the buffer, per YIN)
/// * `max_tau` - largest lag to compute
///
/// # Returns
/// * `Vec<f64>` - `d(tau)` for `tau` in `0..=max_tau`
fn difference_function(signal: &[f64], window: usize, max_tau: usize) -> Vec<f64> {
    let mut prefix_sq = vec![0.0; signal.len() + 1];
    for (i, &x) in signal.iter().enumerate() {
        prefix_sq[i + 1] = prefix_sq[i] + x * x;
    }
    let sum_sq_fixed = prefix_sq[window] - prefix_sq[0];

    let mut d = vec![0.0; max_tau + 1];
    for tau in 0..=max_tau {
        let sum_sq_shifted = prefix_sq[tau + window] - prefix_sq[tau];
        let mut cross = 0.0;
        for i in 0..window {
            cross += signal[i] * signal[i + tau];
        }
        d[tau] = sum_sq_fixed + sum_sq_shifted - 2.0 * cross;
    }
    d
}

/// Cumulative mean normalized difference function. Lags outside
/// `[min_tau, max_tau]` are forced to 1.0 so the minimum search ignores
/// them, per spec.
///
/// # Arguments
/// * `d` - the raw difference function from [`difference_function`]
/// * `min_tau` - smallest lag considered active
/// * `max_tau` - largest lag considered active
///
/// # Returns
/// * `Vec<f64>` - the CMNDF, same length as `d`
fn cmndf(d: &[f64], min_tau: usize, max_tau: usize) -> Vec<f64> {
    const EPS: f64 = 1e-12;
    let mut out = vec![1.0; d.len()];
    let mut running_sum = 0.0;
    for tau in 1..d.len() {
        running_sum += d[tau];
        let normalized = if tau >= min_tau && tau <= max_tau {
            d[tau] * tau as f64 / (running_sum + EPS)
        } else {
            1.0
        };
        out[tau] = normalized;
    }
    out
}

/// # Arguments
/// * `signal_rms` - unscaled RMS of the input buffer
///
/// # Returns
/// * `f64` - the CMNDF dip threshold, `min(0.5, 0.4*(1 + 0.3/(rms + 0.01)))`
fn dynamic_threshold(signal_rms: f64) -> f64 {
    (0.4 * (1.0 + 0.3 / (signal_rms + 0.01))).min(0.5)
}

/// Runs the YIN algorithm over `buffer`, returning [`NO_PITCH`] if no
/// qualifying dip in the CMNDF is found.
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

    let n = buffer.len();
    let window = n / 2;
    if window < 2 {
        return NO_PITCH;
    }

    let sr = sample_rate as f64;
    let widened_max_freq = add_cents(CENTS_MARGIN, range.max_hz);
    let widened_min_freq = add_cents(-CENTS_MARGIN, range.min_hz);
    if widened_max_freq <= 0.0 || widened_min_freq <= 0.0 {
        return NO_PITCH;
    }

    let min_tau = ((sr / widened_max_freq).floor() as usize).max(1);
    let max_tau = ((sr / widened_min_freq).ceil() as usize).min(window - 1);
    if min_tau >= max_tau {
        return NO_PITCH;
    }

    let d = difference_function(buffer, window, max_tau);
    let d_prime = cmndf(&d, min_tau, max_tau);

    let signal_rms = rms(buffer);
    let threshold = dynamic_threshold(signal_rms);

    let mut chosen_tau = None;
    for tau in min_tau..=max_tau {
        if tau == 0 || tau + 1 >= d_prime.len() {
            continue;
        }
        let is_local_min = d_prime[tau] < d_prime[tau - 1] && d_prime[tau] < d_prime[tau + 1];
        if is_local_min && d_prime[tau] < threshold {
            chosen_tau = Some(tau);
            break;
        }
    }

    let Some(tau) = chosen_tau else {
        return NO_PITCH;
    };

    let refined_tau = parabolic_interpolate(&d_prime, tau);
    if refined_tau <= 0.0 {
        return NO_PITCH;
    }

    let pitch_hz = sr / refined_tau;
    let confidence = (1.0 - (d_prime[tau] / threshold).powi(2)).clamp(0.0, 1.0);

    log::trace!("yin: tau={tau}, refined_tau={refined_tau:.3}, pitch_hz={pitch_hz:.3}, confidence={confidence:.3}");

    PitchResult {
        pitch_hz,
        confidence,
    }
    .clamp_confidence()
}

/// Zero-sized marker implementing [`Detector`] so the YIN algorithm can be
/// used polymorphically (e.g. by the hybrid dispatcher).
#[derive(Debug, Default, Clone, Copy)]
pub struct YinDetector;

impl Detector for YinDetector {
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
        let mut state: u64 = 0x9E3779B97F4A7C15;
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

    #[test]
    fn is_idempotent() {
        let sr = 44100;
        let signal = sine(330.0, sr, 4096);
        let a = detect(&signal, sr, FrequencyRange::default_range());
        let b = detect(&signal, sr, FrequencyRange::default_range());
        assert_eq!(a, b);
    }
}
