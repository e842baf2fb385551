//! # ZCR + spectral detector
//!
//! Fuses a cheap zero-crossing-rate estimate with an autocorrelation
//! estimate, refines whichever one looks more reliable against a fixed
//! 2048-point spectrum, then applies an empirically tuned frequency
//! correction table. The correction table in particular is a heuristic
//! carried over from field tuning rather than a principled model —
//! property tests for this detector use loose tolerances accordingly.

use crate::config::FrequencyRange;
use crate::detector::{preconditions_ok, Detector, PitchResult, NO_PITCH};
use crate::noise::is_silent;
use crate::numerics::{parabolic_interpolate, windowed_fft};

const SILENCE_THRESHOLD: f64 = 0.005;
const AMPLITUDE_GATE: f64 = 0.005;
const AUTOCORR_MAX_SAMPLES: usize = 1024;
const AUTOCORR_PEAK_THRESHOLD: f64 = 0.3;
const SPECTRAL_FFT_SIZE: usize = 2048;
const SEARCH_WINDOW_RATIO: f64 = 0.20;
const AGREEMENT_RATIO: f64 = 0.10;
const AGREEMENT_BOOST: f64 = 1.2;
const CONFIDENCE_FLOOR: f64 = 0.6;

struct Estimate {
    frequency_hz: f64,
}

/// # Arguments
/// * `buffer` - mono PCM samples
/// * `sample_rate` - sample rate of `buffer` in Hz
/// * `range` - frequency bounds used to sanity-check the estimate
///
/// # Returns
/// * `Some(Estimate)` - a zero-crossing frequency estimate within `[0.7*min, 1.3*max]`
/// * `None` - no amplitude-gated crossings, or the estimate falls outside that band
fn zero_crossing_estimate(buffer: &[f64], sample_rate: u32, range: FrequencyRange) -> Option<Estimate> {
    let mut crossings = 0usize;
    for w in buffer.windows(2) {
        let (a, b) = (w[0], w[1]);
        if a.abs() > AMPLITUDE_GATE && b.abs() > AMPLITUDE_GATE && a.signum() != b.signum() {
            crossings += 1;
        }
    }
    let duration = buffer.len() as f64 / sample_rate as f64;
    if duration <= 0.0 {
        return None;
    }
    let freq = crossings as f64 / (2.0 * duration);
    let lower = 0.7 * range.min_hz;
    let upper = 1.3 * range.max_hz;
    if freq >= lower && freq <= upper {
        Some(Estimate { frequency_hz: freq })
    } else {
        None
    }
}

/// # Arguments
/// * `buffer` - mono PCM samples (only the leading `AUTOCORR_MAX_SAMPLES` are used)
/// * `sample_rate` - sample rate of `buffer` in Hz
/// * `range` - frequency bounds that define the active lag search range
///
/// # Returns
/// * `Some(Estimate)` - the first local autocorrelation maximum above threshold, refined
/// * `None` - silence, or no qualifying peak in the active lag range
fn autocorrelation_estimate(buffer: &[f64], sample_rate: u32, range: FrequencyRange) -> Option<Estimate> {
    let w = buffer.len().min(AUTOCORR_MAX_SAMPLES);
    if w < 2 {
        return None;
    }
    let signal = &buffer[..w];
    let energy: f64 = signal.iter().map(|&s| s * s).sum();
    if energy <= 0.0 {
        return None;
    }

    let sr = sample_rate as f64;
    let min_tau = ((sr / range.max_hz).floor() as usize).max(1);
    let max_tau = ((sr / range.min_hz).ceil() as usize).min(w - 1);
    if min_tau >= max_tau {
        return None;
    }

    let mut ac = vec![0.0; max_tau + 1];
    for tau in 0..=max_tau {
        let mut sum = 0.0;
        for i in 0..(w - tau) {
            sum += signal[i] * signal[i + tau];
        }
        ac[tau] = sum / energy;
    }

    let mut chosen_tau = None;
    for tau in min_tau..=max_tau {
        if tau == 0 || tau + 1 >= ac.len() {
            continue;
        }
        let is_local_max = ac[tau] > ac[tau - 1] && ac[tau] > ac[tau + 1];
        if is_local_max && ac[tau] > AUTOCORR_PEAK_THRESHOLD {
            chosen_tau = Some(tau);
            break;
        }
    }

    let tau = chosen_tau?;
    let refined_tau = parabolic_interpolate(&ac, tau);
    if refined_tau <= 0.0 {
        return None;
    }
    Some(Estimate {
        frequency_hz: sr / refined_tau,
    })
}

/// Refines `estimate_hz` against a fixed 2048-point spectrum: finds the
/// strongest bin within +/-20% of the estimate and returns its refined
/// frequency along with a 0..1 "spectral confidence" (SNR-style
/// prominence, same normalization the FFT peak detector uses).
///
/// # Arguments
/// * `buffer` - mono PCM samples (only the leading `SPECTRAL_FFT_SIZE` are used)
/// * `sample_rate` - sample rate of `buffer` in Hz
/// * `estimate_hz` - rough frequency estimate to refine
///
/// # Returns
/// * `Some((freq_hz, spectral_confidence))` - the refined frequency and its confidence
/// * `None` - no qualifying peak in the search window
fn refine_against_spectrum(
    buffer: &[f64],
    sample_rate: u32,
    estimate_hz: f64,
) -> Option<(f64, f64)> {
    let front = &buffer[..buffer.len().min(SPECTRAL_FFT_SIZE)];
    let spectrum_complex = windowed_fft(front, SPECTRAL_FFT_SIZE);
    let spectrum: Vec<f64> = spectrum_complex.iter().map(|c| c.norm()).collect();
    if spectrum.len() < 3 {
        return None;
    }

    let sr = sample_rate as f64;
    let bin_hz = sr / SPECTRAL_FFT_SIZE as f64;
    let center_bin = estimate_hz / bin_hz;
    let lo = ((center_bin * (1.0 - SEARCH_WINDOW_RATIO)).floor().max(1.0)) as usize;
    let hi = ((center_bin * (1.0 + SEARCH_WINDOW_RATIO)).ceil() as usize).min(spectrum.len() - 2);
    if lo > hi {
        return None;
    }

    let (peak_bin, &peak_mag) = spectrum[lo..=hi]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, m)| (lo + i, m))?;

    let avg_magnitude = spectrum.iter().sum::<f64>() / spectrum.len() as f64;
    if avg_magnitude <= 0.0 {
        return None;
    }
    let spectral_confidence = (peak_mag / avg_magnitude / 10.0).min(1.0).max(0.0);

    let refined_bin = parabolic_interpolate(&spectrum, peak_bin);
    let refined_hz = refined_bin * bin_hz;
    Some((refined_hz, spectral_confidence))
}

/// # Arguments
/// * `freq_hz` - pre-correction frequency estimate in Hz
///
/// # Returns
/// * `f64` - the empirically-tuned corrected frequency
fn apply_frequency_correction(freq_hz: f64) -> f64 {
    if freq_hz < 200.0 {
        freq_hz * 0.935
    } else if freq_hz < 1000.0 {
        freq_hz * 1.023
    } else {
        freq_hz
    }
}

/// Runs the ZCR + spectral detector over `buffer`.
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
    if is_silent(buffer, SILENCE_THRESHOLD) {
        return NO_PITCH;
    }

    let zc = zero_crossing_estimate(buffer, sample_rate, range);
    let autocorr = autocorrelation_estimate(buffer, sample_rate, range);

    let zc_refined = zc
        .as_ref()
        .and_then(|e| refine_against_spectrum(buffer, sample_rate, e.frequency_hz));
    let autocorr_refined = autocorr
        .as_ref()
        .and_then(|e| refine_against_spectrum(buffer, sample_rate, e.frequency_hz));

    let (mut freq_hz, mut confidence, agree) = match (zc_refined, autocorr_refined) {
        (Some((zf, zc_conf)), Some((af, ac_conf))) => {
            let agree = (zf - af).abs() / zf.min(af).max(1e-9) < AGREEMENT_RATIO;
            if zc_conf >= ac_conf {
                (zf, zc_conf, agree)
            } else {
                (af, ac_conf, agree)
            }
        }
        (Some((zf, zc_conf)), None) => (zf, zc_conf, false),
        (None, Some((af, ac_conf))) => (af, ac_conf, false),
        (None, None) => return NO_PITCH,
    };

    if agree {
        confidence = (confidence * AGREEMENT_BOOST).min(1.0);
    }

    freq_hz = apply_frequency_correction(freq_hz);
    confidence = confidence.max(CONFIDENCE_FLOOR);

    if freq_hz < range.min_hz || freq_hz > range.max_hz {
        confidence *= 0.5;
    }

    log::trace!("zcr: freq_hz={freq_hz:.3}, confidence={confidence:.3}, agree={agree}");

    PitchResult {
        pitch_hz: freq_hz,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

/// Zero-sized marker implementing [`Detector`] for polymorphic use by the
/// hybrid dispatcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZcrSpectralDetector;

impl Detector for ZcrSpectralDetector {
    fn detect(&self, buffer: &[f64], sample_rate: u32, range: FrequencyRange) -> PitchResult {
        detect(buffer, sample_rate, range)
    }
}
