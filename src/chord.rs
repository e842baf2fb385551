//! # Spectral chord detector
//!
//! Finds up to [`MAX_PITCHES`] simultaneous fundamentals from a single FFT:
//! a spectral-flatness noise gate, a peak list, a band filter, a harmonic
//! filter (with a mandatory octave exception), a lower-frequency
//! prioritization pass, a proximity merge, and a final cap. The stage
//! order below is load-bearing — the harmonic filter and the
//! lower-frequency prioritization pass interact in an order-sensitive way,
//! so it is preserved exactly as documented rather than reordered for
//! convenience.

use crate::config::FrequencyRange;
use crate::detector::{ChordResult, SpectralPeak};
use crate::numerics::{next_pow2, parabolic_interpolate, windowed_fft};

const MIN_FFT_SIZE: usize = 1024;
const FLATNESS_THRESHOLD: f64 = 0.4;
const PEAK_THRESHOLD: f64 = 0.05;
const HARMONIC_RATIO_TOLERANCE: f64 = 0.05;
const HARMONIC_MAGNITUDE_RATIO: f64 = 0.30;
const UNREALISTIC_HARMONIC_RATIO: f64 = 5.0;
const LOWER_PRIORITIZATION_RATIO: f64 = 0.6;
const PROXIMITY_MERGE_HZ: f64 = 25.0;
pub const MAX_PITCHES: usize = 4;

/// # Arguments
/// * `spectrum` - magnitude spectrum
/// * `fft_size` - FFT size `spectrum` was computed with
/// * `sample_rate` - sample rate in Hz
/// * `range` - frequency band the flatness ratio is computed over
///
/// # Returns
/// * `f64` - geometric-mean / arithmetic-mean over the band; `1.0` (noise-like) if the band is empty
fn spectral_flatness(spectrum: &[f64], fft_size: usize, sample_rate: u32, range: FrequencyRange) -> f64 {
    const EPS: f64 = 1e-12;
    let bin_hz = sample_rate as f64 / fft_size as f64;
    let lo = ((range.min_hz / bin_hz).floor() as usize).max(1);
    let hi = ((range.max_hz / bin_hz).ceil() as usize).min(spectrum.len().saturating_sub(1));
    if lo >= hi {
        return 1.0;
    }

    let band = &spectrum[lo..=hi];
    let n = band.len() as f64;
    let log_sum: f64 = band.iter().map(|&m| (m + EPS).ln()).sum();
    let geometric_mean = (log_sum / n).exp();
    let arithmetic_mean = band.iter().sum::<f64>() / n;
    if arithmetic_mean <= EPS {
        return 1.0;
    }
    geometric_mean / arithmetic_mean
}

/// # Arguments
/// * `spectrum` - normalized magnitude spectrum
/// * `fft_size` - FFT size `spectrum` was computed with
/// * `sample_rate` - sample rate in Hz
/// * `range` - frequency band to search
///
/// # Returns
/// * `Vec<SpectralPeak>` - local maxima above [`PEAK_THRESHOLD`], refined, sorted by magnitude descending
fn find_peak_list(spectrum: &[f64], fft_size: usize, sample_rate: u32, range: FrequencyRange) -> Vec<SpectralPeak> {
    let bin_hz = sample_rate as f64 / fft_size as f64;
    let min_bin = ((range.min_hz / bin_hz).floor() as usize).max(1);
    let max_bin = ((range.max_hz / bin_hz).ceil() as usize).min(spectrum.len().saturating_sub(2));

    let mut peaks = Vec::new();
    if min_bin > max_bin {
        return peaks;
    }
    for bin in min_bin..=max_bin {
        if bin == 0 || bin + 1 >= spectrum.len() {
            continue;
        }
        let is_local_max = spectrum[bin] > spectrum[bin - 1] && spectrum[bin] > spectrum[bin + 1];
        if !is_local_max || spectrum[bin] <= PEAK_THRESHOLD {
            continue;
        }
        let refined_bin = parabolic_interpolate(spectrum, bin);
        let frequency_hz = refined_bin * bin_hz;
        peaks.push(SpectralPeak {
            frequency_hz,
            magnitude: spectrum[bin],
        });
    }
    peaks.sort_by(|a, b| b.magnitude.partial_cmp(&a.magnitude).unwrap());
    peaks
}

/// # Arguments
/// * `peaks` - candidate peaks
/// * `range` - frequency band to keep
///
/// # Returns
/// * `Vec<SpectralPeak>` - only the peaks whose frequency falls within `range`
fn band_filter(peaks: Vec<SpectralPeak>, range: FrequencyRange) -> Vec<SpectralPeak> {
    peaks
        .into_iter()
        .filter(|p| p.frequency_hz >= range.min_hz && p.frequency_hz <= range.max_hz)
        .collect()
}

/// Discards peaks that are near-integer-ratio harmonics of an
/// already-kept, stronger peak. Octave ratios (exactly 2) always pass;
/// ratios beyond 5 are treated as unrelated tones rather than harmonics.
///
/// # Arguments
/// * `peaks` - candidate peaks, any order
///
/// # Returns
/// * `Vec<SpectralPeak>` - peaks surviving harmonic suppression, input order preserved
fn harmonic_filter(peaks: Vec<SpectralPeak>) -> Vec<SpectralPeak> {
    let mut kept: Vec<SpectralPeak> = Vec::new();
    'peaks: for peak in peaks {
        for &prior in &kept {
            if prior.frequency_hz <= 0.0 {
                continue;
            }
            let ratio = peak.frequency_hz / prior.frequency_hz;
            if ratio <= 1.0 || ratio > UNREALISTIC_HARMONIC_RATIO {
                continue;
            }
            let nearest_int = ratio.round();
            if nearest_int < 2.0 || (ratio - nearest_int).abs() > HARMONIC_RATIO_TOLERANCE {
                continue;
            }
            if (nearest_int - 2.0).abs() < 1e-9 {
                continue; // octave exception: always pass
            }
            if peak.magnitude < HARMONIC_MAGNITUDE_RATIO * prior.magnitude {
                continue 'peaks; // discard: harmonic of a much stronger peak
            }
        }
        kept.push(peak);
    }
    kept
}

/// Suppresses a higher peak when a previously kept, lower peak dominates
/// it by the documented 0.6 magnitude ratio.
///
/// # Arguments
/// * `peaks` - candidate peaks, any order
///
/// # Returns
/// * `Vec<SpectralPeak>` - surviving peaks, sorted by frequency ascending
fn prioritize_lower_frequencies(mut peaks: Vec<SpectralPeak>) -> Vec<SpectralPeak> {
    peaks.sort_by(|a, b| a.frequency_hz.partial_cmp(&b.frequency_hz).unwrap());

    let mut survivors: Vec<SpectralPeak> = Vec::new();
    for peak in peaks {
        let suppressed = survivors
            .iter()
            .any(|lower| lower.frequency_hz < peak.frequency_hz && peak.magnitude < LOWER_PRIORITIZATION_RATIO * lower.magnitude);
        if !suppressed {
            survivors.push(peak);
        }
    }
    survivors
}

/// Single pass merging adjacent peaks (in frequency-ascending order)
/// closer than [`PROXIMITY_MERGE_HZ`] into a magnitude-weighted mean.
///
/// # Arguments
/// * `peaks` - peaks sorted by frequency ascending
///
/// # Returns
/// * `Vec<SpectralPeak>` - peaks after merging, still frequency-ascending
fn proximity_merge(peaks: Vec<SpectralPeak>) -> Vec<SpectralPeak> {
    let mut merged = Vec::with_capacity(peaks.len());
    let mut i = 0;
    while i < peaks.len() {
        if i + 1 < peaks.len() && (peaks[i + 1].frequency_hz - peaks[i].frequency_hz).abs() < PROXIMITY_MERGE_HZ {
            let a = peaks[i];
            let b = peaks[i + 1];
            let total_mag = a.magnitude + b.magnitude;
            let frequency_hz = if total_mag > 0.0 {
                (a.frequency_hz * a.magnitude + b.frequency_hz * b.magnitude) / total_mag
            } else {
                (a.frequency_hz + b.frequency_hz) / 2.0
            };
            merged.push(SpectralPeak {
                frequency_hz,
                magnitude: total_mag,
            });
            i += 2;
        } else {
            merged.push(peaks[i]);
            i += 1;
        }
    }
    merged
}

/// Runs the spectral chord detector over `buffer`.
///
/// # Arguments
/// * `buffer` - mono PCM samples
/// * `sample_rate` - sample rate of `buffer` in Hz
/// * `range` - frequency band fundamentals must fall within
///
/// # Returns
/// * `ChordResult` - up to [`MAX_PITCHES`] fundamentals and their joint confidence, or an empty chord
pub fn detect(buffer: &[f64], sample_rate: u32, range: FrequencyRange) -> ChordResult {
    if buffer.len() < 2 || sample_rate == 0 {
        return ChordResult::empty();
    }

    let fft_size = MIN_FFT_SIZE.max(next_pow2(buffer.len()));
    let spectrum_complex = windowed_fft(buffer, fft_size);
    let mut spectrum: Vec<f64> = spectrum_complex.iter().map(|c| c.norm()).collect();
    if spectrum.len() < 3 {
        return ChordResult::empty();
    }

    let flatness = spectral_flatness(&spectrum, fft_size, sample_rate, range);
    if flatness > FLATNESS_THRESHOLD {
        log::trace!("chord: spectral flatness {flatness:.3} judged noise");
        return ChordResult::empty();
    }

    crate::numerics::normalize_by_max(&mut spectrum);

    let peaks = find_peak_list(&spectrum, fft_size, sample_rate, range);
    let peaks = band_filter(peaks, range);
    let peaks = harmonic_filter(peaks);
    let peaks = prioritize_lower_frequencies(peaks);
    let mut peaks = proximity_merge(peaks);

    if peaks.len() > MAX_PITCHES {
        peaks.truncate(MAX_PITCHES);
    }

    if peaks.is_empty() {
        return ChordResult::empty();
    }

    let confidence = peaks.iter().map(|p| p.magnitude).sum::<f64>() / peaks.len() as f64;
    let pitches_hz = peaks.iter().map(|p| p.frequency_hz).collect();

    log::trace!("chord: {} pitches, confidence={confidence:.3}", peaks.len());

    ChordResult {
        pitches_hz,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn mix(freqs: &[f64], sample_rate: u32, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                freqs
                    .iter()
                    .map(|&f| (2.0 * PI * f * i as f64 / sample_rate as f64).sin())
                    .sum::<f64>()
                    / freqs.len() as f64
            })
            .collect()
    }

    #[test]
    fn single_tone_yields_singleton_chord() {
        let sr = 44100;
        let signal = mix(&[261.63], sr, 4096);
        let result = detect(&signal, sr, FrequencyRange::default_range());
        assert_eq!(result.pitches_hz.len(), 1);
        assert!((result.pitches_hz[0] - 261.63).abs() < 10.0);
    }

    #[test]
    fn c_major_triad_yields_three_pitches_ascending() {
        let sr = 44100;
        let signal = mix(&[261.63, 329.63, 392.0], sr, 8192);
        let result = detect(&signal, sr, FrequencyRange::default_range());
        assert_eq!(result.pitches_hz.len(), 3);
        for w in result.pitches_hz.windows(2) {
            assert!(w[0] < w[1]);
        }
        let targets = [261.63, 329.63, 392.0];
        for (got, want) in result.pitches_hz.iter().zip(targets.iter()) {
            assert!((got - want).abs() < 10.0, "got {got}, want {want}");
        }
    }

    #[test]
    fn pure_octave_keeps_both_frequencies() {
        let sr = 44100;
        let signal = mix(&[261.63, 523.25], sr, 8192);
        let result = detect(&signal, sr, FrequencyRange::default_range());
        assert_eq!(result.pitches_hz.len(), 2);
        assert!((result.pitches_hz[0] - 261.63).abs() < 10.0);
        assert!((result.pitches_hz[1] - 523.25).abs() < 10.0);
    }

    #[test]
    fn white_noise_yields_empty_chord() {
        let mut state: u64 = 0xA3EC647659359ACD;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state as f64 / u64::MAX as f64) * 2.0 - 1.0
        };
        let signal: Vec<f64> = (0..4096).map(|_| next() * 0.5).collect();
        let result = detect(&signal, 44100, FrequencyRange::default_range());
        assert!(result.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn confidence_is_in_unit_range() {
        let sr = 44100;
        let signal = mix(&[261.63, 329.63, 392.0], sr, 8192);
        let result = detect(&signal, sr, FrequencyRange::default_range());
        assert!(result.confidence >= 0.0 && result.confidence <= 1.0);
    }

    #[test]
    fn harmonic_filter_keeps_octave_but_drops_weak_harmonic() {
        let kept = SpectralPeak {
            frequency_hz: 200.0,
            magnitude: 1.0,
        };
        let octave = SpectralPeak {
            frequency_hz: 400.0,
            magnitude: 0.1,
        };
        let weak_third_harmonic = SpectralPeak {
            frequency_hz: 600.0,
            magnitude: 0.1,
        };
        let peaks = vec![kept, octave, weak_third_harmonic];
        let result = harmonic_filter(peaks);
        assert!(result.iter().any(|p| (p.frequency_hz - 200.0).abs() < 1e-6));
        assert!(result.iter().any(|p| (p.frequency_hz - 400.0).abs() < 1e-6));
        assert!(!result.iter().any(|p| (p.frequency_hz - 600.0).abs() < 1e-6));
    }
}
