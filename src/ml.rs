//! # Pluggable ML chord backend
//!
//! An optional strategy that substitutes the spectral chord detector
//! (`chord.rs`) with a small pre-trained classifier over a 32-dimensional
//! feature vector (MFCC-like coefficients, chroma, spectral contrast).
//! This module defines the contract and the feature extraction; it does
//! not ship any trained weights — those are a pluggable artifact loaded
//! at construction time, never baked into the crate.
//!
//! Grounded on the pack's general-purpose feature extractors (MFCC/
//! spectral-feature style borrowed from `rusty-audio`'s feature
//! extractor, chroma binning borrowed from `mecomp-analysis`'s chroma
//! module), adapted to this crate's own FFT and note utilities rather
//! than pulled in wholesale.

use crate::config::FrequencyRange;
use crate::detector::ChordResult;
use crate::notes::midi_note_frequency;
use crate::numerics::{magnitude_spectrum, windowed_fft};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FEATURE_DIM: usize = 32;
const MFCC_COEFFICIENTS: usize = 13;
const MEL_FILTERS: usize = 26;
const CHROMA_BINS: usize = 12;
const SPECTRAL_CONTRAST_BANDS: usize = 7;
const SILENCE_RMS_THRESHOLD: f64 = 1e-6;
const TARGET_SAMPLE_RATE: u32 = 16_000;
const FEATURE_FFT_SIZE: usize = 2048;

pub const CONFIDENCE_THRESHOLD: f64 = 0.10;
pub const MAX_PITCHES: usize = 10;

/// Errors raised while constructing or loading an [`MlChordBackend`].
/// Never surfaces from a detection call — only from construction, per
/// the contract in spec.md section 7.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("classifier weights are malformed: expected {expected} rows of {cols} columns, got {got} rows")]
    ShapeMismatch {
        expected: usize,
        cols: usize,
        got: usize,
    },
    #[error("failed to parse classifier weights JSON")]
    Parse(#[source] serde_json::Error),
}

/// A linear-softmax classifier mapping a 32-dim feature vector to a
/// per-semitone confidence distribution over the 12 pitch classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierWeights {
    /// `[CHROMA_BINS][FEATURE_DIM + 1]`, last column is the bias term.
    pub rows: Vec<Vec<f64>>,
}

impl ClassifierWeights {
    /// # Arguments
    /// * `json` - serialized `ClassifierWeights` (`rows: [[f64; FEATURE_DIM + 1]; CHROMA_BINS]`)
    ///
    /// # Returns
    /// * `Ok(ClassifierWeights)` - parsed and shape-validated weights
    /// * `Err` - malformed JSON or a row/column count mismatch
    pub fn from_json_str(json: &str) -> Result<Self> {
        let weights: ClassifierWeights =
            serde_json::from_str(json).map_err(ModelError::Parse)?;
        weights.validate()?;
        Ok(weights)
    }

    /// # Returns
    /// * `Ok(())` - `rows` has exactly `CHROMA_BINS` rows of `FEATURE_DIM + 1` columns
    /// * `Err(ModelError::ShapeMismatch)` - otherwise
    fn validate(&self) -> Result<(), ModelError> {
        if self.rows.len() != CHROMA_BINS {
            return Err(ModelError::ShapeMismatch {
                expected: CHROMA_BINS,
                cols: FEATURE_DIM + 1,
                got: self.rows.len(),
            });
        }
        for row in &self.rows {
            if row.len() != FEATURE_DIM + 1 {
                return Err(ModelError::ShapeMismatch {
                    expected: CHROMA_BINS,
                    cols: FEATURE_DIM + 1,
                    got: self.rows.len(),
                });
            }
        }
        Ok(())
    }

    /// # Arguments
    /// * `features` - the 32-dim feature vector from [`extract_features`]
    ///
    /// # Returns
    /// * `[f64; CHROMA_BINS]` - per-class logits before softmax
    fn logits(&self, features: &[f64; FEATURE_DIM]) -> [f64; CHROMA_BINS] {
        let mut out = [0.0; CHROMA_BINS];
        for (class, row) in self.rows.iter().enumerate() {
            let bias = row[FEATURE_DIM];
            let dot: f64 = row[..FEATURE_DIM]
                .iter()
                .zip(features.iter())
                .map(|(w, f)| w * f)
                .sum();
            out[class] = dot + bias;
        }
        out
    }
}

/// # Arguments
/// * `logits` - per-class logits
///
/// # Returns
/// * `[f64; CHROMA_BINS]` - per-class probabilities summing to 1.0
fn softmax(logits: [f64; CHROMA_BINS]) -> [f64; CHROMA_BINS] {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    let mut out = [0.0; CHROMA_BINS];
    for (i, e) in exps.into_iter().enumerate() {
        out[i] = if sum > 0.0 { e / sum } else { 0.0 };
    }
    out
}

/// Strategy selected at construction time; both implementors satisfy the
/// same external [`ChordResult`] shape.
pub trait ChordBackend {
    /// # Arguments
    /// * `buffer` - mono PCM samples
    /// * `sample_rate` - sample rate of `buffer` in Hz
    /// * `range` - frequency band fundamentals must fall within
    ///
    /// # Returns
    /// * `ChordResult` - simultaneous fundamentals and a joint confidence, or an empty chord
    fn detect_chord(&self, buffer: &[f64], sample_rate: u32, range: FrequencyRange) -> ChordResult;
}

/// Default backend: the spectral chord detector in `chord.rs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectralChordBackend;

impl ChordBackend for SpectralChordBackend {
    fn detect_chord(&self, buffer: &[f64], sample_rate: u32, range: FrequencyRange) -> ChordResult {
        crate::chord::detect(buffer, sample_rate, range)
    }
}

/// Classifier-backed chord backend.
pub struct MlChordBackend {
    weights: ClassifierWeights,
}

impl MlChordBackend {
    /// # Arguments
    /// * `weights` - a validated classifier
    ///
    /// # Returns
    /// * `MlChordBackend` - ready to classify chords
    pub fn new(weights: ClassifierWeights) -> Self {
        Self { weights }
    }

    /// # Arguments
    /// * `json` - serialized [`ClassifierWeights`]
    ///
    /// # Returns
    /// * `Ok(MlChordBackend)` - backend built from the parsed weights
    /// * `Err` - the weights failed to parse or validate
    pub fn from_json_str(json: &str) -> Result<Self> {
        let weights = ClassifierWeights::from_json_str(json).context("loading classifier weights")?;
        Ok(Self::new(weights))
    }
}

impl ChordBackend for MlChordBackend {
    fn detect_chord(&self, buffer: &[f64], sample_rate: u32, range: FrequencyRange) -> ChordResult {
        if crate::noise::is_silent(buffer, SILENCE_RMS_THRESHOLD) {
            return ChordResult::empty();
        }

        let resampled = resample_linear(buffer, sample_rate, TARGET_SAMPLE_RATE);
        let Some(features) = extract_features(&resampled, TARGET_SAMPLE_RATE) else {
            return ChordResult::empty();
        };

        let probabilities = softmax(self.weights.logits(&features));

        let mut ranked: Vec<(usize, f64)> = probabilities
            .into_iter()
            .enumerate()
            .filter(|&(_, p)| p >= CONFIDENCE_THRESHOLD)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        ranked.truncate(MAX_PITCHES);

        if ranked.is_empty() {
            return ChordResult::empty();
        }

        let pitches_hz: Vec<f64> = ranked
            .iter()
            .map(|&(semitone, _)| semitone_to_frequency_in_range(semitone, range))
            .collect();
        let confidence = ranked.iter().map(|&(_, p)| p).sum::<f64>() / ranked.len() as f64;

        ChordResult {
            pitches_hz,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Picks the octave (0..=8) that places `semitone`'s frequency inside
/// `range`, falling back to octave 4 (A440's octave) if none qualify.
///
/// # Arguments
/// * `semitone` - pitch class in `0..CHROMA_BINS`
/// * `range` - frequency band the result should fall within
///
/// # Returns
/// * `f64` - the chosen octave's frequency for `semitone`, in Hz
fn semitone_to_frequency_in_range(semitone: usize, range: FrequencyRange) -> f64 {
    for octave in 0..=8 {
        let midi_note = octave * 12 + semitone as i32;
        let freq = midi_note_frequency(midi_note);
        if freq >= range.min_hz && freq <= range.max_hz {
            return freq;
        }
    }
    let fallback_midi = 4 * 12 + semitone as i32;
    midi_note_frequency(fallback_midi)
}

/// Linear-interpolation resampling. A no-op when rates already match.
///
/// # Arguments
/// * `buffer` - input samples at `from_sr`
/// * `from_sr` - input sample rate in Hz
/// * `to_sr` - desired output sample rate in Hz
///
/// # Returns
/// * `Vec<f64>` - `buffer` resampled to `to_sr`
fn resample_linear(buffer: &[f64], from_sr: u32, to_sr: u32) -> Vec<f64> {
    if from_sr == to_sr || buffer.is_empty() {
        return buffer.to_vec();
    }
    let ratio = to_sr as f64 / from_sr as f64;
    let out_len = ((buffer.len() as f64) * ratio).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let lo = src_pos.floor() as usize;
        let hi = (lo + 1).min(buffer.len() - 1);
        let frac = src_pos - lo as f64;
        let lo_val = buffer[lo.min(buffer.len() - 1)];
        let hi_val = buffer[hi];
        out.push(lo_val + (hi_val - lo_val) * frac);
    }
    out
}

/// # Returns
/// * `f64` - `hz` converted to the Mel scale
fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// # Returns
/// * `f64` - `mel` converted back to Hz
fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular Mel filterbank energies over a magnitude spectrum.
///
/// # Arguments
/// * `spectrum` - magnitude spectrum
/// * `fft_size` - FFT size `spectrum` was computed with
/// * `sample_rate` - sample rate in Hz
///
/// # Returns
/// * `Vec<f64>` - `MEL_FILTERS` triangular filterbank energies
fn mel_filter_energies(spectrum: &[f64], fft_size: usize, sample_rate: u32) -> Vec<f64> {
    let nyquist = sample_rate as f64 / 2.0;
    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(nyquist);
    let mel_points: Vec<f64> = (0..=MEL_FILTERS + 1)
        .map(|i| mel_min + (mel_max - mel_min) * i as f64 / (MEL_FILTERS + 1) as f64)
        .collect();
    let bin_points: Vec<usize> = mel_points
        .iter()
        .map(|&m| {
            let hz = mel_to_hz(m);
            ((hz * fft_size as f64 / sample_rate as f64).floor() as usize).min(spectrum.len() - 1)
        })
        .collect();

    let mut energies = vec![0.0; MEL_FILTERS];
    for f in 0..MEL_FILTERS {
        let (left, center, right) = (bin_points[f], bin_points[f + 1], bin_points[f + 2]);
        let mut energy = 0.0;
        for bin in left..center {
            if center == left {
                break;
            }
            let weight = (bin - left) as f64 / (center - left) as f64;
            energy += spectrum[bin] * weight;
        }
        for bin in center..right {
            if right == center {
                break;
            }
            let weight = (right - bin) as f64 / (right - center) as f64;
            energy += spectrum[bin] * weight;
        }
        energies[f] = energy;
    }
    energies
}

/// DCT-II, keeping the first `MFCC_COEFFICIENTS` coefficients.
///
/// # Arguments
/// * `input` - log Mel-filterbank energies
/// * `out_len` - number of coefficients to keep
///
/// # Returns
/// * `Vec<f64>` - the first `out_len` DCT-II coefficients
fn dct(input: &[f64], out_len: usize) -> Vec<f64> {
    use std::f64::consts::PI;
    let n = input.len();
    let mut out = vec![0.0; out_len];
    for (k, slot) in out.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (i, &x) in input.iter().enumerate() {
            sum += x * (PI / n as f64 * (i as f64 + 0.5) * k as f64).cos();
        }
        *slot = sum;
    }
    out
}

/// # Arguments
/// * `spectrum` - magnitude spectrum
/// * `fft_size` - FFT size `spectrum` was computed with
/// * `sample_rate` - sample rate in Hz
///
/// # Returns
/// * `Vec<f64>` - `MFCC_COEFFICIENTS` MFCC-like coefficients
fn mfcc(spectrum: &[f64], fft_size: usize, sample_rate: u32) -> Vec<f64> {
    let mel_energies = mel_filter_energies(spectrum, fft_size, sample_rate);
    let log_energies: Vec<f64> = mel_energies.iter().map(|&e| (e + 1e-10).ln()).collect();
    dct(&log_energies, MFCC_COEFFICIENTS)
}

/// Chroma vector: bins each spectral bin's frequency onto the nearest
/// semitone modulo 12 from an A440 reference, summing magnitude.
///
/// # Arguments
/// * `spectrum` - magnitude spectrum
/// * `fft_size` - FFT size `spectrum` was computed with
/// * `sample_rate` - sample rate in Hz
///
/// # Returns
/// * `[f64; CHROMA_BINS]` - normalized per-semitone energy, summing to 1.0
fn chroma(spectrum: &[f64], fft_size: usize, sample_rate: u32) -> [f64; CHROMA_BINS] {
    let mut bins = [0.0; CHROMA_BINS];
    let bin_hz = sample_rate as f64 / fft_size as f64;
    for (i, &mag) in spectrum.iter().enumerate() {
        let freq = i as f64 * bin_hz;
        if freq < 20.0 {
            continue;
        }
        let semitone_from_a4 = 12.0 * (freq / 440.0).log2();
        let semitone_class = (semitone_from_a4.round() as i64).rem_euclid(12) as usize;
        bins[semitone_class] += mag;
    }
    let total: f64 = bins.iter().sum();
    if total > 0.0 {
        for b in bins.iter_mut() {
            *b /= total;
        }
    }
    bins
}

/// Peak-minus-valley spectral contrast over `SPECTRAL_CONTRAST_BANDS`
/// equal-width sub-bands.
///
/// # Arguments
/// * `spectrum` - magnitude spectrum
///
/// # Returns
/// * `[f64; SPECTRAL_CONTRAST_BANDS]` - per-band `peak - valley`
fn spectral_contrast(spectrum: &[f64]) -> [f64; SPECTRAL_CONTRAST_BANDS] {
    let mut out = [0.0; SPECTRAL_CONTRAST_BANDS];
    let band_size = spectrum.len() / SPECTRAL_CONTRAST_BANDS;
    if band_size == 0 {
        return out;
    }
    for (b, slot) in out.iter_mut().enumerate() {
        let start = b * band_size;
        let end = if b + 1 == SPECTRAL_CONTRAST_BANDS {
            spectrum.len()
        } else {
            start + band_size
        };
        let band = &spectrum[start..end];
        let peak = band.iter().cloned().fold(f64::MIN, f64::max);
        let valley = band.iter().cloned().fold(f64::MAX, f64::min);
        *slot = peak - valley;
    }
    out
}

/// Extracts the 32-dim feature vector: 13 MFCC-like coefficients, 12
/// chroma bins, 7 spectral-contrast coefficients. Returns `None` on a
/// degenerate (too-short) buffer.
///
/// # Arguments
/// * `buffer` - mono PCM samples
/// * `sample_rate` - sample rate of `buffer` in Hz
///
/// # Returns
/// * `Some([f64; FEATURE_DIM])` - the concatenated feature vector
/// * `None` - `buffer` is too short to extract features from
pub fn extract_features(buffer: &[f64], sample_rate: u32) -> Option<[f64; FEATURE_DIM]> {
    if buffer.len() < 2 {
        return None;
    }
    let spectrum_complex = windowed_fft(buffer, FEATURE_FFT_SIZE);
    let spectrum = magnitude_spectrum(&spectrum_complex);

    let mfcc = mfcc(&spectrum, FEATURE_FFT_SIZE, sample_rate);
    let chroma = chroma(&spectrum, FEATURE_FFT_SIZE, sample_rate);
    let contrast = spectral_contrast(&spectrum);

    let mut features = [0.0; FEATURE_DIM];
    features[..MFCC_COEFFICIENTS].copy_from_slice(&mfcc);
    features[MFCC_COEFFICIENTS..MFCC_COEFFICIENTS + CHROMA_BINS].copy_from_slice(&chroma);
    features[MFCC_COEFFICIENTS + CHROMA_BINS..].copy_from_slice(&contrast);
    Some(features)
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
    fn feature_vector_has_expected_dimension_and_is_finite() {
        let signal = sine(440.0, 16000, 2048);
        let features = extract_features(&signal, 16000).unwrap();
        assert_eq!(features.len(), FEATURE_DIM);
        assert!(features.iter().all(|f| f.is_finite()));
    }

    #[test]
    fn resample_linear_noop_when_rates_match() {
        let signal = vec![0.1, 0.2, 0.3];
        let resampled = resample_linear(&signal, 16000, 16000);
        assert_eq!(resampled, signal);
    }

    #[test]
    fn resample_linear_changes_length_proportionally() {
        let signal = vec![0.0; 1000];
        let resampled = resample_linear(&signal, 44100, 16000);
        let expected_len = (1000.0 * 16000.0 / 44100.0).round() as usize;
        assert_eq!(resampled.len(), expected_len);
    }

    fn flat_weights() -> ClassifierWeights {
        ClassifierWeights {
            rows: vec![vec![0.0; FEATURE_DIM + 1]; CHROMA_BINS],
        }
    }

    #[test]
    fn malformed_weights_are_rejected_at_construction() {
        let bad = ClassifierWeights {
            rows: vec![vec![0.0; FEATURE_DIM]; CHROMA_BINS - 1],
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn ml_backend_on_flat_weights_returns_a_uniform_distribution_chord() {
        let backend = MlChordBackend::new(flat_weights());
        let signal = sine(440.0, 44100, 4096);
        // All logits are zero -> softmax is uniform 1/12 per class, which
        // is below CONFIDENCE_THRESHOLD (0.10... actually 1/12 = 0.0833 <
        // 0.10), so this should yield an empty chord, not a crash.
        let result = backend.detect_chord(&signal, 44100, FrequencyRange::default_range());
        assert!(result.is_empty());
    }

    #[test]
    fn ml_backend_silence_yields_empty_chord() {
        let backend = MlChordBackend::new(flat_weights());
        let result = backend.detect_chord(&[0.0; 4096], 44100, FrequencyRange::default_range());
        assert!(result.is_empty());
    }
}
