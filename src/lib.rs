//! # pitchcore
//!
//! Real-time monophonic and polyphonic pitch estimation for tuning and
//! chord recognition. The crate never performs audio I/O itself — callers
//! supply a buffer of samples (`f64`, already de-interleaved to mono) and
//! get back a pitch or chord estimate. No detector call ever panics on
//! well-formed input: a detector that cannot find a reliable fundamental
//! returns a sentinel ([`NO_PITCH`] or an empty [`ChordResult`]) instead.
//!
//! Logging goes through the [`log`] facade; this crate never installs a
//! logger itself, so a host application wires up `env_logger` or whatever
//! else it prefers.

pub mod chord;
pub mod config;
pub mod detector;
pub mod fft_detector;
pub mod hybrid;
pub mod ml;
pub mod mpm;
pub mod noise;
pub mod notes;
pub mod numerics;
pub mod yin;
pub mod zcr;

pub use config::{set_frequency_range, set_hybrid_thresholds, FrequencyRange, HybridThresholds};
pub use detector::{ChordResult, Detector, DetectorKind, PitchResult, NO_PITCH};
pub use ml::{ChordBackend, ClassifierWeights, MlChordBackend, SpectralChordBackend};
pub use notes::{add_cents, cents, cents_from_nearest_note, find_nearest_note, NamedNote};
pub use numerics::rms;

/// Returns a copy of the currently configured frequency range.
///
/// # Returns
/// * `FrequencyRange` - the process-wide range snapshot at the time of the call
pub fn get_frequency_range() -> FrequencyRange {
    config::frequency_range()
}

/// Resets both the frequency range and the hybrid thresholds to their
/// process-wide defaults.
pub fn restore_defaults() {
    config::restore_defaults()
}

/// Runs a single monophonic pitch detection over `buffer`, dispatching to
/// whichever algorithm `kind` names. `Chord` is not a valid monophonic
/// kind; pass it to [`detect_chord`] instead, and it resolves to
/// [`NO_PITCH`] here rather than panicking.
///
/// # Arguments
/// * `buffer` - mono PCM samples in `[-1.0, 1.0]` nominal range
/// * `sample_rate` - sample rate of `buffer` in Hz
/// * `kind` - which monophonic detector (or meta-detector) to run
///
/// # Returns
/// * `PitchResult` - the detected pitch and confidence, or [`NO_PITCH`]
pub fn detect_pitch(buffer: &[f64], sample_rate: u32, kind: DetectorKind) -> PitchResult {
    let range = config::frequency_range();
    match kind {
        DetectorKind::Yin => yin::detect(buffer, sample_rate, range),
        DetectorKind::Mpm => mpm::detect(buffer, sample_rate, range),
        DetectorKind::FftPeak => fft_detector::detect(buffer, sample_rate, range),
        DetectorKind::ZcrSpectral => zcr::detect(buffer, sample_rate, range),
        DetectorKind::Hybrid => {
            let thresholds = config::hybrid_thresholds();
            hybrid::detect(buffer, sample_rate, range, thresholds)
        }
        DetectorKind::Chord => NO_PITCH,
    }
}

/// Runs the spectral chord detector over `buffer` using the process-wide
/// frequency range, finding up to [`chord::MAX_PITCHES`] simultaneous
/// fundamentals.
///
/// # Arguments
/// * `buffer` - mono PCM samples in `[-1.0, 1.0]` nominal range
/// * `sample_rate` - sample rate of `buffer` in Hz
///
/// # Returns
/// * `ChordResult` - simultaneous fundamentals and a joint confidence, or an empty chord
pub fn detect_chord(buffer: &[f64], sample_rate: u32) -> ChordResult {
    let range = config::frequency_range();
    chord::detect(buffer, sample_rate, range)
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
    fn detect_pitch_dispatches_to_yin() {
        let sr = 44100;
        let signal = sine(440.0, sr, 4096);
        let result = detect_pitch(&signal, sr, DetectorKind::Yin);
        assert!(result.is_pitch());
        assert!((result.pitch_hz - 440.0).abs() < 5.0);
    }

    #[test]
    fn detect_pitch_dispatches_to_hybrid() {
        let sr = 44100;
        let signal = sine(440.0, sr, 4096);
        let result = detect_pitch(&signal, sr, DetectorKind::Hybrid);
        assert!(result.is_pitch());
    }

    #[test]
    fn detect_pitch_chord_kind_is_not_a_monophonic_result() {
        let sr = 44100;
        let signal = sine(440.0, sr, 4096);
        let result = detect_pitch(&signal, sr, DetectorKind::Chord);
        assert_eq!(result, NO_PITCH);
    }

    #[test]
    fn detect_chord_finds_a_triad() {
        let sr = 44100;
        let signal: Vec<f64> = (0..8192)
            .map(|i| {
                [261.63, 329.63, 392.0]
                    .iter()
                    .map(|&f| (2.0 * PI * f * i as f64 / sr as f64).sin())
                    .sum::<f64>()
                    / 3.0
            })
            .collect();
        let result = detect_chord(&signal, sr);
        assert_eq!(result.pitches_hz.len(), 3);
    }

    #[test]
    fn spectral_chord_backend_matches_detect_chord() {
        let sr = 44100;
        let signal = sine(261.63, sr, 4096);
        let backend = SpectralChordBackend;
        let via_backend = backend.detect_chord(&signal, sr, config::frequency_range());
        let via_free_fn = detect_chord(&signal, sr);
        assert_eq!(via_backend, via_free_fn);
    }
}
