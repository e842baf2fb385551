//! # Detector contract & shared result types
//!
//! Every monophonic detector implements [`Detector`]. None of them ever
//! raise: a detector that can't find a reliable fundamental returns
//! [`NO_PITCH`] instead of an error, because the intended callers (a
//! real-time tuner UI loop) cannot reasonably handle an exception inside
//! the audio tick.

use crate::config::FrequencyRange;

/// Result of a single monophonic pitch detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchResult {
    pub pitch_hz: f64,
    pub confidence: f64,
}

/// Sentinel returned when no reliable fundamental could be found.
pub const NO_PITCH: PitchResult = PitchResult {
    pitch_hz: -1.0,
    confidence: 0.0,
};

impl PitchResult {
    /// # Returns
    /// * `bool` - `true` unless this result is the [`NO_PITCH`] sentinel
    pub fn is_pitch(&self) -> bool {
        self.pitch_hz > 0.0
    }

    pub(crate) fn clamp_confidence(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

/// Result of a single chord (polyphonic) detection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordResult {
    pub pitches_hz: Vec<f64>,
    pub confidence: f64,
}

impl ChordResult {
    /// # Returns
    /// * `ChordResult` - the "no chord" sentinel: an empty pitch list with zero confidence
    pub fn empty() -> Self {
        Self {
            pitches_hz: Vec::new(),
            confidence: 0.0,
        }
    }

    /// # Returns
    /// * `bool` - `true` if no pitches were found
    pub fn is_empty(&self) -> bool {
        self.pitches_hz.is_empty()
    }
}

/// A single peak found in a magnitude spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SpectralPeak {
    pub frequency_hz: f64,
    pub magnitude: f64,
}

/// Selects which monophonic detector (or meta-detector) to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorKind {
    Yin,
    Mpm,
    FftPeak,
    ZcrSpectral,
    Hybrid,
    Chord,
}

/// Common contract for every monophonic pitch detector.
///
/// Implementors read the process-wide [`FrequencyRange`] (passed in as a
/// snapshot, never re-read mid-call) and must not mutate the input buffer.
pub trait Detector {
    /// # Arguments
    /// * `buffer` - mono PCM samples, not mutated
    /// * `sample_rate` - sample rate of `buffer` in Hz
    /// * `range` - frequency bounds a detected fundamental must respect
    ///
    /// # Returns
    /// * `PitchResult` - a pitch/confidence pair, or [`NO_PITCH`] if none was found
    fn detect(&self, buffer: &[f64], sample_rate: u32, range: FrequencyRange) -> PitchResult;
}

/// Defensive precondition check shared by every detector: a sample rate of
/// zero or a too-short buffer can never yield a pitch.
///
/// # Arguments
/// * `buffer` - candidate input buffer
/// * `sample_rate` - candidate sample rate in Hz
///
/// # Returns
/// * `bool` - `true` if `buffer`/`sample_rate` are usable by a detector
pub(crate) fn preconditions_ok(buffer: &[f64], sample_rate: u32) -> bool {
    sample_rate > 0 && buffer.len() >= 2
}
