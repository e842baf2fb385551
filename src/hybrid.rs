//! # Hybrid dispatcher
//!
//! Routes a buffer to whichever monophonic detector best matches its
//! spectral energy distribution instead of always paying for all four.
//!
//! Two strategies are described in the originating spec: an FFT-first
//! routing scheme, and a Goertzel energy-driven one. This crate implements
//! the **Goertzel energy-driven strategy** (Strategy B) as the production
//! path — it needs only two single-bin energy probes per call instead of a
//! full FFT before routing, which matters more for a real-time tuner tick
//! than the marginal accuracy difference between the two schemes. See
//! DESIGN.md for the full rationale.

use crate::config::{FrequencyRange, HybridThresholds};
use crate::detector::{Detector, PitchResult, NO_PITCH};
use crate::noise::is_noise_like;
use crate::numerics::goertzel_energy;
use crate::{fft_detector, mpm, yin};

/// Runs the Goertzel-energy-driven hybrid dispatcher over `buffer`.
///
/// # Arguments
/// * `buffer` - mono PCM samples
/// * `sample_rate` - sample rate of `buffer` in Hz
/// * `range` - frequency bounds passed through to whichever detector is routed to
/// * `thresholds` - Goertzel-energy routing thresholds
///
/// # Returns
/// * `PitchResult` - the routed detector's result, or [`NO_PITCH`] if the
///   noise gate trips or every attempted detector comes up empty
pub fn detect(
    buffer: &[f64],
    sample_rate: u32,
    range: FrequencyRange,
    thresholds: HybridThresholds,
) -> PitchResult {
    if buffer.len() < 2 || sample_rate == 0 {
        return NO_PITCH;
    }
    if is_noise_like(buffer) {
        return NO_PITCH;
    }

    let low_freq_energy = goertzel_energy(buffer, thresholds.low_freq_hz, sample_rate);

    let (primary_kind, primary_result) = if low_freq_energy > thresholds.low_energy {
        (Kind::Yin, yin::detect(buffer, sample_rate, range))
    } else {
        let high_freq_energy = goertzel_energy(buffer, thresholds.high_freq_hz, sample_rate);
        if high_freq_energy > thresholds.high_energy {
            (Kind::Fft, fft_detector::detect(buffer, sample_rate, range))
        } else {
            (Kind::Mpm, mpm::detect(buffer, sample_rate, range))
        }
    };

    if primary_result.is_pitch() {
        log::trace!("hybrid: routed to {primary_kind:?}");
        return primary_result;
    }
    if primary_kind == Kind::Yin {
        return primary_result;
    }

    log::trace!("hybrid: {primary_kind:?} found nothing, falling back to Yin");
    yin::detect(buffer, sample_rate, range)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Yin,
    Mpm,
    Fft,
}

/// Zero-sized marker implementing [`Detector`]; reads the process-wide
/// hybrid thresholds at call time via [`crate::config::hybrid_thresholds`].
#[derive(Debug, Default, Clone, Copy)]
pub struct HybridDetector;

impl Detector for HybridDetector {
    fn detect(&self, buffer: &[f64], sample_rate: u32, range: FrequencyRange) -> PitchResult {
        let thresholds = crate::config::hybrid_thresholds();
        detect(buffer, sample_rate, range, thresholds)
    }
}
