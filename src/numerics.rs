//! # Numerics Module
//!
//! Shared building blocks for every detector: windowing, FFT via RustFFT,
//! magnitude spectra, parabolic peak interpolation, RMS and Goertzel energy.
//! Every routine here is total on finite input — none of them panic, they
//! degrade to a sentinel, zero, or an unrefined value instead.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f64::consts::PI;

/// Smallest power of two that is `>= n`.
///
/// # Arguments
/// * `n` - the lower bound to round up from
///
/// # Returns
/// * `usize` - the smallest power of two `>= n` (`1` for `n <= 1`)
pub fn next_pow2(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    let mut p = 1usize;
    while p < n {
        p <<= 1;
    }
    p
}

/// Hann window coefficient at index `i` of a window of length `len`.
///
/// # Arguments
/// * `i` - sample index within the window
/// * `len` - total window length
///
/// # Returns
/// * `f64` - the coefficient `0.5 * (1 - cos(2*pi*i/(len-1)))`, or `1.0`
///   when `len <= 1`
pub fn hann_coefficient(i: usize, len: usize) -> f64 {
    if len <= 1 {
        return 1.0;
    }
    0.5 * (1.0 - (2.0 * PI * i as f64 / (len - 1) as f64).cos())
}

/// Applies a Hann window to `buffer` in place, using `buffer.len()` as the
/// window length (not the eventual FFT size — callers zero-pad afterwards).
///
/// # Arguments
/// * `buffer` - samples to window, modified in place
pub fn apply_hann_window(buffer: &mut [f64]) {
    let len = buffer.len();
    for (i, sample) in buffer.iter_mut().enumerate() {
        *sample *= hann_coefficient(i, len);
    }
}

/// Hann-windows `signal` (using its own length) and zero-pads to `fft_size`,
/// then runs a forward FFT through RustFFT, returning the lower
/// `fft_size / 2` complex bins.
///
/// # Arguments
/// * `signal` - input audio samples; not modified, windowed into a scratch copy
/// * `fft_size` - must be a power of two `>= signal.len()`
///
/// # Returns
/// * `Vec<Complex<f64>>` - the non-redundant lower half of the forward spectrum
pub fn windowed_fft(signal: &[f64], fft_size: usize) -> Vec<Complex<f64>> {
    let mut windowed = signal.to_vec();
    apply_hann_window(&mut windowed);
    windowed.resize(fft_size, 0.0);

    let mut buffer: Vec<Complex<f64>> = windowed
        .into_iter()
        .map(|sample| Complex { re: sample, im: 0.0 })
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut buffer);

    buffer.truncate(fft_size / 2);
    buffer
}

/// Magnitude spectrum `|X_k| = sqrt(re^2 + im^2)` of a complex spectrum.
///
/// # Arguments
/// * `spectrum` - complex FFT bins, e.g. from [`windowed_fft`]
///
/// # Returns
/// * `Vec<f64>` - the per-bin magnitude
pub fn magnitude_spectrum(spectrum: &[Complex<f64>]) -> Vec<f64> {
    spectrum.iter().map(|c| c.norm()).collect()
}

/// Normalizes a spectrum in place by dividing every bin by its maximum.
/// Leaves the spectrum unchanged if the maximum is (near) zero.
///
/// # Arguments
/// * `spectrum` - magnitude spectrum, modified in place
pub fn normalize_by_max(spectrum: &mut [f64]) {
    let max = spectrum.iter().cloned().fold(0.0_f64, f64::max);
    if max > 1e-12 {
        for v in spectrum.iter_mut() {
            *v /= max;
        }
    }
}

/// Parabolic interpolation of a peak at index `k`, given its neighbors.
/// Returns the refined (fractional) index. Falls back to `k as f64`
/// unchanged if the denominator is near-zero or the adjustment is
/// implausibly large (> 1 bin), per the documented safeguards.
///
/// # Arguments
/// * `values` - the array the peak was found in
/// * `k` - the integer index of the peak
///
/// # Returns
/// * `f64` - the refined, fractional index
pub fn parabolic_interpolate(values: &[f64], k: usize) -> f64 {
    if k == 0 || k + 1 >= values.len() {
        return k as f64;
    }
    let x0 = values[k - 1];
    let x1 = values[k];
    let x2 = values[k + 1];
    let denom = x0 - 2.0 * x1 + x2;
    if denom.abs() < 1e-10 {
        return k as f64;
    }
    let adjustment = (x0 - x2) / (2.0 * denom);
    if adjustment.abs() > 1.0 {
        return k as f64;
    }
    k as f64 + adjustment
}

/// Unscaled root-mean-square amplitude of a buffer.
///
/// # Arguments
/// * `buffer` - samples to measure
///
/// # Returns
/// * `f64` - `sqrt(mean(x^2))`, or `0.0` for an empty buffer
pub fn rms(buffer: &[f64]) -> f64 {
    if buffer.is_empty() {
        return 0.0;
    }
    (buffer.iter().map(|&s| s * s).sum::<f64>() / buffer.len() as f64).sqrt()
}

/// Single-bin Goertzel energy at frequency `freq_hz` over `buffer`.
///
/// # Arguments
/// * `buffer` - samples to analyze
/// * `freq_hz` - target frequency in Hz
/// * `sample_rate` - sample rate in Hz
///
/// # Returns
/// * `f64` - the single-bin energy at `freq_hz`
pub fn goertzel_energy(buffer: &[f64], freq_hz: f64, sample_rate: u32) -> f64 {
    let omega = 2.0 * PI * freq_hz / sample_rate as f64;
    let coeff = 2.0 * omega.cos();
    let mut q1 = 0.0;
    let mut q2 = 0.0;
    for &x in buffer {
        let q0 = coeff * q1 - q2 + x;
        q2 = q1;
        q1 = q0;
    }
    q1 * q1 + q2 * q2 - coeff * q1 * q2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_pow2_rounds_up() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(2), 2);
        assert_eq!(next_pow2(513), 1024);
        assert_eq!(next_pow2(1024), 1024);
    }

    #[test]
    fn hann_window_is_zero_at_edges_and_one_in_middle() {
        let len = 9;
        assert!(hann_coefficient(0, len).abs() < 1e-9);
        assert!(hann_coefficient(len - 1, len).abs() < 1e-9);
        assert!((hann_coefficient(len / 2, len) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fft_of_pure_tone_peaks_at_expected_bin() {
        let sr = 8192.0;
        let n = 1024;
        let bin_hz = sr / n as f64;
        let target_bin = 64; // freq = 64 * bin_hz
        let freq = target_bin as f64 * bin_hz;
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sr).sin())
            .collect();

        let mut buf: Vec<Complex<f64>> = signal.into_iter().map(|s| Complex::new(s, 0.0)).collect();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);
        fft.process(&mut buf);
        let mag = magnitude_spectrum(&buf[..n / 2]);

        let (peak_bin, _) = mag
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        assert_eq!(peak_bin, target_bin);
    }

    #[test]
    fn windowed_fft_of_pure_tone_peaks_near_expected_bin() {
        let sr = 44100u32;
        let n = 4096;
        let freq = 440.0;
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sr as f64).sin())
            .collect();

        let spectrum = windowed_fft(&signal, n);
        assert_eq!(spectrum.len(), n / 2);
        let mag = magnitude_spectrum(&spectrum);
        let (peak_bin, _) = mag
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        let bin_hz = sr as f64 / n as f64;
        let peak_hz = peak_bin as f64 * bin_hz;
        assert!((peak_hz - freq).abs() < bin_hz * 2.0);
    }

    #[test]
    fn parabolic_interpolate_refines_toward_larger_neighbor() {
        let values = [0.0, 0.5, 1.0, 0.8, 0.0];
        let refined = parabolic_interpolate(&values, 2);
        assert!(refined > 2.0 && refined < 2.5);
    }

    #[test]
    fn parabolic_interpolate_falls_back_at_edges() {
        let values = [1.0, 0.5];
        assert_eq!(parabolic_interpolate(&values, 0), 0.0);
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&[0.0; 100]), 0.0);
    }

    #[test]
    fn goertzel_energy_is_larger_at_matching_frequency() {
        let sr = 44100u32;
        let freq = 440.0;
        let n = 2048;
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sr as f64).sin())
            .collect();
        let on_target = goertzel_energy(&signal, freq, sr);
        let off_target = goertzel_energy(&signal, freq * 3.0, sr);
        assert!(on_target > off_target);
    }
}
