//! # Note utilities
//!
//! Cent arithmetic and a note-name display, generalized from the teacher's
//! fixed 88-key (A0-C8) lookup table in `tuning.rs` to a closed-form
//! semitone computation from A440. A harmonica's useful range routinely
//! falls outside a based-on-piano-keys window, so a table walk is replaced
//! by direct math; every A0-C8 frequency still matches the old table to
//! within floating-point tolerance.

const A4_HZ: f64 = 440.0;
const A4_MIDI: i32 = 69;
const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Cents between two frequencies.
///
/// # Arguments
/// * `f1` - first frequency in Hz
/// * `f2` - reference frequency in Hz
///
/// # Returns
/// * `f64` - `1200 * log2(f1 / f2)`
pub fn cents(f1: f64, f2: f64) -> f64 {
    1200.0 * (f1 / f2).log2()
}

/// Adds `cents` worth of pitch shift to `f`.
///
/// # Arguments
/// * `cents` - pitch shift in cents (1/1200 of an octave)
/// * `f` - base frequency in Hz
///
/// # Returns
/// * `f64` - `f * 2^(cents/1200)`
pub fn add_cents(cents: f64, f: f64) -> f64 {
    f * 2f64.powf(cents / 1200.0)
}

/// A note name with octave (e.g. `"A4"`, `"C#3"`) and the frequency it
/// names under 12-tone equal temperament referenced to A4 = 440 Hz.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedNote {
    pub name: String,
    pub frequency_hz: f64,
}

/// Nearest MIDI note number (not clamped to any particular octave range)
/// to a frequency.
///
/// # Arguments
/// * `freq_hz` - frequency in Hz
///
/// # Returns
/// * `i32` - the nearest MIDI note number; `A4_MIDI` for non-positive input
fn nearest_midi_note(freq_hz: f64) -> i32 {
    if freq_hz <= 0.0 {
        return A4_MIDI;
    }
    (A4_MIDI as f64 + 12.0 * (freq_hz / A4_HZ).log2()).round() as i32
}

/// Frequency of a MIDI note number under equal temperament, A4 = 440 Hz.
///
/// # Arguments
/// * `midi_note` - MIDI note number
///
/// # Returns
/// * `f64` - the note's frequency in Hz
pub fn midi_note_frequency(midi_note: i32) -> f64 {
    A4_HZ * 2f64.powf((midi_note - A4_MIDI) as f64 / 12.0)
}

fn midi_note_name(midi_note: i32) -> String {
    let semitone = midi_note.rem_euclid(12) as usize;
    let octave = midi_note.div_euclid(12) - 1;
    format!("{}{}", NOTE_NAMES[semitone], octave)
}

/// Finds the nearest equal-temperament note to `freq_hz`, returning its
/// name and exact target frequency. Mirrors the teacher's
/// `find_nearest_note`, generalized beyond the 88-key piano window.
///
/// # Arguments
/// * `freq_hz` - frequency in Hz
///
/// # Returns
/// * `NamedNote` - the nearest note's name and exact frequency
pub fn find_nearest_note(freq_hz: f64) -> NamedNote {
    let midi_note = nearest_midi_note(freq_hz);
    NamedNote {
        name: midi_note_name(midi_note),
        frequency_hz: midi_note_frequency(midi_note),
    }
}

/// Cent deviation of `freq_hz` from the nearest equal-temperament note.
/// Positive values are sharp, negative values are flat.
///
/// # Arguments
/// * `freq_hz` - frequency in Hz
///
/// # Returns
/// * `f64` - signed cent deviation from the nearest note
pub fn cents_from_nearest_note(freq_hz: f64) -> f64 {
    let nearest = find_nearest_note(freq_hz);
    cents(freq_hz, nearest.frequency_hz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_of_equal_frequencies_is_zero() {
        assert!((cents(261.63, 261.63)).abs() < 1e-9);
    }

    #[test]
    fn cents_of_an_octave_is_1200() {
        assert!((cents(523.26, 261.63) - 1200.0).abs() < 1e-6);
    }

    #[test]
    fn add_cents_inverts_cents() {
        let a = 329.63;
        let b = 261.63;
        let c = cents(a, b);
        let reconstructed = add_cents(c, b);
        assert!((reconstructed - a).abs() < 1e-6);
    }

    #[test]
    fn a4_resolves_to_440() {
        let note = find_nearest_note(440.0);
        assert_eq!(note.name, "A4");
        assert!((note.frequency_hz - 440.0).abs() < 1e-9);
    }

    #[test]
    fn c4_resolves_to_261_63() {
        let note = find_nearest_note(261.63);
        assert_eq!(note.name, "C4");
        assert!((note.frequency_hz - 261.6256).abs() < 0.01);
    }

    #[test]
    fn nearest_note_handles_slightly_sharp_frequency() {
        let note = find_nearest_note(442.0);
        assert_eq!(note.name, "A4");
        let deviation = cents_from_nearest_note(442.0);
        assert!(deviation > 0.0 && deviation < 20.0);
    }
}
