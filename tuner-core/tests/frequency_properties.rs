use proptest::prelude::*;
use tuner_core::frequency::{
    cents_to_frequency, frequency_to_cents, nearest_string, string_index_by_name,
    string_target_frequencies, string_target_frequency, STRINGS,
};
use tuner_core::reference_pitch::{MAX_REFERENCE_PITCH, MIN_REFERENCE_PITCH};

proptest! {
    #[test]
    fn higher_strings_have_higher_targets(reference in MIN_REFERENCE_PITCH..=MAX_REFERENCE_PITCH) {
        let mut by_semitones: Vec<_> = STRINGS
            .iter()
            .map(|string| (string.semitones, string_target_frequency(string.index, reference).unwrap()))
            .collect();
        by_semitones.sort_by_key(|(semitones, _)| *semitones);

        for pair in by_semitones.windows(2) {
            prop_assert!(pair[0].1 < pair[1].1);
        }
    }

    #[test]
    fn targets_scale_with_reference(reference in MIN_REFERENCE_PITCH..=MAX_REFERENCE_PITCH, k in 0.5f64..2.0) {
        let base = string_target_frequencies(reference);
        let scaled = string_target_frequencies(reference * k);
        for (b, s) in base.iter().zip(scaled.iter()) {
            prop_assert!((s - b * k).abs() <= 1e-9 * s.abs());
        }
    }

    #[test]
    fn cents_survive_a_frequency_round_trip(cents in -2400.0f64..2400.0, reference in 20.0f64..5000.0) {
        let back = frequency_to_cents(cents_to_frequency(cents, reference), reference);
        prop_assert!((back - cents).abs() <= 1e-9 * cents.abs().max(1.0));
    }
}

#[test]
fn a2_follows_the_literal_formula() {
    let a2 = string_index_by_name("A2").unwrap();
    let target = string_target_frequency(a2, 440.0).unwrap();
    assert_eq!(target, 880.0);

    let found = nearest_string(target, 440.0, 50.0).unwrap();
    assert_eq!(found.index, a2);
    assert!(found.deviation_cents.abs() < 1e-9);
}

#[test]
fn nothing_matches_far_from_every_string() {
    assert!(nearest_string(100.0, 440.0, 50.0).is_none());
    assert!(nearest_string(5000.0, 440.0, 50.0).is_none());

    // A whole tone above D3 is 300 cents below G3.
    let d3 = string_target_frequency(3, 440.0).unwrap();
    assert!(nearest_string(cents_to_frequency(200.0, d3), 440.0, 50.0).is_none());
}
