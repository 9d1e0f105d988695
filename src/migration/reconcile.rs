//! Audio key reconciliation
//!
//! Legacy recordings and their audio were written at slightly different times
//! and may carry different ids. A record is paired with audio stored under its
//! own id, or else with the audio key whose embedded epoch is closest to its own.

use crate::recorder::state::recording_id_epoch_ms;

/// How a legacy record was paired with audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMatch<'a> {
    /// Audio stored under the record's own id
    Exact(&'a str),
    /// Audio whose embedded epoch is within the window
    Nearest { key: &'a str, distance_ms: i64 },
}

impl<'a> AudioMatch<'a> {
    pub fn key(&self) -> &'a str {
        match self {
            AudioMatch::Exact(key) => key,
            AudioMatch::Nearest { key, .. } => key,
        }
    }
}

/// Find the audio key belonging to `record_id`
///
/// Heuristic matches need `|Δ| < window_ms` and the smallest distance wins;
/// ties go to the lexicographically smaller key so the result does not depend
/// on iteration order.
pub fn match_audio_key<'a, I>(record_id: &str, audio_keys: I, window_ms: i64) -> Option<AudioMatch<'a>>
where
    I: IntoIterator<Item = &'a str>,
{
    let record_epoch = recording_id_epoch_ms(record_id);
    let mut best: Option<(i64, &'a str)> = None;

    for key in audio_keys {
        if key == record_id {
            return Some(AudioMatch::Exact(key));
        }
        let (Some(record_epoch), Some(key_epoch)) = (record_epoch, recording_id_epoch_ms(key))
        else {
            continue;
        };
        let distance = (record_epoch - key_epoch).abs();
        if distance >= window_ms {
            continue;
        }
        let closer = match best {
            None => true,
            Some((best_distance, best_key)) => (distance, key) < (best_distance, best_key),
        };
        if closer {
            best = Some((distance, key));
        }
    }

    best.map(|(distance_ms, key)| AudioMatch::Nearest { key, distance_ms })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 3_600_000;

    #[test]
    fn test_exact_match_wins() {
        let keys = ["recording_1001_b", "recording_1000_a"];
        let found = match_audio_key("recording_1000_a", keys, HOUR_MS).unwrap();
        assert_eq!(found, AudioMatch::Exact("recording_1000_a"));
    }

    #[test]
    fn test_nearest_within_window() {
        let keys = ["recording_1500_x"];
        let found = match_audio_key("recording_1000_a", keys, HOUR_MS).unwrap();
        assert_eq!(
            found,
            AudioMatch::Nearest {
                key: "recording_1500_x",
                distance_ms: 500
            }
        );
    }

    #[test]
    fn test_outside_window_is_unmatched() {
        let keys = ["recording_5000000_x"];
        assert!(match_audio_key("recording_1000_a", keys, HOUR_MS).is_none());
    }

    #[test]
    fn test_window_is_exclusive() {
        let keys = ["recording_3601000_x"];
        assert!(match_audio_key("recording_1000_a", keys, HOUR_MS).is_none());
    }

    #[test]
    fn test_closest_wins_regardless_of_order() {
        let keys = ["recording_9000_far", "recording_1200_near", "recording_800_tie"];
        let found = match_audio_key("recording_1000_a", keys, HOUR_MS).unwrap();
        assert_eq!(found.key(), "recording_1200_near");

        let reversed = ["recording_800_tie", "recording_1200_near", "recording_9000_far"];
        let found = match_audio_key("recording_1000_a", reversed, HOUR_MS).unwrap();
        assert_eq!(found.key(), "recording_1200_near");
    }

    #[test]
    fn test_ids_without_epoch() {
        let keys = ["voice-memo", "recording_1000_a"];
        assert!(match_audio_key("custom-id", keys, HOUR_MS).is_none());
        assert_eq!(
            match_audio_key("voice-memo", keys, HOUR_MS),
            Some(AudioMatch::Exact("voice-memo"))
        );
    }
}
