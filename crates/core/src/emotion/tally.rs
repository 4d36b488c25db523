use crate::emotion::Emotion;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Session-wide count of accepted samples per dominant label.
///
/// Counts only ever grow, by one per accepted sample, so `total()` equals the
/// number of frames classified with a face.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct EmotionTally {
    counts: BTreeMap<Emotion, u32>,
}

impl EmotionTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tally from precomputed counts; zero counts are dropped.
    pub fn from_counts(counts: impl IntoIterator<Item = (Emotion, u32)>) -> Self {
        let mut tally = Self::new();
        for (emotion, count) in counts {
            if count > 0 {
                *tally.counts.entry(emotion).or_insert(0) += count;
            }
        }
        tally
    }

    pub(crate) fn record(&mut self, emotion: Emotion) -> u32 {
        let count = self.counts.entry(emotion).or_insert(0);
        *count += 1;
        *count
    }

    pub fn get(&self, emotion: Emotion) -> u32 {
        self.counts.get(&emotion).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().map(|c| u64::from(*c)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, u32)> + '_ {
        self.counts.iter().map(|(e, c)| (*e, *c))
    }

    /// Most frequent label; ties go to the earlier label in [`Emotion::ALL`].
    pub fn dominant(&self) -> Option<Emotion> {
        let mut best: Option<(Emotion, u32)> = None;
        for (emotion, count) in self.iter() {
            match best {
                Some((_, top)) if count <= top => {}
                _ => best = Some((emotion, count)),
            }
        }
        best.map(|(e, _)| e)
    }

    /// Compact JSON object, e.g. `{"happy":3,"sad":1}`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}

impl fmt::Display for EmotionTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (emotion, count)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{emotion}: {count}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_increments_and_total_tracks_sum() {
        let mut tally = EmotionTally::new();
        assert!(tally.is_empty());
        assert_eq!(tally.record(Emotion::Happy), 1);
        assert_eq!(tally.record(Emotion::Happy), 2);
        assert_eq!(tally.record(Emotion::Sad), 1);
        assert_eq!(tally.get(Emotion::Happy), 2);
        assert_eq!(tally.get(Emotion::Fear), 0);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn dominant_prefers_count_then_enumeration_order() {
        let tally = EmotionTally::from_counts([(Emotion::Neutral, 2), (Emotion::Happy, 2)]);
        assert_eq!(tally.dominant(), Some(Emotion::Happy));

        let tally = EmotionTally::from_counts([(Emotion::Neutral, 3), (Emotion::Happy, 2)]);
        assert_eq!(tally.dominant(), Some(Emotion::Neutral));

        assert_eq!(EmotionTally::new().dominant(), None);
    }

    #[test]
    fn zero_counts_are_not_stored() {
        let tally = EmotionTally::from_counts([(Emotion::Angry, 0)]);
        assert!(tally.is_empty());
    }

    #[test]
    fn json_and_display_forms() {
        let tally = EmotionTally::from_counts([(Emotion::Sad, 1), (Emotion::Happy, 3)]);
        assert_eq!(tally.to_json(), r#"{"happy":3,"sad":1}"#);
        assert_eq!(tally.to_string(), "{happy: 3, sad: 1}");
    }
}
