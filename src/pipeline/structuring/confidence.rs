use serde::{Deserialize, Serialize};

/// Penalties subtracted from a candidate's confidence.
pub mod penalty {
    /// Per edit between the printed name and the lexicon variant.
    pub const NAME_EDIT: u8 = 15;

    /// Value taken from the line after the name.
    pub const CROSS_LINE: u8 = 20;

    /// Unit printed but not one the biomarker is measured in.
    pub const UNIT_MISMATCH: u8 = 10;

    /// Value outside the biomarker's plausible bounds.
    pub const OUT_OF_BOUNDS: u8 = 50;
}

/// Relative match quality, 0-100. Only compared between candidates of the
/// same document; not a probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Confidence(u8);

impl Confidence {
    pub const MAX: Confidence = Confidence(100);

    /// Below this a retained value is flagged low-confidence.
    pub const LOW_THRESHOLD: u8 = 50;

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn penalize(self, points: u8) -> Self {
        Self(self.0.saturating_sub(points))
    }

    pub fn is_low(self) -> bool {
        self.0 < Self::LOW_THRESHOLD
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalties_saturate_at_zero() {
        let c = Confidence::MAX
            .penalize(penalty::OUT_OF_BOUNDS)
            .penalize(penalty::OUT_OF_BOUNDS)
            .penalize(penalty::CROSS_LINE);
        assert_eq!(c.value(), 0);
    }

    #[test]
    fn single_edit_stays_confident() {
        let c = Confidence::MAX.penalize(penalty::NAME_EDIT);
        assert!(!c.is_low());
        assert!(c < Confidence::MAX);
    }

    #[test]
    fn threshold_itself_is_not_low() {
        assert!(!Confidence(Confidence::LOW_THRESHOLD).is_low());
        assert!(Confidence(Confidence::LOW_THRESHOLD - 1).is_low());
    }

    #[test]
    fn out_of_bounds_plus_edit_is_low() {
        let c = Confidence::MAX
            .penalize(penalty::OUT_OF_BOUNDS)
            .penalize(penalty::NAME_EDIT);
        assert!(c.is_low());
    }
}
