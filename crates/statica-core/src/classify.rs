//! Top-1 interpretation of a class score vector.

/// The single highest-scoring class in a score vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Index of the highest score (first one wins on ties).
    pub index: usize,
    /// Raw score at `index`.
    pub score: f32,
    /// Softmax probability of `index` over the whole vector.
    pub probability: f32,
}

impl Classification {
    /// Pick the top-1 class.
    ///
    /// NaN scores are ignored, both for the arg-max and the probability.
    /// Returns `None` when no score is a number.
    pub fn from_scores(scores: &[f32]) -> Option<Self> {
        let (index, &score) = scores
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_nan())
            .fold(None, |best: Option<(usize, &f32)>, (i, s)| match best {
                Some((_, b)) if *s <= *b => best,
                _ => Some((i, s)),
            })?;

        // exp(s - max) sums to >= 1, so no division by zero.
        let sum: f32 = scores
            .iter()
            .filter(|s| !s.is_nan())
            .map(|s| (s - score).exp())
            .sum();

        Some(Self {
            index,
            score,
            probability: 1.0 / sum,
        })
    }

    /// Probability as a percentage.
    pub fn confidence_percent(&self) -> f32 {
        self.probability * 100.0
    }
}
