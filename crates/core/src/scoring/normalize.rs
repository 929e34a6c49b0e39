/// Score given when a value is missing or the universe has no spread on a metric.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Rescale `value` from `[min, max]` onto `0..=100`.
///
/// `reverse` flips the scale so that lower raw values score higher. A missing or
/// non-finite value, or a degenerate range, yields [`NEUTRAL_SCORE`].
pub fn normalize(value: Option<f64>, min: f64, max: f64, reverse: bool) -> f64 {
    let Some(value) = value.filter(|v| v.is_finite()) else {
        return NEUTRAL_SCORE;
    };
    if min == max {
        return NEUTRAL_SCORE;
    }

    let normalized = ((value - min) / (max - min)) * 100.0;
    if reverse {
        100.0 - normalized
    } else {
        normalized
    }
}

/// Observed spread of one metric across the scored set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

impl MinMax {
    /// `None` when no finite value is present.
    pub fn from_values<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some(MinMax { min: v, max: v }),
                Some(m) => Some(MinMax {
                    min: m.min.min(v),
                    max: m.max.max(v),
                }),
            })
    }

    pub fn score(&self, value: Option<f64>, reverse: bool) -> f64 {
        normalize(value, self.min, self.max, reverse)
    }
}
