use std::collections::BTreeMap;

use statrs::statistics::Statistics;

use crate::rating::RatingState;
use crate::{EloError, ItemKey};

/// Where Elo ratings are split into positive and negative labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LabelPolicy {
    /// Positive iff rating > 0. Meaningful for zero-initialized ratings.
    #[default]
    ZeroThreshold,
    /// Positive iff rating > the median rating of the evaluated items.
    MedianSplit,
}

/// Upper median: element `len / 2` of the ascending ratings.
pub fn median_rating<K: ItemKey>(state: &RatingState<K>) -> Option<f64> {
    let mut ratings: Vec<f64> = state.iter().map(|(_, rating)| rating).collect();
    ratings.sort_by(f64::total_cmp);
    ratings.get(ratings.len() / 2).copied()
}

pub fn threshold_labels<K: ItemKey>(state: &RatingState<K>, threshold: f64) -> BTreeMap<K, bool> {
    state
        .iter()
        .map(|(item, rating)| (item.clone(), rating > threshold))
        .collect()
}

pub fn elo_labels<K: ItemKey>(state: &RatingState<K>, policy: LabelPolicy) -> BTreeMap<K, bool> {
    let threshold = match policy {
        LabelPolicy::ZeroThreshold => 0.0,
        LabelPolicy::MedianSplit => median_rating(state).unwrap_or(0.0),
    };
    threshold_labels(state, threshold)
}

/// Positive iff strictly more than half of the item's votes are positive.
pub fn majority_vote_labels<K: ItemKey>(votes: &BTreeMap<K, Vec<bool>>) -> BTreeMap<K, bool> {
    votes
        .iter()
        .map(|(item, item_votes)| {
            let positive = item_votes.iter().filter(|&&v| v).count();
            (item.clone(), 2 * positive > item_votes.len())
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Confusion {
    pub true_positive: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_negative: usize,
}

impl Confusion {
    /// Counts over the shared key set. Fails if the key sets differ.
    pub fn tally<K: ItemKey>(
        truth: &BTreeMap<K, bool>,
        estimated: &BTreeMap<K, bool>,
    ) -> Result<Self, EloError<K>> {
        if let Some(item) = estimated.keys().find(|item| !truth.contains_key(*item)) {
            return Err(EloError::KeySetMismatch { missing: item.clone() });
        }

        let mut confusion = Confusion::default();
        for (item, &actual) in truth {
            let predicted = *estimated
                .get(item)
                .ok_or_else(|| EloError::KeySetMismatch { missing: item.clone() })?;
            match (actual, predicted) {
                (true, true) => confusion.true_positive += 1,
                (false, true) => confusion.false_positive += 1,
                (true, false) => confusion.false_negative += 1,
                (false, false) => confusion.true_negative += 1,
            }
        }
        Ok(confusion)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    /// F1 of the positive class; 0 when it is undefined.
    pub fn f1(&self) -> f64 {
        ratio(
            2 * self.true_positive,
            2 * self.true_positive + self.false_positive + self.false_negative,
        )
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// F1 of the positive class, with both label maps aligned on their sorted
/// key order.
pub fn f1_score<K: ItemKey>(
    truth: &BTreeMap<K, bool>,
    estimated: &BTreeMap<K, bool>,
) -> Result<f64, EloError<K>> {
    Ok(Confusion::tally(truth, estimated)?.f1())
}

/// Estimated positive rate minus true positive rate over the items whose
/// sensitive flag is set. NaN when no item is flagged.
pub fn bias<K: ItemKey>(
    truth: &BTreeMap<K, bool>,
    estimated: &BTreeMap<K, bool>,
    sensitive: &BTreeMap<K, bool>,
) -> Result<f64, EloError<K>> {
    let mut true_rates = Vec::new();
    let mut estimated_rates = Vec::new();
    for (item, _) in sensitive.iter().filter(|(_, flag)| **flag) {
        let actual = truth
            .get(item)
            .ok_or_else(|| EloError::ItemNotFound(item.clone()))?;
        let predicted = estimated
            .get(item)
            .ok_or_else(|| EloError::ItemNotFound(item.clone()))?;
        true_rates.push(if *actual { 1.0 } else { 0.0 });
        estimated_rates.push(if *predicted { 1.0 } else { 0.0 });
    }

    Ok(estimated_rates.mean() - true_rates.mean())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn labels(values: &[bool]) -> BTreeMap<usize, bool> {
        values.iter().copied().enumerate().collect()
    }

    #[test]
    fn test_f1_of_positive_class() {
        let truth = labels(&[true, true, true, false, false, false]);
        let estimated = labels(&[true, true, false, true, false, false]);

        let confusion = Confusion::tally(&truth, &estimated).unwrap();
        assert_eq!(
            confusion,
            Confusion {
                true_positive: 2,
                false_positive: 1,
                false_negative: 1,
                true_negative: 2
            }
        );
        assert_relative_eq!(confusion.precision(), 2.0 / 3.0);
        assert_relative_eq!(confusion.recall(), 2.0 / 3.0);
        assert_relative_eq!(f1_score(&truth, &estimated).unwrap(), 2.0 / 3.0);
    }

    #[test]
    fn test_f1_is_zero_without_positive_predictions() {
        let truth = labels(&[true, false, true]);
        let estimated = labels(&[false, false, false]);
        assert_eq!(f1_score(&truth, &estimated).unwrap(), 0.0);
        assert_eq!(f1_score(&truth, &truth).unwrap(), 1.0);
    }

    #[test]
    fn test_f1_rejects_mismatched_keys() {
        let truth = labels(&[true, false]);
        let estimated = labels(&[true, false, true]);
        assert!(matches!(
            f1_score(&truth, &estimated),
            Err(EloError::KeySetMismatch { missing: 2 })
        ));
        assert!(matches!(
            f1_score(&estimated, &truth),
            Err(EloError::KeySetMismatch { missing: 2 })
        ));
    }

    #[test]
    fn test_bias_restricted_to_flagged_items() {
        let truth = labels(&[false, false, true, true]);
        let estimated = labels(&[true, true, true, false]);
        let sensitive = labels(&[true, false, true, true]);

        // flagged items 0, 2, 3: estimated 2/3 positive, truth 2/3 positive
        assert_relative_eq!(bias(&truth, &estimated, &sensitive).unwrap(), 0.0);

        let sensitive = labels(&[true, true, false, false]);
        assert_relative_eq!(bias(&truth, &estimated, &sensitive).unwrap(), 1.0);

        let nobody = labels(&[false, false, false, false]);
        assert!(bias(&truth, &estimated, &nobody).unwrap().is_nan());
    }

    #[test]
    fn test_majority_vote_needs_strict_majority() {
        let mut votes = BTreeMap::new();
        votes.insert(0usize, vec![true, true, false]);
        votes.insert(1usize, vec![true, false, false]);
        votes.insert(2usize, vec![true, true, false, false]);
        votes.insert(3usize, vec![true, true, true, false]);
        votes.insert(4usize, vec![]);

        let labels = majority_vote_labels(&votes);
        assert_eq!(labels.values().copied().collect::<Vec<_>>(), vec![true, false, false, true, false]);
    }

    #[test]
    fn test_label_policies() {
        let state = RatingState::from_ratings(
            [(0usize, -2.0), (1, 1.0), (2, 3.0), (3, 4.0), (4, 5.0)].into_iter().collect(),
        );

        assert_eq!(median_rating(&state), Some(3.0));
        let zero = elo_labels(&state, LabelPolicy::ZeroThreshold);
        assert_eq!(zero.values().filter(|&&l| l).count(), 4);
        let median = elo_labels(&state, LabelPolicy::MedianSplit);
        assert_eq!(median.values().filter(|&&l| l).count(), 2);
        assert!(median[&3] && median[&4] && !median[&2]);
    }
}
