//! Synthetic items and raters.
//!
//! A faithful rater perceives an item's latent quality through its own
//! persistent noise and a pull toward the item's sensitive feature; a spam
//! rater answers uniformly at random. Both vote on single items and judge
//! pairs.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Beta, Distribution, Normal, StandardNormal};

use crate::rating::{Match, Outcome};
use crate::seed::{stream_rng, PERCEPTION_STREAM};
use crate::EloError;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Item {
    pub id: usize,
    /// Latent true quality.
    pub quality: f64,
    /// Sensitive ("bad") feature, only used for bias measurement.
    pub sensitive: bool,
}

/// Pairwise judgment. `Tie` means the rater could not tell the items apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Preference {
    First,
    Tie,
    Second,
}

impl Preference {
    pub fn sign(self) -> i8 {
        match self {
            Preference::First => 1,
            Preference::Tie => 0,
            Preference::Second => -1,
        }
    }

    pub fn from_sign(sign: i8) -> Self {
        match sign.signum() {
            1 => Preference::First,
            0 => Preference::Tie,
            _ => Preference::Second,
        }
    }

    pub fn outcome(self) -> Outcome {
        match self {
            Preference::First => Outcome::Win,
            Preference::Tie => Outcome::Tie,
            Preference::Second => Outcome::Lose,
        }
    }

    pub fn to_match(self, first: usize, second: usize) -> Match<usize> {
        Match::from_outcome(first, second, self.outcome())
    }
}

/// A rater that tries to judge honestly.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaithfulRater {
    id: usize,
    bias: f64,
    perception_ambiguity: f64,
    comparison_ambiguity: f64,
    feature_weight: f64,
    perception_seed: u64,
}

impl FaithfulRater {
    /// `feature_weight` must lie in `[-1, 1]`; ambiguities must be
    /// non-negative.
    pub fn new(
        id: usize,
        bias: f64,
        perception_ambiguity: f64,
        comparison_ambiguity: f64,
        feature_weight: f64,
        perception_seed: u64,
    ) -> Result<Self, EloError<usize>> {
        if !(perception_ambiguity >= 0.0 && perception_ambiguity.is_finite()) {
            return Err(EloError::InvalidParameter(format!(
                "perception ambiguity must be a non-negative number, got {perception_ambiguity}"
            )));
        }
        if !(comparison_ambiguity >= 0.0 && comparison_ambiguity.is_finite()) {
            return Err(EloError::InvalidParameter(format!(
                "comparison ambiguity must be a non-negative number, got {comparison_ambiguity}"
            )));
        }
        if !(-1.0..=1.0).contains(&feature_weight) {
            return Err(EloError::InvalidParameter(format!(
                "feature weight must lie in [-1, 1], got {feature_weight}"
            )));
        }

        Ok(FaithfulRater {
            id,
            bias,
            perception_ambiguity,
            comparison_ambiguity,
            feature_weight,
            perception_seed,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn feature_weight(&self) -> f64 {
        self.feature_weight
    }

    /// Perceived quality of `item`. A pure function of the rater, the item
    /// and the perception seed: the noise draw is keyed by
    /// `(rater id, item id)`, never by call order.
    pub fn perceive(&self, item: &Item) -> f64 {
        let mut rng = stream_rng(
            self.perception_seed,
            &[PERCEPTION_STREAM, self.id as u64, item.id as u64],
        );
        let noise: f64 = StandardNormal.sample(&mut rng);
        let theta = item.quality + self.perception_ambiguity * noise;

        let w = self.feature_weight;
        let feature = if item.sensitive { 1.0 } else { 0.0 };
        (1.0 - w * w).sqrt() * theta + w * feature
    }

    pub fn rate(&self, item: &Item) -> bool {
        self.perceive(item) > self.bias
    }

    pub fn compare(&self, first: &Item, second: &Item) -> Preference {
        let p1 = self.perceive(first);
        let p2 = self.perceive(second);

        if (p1 - p2).abs() < self.comparison_ambiguity {
            Preference::Tie
        } else if p1 > p2 {
            Preference::First
        } else {
            Preference::Second
        }
    }
}

/// A rater whose answers are pure noise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpamRater;

impl SpamRater {
    pub fn rate<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen_bool(0.5)
    }

    pub fn compare<R: Rng + ?Sized>(&self, rng: &mut R) -> Preference {
        Preference::from_sign(rng.gen_range(-1i8..=1))
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rater {
    Faithful(FaithfulRater),
    Spam(SpamRater),
}

impl Rater {
    pub fn rate<R: Rng + ?Sized>(&self, item: &Item, rng: &mut R) -> bool {
        match self {
            Rater::Faithful(rater) => rater.rate(item),
            Rater::Spam(rater) => rater.rate(rng),
        }
    }

    pub fn compare<R: Rng + ?Sized>(&self, first: &Item, second: &Item, rng: &mut R) -> Preference {
        match self {
            Rater::Faithful(rater) => rater.compare(first, second),
            Rater::Spam(rater) => rater.compare(rng),
        }
    }

    pub fn is_spam(&self) -> bool {
        matches!(self, Rater::Spam(_))
    }
}

/// Parameters of the synthetic rater pool.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RaterPopulation {
    pub raters: usize,
    pub spammers: usize,
    /// Spread (standard deviation) of the raters' personal thresholds.
    pub threshold_spread: f64,
    pub perception_ambiguity: f64,
    pub comparison_ambiguity: f64,
    /// `(alpha, beta)` of the Beta distribution behind each rater's
    /// sensitive-feature weight `2 * Beta(alpha, beta) - 1`. `None` gives
    /// every rater a weight of zero.
    pub feature_importance: Option<(f64, f64)>,
}

impl Default for RaterPopulation {
    fn default() -> Self {
        RaterPopulation {
            raters: 10,
            spammers: 0,
            threshold_spread: 0.5,
            perception_ambiguity: 0.5,
            comparison_ambiguity: 0.5,
            feature_importance: None,
        }
    }
}

impl RaterPopulation {
    pub fn validate(&self) -> Result<(), EloError<usize>> {
        if self.spammers > self.raters {
            return Err(EloError::InvalidSpammerCount {
                spammers: self.spammers,
                raters: self.raters,
            });
        }
        if self.raters == 0 {
            return Err(EloError::InvalidParameter("at least one rater is required".to_string()));
        }
        Ok(())
    }
}

/// Items with quality ~ N(0, 1) and a fair-coin sensitive flag.
pub fn generate_items<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<Item> {
    (0..count)
        .map(|id| Item {
            id,
            quality: StandardNormal.sample(rng),
            sensitive: rng.gen_bool(0.5),
        })
        .collect()
}

/// Faithful raters first (ids `0..raters - spammers`), spammers last.
/// `perception_seed` keys every faithful rater's perception stream.
pub fn generate_raters<R: Rng + ?Sized>(
    population: &RaterPopulation,
    perception_seed: u64,
    rng: &mut R,
) -> Result<Vec<Rater>, EloError<usize>> {
    population.validate()?;

    let thresholds = Normal::new(0.0, population.threshold_spread)
        .map_err(|e| EloError::InvalidParameter(format!("threshold spread: {e}")))?;
    let importance = population
        .feature_importance
        .map(|(alpha, beta)| {
            Beta::new(alpha, beta).map_err(|e| EloError::InvalidParameter(format!("feature importance: {e}")))
        })
        .transpose()?;

    let faithful = population.raters - population.spammers;
    let mut raters = Vec::with_capacity(population.raters);
    for id in 0..faithful {
        let bias = thresholds.sample(rng);
        let weight = match &importance {
            Some(beta) => 2.0 * beta.sample(rng) - 1.0,
            None => 0.0,
        };
        raters.push(Rater::Faithful(FaithfulRater::new(
            id,
            bias,
            population.perception_ambiguity,
            population.comparison_ambiguity,
            weight,
            perception_seed,
        )?));
    }
    raters.extend((0..population.spammers).map(|_| Rater::Spam(SpamRater)));

    Ok(raters)
}

/// Collects `votes_per_item` votes for every item, each from a rater chosen
/// uniformly at random.
pub fn vote_items<R: Rng + ?Sized>(
    items: &[Item],
    raters: &[Rater],
    rng: &mut R,
    votes_per_item: usize,
) -> Result<BTreeMap<usize, Vec<bool>>, EloError<usize>> {
    let mut votes = BTreeMap::new();
    for item in items {
        let mut item_votes = Vec::with_capacity(votes_per_item);
        for _ in 0..votes_per_item {
            let rater = raters
                .choose(rng)
                .ok_or_else(|| EloError::InvalidParameter("cannot vote without raters".to_string()))?;
            item_votes.push(rater.rate(item, rng));
        }
        votes.insert(item.id, item_votes);
    }
    Ok(votes)
}
