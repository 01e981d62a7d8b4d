use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::{EloError, ItemKey};

/// Logistic Elo expectation: the probability that B outscores A given the
/// rating gap. Stable over the whole real line; saturates to 0 or 1.
pub fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_a - rating_b) / 400.0))
}

pub fn update_rating(rating: f64, real_score: f64, expected_score: f64, k: f64) -> f64 {
    rating + k * (real_score - expected_score)
}

/// Discrete result of a match from player A's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    Win,
    Lose,
    Tie,
}

impl Outcome {
    pub fn scores(self) -> (f64, f64) {
        match self {
            Outcome::Win => (1.0, 0.0),
            Outcome::Lose => (0.0, 1.0),
            Outcome::Tie => (0.5, 0.5),
        }
    }
}

/// One pairwise outcome. `score_a + score_b == 1` holds for every value of
/// this type. A match of an item against itself is refused by `new` and by
/// [`EloEngine::apply`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Match<K> {
    player_a: K,
    player_b: K,
    score_a: f64,
    score_b: f64,
}

impl<K: ItemKey> Match<K> {
    /// Continuous outcome: `score_a` is the "A beat B" probability.
    pub fn new(player_a: K, player_b: K, score_a: f64) -> Result<Self, EloError<K>> {
        if player_a == player_b {
            return Err(EloError::InvalidComparison(player_a));
        }
        if !(0.0..=1.0).contains(&score_a) {
            return Err(EloError::InvalidScore(score_a));
        }
        Ok(Match {
            player_a,
            player_b,
            score_a,
            score_b: 1.0 - score_a,
        })
    }

    pub fn from_outcome(player_a: K, player_b: K, outcome: Outcome) -> Self {
        let (score_a, score_b) = outcome.scores();
        Match {
            player_a,
            player_b,
            score_a,
            score_b,
        }
    }

    pub fn player_a(&self) -> &K {
        &self.player_a
    }

    pub fn player_b(&self) -> &K {
        &self.player_b
    }

    pub fn score_a(&self) -> f64 {
        self.score_a
    }

    pub fn score_b(&self) -> f64 {
        self.score_b
    }
}

impl<K: fmt::Display> fmt::Display for Match<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vs {} ({}:{})",
            self.player_a, self.player_b, self.score_a, self.score_b
        )
    }
}

/// Current rating of every item in one replica.
///
/// The key set is fixed at construction; `apply` never inserts. Mutation
/// goes through `&mut self`, so a state has exactly one sequential writer.
/// Cloning a state is the only way to share it, and yields an independent
/// copy.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RatingState<K: Ord> {
    ratings: BTreeMap<K, f64>,
    version: u64,
}

impl<K: ItemKey> RatingState<K> {
    pub fn uniform<I: IntoIterator<Item = K>>(items: I, initial: f64) -> Self {
        RatingState {
            ratings: items.into_iter().map(|item| (item, initial)).collect(),
            version: 0,
        }
    }

    pub fn from_ratings(ratings: BTreeMap<K, f64>) -> Self {
        RatingState { ratings, version: 0 }
    }

    pub fn get(&self, item: &K) -> Result<f64, EloError<K>> {
        self.ratings
            .get(item)
            .copied()
            .ok_or_else(|| EloError::ItemNotFound(item.clone()))
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    pub fn contains(&self, item: &K) -> bool {
        self.ratings.contains_key(item)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, f64)> {
        self.ratings.iter().map(|(item, &rating)| (item, rating))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.ratings.keys()
    }

    pub fn as_map(&self) -> &BTreeMap<K, f64> {
        &self.ratings
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Zero-based ranks by rating descending. Equal ratings keep key order.
    pub fn ranking(&self) -> Ranking<K> {
        let mut ordered: Vec<(&K, f64)> = self.iter().collect();
        // BTreeMap iteration is already key-ascending, and the sort is stable.
        ordered.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ranking {
            ranks: ordered
                .into_iter()
                .enumerate()
                .map(|(rank, (item, _))| (item.clone(), rank))
                .collect(),
        }
    }

    fn set(&mut self, item: &K, rating: f64) -> Result<(), EloError<K>> {
        let slot = self
            .ratings
            .get_mut(item)
            .ok_or_else(|| EloError::ItemNotFound(item.clone()))?;
        *slot = rating;
        Ok(())
    }
}

/// Read-only rank view derived from a [`RatingState`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Ranking<K: Ord> {
    ranks: BTreeMap<K, usize>,
}

impl<K: ItemKey> Ranking<K> {
    pub fn rank(&self, item: &K) -> Result<usize, EloError<K>> {
        self.ranks
            .get(item)
            .copied()
            .ok_or_else(|| EloError::ItemNotFound(item.clone()))
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, usize)> {
        self.ranks.iter().map(|(item, &rank)| (item, rank))
    }

    pub fn ordering(&self) -> Vec<K> {
        let mut ordered: Vec<(&K, usize)> = self.iter().collect();
        ordered.sort_by_key(|&(_, rank)| rank);
        ordered.into_iter().map(|(item, _)| item.clone()).collect()
    }

    /// Mean squared per-item rank difference.
    pub fn distance(&self, other: &Ranking<K>) -> Result<f64, EloError<K>> {
        ensure_same_keys(&self.ranks, &other.ranks)?;
        Ok(mean_squared(
            self.ranks
                .iter()
                .map(|(item, &rank)| rank as f64 - other.ranks[item] as f64),
            self.ranks.len(),
        ))
    }
}

fn ensure_same_keys<K: ItemKey, V, W>(
    left: &BTreeMap<K, V>,
    right: &BTreeMap<K, W>,
) -> Result<(), EloError<K>> {
    let missing = left
        .keys()
        .find(|item| !right.contains_key(*item))
        .or_else(|| right.keys().find(|item| !left.contains_key(*item)));

    match missing {
        Some(item) => Err(EloError::KeySetMismatch {
            missing: item.clone(),
        }),
        None => Ok(()),
    }
}

fn mean_squared<I: Iterator<Item = f64>>(diffs: I, size: usize) -> f64 {
    if size == 0 {
        return 0.0;
    }
    diffs.map(|d| d * d).sum::<f64>() / size as f64
}

/// Mean squared per-item rating difference. Fails if the key sets differ.
pub fn ratings_distance<K: ItemKey>(
    left: &RatingState<K>,
    right: &RatingState<K>,
) -> Result<f64, EloError<K>> {
    ensure_same_keys(&left.ratings, &right.ratings)?;
    Ok(mean_squared(
        left.ratings
            .iter()
            .map(|(item, rating)| rating - right.ratings[item]),
        left.ratings.len(),
    ))
}

/// Mean squared per-item rank difference. Fails if the key sets differ.
pub fn rankings_distance<K: ItemKey>(
    left: &RatingState<K>,
    right: &RatingState<K>,
) -> Result<f64, EloError<K>> {
    ensure_same_keys(&left.ratings, &right.ratings)?;
    left.ranking().distance(&right.ranking())
}

/// Elo update with a fixed learning rate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EloEngine {
    k: f64,
}

impl EloEngine {
    pub fn new(k: f64) -> Self {
        EloEngine { k }
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Applies one match to `state`. Each side's expectation is computed
    /// against the opponent's pre-match rating. Both ratings are looked up
    /// before either is written, so a missing item leaves `state` untouched.
    pub fn apply<K: ItemKey>(&self, game: &Match<K>, state: &mut RatingState<K>) -> Result<(), EloError<K>> {
        if game.player_a == game.player_b {
            return Err(EloError::InvalidComparison(game.player_a.clone()));
        }
        let rating_a = state.get(&game.player_a)?;
        let rating_b = state.get(&game.player_b)?;

        let expected_a = expected_score(rating_b, rating_a);
        let expected_b = expected_score(rating_a, rating_b);

        state.set(&game.player_a, update_rating(rating_a, game.score_a, expected_a, self.k))?;
        state.set(&game.player_b, update_rating(rating_b, game.score_b, expected_b, self.k))?;
        state.version += 1;

        Ok(())
    }

    /// Runs `epochs` passes over `matches`, reshuffling them in place before
    /// every pass.
    pub fn fit_epochs<K: ItemKey, R: Rng + ?Sized>(
        &self,
        matches: &mut [Match<K>],
        state: &mut RatingState<K>,
        epochs: usize,
        rng: &mut R,
    ) -> Result<(), EloError<K>> {
        for epoch in 0..epochs {
            matches.shuffle(rng);
            for game in matches.iter() {
                self.apply(game, state)?;
            }
            debug!(epoch, matches = matches.len(), "epoch complete");
        }
        Ok(())
    }
}
