//! Elo convergence on pairwise comparisons with ties.
//!
//! Pairwise "A vs B vs tie" judgments are replayed through an incremental
//! Elo update, and the resulting ratings are compared against majority-vote
//! labeling of the same items. The crate provides:
//!
//! - [`rating`]: the Elo expectation/update rule, [`Match`] records and the
//!   exclusively owned [`RatingState`].
//! - [`combination`]: lexicographic unranking of combinations and a
//!   [`PairSampler`] that draws unique pairs out of `C(n, 2)` without
//!   materializing the pair space.
//! - [`rater`]: synthetic items and raters (faithful or spam) that emit
//!   votes and pairwise preferences.
//! - [`harness`]: ensembles of shuffled replays with rating/ranking time
//!   series and distance-to-truth metrics.
//! - [`scoring`]: binary labeling, F1 and subgroup bias.
//! - [`synthetic`], [`empirical`]: the checkpointed scaling experiments.
//! - [`records`]: the upstream record shapes (tasks, answers, ground truth,
//!   `a,b,score` lines) and their conversion into matches.
//!
//! # Quick start
//!
//! ```rust
//! use elo_consensus::{EloEngine, Match, Outcome, RatingState};
//!
//! let mut state = RatingState::uniform(["x", "y"], 1500.0);
//! let engine = EloEngine::new(16.0);
//!
//! engine.apply(&Match::from_outcome("x", "y", Outcome::Win), &mut state).unwrap();
//!
//! assert_eq!(state.get(&"x").unwrap(), 1508.0);
//! assert_eq!(state.get(&"y").unwrap(), 1492.0);
//! ```

use std::fmt::{Debug, Display};

use thiserror::Error;

pub mod combination;
pub mod empirical;
pub mod harness;
pub mod rater;
pub mod rating;
pub mod records;
pub mod scoring;
pub mod seed;
pub mod synthetic;

pub use combination::{binomial, nth_combination, rank_combination, unrank, CombinationError, PairSampler};
pub use empirical::{run_empirical, EmpiricalConfig, EmpiricalReport};
pub use harness::{sample_population, EnsembleConfig, EnsembleReport, ReplicaTrace, SimulationHarness};
pub use rater::{
    generate_items, generate_raters, vote_items, FaithfulRater, Item, Preference, Rater, RaterPopulation, SpamRater,
};
pub use rating::{
    expected_score, rankings_distance, ratings_distance, update_rating, EloEngine, Match, Outcome, Ranking,
    RatingState,
};
pub use scoring::{bias, elo_labels, f1_score, majority_vote_labels, Confusion, LabelPolicy};
pub use synthetic::{run_synthetic, Checkpoint, SyntheticConfig, SyntheticReport};

/// Bounds shared by every item identifier: opaque, totally ordered (for
/// deterministic iteration and tie-breaking) and printable in errors.
pub trait ItemKey: Clone + Debug + Display + Ord + Send + Sync + 'static {}

impl<T> ItemKey for T where T: Clone + Debug + Display + Ord + Send + Sync + 'static {}

#[derive(Error, Debug)]
pub enum EloError<K: Display + Debug> {
    #[error("Item not found: {0}")]
    ItemNotFound(K),
    #[error("Key sets differ: item {missing} is present on one side only")]
    KeySetMismatch { missing: K },
    #[error("Spammers should be in the range [0, {raters}], got {spammers}")]
    InvalidSpammerCount { spammers: usize, raters: usize },
    #[error("Unrecognized selection: {0:?}")]
    InvalidSelection(String),
    #[error("Invalid comparison: both sides are item {0}")]
    InvalidComparison(K),
    #[error("Score must lie in [0, 1], got {0}")]
    InvalidScore(f64),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
    #[error(transparent)]
    Combination(#[from] CombinationError),
}
