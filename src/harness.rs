//! Ensemble replay of a fixed match list.
//!
//! Each replica owns its own rating state and generator, reshuffles the match
//! list every epoch and streams it through the Elo update, recording how far
//! each update moved the state and how far the state is from ground truth.
//! Replicas share nothing mutable and run in parallel; results are identical
//! to a sequential run because every replica's generator is derived from the
//! master seed and the replica index alone.

use std::collections::BTreeMap;

use nalgebra::DVector;
use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::rating::{ratings_distance, EloEngine, Match, Ranking, RatingState};
use crate::seed::{stream_rng, REPLICA_STREAM};
use crate::{EloError, ItemKey};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnsembleConfig {
    pub ensemble_size: usize,
    pub epochs: usize,
    pub k: f64,
    pub initial_rating: f64,
    /// Snapshot ratings and rankings every this many matches.
    pub snapshot_every: usize,
    pub seed: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        EnsembleConfig {
            ensemble_size: 10,
            epochs: 1,
            k: 16.0,
            initial_rating: 1500.0,
            snapshot_every: 5,
            seed: 0,
        }
    }
}

impl EnsembleConfig {
    pub fn validate<K: ItemKey>(&self) -> Result<(), EloError<K>> {
        if self.ensemble_size == 0 {
            return Err(EloError::InvalidParameter("ensemble size must be positive".to_string()));
        }
        if self.snapshot_every == 0 {
            return Err(EloError::InvalidParameter("snapshot stride must be positive".to_string()));
        }
        if !self.k.is_finite() || !self.initial_rating.is_finite() {
            return Err(EloError::InvalidParameter(format!(
                "k ({}) and initial rating ({}) must be finite",
                self.k, self.initial_rating
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReplicaTrace<K: Ord> {
    pub replica: usize,
    /// Per-item rating at every snapshot.
    pub rating_series: BTreeMap<K, Vec<f64>>,
    /// Per-item rank at every snapshot.
    pub ranking_series: BTreeMap<K, Vec<usize>>,
    /// Per match: distance between the states before and after the update.
    pub step_rating_distance: Vec<f64>,
    pub step_ranking_distance: Vec<f64>,
    /// Per match: distance between the updated state and ground truth.
    /// Empty when no ground truth was supplied.
    pub truth_rating_distance: Vec<f64>,
    pub truth_ranking_distance: Vec<f64>,
    pub final_ratings: BTreeMap<K, f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EnsembleReport<K: Ord> {
    pub params: EnsembleConfig,
    pub cardinality: usize,
    pub matches: usize,
    pub replicas: Vec<ReplicaTrace<K>>,
    pub average_rating_diffs: Vec<f64>,
    pub average_ranking_diffs: Vec<f64>,
    pub average_true_rating_diffs: Vec<f64>,
    pub average_true_ranking_diffs: Vec<f64>,
}

struct Truth<'a, K: Ord> {
    ratings: &'a RatingState<K>,
    ranking: Ranking<K>,
}

pub struct SimulationHarness<'a, K: Ord> {
    config: EnsembleConfig,
    engine: EloEngine,
    truth: Option<Truth<'a, K>>,
}

impl<'a, K: ItemKey> SimulationHarness<'a, K> {
    pub fn new(config: EnsembleConfig) -> Result<Self, EloError<K>> {
        config.validate::<K>()?;
        Ok(SimulationHarness {
            engine: EloEngine::new(config.k),
            config,
            truth: None,
        })
    }

    /// Ground truth to measure every replica against. Its key set must
    /// match the item population passed to [`run`](Self::run).
    pub fn with_truth(mut self, truth: &'a RatingState<K>) -> Self {
        self.truth = Some(Truth {
            ratings: truth,
            ranking: truth.ranking(),
        });
        self
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn run(&self, items: &[K], matches: &[Match<K>]) -> Result<EnsembleReport<K>, EloError<K>> {
        let prior = RatingState::uniform(items.iter().cloned(), self.config.initial_rating);
        if let Some(truth) = &self.truth {
            ratings_distance(&prior, truth.ratings)?;
        }

        info!(
            items = prior.len(),
            matches = matches.len(),
            replicas = self.config.ensemble_size,
            epochs = self.config.epochs,
            k = self.config.k,
            "starting ensemble"
        );

        let replicas = (0..self.config.ensemble_size)
            .into_par_iter()
            .map(|replica| self.run_replica(replica, &prior, matches))
            .collect::<Result<Vec<_>, _>>()?;

        let steps = self.config.epochs * matches.len();
        let report = EnsembleReport {
            params: self.config.clone(),
            cardinality: prior.len(),
            matches: matches.len(),
            average_rating_diffs: average_series(&replicas, |t| t.step_rating_distance.as_slice()),
            average_ranking_diffs: average_series(&replicas, |t| t.step_ranking_distance.as_slice()),
            average_true_rating_diffs: average_series(&replicas, |t| t.truth_rating_distance.as_slice()),
            average_true_ranking_diffs: average_series(&replicas, |t| t.truth_ranking_distance.as_slice()),
            replicas,
        };

        info!(
            steps,
            final_truth_ranking_distance = ?report.average_true_ranking_diffs.last(),
            "ensemble complete"
        );
        Ok(report)
    }

    fn run_replica(
        &self,
        replica: usize,
        prior: &RatingState<K>,
        matches: &[Match<K>],
    ) -> Result<ReplicaTrace<K>, EloError<K>> {
        let mut rng = stream_rng(self.config.seed, &[REPLICA_STREAM, replica as u64]);
        let mut order: Vec<&Match<K>> = matches.iter().collect();
        let mut state = prior.clone();
        let mut ranking = state.ranking();

        let steps = self.config.epochs * matches.len();
        let mut trace = ReplicaTrace {
            replica,
            rating_series: prior.keys().map(|item| (item.clone(), Vec::new())).collect(),
            ranking_series: prior.keys().map(|item| (item.clone(), Vec::new())).collect(),
            step_rating_distance: Vec::with_capacity(steps),
            step_ranking_distance: Vec::with_capacity(steps),
            truth_rating_distance: Vec::new(),
            truth_ranking_distance: Vec::new(),
            final_ratings: BTreeMap::new(),
        };

        let mut counter = 0usize;
        for epoch in 0..self.config.epochs {
            order.shuffle(&mut rng);
            for &game in &order {
                let previous = state.clone();
                self.engine.apply(game, &mut state)?;
                let updated_ranking = state.ranking();

                trace.step_rating_distance.push(ratings_distance(&previous, &state)?);
                trace.step_ranking_distance.push(ranking.distance(&updated_ranking)?);
                if let Some(truth) = &self.truth {
                    trace.truth_rating_distance.push(ratings_distance(&state, truth.ratings)?);
                    trace.truth_ranking_distance.push(updated_ranking.distance(&truth.ranking)?);
                }
                ranking = updated_ranking;

                if counter % self.config.snapshot_every == 0 {
                    for (item, rating) in state.iter() {
                        if let Some(series) = trace.rating_series.get_mut(item) {
                            series.push(rating);
                        }
                    }
                    for (item, rank) in ranking.iter() {
                        if let Some(series) = trace.ranking_series.get_mut(item) {
                            series.push(rank);
                        }
                    }
                }
                counter += 1;
            }
            debug!(replica, epoch, "replica epoch complete");
        }

        trace.final_ratings = state.as_map().clone();
        Ok(trace)
    }
}

/// Element-wise mean of one per-step series across replicas.
fn average_series<K: Ord>(replicas: &[ReplicaTrace<K>], series: impl Fn(&ReplicaTrace<K>) -> &[f64]) -> Vec<f64> {
    let Some(first) = replicas.first() else {
        return Vec::new();
    };
    let mut total = DVector::<f64>::zeros(series(first).len());
    for trace in replicas {
        total += DVector::from_column_slice(series(trace));
    }
    (total / replicas.len() as f64).as_slice().to_vec()
}

pub fn sample_population<K: ItemKey, R: Rng + ?Sized>(
    keys: &[K],
    size: usize,
    rng: &mut R,
) -> Result<Vec<K>, EloError<K>> {
    if size > keys.len() {
        return Err(EloError::InvalidParameter(format!(
            "cannot sample {size} items out of {}",
            keys.len()
        )));
    }
    let mut sample: Vec<K> = keys.iter().cloned().choose_multiple(rng, size);
    sample.sort();
    Ok(sample)
}
