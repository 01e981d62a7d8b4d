//! Lexicographic unranking of combinations.
//!
//! Combinations of `r` positions out of `0..n` are ordered lexicographically;
//! `unrank` maps an index straight to its combination with `O(n)` binomial
//! arithmetic and no enumeration. [`PairSampler`] builds on it to draw unique
//! item pairs out of `C(n, 2)` without ever materializing the pair space.

use rand::seq::{index, SliceRandom};
use rand::Rng;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CombinationError {
    #[error("Combination size {r} is outside [0, {n}]")]
    InvalidSize { r: usize, n: usize },
    #[error("Combination index {index} is outside [0, {total})")]
    IndexOutOfRange { index: i128, total: u128 },
    #[error("C({n}, {r}) does not fit in 128 bits")]
    CountOverflow { n: usize, r: usize },
    #[error("Positions {0:?} are not a strictly increasing combination")]
    NotACombination(Vec<usize>),
    #[error("Cannot draw {requested} unique pairs out of {available}")]
    NotEnoughPairs { requested: usize, available: u128 },
}

/// `C(n, r)`, or `None` on overflow. Zero when `r > n`.
pub fn binomial(n: usize, r: usize) -> Option<u128> {
    if r > n {
        return Some(0);
    }
    let k = r.min(n - r) as u128;
    let n = n as u128;
    let mut c: u128 = 1;
    for i in 1..=k {
        c = c.checked_mul(n - k + i)? / i;
    }
    Some(c)
}

fn checked_binomial(n: usize, r: usize) -> Result<u128, CombinationError> {
    binomial(n, r).ok_or(CombinationError::CountOverflow { n, r })
}

/// Positions of the `index`-th combination of `r` out of `0..n`.
pub fn unrank(n: usize, r: usize, index: u128) -> Result<Vec<usize>, CombinationError> {
    if r > n {
        return Err(CombinationError::InvalidSize { r, n });
    }
    let total = checked_binomial(n, r)?;
    if index >= total {
        return Err(CombinationError::IndexOutOfRange {
            index: i128::try_from(index).unwrap_or(i128::MAX),
            total,
        });
    }

    let overflow = CombinationError::CountOverflow { n, r };
    let mut index = index;
    let mut c = total;
    let mut n_left = n as u128;
    let mut r_left = r as u128;
    let mut positions = Vec::with_capacity(r);

    while r_left > 0 {
        // c becomes C(n_left - 1, r_left - 1): combinations that take the
        // current head position.
        c = c.checked_mul(r_left).ok_or_else(|| overflow.clone())? / n_left;
        n_left -= 1;
        r_left -= 1;
        while index >= c {
            index -= c;
            if n_left == 0 {
                return Err(CombinationError::IndexOutOfRange {
                    index: i128::try_from(index).unwrap_or(i128::MAX),
                    total,
                });
            }
            c = c.checked_mul(n_left - r_left).ok_or_else(|| overflow.clone())? / n_left;
            n_left -= 1;
        }
        positions.push(n - 1 - n_left as usize);
    }

    Ok(positions)
}

/// Inverse of [`unrank`]: the lexicographic index of a strictly increasing
/// set of positions drawn from `0..n`.
pub fn rank_combination(n: usize, positions: &[usize]) -> Result<u128, CombinationError> {
    let r = positions.len();
    if r > n {
        return Err(CombinationError::InvalidSize { r, n });
    }
    let increasing = positions.windows(2).all(|w| w[0] < w[1]);
    if !increasing || positions.last().is_some_and(|&last| last >= n) {
        return Err(CombinationError::NotACombination(positions.to_vec()));
    }

    // Count the combinations that sort after this one (they live in the
    // complement's combinatorial number system) and subtract from the end.
    let total = checked_binomial(n, r)?;
    let mut after: u128 = 0;
    for (i, &position) in positions.iter().enumerate() {
        after += checked_binomial(n - 1 - position, r - i)?;
    }
    Ok(total - 1 - after)
}

/// The `index`-th `r`-combination of `pool` in lexicographic order of
/// positions. Negative indices count from the end.
pub fn nth_combination<T: Clone>(pool: &[T], r: usize, index: i128) -> Result<Vec<T>, CombinationError> {
    let n = pool.len();
    if r > n {
        return Err(CombinationError::InvalidSize { r, n });
    }
    let total = checked_binomial(n, r)?;
    let signed_total = i128::try_from(total).map_err(|_| CombinationError::CountOverflow { n, r })?;

    let resolved = if index < 0 { index + signed_total } else { index };
    if resolved < 0 || resolved >= signed_total {
        return Err(CombinationError::IndexOutOfRange { index, total });
    }

    Ok(unrank(n, r, resolved as u128)?
        .into_iter()
        .map(|position| pool[position].clone())
        .collect())
}

/// Uniform sample of unique unordered pairs out of a population of `n`
/// items, drawn without replacement.
///
/// Only the pair *indices* are sampled up front; each is unranked into a
/// pair lazily, so the comparison set can grow checkpoint by checkpoint
/// without revisiting earlier pairs.
#[derive(Debug, Clone)]
pub struct PairSampler {
    population: usize,
    indices: Vec<usize>,
    cursor: usize,
}

impl PairSampler {
    pub fn new<R: Rng + ?Sized>(population: usize, amount: usize, rng: &mut R) -> Result<Self, CombinationError> {
        let available = checked_binomial(population, 2)?;
        let space = usize::try_from(available).map_err(|_| CombinationError::CountOverflow { n: population, r: 2 })?;
        if amount > space {
            return Err(CombinationError::NotEnoughPairs {
                requested: amount,
                available,
            });
        }

        let mut indices = index::sample(rng, space, amount).into_vec();
        indices.shuffle(rng);

        Ok(PairSampler {
            population,
            indices,
            cursor: 0,
        })
    }

    pub fn population(&self) -> usize {
        self.population
    }

    pub fn drawn(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.indices.len() - self.cursor
    }

    /// Next pair of positions `(a, b)` with `a < b`, or `None` once the
    /// sample is exhausted.
    pub fn next_pair(&mut self) -> Result<Option<(usize, usize)>, CombinationError> {
        let Some(&pair_index) = self.indices.get(self.cursor) else {
            return Ok(None);
        };
        let positions = unrank(self.population, 2, pair_index as u128)?;
        self.cursor += 1;
        Ok(Some((positions[0], positions[1])))
    }
}
