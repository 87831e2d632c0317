use covey_core::ParticipantId;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Picks the subset of connected participants that will train a round.
///
/// Any policy is acceptable as long as it returns
/// [`selection_size`]`(candidates.len(), fraction)` distinct ids drawn from
/// `candidates`.
pub trait Selector: Send {
    fn select_ids(&mut self, candidates: &[ParticipantId], fraction: f64) -> Vec<ParticipantId>;
}

/// Number of ids a selection must produce for `num_candidates` candidates.
pub fn selection_size(num_candidates: usize, fraction: f64) -> usize {
    let raw = (num_candidates as f64 * fraction).ceil() as usize;
    raw.max(1).min(num_candidates)
}

/// Uniform random selection without replacement.
pub struct RandomSelector {
    rng: StdRng,
}

impl RandomSelector {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for RandomSelector {
    fn select_ids(&mut self, candidates: &[ParticipantId], fraction: f64) -> Vec<ParticipantId> {
        let k = selection_size(candidates.len(), fraction);
        candidates
            .choose_multiple(&mut self.rng, k)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn candidates(n: usize) -> Vec<ParticipantId> {
        (0..n)
            .map(|i| ParticipantId::new(format!("[::1]:{}", 50000 + i)))
            .collect()
    }

    #[test]
    fn selection_size_law() {
        // (candidates, fraction, expected)
        let cases = [
            (10, 1.0, 10),
            (10, 0.5, 5),
            (10, 0.55, 6),
            (10, 0.01, 1),
            (3, 0.34, 2),
            (1, 1.0, 1),
            (1, 0.2, 1),
            (0, 1.0, 0),
        ];
        for (n, fraction, expected) in cases {
            assert_eq!(
                selection_size(n, fraction),
                expected,
                "n={n} fraction={fraction}"
            );
        }
    }

    #[test]
    fn selects_without_replacement() {
        let pool = candidates(20);
        let mut selector = RandomSelector::with_seed(7);
        for fraction in [0.1, 0.33, 0.5, 1.0] {
            let selected = selector.select_ids(&pool, fraction);
            assert_eq!(selected.len(), selection_size(pool.len(), fraction));
            let distinct: HashSet<_> = selected.iter().collect();
            assert_eq!(distinct.len(), selected.len(), "duplicate id selected");
            assert!(selected.iter().all(|id| pool.contains(id)));
        }
    }

    #[test]
    fn full_fraction_selects_everyone() {
        let pool = candidates(5);
        let mut selector = RandomSelector::with_seed(3);
        let mut selected = selector.select_ids(&pool, 1.0);
        selected.sort();
        let mut expected = pool.clone();
        expected.sort();
        assert_eq!(selected, expected);
    }
}
