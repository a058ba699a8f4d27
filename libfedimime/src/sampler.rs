//! Corpus sampling

use rand::seq::SliceRandom;
use rand::Rng;

/// Pick up to `n` texts uniformly at random, without replacement.
///
/// The list is copied, shuffled and truncated, so asking for more texts
/// than exist returns every text in random order. The RNG is injected;
/// callers pass [`rand::thread_rng`] and tests pass a seeded `StdRng`.
pub fn sample<R: Rng + ?Sized>(texts: &[String], n: usize, rng: &mut R) -> Vec<String> {
    let mut picked = texts.to_vec();
    picked.shuffle(rng);
    picked.truncate(n);
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn corpus(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {}", i)).collect()
    }

    #[test]
    fn test_sample_returns_requested_count() {
        let texts = corpus(100);
        let mut rng = StdRng::seed_from_u64(7);

        let picked = sample(&texts, 10, &mut rng);

        assert_eq!(picked.len(), 10);
    }

    #[test]
    fn test_sample_has_no_duplicates() {
        let texts = corpus(50);
        let mut rng = StdRng::seed_from_u64(7);

        let mut picked = sample(&texts, 25, &mut rng);
        picked.sort();
        picked.dedup();

        assert_eq!(picked.len(), 25);
        assert!(picked.iter().all(|t| texts.contains(t)));
    }

    #[test]
    fn test_sample_beyond_len_returns_everything() {
        let texts = corpus(5);
        let mut rng = StdRng::seed_from_u64(7);

        let mut picked = sample(&texts, 500, &mut rng);
        picked.sort();

        let mut expected = texts.clone();
        expected.sort();
        assert_eq!(picked, expected);
    }

    #[test]
    fn test_sample_zero_is_empty() {
        let texts = corpus(10);
        let mut rng = StdRng::seed_from_u64(7);

        assert!(sample(&texts, 0, &mut rng).is_empty());
    }

    #[test]
    fn test_sample_is_deterministic_per_seed() {
        let texts = corpus(30);

        let first = sample(&texts, 30, &mut StdRng::seed_from_u64(99));
        let second = sample(&texts, 30, &mut StdRng::seed_from_u64(99));

        assert_eq!(first, second);
    }

    #[test]
    fn test_sample_shuffles_order() {
        let texts = corpus(100);
        let mut rng = StdRng::seed_from_u64(1);

        let picked = sample(&texts, 100, &mut rng);

        assert_ne!(picked, texts);
    }

    #[test]
    fn test_sample_empty_corpus() {
        let mut rng = StdRng::seed_from_u64(7);

        assert!(sample(&[], 10, &mut rng).is_empty());
    }
}
