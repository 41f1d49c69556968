//! Sampling gate.
//!
//! Bounds recording overhead under high throughput: each execution is
//! recorded with probability `rate_percent / 100`, decided independently per
//! call. There is no shared state between decisions, so the gate is safe to
//! hit from any number of execution contexts at once.

use rand::Rng;

/// Decides whether the current execution should be recorded.
///
/// Draws a uniform integer in `[0, 100)` from the thread-local generator;
/// true iff the draw is below `rate_percent`. A rate of 100 always samples.
/// Out-of-range rates are a configuration-layer concern, not checked here.
pub fn should_sample(rate_percent: u32) -> bool {
    should_sample_with(&mut rand::thread_rng(), rate_percent)
}

/// `should_sample` with a caller-supplied generator, for deterministic tests.
pub fn should_sample_with<R: Rng>(rng: &mut R, rate_percent: u32) -> bool {
    rng.gen_range(0..100) < rate_percent
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn rate_100_always_samples() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert!(should_sample_with(&mut rng, 100));
        }
        for _ in 0..1000 {
            assert!(should_sample(100));
        }
    }

    #[test]
    fn rate_1_samples_roughly_one_percent() {
        let mut rng = StdRng::seed_from_u64(42);
        let hits = (0..100_000)
            .filter(|_| should_sample_with(&mut rng, 1))
            .count();
        // Expected 1000 of 100k; the band is wide on purpose, this pins the
        // order of magnitude, not the generator.
        assert!(hits > 500 && hits < 2000, "hits = {}", hits);
    }

    #[test]
    fn rate_50_samples_about_half() {
        let mut rng = StdRng::seed_from_u64(1);
        let hits = (0..100_000)
            .filter(|_| should_sample_with(&mut rng, 50))
            .count();
        assert!(hits > 45_000 && hits < 55_000, "hits = {}", hits);
    }
}
