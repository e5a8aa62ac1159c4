//! Environment abstraction for deterministic testing.
//!
//! Decouples channel logic from system resources (time, randomness). Key
//! generation and nonce generation draw their entropy from the environment,
//! so a seeded test environment replays identical keys and payloads.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async sleeping.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    type Instant: Copy + Ord + Send + Sync + std::fmt::Debug + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only runtime code calls this; channel logic never sleeps.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Wall-clock time in milliseconds since the Unix epoch, used for message
    /// timestamps.
    fn wall_clock_millis(&self) -> u64;

    /// Random fixed-size array (key seeds, nonces).
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}

/// Deterministic environment for tests and simulation.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    use super::Environment;

    /// Base wall-clock time reported by [`MockEnv`] (2023-11-14T22:13:20Z).
    const BASE_WALL_CLOCK_MILLIS: u64 = 1_700_000_000_000;

    /// Seeded environment with a virtual clock.
    ///
    /// Clones share the same RNG stream and clock. Sleeping advances the
    /// virtual clock and yields to the scheduler instead of waiting.
    #[derive(Clone)]
    pub struct MockEnv {
        inner: Arc<Mutex<MockEnvInner>>,
    }

    struct MockEnvInner {
        rng: ChaCha20Rng,
        base: Instant,
        offset: Duration,
    }

    impl MockEnv {
        /// Environment seeded with 0.
        pub fn new() -> Self {
            Self::with_seed(0)
        }

        /// Environment with an explicit RNG seed. Two parties in one test
        /// need different seeds or they generate identical key pairs.
        #[allow(clippy::disallowed_methods)]
        pub fn with_seed(seed: u64) -> Self {
            Self {
                inner: Arc::new(Mutex::new(MockEnvInner {
                    rng: ChaCha20Rng::seed_from_u64(seed),
                    base: Instant::now(),
                    offset: Duration::ZERO,
                })),
            }
        }

        /// Advance the virtual clock.
        #[allow(clippy::expect_used)]
        pub fn advance(&self, duration: Duration) {
            self.inner.lock().expect("Mutex poisoned").offset += duration;
        }

        #[allow(clippy::expect_used)]
        fn offset(&self) -> Duration {
            self.inner.lock().expect("Mutex poisoned").offset
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = Instant;

        #[allow(clippy::expect_used)]
        fn now(&self) -> Self::Instant {
            let inner = self.inner.lock().expect("Mutex poisoned");
            inner.base + inner.offset
        }

        fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            self.advance(duration);
            tokio::task::yield_now()
        }

        #[allow(clippy::expect_used)]
        fn random_bytes(&self, buffer: &mut [u8]) {
            self.inner.lock().expect("Mutex poisoned").rng.fill_bytes(buffer);
        }

        fn wall_clock_millis(&self) -> u64 {
            BASE_WALL_CLOCK_MILLIS + self.offset().as_millis() as u64
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn same_seed_same_bytes() {
            let a = MockEnv::with_seed(7);
            let b = MockEnv::with_seed(7);
            assert_eq!(a.random_array::<16>(), b.random_array::<16>());
        }

        #[test]
        fn different_seeds_different_bytes() {
            let a = MockEnv::with_seed(1);
            let b = MockEnv::with_seed(2);
            assert_ne!(a.random_array::<16>(), b.random_array::<16>());
        }

        #[test]
        fn clones_share_stream() {
            let a = MockEnv::with_seed(3);
            let b = a.clone();
            assert_ne!(a.random_array::<16>(), b.random_array::<16>());
        }

        #[test]
        fn advance_moves_both_clocks() {
            let env = MockEnv::new();
            let start = env.now();
            let wall = env.wall_clock_millis();

            env.advance(Duration::from_secs(5));

            assert_eq!(env.now() - start, Duration::from_secs(5));
            assert_eq!(env.wall_clock_millis() - wall, 5_000);
        }
    }
}
