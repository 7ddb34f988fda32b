//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness).
//! Production code plugs in real system time and OS randomness; tests use
//! fixed instants and seeded bytes so every transition is reproducible.

use std::time::Duration;

/// Abstract environment providing time and randomness.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards within one execution context
/// - `random_bytes()` uses cryptographically secure entropy in production
///   (room and session ids must be unguessable)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; tests may use any
    /// monotonic stand-in.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleep for the specified duration.
    ///
    /// The only async method in the trait; used by driver code, never by
    /// protocol logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Wall-clock time in Unix milliseconds, for stamping outbound frames.
    fn wall_clock_millis(&self) -> u64;

    /// Generate a random `u64` (session ids).
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generate a random `u128` (room ids).
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}
