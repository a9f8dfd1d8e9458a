//! Environment seam: randomness and wall-clock time are injected so the
//! engine stays deterministic under test.

use rand_core::{CryptoRng, RngCore};

/// What the engine requires from its surroundings.
pub trait Environment {
    /// Fill `out` with cryptographically secure random bytes.
    fn fill_random(&self, out: &mut [u8]);
    /// Current wall-clock time as seconds since the UNIX epoch.
    fn unix_time(&self) -> u64;
}

/// Process-wide CSPRNG and system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn fill_random(&self, out: &mut [u8]) {
        // The system entropy source failing is not recoverable at this layer.
        getrandom::getrandom(out).expect("system CSPRNG unavailable");
    }

    fn unix_time(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Adapter exposing an [`Environment`] as a `rand_core` RNG, for APIs that
/// take one (RSA encryption needs randomized padding).
pub struct EnvRng<'a> {
    env: &'a dyn Environment,
}

impl<'a> EnvRng<'a> {
    pub fn new(env: &'a dyn Environment) -> Self {
        Self { env }
    }
}

impl RngCore for EnvRng<'_> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.env.fill_random(&mut buf);
        u32::from_be_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.env.fill_random(&mut buf);
        u64::from_be_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.env.fill_random(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.env.fill_random(dest);
        Ok(())
    }
}

impl CryptoRng for EnvRng<'_> {}
