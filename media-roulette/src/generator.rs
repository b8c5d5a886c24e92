use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::{Candidate, ImageService, Result, RouletteError};

// Letters appear twice, digits once, matching the code distribution the
// original viewer drew from.
const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz\
ABCDEFGHIJKLMNOPQRSTUVWXYZ\
abcdefghijklmnopqrstuvwxyz\
ABCDEFGHIJKLMNOPQRSTUVWXYZ\
0123456789";

/// Default ceiling on re-draws before a collision-heavy exclude set is
/// treated as exhausted.
pub const DEFAULT_MAX_ATTEMPTS: usize = 64;

/// Produces random candidate codes for a service, re-drawing while the code
/// collides with the exclude set. Bounded: fails with `RetryExhausted`
/// instead of spinning when the space is (locally) used up.
pub struct LinkGenerator {
    service: ImageService,
    rng: StdRng,
    max_attempts: usize,
}

impl LinkGenerator {
    pub fn new(service: ImageService) -> Self {
        Self {
            service,
            rng: StdRng::from_entropy(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Deterministic generator for tests.
    pub fn with_seed(service: ImageService, seed: u64) -> Self {
        Self {
            service,
            rng: StdRng::seed_from_u64(seed),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn service(&self) -> ImageService {
        self.service
    }

    /// Draw the next candidate not present in `exclude`.
    pub fn next(&mut self, exclude: &HashSet<String>) -> Result<Candidate> {
        for _ in 0..self.max_attempts {
            let code = self.random_code();
            if !exclude.contains(&code) {
                let link = self.service.link_for(&code);
                return Ok(Candidate { code, link });
            }
        }
        Err(RouletteError::RetryExhausted {
            attempts: self.max_attempts,
        })
    }

    fn random_code(&mut self) -> String {
        let chars: Vec<char> = ALPHABET.chars().collect();
        (0..self.service.code_len())
            .map(|_| chars[self.rng.gen_range(0..chars.len())])
            .collect()
    }
}
