//! Pseudo-random indices for sampled container checks.

use std::cell::RefCell;

/// Source of the non-negative integer bound to `__random` while a check runs.
pub trait RandomIndexSource {
    fn next_index(&mut self) -> u32;
}

/// xorshift64* generator. Not cryptographic; only spreads sampled indices.
#[derive(Debug, Clone)]
pub struct XorShiftRandom {
    state: u64,
}

const FALLBACK_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

impl XorShiftRandom {
    pub fn seeded(seed: u64) -> Self {
        Self {
            state: if seed == 0 { FALLBACK_SEED } else { seed },
        }
    }

    pub fn from_entropy() -> Self {
        let mut buf = [0u8; 8];
        match getrandom::getrandom(&mut buf) {
            Ok(()) => Self::seeded(u64::from_le_bytes(buf)),
            Err(err) => {
                tracing::warn!(error = %err, "entropy unavailable; using fixed seed");
                Self::seeded(FALLBACK_SEED)
            }
        }
    }
}

impl RandomIndexSource for XorShiftRandom {
    fn next_index(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        (x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 32) as u32
    }
}

thread_local! {
    static THREAD_RANDOM: RefCell<XorShiftRandom> = RefCell::new(XorShiftRandom::from_entropy());
}

/// Run `f` with this thread's generator.
pub fn with_thread_random<R>(f: impl FnOnce(&mut dyn RandomIndexSource) -> R) -> R {
    THREAD_RANDOM.with(|rng| f(&mut *rng.borrow_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_sequences_repeat() {
        let mut a = XorShiftRandom::seeded(7);
        let mut b = XorShiftRandom::seeded(7);
        let xs: Vec<u32> = (0..8).map(|_| a.next_index()).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.next_index()).collect();
        assert_eq!(xs, ys);
        assert!(xs.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn indices_cover_small_ranges() {
        let mut rng = XorShiftRandom::seeded(42);
        let mut seen = [false; 10];
        for _ in 0..1000 {
            seen[(rng.next_index() % 10) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
