//! Karp-Rabin fingerprints over the Mersenne prime 2^61-1.
//!
//! A seed (window of `p` bytes) is fingerprinted as a degree-(p-1)
//! polynomial in base 263, reduced mod 2^61-1. The full 61-bit value is kept
//! everywhere; index backings reduce it further when bucketing. Also home to
//! the probabilistic primality machinery used to auto-size the fingerprint
//! tables.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::{HASH_BASE, HASH_MOD};

/// Witness count for Miller-Rabin. With witnesses drawn uniformly at random
/// the error probability is below 4^-100 for any composite, Carmichael
/// numbers included.
const MILLER_RABIN_ROUNDS: usize = 100;

/// Reduce a 128-bit value modulo 2^61-1.
///
/// Mersenne identity: x mod M = (x >> 61) + (x & M), corrected once if the
/// sum reaches M. Two rounds cover the full 128-bit range.
#[inline]
pub fn mod_mersenne(x: u128) -> u64 {
    let m = HASH_MOD as u128;
    let mut r = (x >> 61) + (x & m);
    r = (r >> 61) + (r & m);
    if r >= m {
        r -= m;
    }
    r as u64
}

/// Fingerprint of `data[offset..offset + p]`:
/// `(((data[offset]*b + data[offset+1])*b + ...)*b + data[offset+p-1]) mod M`.
pub fn fingerprint(data: &[u8], offset: usize, p: usize) -> u64 {
    let mut h: u64 = 0;
    for &byte in &data[offset..offset + p] {
        h = mod_mersenne(h as u128 * HASH_BASE as u128 + byte as u128);
    }
    h
}

/// `HASH_BASE^(p-1) mod HASH_MOD`, the weight of the window's oldest byte.
pub fn leading_weight(p: usize) -> u64 {
    if p == 0 {
        return 1;
    }
    let mut result: u64 = 1;
    let mut base = HASH_BASE;
    let mut exp = p - 1;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mod_mersenne(result as u128 * base as u128);
        }
        base = mod_mersenne(base as u128 * base as u128);
        exp >>= 1;
    }
    result
}

/// Incrementally maintained window fingerprint.
pub struct RollingHash {
    value: u64,
    bp: u64, // HASH_BASE^(p-1) mod HASH_MOD
    p: usize,
}

impl RollingHash {
    /// Fingerprint `data[offset..offset + p]` as the initial window.
    pub fn new(data: &[u8], offset: usize, p: usize) -> Self {
        RollingHash {
            value: fingerprint(data, offset, p),
            bp: leading_weight(p),
            p,
        }
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    #[inline]
    pub fn seed_len(&self) -> usize {
        self.p
    }

    /// Slide the window right by one byte:
    /// `F' = (F - old_byte * b^(p-1)) * b + new_byte`, all mod M.
    #[inline]
    pub fn roll(&mut self, old_byte: u8, new_byte: u8) {
        let drop = mod_mersenne(old_byte as u128 * self.bp as u128);
        // Keep the subtraction non-negative by wrapping through the modulus.
        let kept = if self.value >= drop {
            self.value - drop
        } else {
            HASH_MOD - (drop - self.value)
        };
        self.value = mod_mersenne(kept as u128 * HASH_BASE as u128 + new_byte as u128);
    }
}

/// Fingerprint source for a left-to-right scan with occasional jumps.
///
/// Consecutive positions roll in O(1); a jump past a match re-seeds the
/// window, which is cheaper than rolling byte-by-byte across the match.
pub struct FingerprintCursor<'a> {
    data: &'a [u8],
    hash: RollingHash,
    pos: usize,
}

impl<'a> FingerprintCursor<'a> {
    /// Cursor over `data` with window `p`; `None` when no window fits.
    pub fn new(data: &'a [u8], p: usize) -> Option<Self> {
        if data.len() < p || p == 0 {
            return None;
        }
        Some(FingerprintCursor {
            data,
            hash: RollingHash::new(data, 0, p),
            pos: 0,
        })
    }

    /// Fingerprint of the window starting at `pos`.
    ///
    /// `pos + p` must not exceed the data length. Any jump other than a
    /// one-byte advance re-seeds the window.
    pub fn at(&mut self, pos: usize) -> u64 {
        let p = self.hash.seed_len();
        debug_assert!(pos + p <= self.data.len());
        if pos == self.pos + 1 {
            self.hash.roll(self.data[self.pos], self.data[self.pos + p]);
            self.pos = pos;
        } else if pos != self.pos {
            self.hash = RollingHash::new(self.data, pos, p);
            self.pos = pos;
        }
        self.hash.value()
    }
}

// ── primality (fingerprint table auto-sizing) ────────────────────────────

/// base^exp mod modulus, with 128-bit intermediates.
fn mod_pow(base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let m = modulus as u128;
    let mut result: u128 = 1;
    let mut b = base as u128 % m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * b % m;
        }
        exp >>= 1;
        b = b * b % m;
    }
    result as u64
}

/// One Miller-Rabin round: does witness `a` fail to expose `n` as composite?
/// `n - 1 = d * 2^r` with `d` odd.
fn witness_passes(a: u64, n: u64, d: u64, r: u32) -> bool {
    let mut x = mod_pow(a, d, n);
    if x == 1 || x == n - 1 {
        return true;
    }
    for _ in 0..r.saturating_sub(1) {
        x = mod_pow(x, 2, n);
        if x == n - 1 {
            return true;
        }
    }
    false
}

/// Miller-Rabin with random witnesses.
///
/// Witnesses are drawn uniformly from `[2, n-2]` by a per-call,
/// entropy-seeded generator; fixed witness sets are unreliable against
/// Carmichael-style composites, random ones are not.
pub fn is_prime(n: usize) -> bool {
    let n = n as u64;
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true; // 2 and 3
    }
    if n % 2 == 0 {
        return false;
    }

    let mut d = n - 1;
    let mut r: u32 = 0;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }

    let mut rng = StdRng::from_entropy();
    for _ in 0..MILLER_RABIN_ROUNDS {
        let a = rng.gen_range(2..=n - 2);
        if !witness_passes(a, n, d, r) {
            return false;
        }
    }
    true
}

/// Smallest prime >= n. Returns 2 for n <= 2, then steps odd candidates.
pub fn next_prime(n: usize) -> usize {
    if n <= 2 {
        return 2;
    }
    let mut candidate = if n % 2 == 0 { n + 1 } else { n };
    while !is_prime(candidate) {
        candidate += 2;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mod_mersenne_identities() {
        assert_eq!(mod_mersenne(0), 0);
        assert_eq!(mod_mersenne(HASH_MOD as u128), 0);
        assert_eq!(mod_mersenne(HASH_MOD as u128 + 1), 1);
        assert_eq!(mod_mersenne(2 * HASH_MOD as u128), 0);
        assert_eq!(mod_mersenne(42), 42);
        assert_eq!(mod_mersenne(u128::MAX), (u128::MAX % HASH_MOD as u128) as u64);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let data = b"ABCDEFGHIJKLMNOP";
        let fp = fingerprint(data, 0, 16);
        assert_ne!(fp, 0);
        assert_eq!(fp, fingerprint(data, 0, 16));
        assert_ne!(fp, fingerprint(data, 0, 15));
    }

    #[test]
    fn fingerprint_short_window_is_polynomial() {
        // p=2: F = (b0 * 263 + b1) mod M, small enough to check directly.
        let data = [7u8, 9u8];
        assert_eq!(fingerprint(&data, 0, 2), 7 * 263 + 9);
    }

    #[test]
    fn rolled_equals_fresh_at_every_offset() {
        let data = b"The quick brown fox jumps over the lazy dog.";
        let p = 8;
        let mut rh = RollingHash::new(data, 0, p);
        for i in 1..=(data.len() - p) {
            rh.roll(data[i - 1], data[i + p - 1]);
            assert_eq!(rh.value(), fingerprint(data, i, p), "mismatch at offset {}", i);
        }
    }

    #[test]
    fn cursor_survives_jumps() {
        let data: Vec<u8> = (0..200u8).collect();
        let p = 4;
        let mut cur = FingerprintCursor::new(&data, p).unwrap();
        assert_eq!(cur.at(0), fingerprint(&data, 0, p));
        assert_eq!(cur.at(1), fingerprint(&data, 1, p));
        assert_eq!(cur.at(57), fingerprint(&data, 57, p));
        assert_eq!(cur.at(58), fingerprint(&data, 58, p));
        assert_eq!(cur.at(58), fingerprint(&data, 58, p));
    }

    #[test]
    fn cursor_rejects_short_data() {
        assert!(FingerprintCursor::new(b"abc", 4).is_none());
        assert!(FingerprintCursor::new(b"abcd", 4).is_some());
    }

    #[test]
    fn small_primes() {
        let primes = [2usize, 3, 5, 7, 11, 13, 17, 19, 23, 1_048_573];
        for p in primes {
            assert!(is_prime(p), "{} is prime", p);
        }
        let composites = [0usize, 1, 4, 6, 9, 15, 21, 1_048_575];
        for c in composites {
            assert!(!is_prime(c), "{} is composite", c);
        }
    }

    #[test]
    fn carmichael_numbers_are_rejected() {
        // Fixed-base Fermat tests pass these; random-witness Miller-Rabin
        // must not.
        for c in [561usize, 1105, 1729, 2465, 2821, 6601, 8911, 41041, 825265] {
            assert!(!is_prime(c), "Carmichael number {} declared prime", c);
        }
    }

    #[test]
    fn next_prime_steps_upward() {
        assert_eq!(next_prime(0), 2);
        assert_eq!(next_prime(2), 2);
        assert_eq!(next_prime(3), 3);
        assert_eq!(next_prime(4), 5);
        assert_eq!(next_prime(14), 17);
        assert_eq!(next_prime(1_048_573), 1_048_573);
        assert!(is_prime(next_prime(1_048_574)));
    }
}
