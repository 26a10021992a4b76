//! Two fixed-arity algebraic hashes over the BN254 scalar field, plus the
//! N-fold reduction rule used for variable-length inputs (distributions).
//!
//! The permutation follows the MiMC-style construction used elsewhere in
//! this corpus for circuit-friendly commitments (x^7 S-box, deterministic
//! round constants derived from small integers — see e.g. the MiMC hasher
//! used to match a Noir circuit's public inputs). `hash2`/`hash5` are built
//! by repeatedly compressing the running state with each new input
//! (Miyaguchi-Preneel style feed-forward), and `hashN` is exactly the
//! left-fold `hash2` reduction this protocol defines.

use crate::field::Fr;
use ark_ff::Field;

const ROUNDS: usize = 91;

/// Deterministic, collision-resistant (under algebraic hash assumptions)
/// hash over `Fr`. Stateless — round constants are derived on the fly from
/// the round index, so every instance agrees bit-exact.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashEngine;

impl HashEngine {
    pub fn new() -> Self {
        Self
    }

    /// RC[i] = (i+1)^3 + (i+1), matching the style of round-constant
    /// derivation used by this corpus's MiMC implementations.
    fn round_constant(i: usize) -> Fr {
        let idx = Fr::from((i + 1) as u64);
        idx * idx * idx + idx
    }

    /// MiMC round function: (x + k + c)^7.
    fn round(x: Fr, k: Fr, c: Fr) -> Fr {
        let t = x + k + c;
        let t2 = t.square();
        let t4 = t2.square();
        let t6 = t4 * t2;
        t6 * t
    }

    /// MiMC permutation of `x` keyed by `k`.
    fn permute(x: Fr, k: Fr) -> Fr {
        let mut state = x;
        for i in 0..ROUNDS {
            state = Self::round(state, k, Self::round_constant(i));
        }
        state + k
    }

    /// Compresses `state` with `input` (one step of the sponge).
    fn compress(state: Fr, input: Fr) -> Fr {
        Self::permute(state, input) + input
    }

    /// arity-2 hash.
    pub fn hash2(&self, a: Fr, b: Fr) -> Fr {
        Self::compress(a, b)
    }

    /// arity-5 hash.
    pub fn hash5(&self, a: Fr, b: Fr, c: Fr, d: Fr, e: Fr) -> Fr {
        let mut state = a;
        state = Self::compress(state, b);
        state = Self::compress(state, c);
        state = Self::compress(state, d);
        state = Self::compress(state, e);
        state
    }

    /// Left-fold N-ary reduction: `hashN([]) = 0`, `hashN([x]) = x`,
    /// `hashN([x, rest...]) = hash2(x, hashN(rest))`.
    pub fn hash_n(&self, xs: &[Fr]) -> Fr {
        match xs {
            [] => Fr::from(0u64),
            [x] => *x,
            [x, rest @ ..] => self.hash2(*x, self.hash_n(rest)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash2_is_deterministic_and_order_sensitive() {
        let h = HashEngine::new();
        let a = Fr::from(1u64);
        let b = Fr::from(2u64);
        assert_eq!(h.hash2(a, b), h.hash2(a, b));
        assert_ne!(h.hash2(a, b), h.hash2(b, a));
    }

    #[test]
    fn hash_n_matches_left_fold_definition() {
        let h = HashEngine::new();
        let xs: Vec<Fr> = (0..4).map(|i| Fr::from(i as u64)).collect();
        let expected = h.hash2(xs[0], h.hash2(xs[1], h.hash2(xs[2], xs[3])));
        assert_eq!(h.hash_n(&xs), expected);
        assert_eq!(h.hash_n(&[]), Fr::from(0u64));
        assert_eq!(h.hash_n(&xs[..1]), xs[0]);
    }

    #[test]
    fn hash5_is_stable_across_calls() {
        let h = HashEngine::new();
        let vals: Vec<Fr> = (10..15).map(|i| Fr::from(i as u64)).collect();
        let first = h.hash5(vals[0], vals[1], vals[2], vals[3], vals[4]);
        let second = h.hash5(vals[0], vals[1], vals[2], vals[3], vals[4]);
        assert_eq!(first, second);
    }
}
