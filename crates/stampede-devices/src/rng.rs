//! Stateless hash-based random numbers.
//!
//! Each value is computed from its coordinates (a seed plus two indices), so
//! a simulation that is reset and re-run draws exactly the same sequence.
//! Devices use it for tie-breaking decisions such as the op-amp rail escape
//! and for the noise waveform.

/// SplitMix64 mixing function.
#[inline]
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

/// Mix a seed with two coordinates into one hash input.
#[inline]
pub fn combine(seed: u64, a: u64, b: u64) -> u64 {
    seed ^ a.wrapping_mul(0x517cc1b727220a95) ^ b.wrapping_mul(0x5851f42d4c957f2d)
}

/// Uniform value in [0, 1).
#[inline]
pub fn uniform(seed: u64, a: u64, b: u64) -> f64 {
    let bits = splitmix64(combine(seed, a, b));
    // top 53 bits give the full f64 mantissa
    (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

/// True with probability `1 / n`.
#[inline]
pub fn one_in(n: u64, seed: u64, a: u64, b: u64) -> bool {
    n > 0 && splitmix64(combine(seed, a, b)) % n == 0
}
