//! Curve smoothing and downsampling
//!
//! Smoothing level `k` is the operator of `k²` passes of the binomial kernel
//! `[1/4, 1/2, 1/4]` with reflecting edges. The passes collapse into one
//! convolution with the binomial kernel of `2k²` (half-sample symmetric
//! extension at both ends), truncated where its weights fall below
//! [`KERNEL_CUTOFF`] of the center weight. The truncated kernel has about
//! `12.5 k` taps, so a level costs `O(k n)` rather than `O(k² n)`.
//!
//! Each level is a symmetric, doubly stochastic averaging: it preserves the
//! mean, keeps every value inside the original range and cannot increase
//! variance, so a higher level is always at least as flat as a lower one.
//!
//! References:
//! - Marchand & Marmet (1983), binomial smoothing filter

use super::SmoothingLevel;

/// Relative weight below which binomial tail taps are dropped.
pub const KERNEL_CUTOFF: f64 = 1e-17;

/// Number of `[1/4, 1/2, 1/4]` passes a smoothing level stands for.
#[must_use]
pub const fn passes(level: SmoothingLevel) -> usize {
    let k = level.get() as usize;
    k * k
}

/// Normalized, symmetric convolution kernel for a smoothing level.
///
/// Length is always odd; level 0 yields `[1.0]`.
#[must_use]
pub fn binomial_kernel(level: SmoothingLevel) -> Vec<f64> {
    let order = u32::from(level.get()).pow(2);

    // Weights relative to the center tap, C(2m, m + d) / C(2m, m).
    let mut half = vec![1.0];
    let mut weight = 1.0;
    for d in 0..order {
        weight *= f64::from(order - d) / f64::from(order + d + 1);
        if weight < KERNEL_CUTOFF {
            break;
        }
        half.push(weight);
    }

    let total = 2.0f64.mul_add(half.iter().sum::<f64>(), -1.0);
    half.iter()
        .rev()
        .chain(half.iter().skip(1))
        .map(|w| w / total)
        .collect()
}

/// Smooth `values` in place at the given level.
///
/// Level 0 leaves the slice untouched.
pub fn smooth_in_place(values: &mut [f64], level: SmoothingLevel) {
    let n = values.len();
    if n < 2 || level.is_identity() {
        return;
    }

    let kernel = binomial_kernel(level);
    let radius = kernel.len() / 2;
    let extended: Vec<f64> = (0..n + 2 * radius)
        .map(|position| values[mirrored(position, radius, n)])
        .collect();

    for (i, out) in values.iter_mut().enumerate() {
        *out = extended[i..i + kernel.len()]
            .iter()
            .zip(&kernel)
            .fold(0.0, |acc, (x, w)| w.mul_add(*x, acc));
    }
}

/// Source index of `position` in a buffer padded by `radius` on both sides,
/// mirroring about the half-sample points `-1/2` and `n - 1/2`.
const fn mirrored(position: usize, radius: usize, n: usize) -> usize {
    let period = 2 * n;
    let offset = (position + period * (radius / period + 1) - radius) % period;
    if offset < n {
        offset
    } else {
        period - 1 - offset
    }
}

/// Indices kept when thinning `len` points down toward `max_points`.
///
/// Keeps every `len / max_points`-th point starting from the first, so the
/// result can exceed `max_points` by less than a factor of two.
#[must_use]
pub fn downsample_indices(len: usize, max_points: usize) -> Vec<usize> {
    if max_points == 0 || len <= max_points {
        return (0..len).collect();
    }
    let stride = len / max_points;
    (0..len).step_by(stride).collect()
}
