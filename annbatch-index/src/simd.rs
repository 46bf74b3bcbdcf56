//! # Distance Kernels
//!
//! Distances used by the bundled engines. On x86_64 the AVX2+FMA path is
//! picked at runtime; everywhere else a four-lane unrolled loop that the
//! compiler vectorizes on its own.
//!
//! Both kernels are one accumulation loop over `a` and `b`:
//!
//! ```text
//!   dot:  acc += a[i] * b[i]
//!   l2:   acc += (a[i] - b[i])^2
//! ```

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// Metric an engine ranks neighbors by. Smaller is closer for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DistanceMetric {
    /// Squared Euclidean distance
    L2 = 1,
    /// 1 - inner product
    InnerProduct = 2,
}

impl DistanceMetric {
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => l2_distance_squared(a, b),
            DistanceMetric::InnerProduct => 1.0 - dot_product(a, b),
        }
    }

    /// Tag used in persisted index headers
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(DistanceMetric::L2),
            2 => Some(DistanceMetric::InnerProduct),
            _ => None,
        }
    }
}

/// Inner product of `a` and `b`
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    accumulate::<false>(a, b)
}

/// Squared Euclidean distance between `a` and `b`
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    accumulate::<true>(a, b)
}

/// Sum of squares of `v`
#[inline]
pub fn squared_norm(v: &[f32]) -> f32 {
    dot_product(v, v)
}

#[inline]
fn accumulate<const DIFF: bool>(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            // SAFETY: features checked above
            return unsafe { accumulate_avx2::<DIFF>(a, b) };
        }
    }

    accumulate_unrolled::<DIFF>(a, b)
}

#[inline(always)]
fn term<const DIFF: bool>(x: f32, y: f32) -> f32 {
    if DIFF {
        let d = x - y;
        d * d
    } else {
        x * y
    }
}

fn accumulate_unrolled<const DIFF: bool>(a: &[f32], b: &[f32]) -> f32 {
    let mut lanes = [0.0f32; 4];
    let mut ca = a.chunks_exact(4);
    let mut cb = b.chunks_exact(4);
    for (xa, xb) in (&mut ca).zip(&mut cb) {
        for k in 0..4 {
            lanes[k] += term::<DIFF>(xa[k], xb[k]);
        }
    }

    let tail: f32 = ca
        .remainder()
        .iter()
        .zip(cb.remainder())
        .map(|(&x, &y)| term::<DIFF>(x, y))
        .sum();
    (lanes[0] + lanes[1]) + (lanes[2] + lanes[3]) + tail
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn accumulate_avx2<const DIFF: bool>(a: &[f32], b: &[f32]) -> f32 {
    let blocks = a.len() / 8;
    let mut acc = _mm256_setzero_ps();
    for block in 0..blocks {
        let xa = _mm256_loadu_ps(a.as_ptr().add(block * 8));
        let xb = _mm256_loadu_ps(b.as_ptr().add(block * 8));
        acc = if DIFF {
            let d = _mm256_sub_ps(xa, xb);
            _mm256_fmadd_ps(d, d, acc)
        } else {
            _mm256_fmadd_ps(xa, xb, acc)
        };
    }

    // Fold 8 lanes down to 1
    let halves = _mm_add_ps(_mm256_castps256_ps128(acc), _mm256_extractf128_ps(acc, 1));
    let pairs = _mm_add_ps(halves, _mm_movehl_ps(halves, halves));
    let single = _mm_add_ss(pairs, _mm_shuffle_ps(pairs, pairs, 0b01));

    let done = blocks * 8;
    _mm_cvtss_f32(single) + accumulate_unrolled::<DIFF>(&a[done..], &b[done..])
}
