//! # Vector Policies
//!
//! Transforms applied on the way into and out of an engine:
//!
//! ```text
//!   caller vector ──► Normalization ──► engine ──► DistanceTransform ──► caller
//! ```
//!
//! Both are chosen once per index and applied uniformly on every path
//! (single item, row-major batch, column-major batch).

use crate::simd::squared_norm;

/// Added to the norm so the zero vector stays finite
pub const NORM_EPSILON: f32 = 1e-30;

/// Preprocessing applied to every vector before insert or search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    Identity,
    /// Divide by `sqrt(sum of squares) + NORM_EPSILON`
    L2,
}

impl Normalization {
    /// Apply in place
    #[inline]
    pub fn apply(self, vector: &mut [f32]) {
        match self {
            Normalization::Identity => {}
            Normalization::L2 => {
                let norm = squared_norm(vector).sqrt() + NORM_EPSILON;
                for x in vector.iter_mut() {
                    *x /= norm;
                }
            }
        }
    }

    /// Normalized copy of `vector`
    pub fn normalized(self, vector: &[f32]) -> Vec<f32> {
        let mut v = vector.to_vec();
        self.apply(&mut v);
        v
    }
}

/// Postprocessing applied to raw engine distances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceTransform {
    Identity,
    /// Squared distances in, true distances out
    Sqrt,
}

impl DistanceTransform {
    #[inline]
    pub fn apply_one(self, distance: f32) -> f32 {
        match self {
            DistanceTransform::Identity => distance,
            DistanceTransform::Sqrt => distance.sqrt(),
        }
    }

    /// Apply element-wise in place
    pub fn apply(self, distances: &mut [f32]) {
        if self == DistanceTransform::Sqrt {
            for d in distances.iter_mut() {
                *d = d.sqrt();
            }
        }
    }
}
