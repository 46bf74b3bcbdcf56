//! Metric space descriptors: the engine metric plus the policies that adapt
//! it to what callers expect.

use annbatch_core::config::SpaceKind;

use crate::policy::{DistanceTransform, Normalization};
use crate::simd::DistanceMetric;

/// Resolved metric space of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Space {
    pub kind: SpaceKind,
    pub metric: DistanceMetric,
    pub normalization: Normalization,
    pub transform: DistanceTransform,
}

impl Space {
    pub fn new(kind: SpaceKind) -> Self {
        let (metric, normalization, transform) = match kind {
            SpaceKind::L2 => (DistanceMetric::L2, Normalization::Identity, DistanceTransform::Identity),
            SpaceKind::Euclidean => (DistanceMetric::L2, Normalization::Identity, DistanceTransform::Sqrt),
            SpaceKind::Cosine => (
                DistanceMetric::InnerProduct,
                Normalization::L2,
                DistanceTransform::Identity,
            ),
            SpaceKind::InnerProduct => (
                DistanceMetric::InnerProduct,
                Normalization::Identity,
                DistanceTransform::Identity,
            ),
        };
        Self {
            kind,
            metric,
            normalization,
            transform,
        }
    }
}

impl From<SpaceKind> for Space {
    fn from(kind: SpaceKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_table() {
        let e = Space::new(SpaceKind::Euclidean);
        assert_eq!(e.metric, DistanceMetric::L2);
        assert_eq!(e.transform, DistanceTransform::Sqrt);

        let c = Space::new(SpaceKind::Cosine);
        assert_eq!(c.metric, DistanceMetric::InnerProduct);
        assert_eq!(c.normalization, Normalization::L2);

        let ip = Space::from(SpaceKind::InnerProduct);
        assert_eq!(ip.normalization, Normalization::Identity);
    }
}
