use crate::models::{DiversityWeights, OptInRecord};
use std::collections::BTreeSet;

/// Tags describing a cluster or a partially filled circle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagProfile {
    pub interests: BTreeSet<String>,
    pub dietary: BTreeSet<String>,
}

impl TagProfile {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a OptInRecord>) -> Self {
        let mut profile = Self::default();
        for record in records {
            profile.absorb(record);
        }
        profile
    }

    pub fn absorb(&mut self, record: &OptInRecord) {
        self.interests
            .extend(record.attributes.interests.iter().cloned());
        self.dietary
            .extend(record.attributes.dietary_restrictions.iter().cloned());
    }

    pub fn merge(&mut self, other: &TagProfile) {
        self.interests.extend(other.interests.iter().cloned());
        self.dietary.extend(other.dietary.iter().cloned());
    }
}

/// Scores how different an incoming cluster is from a circle's current members
///
/// Higher means more dissimilar. The allocator places each cluster in the
/// circle with the highest score, so swapping the metric changes composition
/// but never completeness or partner adjacency.
pub trait DiversityMetric: Send + Sync + std::fmt::Debug {
    /// Score in `0.0..=1.0`. `circle_size` is the number of people already placed.
    fn dissimilarity(&self, circle: &TagProfile, circle_size: usize, incoming: &TagProfile) -> f64;
}

/// Weighted Jaccard distance over interest and dietary tags
#[derive(Debug, Clone, Copy)]
pub struct JaccardDiversity {
    weights: DiversityWeights,
}

impl JaccardDiversity {
    pub fn new(weights: DiversityWeights) -> Self {
        Self { weights }
    }
}

impl Default for JaccardDiversity {
    fn default() -> Self {
        Self::new(DiversityWeights::default())
    }
}

impl DiversityMetric for JaccardDiversity {
    fn dissimilarity(&self, circle: &TagProfile, circle_size: usize, incoming: &TagProfile) -> f64 {
        if circle_size == 0 {
            return 1.0;
        }

        let total = self.weights.interests + self.weights.dietary;
        if total <= 0.0 {
            return 1.0;
        }

        let score = jaccard_distance(&circle.interests, &incoming.interests) * self.weights.interests
            + jaccard_distance(&circle.dietary, &incoming.dietary) * self.weights.dietary;

        (score / total).clamp(0.0, 1.0)
    }
}

/// `1 - |A ∩ B| / |A ∪ B|`, defined as 1.0 when both sets are empty
#[inline]
pub fn jaccard_distance(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    let shared = a.intersection(b).count();
    1.0 - shared as f64 / union as f64
}
