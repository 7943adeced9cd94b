use crate::core::diversity::{DiversityMetric, JaccardDiversity, TagProfile};
use crate::core::partner_graph::{ClusterId, PartnerGraph};
use crate::error::CircleError;
use crate::models::OptInRecord;
use std::sync::Arc;

/// Scores closer than this are treated as equal so placement stays reproducible
const SCORE_EPSILON: f64 = 1e-9;

/// A circle produced by the allocator, before roles are assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedCircle {
    /// Clusters in placement order
    pub clusters: Vec<ClusterId>,
    /// Pool indices of all members in placement order
    pub members: Vec<usize>,
    /// Seats this circle was sized for
    pub target: usize,
    pub is_overflow: bool,
}

impl AllocatedCircle {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn free_seats(&self) -> usize {
        self.target - self.members.len()
    }
}

/// Result of one allocation run
#[derive(Debug, Clone)]
pub struct Allocation {
    pub circles: Vec<AllocatedCircle>,
    pub participant_count: usize,
}

impl Allocation {
    pub fn overflow(&self) -> Option<&AllocatedCircle> {
        self.circles.iter().find(|c| c.is_overflow)
    }
}

/// Partitions partner clusters into fixed-size circles
///
/// # Algorithm
/// 1. Size circles: `n / circle_size` full circles plus one overflow circle
///    holding the remainder, if any
/// 2. Take clusters pairs first (the graph already orders them)
/// 3. Put each cluster in the circle with enough free seats whose members are
///    most dissimilar to it, breaking ties by lowest fill, then lowest index
///
/// The circle size must be even: with pairs placed first every full circle
/// keeps an even number of free seats, so a pair always finds room.
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    circle_size: usize,
    minimum_pool_size: usize,
    metric: Arc<dyn DiversityMetric>,
}

impl MatchingEngine {
    pub fn new(
        circle_size: usize,
        minimum_pool_size: usize,
        metric: Arc<dyn DiversityMetric>,
    ) -> Result<Self, CircleError> {
        if circle_size < 2 || circle_size % 2 != 0 {
            return Err(CircleError::InvalidConfiguration(format!(
                "circle size must be an even number of at least 2, got {}",
                circle_size
            )));
        }
        if minimum_pool_size == 0 {
            return Err(CircleError::InvalidConfiguration(
                "minimum pool size must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            circle_size,
            minimum_pool_size,
            metric,
        })
    }

    pub fn with_default_metric(circle_size: usize, minimum_pool_size: usize) -> Result<Self, CircleError> {
        Self::new(circle_size, minimum_pool_size, Arc::new(JaccardDiversity::default()))
    }

    pub fn circle_size(&self) -> usize {
        self.circle_size
    }

    pub fn minimum_pool_size(&self) -> usize {
        self.minimum_pool_size
    }

    /// Partition the pool's clusters into circles
    ///
    /// # Arguments
    /// * `pool` - The pool snapshot the graph was built from
    /// * `graph` - Clusters of that pool
    ///
    /// # Returns
    /// Every participant in exactly one circle, partners together
    pub fn allocate(&self, pool: &[OptInRecord], graph: &PartnerGraph) -> Result<Allocation, CircleError> {
        let participant_count = graph.participant_count();

        if participant_count < self.minimum_pool_size {
            return Err(CircleError::InsufficientPool {
                pool_size: participant_count,
                minimum: self.minimum_pool_size,
            });
        }

        let full = participant_count / self.circle_size;
        let remainder = participant_count % self.circle_size;

        let mut circles: Vec<AllocatedCircle> = (0..full)
            .map(|_| AllocatedCircle {
                clusters: Vec::new(),
                members: Vec::new(),
                target: self.circle_size,
                is_overflow: false,
            })
            .collect();

        if remainder > 0 {
            circles.push(AllocatedCircle {
                clusters: Vec::new(),
                members: Vec::new(),
                target: remainder,
                is_overflow: true,
            });
        }

        let mut profiles = vec![TagProfile::default(); circles.len()];

        for (cluster_id, cluster) in graph.clusters().iter().enumerate() {
            let incoming = TagProfile::from_records(cluster.members.iter().map(|&i| &pool[i]));

            let chosen = self
                .select_circle(&circles, &profiles, &incoming, cluster.size())
                .ok_or_else(|| {
                    CircleError::Internal(format!(
                        "no circle has {} free seats for cluster {}",
                        cluster.size(),
                        cluster_id
                    ))
                })?;

            circles[chosen].clusters.push(cluster_id);
            circles[chosen].members.extend(cluster.members.iter().copied());
            profiles[chosen].merge(&incoming);
        }

        tracing::debug!(
            "Allocated {} participants into {} circles ({} pairs, overflow: {})",
            participant_count,
            circles.len(),
            graph.pair_count(),
            remainder
        );

        Ok(Allocation {
            circles,
            participant_count,
        })
    }

    fn select_circle(
        &self,
        circles: &[AllocatedCircle],
        profiles: &[TagProfile],
        incoming: &TagProfile,
        seats: usize,
    ) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;

        for (index, circle) in circles.iter().enumerate() {
            if circle.free_seats() < seats {
                continue;
            }

            let score = self
                .metric
                .dissimilarity(&profiles[index], circle.len(), incoming);

            let better = match best {
                None => true,
                Some((best_index, best_score)) => {
                    if score > best_score + SCORE_EPSILON {
                        true
                    } else if score < best_score - SCORE_EPSILON {
                        false
                    } else {
                        circle.len() < circles[best_index].len()
                    }
                }
            };

            if better {
                best = Some((index, score));
            }
        }

        best.map(|(index, _)| index)
    }
}
