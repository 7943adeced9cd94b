use crate::core::allocator::MatchingEngine;
use crate::core::diversity::DiversityMetric;
use crate::core::partner_graph::PartnerGraph;
use crate::core::pool::sort_pool;
use crate::core::roles::{assign_roles, RoleAssignment};
use crate::error::CircleError;
use crate::models::{Circle, CircleMember, Event, OptInRecord, Role};
use std::sync::Arc;
use uuid::Uuid;

/// Circles produced by one trigger, ready to persist
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub circles: Vec<Circle>,
    /// Hosted circles that committed without a host and need an admin
    pub unhosted_circles: Vec<Uuid>,
}

impl MatchOutcome {
    pub fn participant_count(&self) -> usize {
        self.circles.iter().map(|c| c.members.len()).sum()
    }
}

/// Runs partner graph, allocation and role assignment over a pool snapshot
///
/// Pure and synchronous, so stores can call it inside their transaction or
/// hand it to a blocking worker.
#[derive(Debug, Clone)]
pub struct MatchingPipeline {
    metric: Arc<dyn DiversityMetric>,
}

impl MatchingPipeline {
    pub fn new(metric: Arc<dyn DiversityMetric>) -> Self {
        Self { metric }
    }

    pub fn run(&self, event: &Event, mut pool: Vec<OptInRecord>) -> Result<MatchOutcome, CircleError> {
        sort_pool(&mut pool);

        let engine = MatchingEngine::new(event.circle_size, event.minimum_pool_size, self.metric.clone())?;
        let graph = PartnerGraph::build(&pool)?;
        let allocation = engine.allocate(&pool, &graph)?;

        let mut circles = Vec::with_capacity(allocation.circles.len());
        let mut unhosted_circles = Vec::new();

        for (index, allocated) in allocation.circles.iter().enumerate() {
            let circle_id = Uuid::new_v4();

            let (assignments, needs_host) =
                match assign_roles(index, allocated, &graph, &pool, event.format) {
                    Ok(assignments) => (assignments, false),
                    Err(CircleError::NoHostAvailable { .. }) => {
                        tracing::warn!(
                            "Circle {} of event {} has no member available to host",
                            circle_id,
                            event.id
                        );
                        unhosted_circles.push(circle_id);
                        let everyone = allocated
                            .members
                            .iter()
                            .map(|&member| RoleAssignment {
                                member,
                                role: Role::Participant,
                            })
                            .collect();
                        (everyone, true)
                    }
                    Err(e) => return Err(e),
                };

            let members = assignments
                .iter()
                .map(|a| CircleMember::from_record(circle_id, &pool[a.member], a.role))
                .collect();

            circles.push(Circle {
                id: circle_id,
                event_id: event.id,
                format: event.format,
                is_overflow: allocated.is_overflow,
                needs_host,
                members,
            });
        }

        Ok(MatchOutcome {
            circles,
            unhosted_circles,
        })
    }
}
