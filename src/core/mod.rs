// Core matching engine exports
pub mod allocator;
pub mod diversity;
pub mod partner_graph;
pub mod pipeline;
pub mod pool;
pub mod roles;

pub use allocator::{AllocatedCircle, Allocation, MatchingEngine};
pub use diversity::{jaccard_distance, DiversityMetric, JaccardDiversity, TagProfile};
pub use partner_graph::{Cluster, ClusterId, PartnerGraph};
pub use pipeline::{MatchOutcome, MatchingPipeline};
pub use pool::{plan_opt_in, plan_opt_out, sort_pool, OptInPlan};
pub use roles::{assign_roles, RoleAssignment};
