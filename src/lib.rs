//! Circle Match - matching engine for communal dinner circles
//!
//! Participants opt in to an event, optionally linked to a partner. A one-shot
//! trigger partitions the pool into circles of a fixed size, keeping partners
//! together and spreading interests, then assigns course or host roles.

pub mod auth;
pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{DiversityMetric, JaccardDiversity, MatchOutcome, MatchingEngine, MatchingPipeline, PartnerGraph};
pub use error::CircleError;
pub use models::{Circle, CircleMember, Event, EventFormat, MatchingStatus, OptInAttributes, OptInRecord, Role};
pub use services::{EventStore, MatchingService, MemoryStore, OptInService};
