use crate::models::MatchingStatus;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the opt-in pool, the matching pipeline and the stores
#[derive(Debug, Error)]
pub enum CircleError {
    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("User {user_id} has already opted in to event {event_id}")]
    AlreadyOptedIn { event_id: Uuid, user_id: String },

    #[error("User {user_id} has not opted in to event {event_id}")]
    NotOptedIn { event_id: Uuid, user_id: String },

    #[error("Event {event_id} is not open for opt-ins (status: {status})")]
    EventNotOpen { event_id: Uuid, status: MatchingStatus },

    #[error("Partner {partner_id} is already linked to {linked_to}")]
    PartnerConflict { partner_id: String, linked_to: String },

    #[error("Invalid partner reference: {0}")]
    InvalidPartner(String),

    #[error("Corrupt partner link between {user_id} and {partner_id}")]
    CorruptPartnerLink { user_id: String, partner_id: String },

    #[error("Pool has {pool_size} participants, at least {minimum} required")]
    InsufficientPool { pool_size: usize, minimum: usize },

    #[error("Matching for event {0} has already been triggered")]
    AlreadyTriggered(Uuid),

    #[error("No member of circle {circle_index} is available to host")]
    NoHostAvailable { circle_index: usize },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: MatchingStatus,
        to: MatchingStatus,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CircleError {
    /// Stable machine-readable code used in HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            CircleError::EventNotFound(_) => "event_not_found",
            CircleError::AlreadyOptedIn { .. } => "already_opted_in",
            CircleError::NotOptedIn { .. } => "not_opted_in",
            CircleError::EventNotOpen { .. } => "event_not_open",
            CircleError::PartnerConflict { .. } => "partner_conflict",
            CircleError::InvalidPartner(_) => "invalid_partner",
            CircleError::CorruptPartnerLink { .. } => "corrupt_partner_link",
            CircleError::InsufficientPool { .. } => "insufficient_pool",
            CircleError::AlreadyTriggered(_) => "already_triggered",
            CircleError::NoHostAvailable { .. } => "no_host_available",
            CircleError::InvalidTransition { .. } => "invalid_transition",
            CircleError::InvalidConfiguration(_) => "invalid_configuration",
            CircleError::Storage(_) | CircleError::Migration(_) => "storage_error",
            CircleError::Internal(_) => "internal_error",
        }
    }

    /// Errors that indicate broken data or infrastructure rather than a bad request
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CircleError::CorruptPartnerLink { .. }
                | CircleError::InvalidTransition { .. }
                | CircleError::InvalidConfiguration(_)
                | CircleError::Storage(_)
                | CircleError::Migration(_)
                | CircleError::Internal(_)
        )
    }
}
