use crate::models::domain::{Circle, MatchingStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response for the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "matchingStatus")]
    pub matching_status: MatchingStatus,
    #[serde(rename = "poolCount")]
    pub pool_count: usize,
    #[serde(rename = "isOptedIn")]
    pub is_opted_in: bool,
    #[serde(rename = "userCircle", skip_serializing_if = "Option::is_none")]
    pub user_circle: Option<Circle>,
}

/// Response for the opt-out endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptOutResponse {
    #[serde(rename = "removedUserIds")]
    pub removed_user_ids: Vec<String>,
}

/// Response for the trigger endpoint
///
/// `unhostedCircles` is non-empty when some hosted circles committed without a
/// host and need manual resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    #[serde(rename = "eventId")]
    pub event_id: Uuid,
    #[serde(rename = "matchingStatus")]
    pub matching_status: MatchingStatus,
    pub circles: Vec<Circle>,
    #[serde(rename = "unhostedCircles")]
    pub unhosted_circles: Vec<Uuid>,
}

/// Response for the results endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CirclesResponse {
    #[serde(rename = "eventId")]
    pub event_id: Uuid,
    pub circles: Vec<Circle>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
}
