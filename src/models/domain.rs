use crate::error::CircleError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// How a circle shares its meal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "event_format", rename_all = "lowercase")]
pub enum EventFormat {
    /// Each member hosts one course, the group moves between homes
    Rotating,
    /// One member hosts the whole meal
    Hosted,
}

/// Matching lifecycle of an event
///
/// `open -> matching -> closed`, with `matching -> open` used only to roll back
/// a failed trigger. `closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "matching_status", rename_all = "lowercase")]
pub enum MatchingStatus {
    Open,
    Matching,
    Closed,
}

impl MatchingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchingStatus::Open => "open",
            MatchingStatus::Matching => "matching",
            MatchingStatus::Closed => "closed",
        }
    }

    pub fn can_transition_to(&self, next: MatchingStatus) -> bool {
        matches!(
            (self, next),
            (MatchingStatus::Open, MatchingStatus::Matching)
                | (MatchingStatus::Matching, MatchingStatus::Closed)
                | (MatchingStatus::Matching, MatchingStatus::Open)
        )
    }

    /// Validate and perform a lifecycle transition
    pub fn transition(self, next: MatchingStatus) -> Result<MatchingStatus, CircleError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CircleError::InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for MatchingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled dinner event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub format: EventFormat,
    #[serde(rename = "matchingStatus")]
    pub matching_status: MatchingStatus,
    #[serde(rename = "minimumPoolSize")]
    pub minimum_pool_size: usize,
    #[serde(rename = "circleSize")]
    pub circle_size: usize,
}

impl Event {
    pub fn new(format: EventFormat, minimum_pool_size: usize, circle_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            format,
            matching_status: MatchingStatus::Open,
            minimum_pool_size,
            circle_size,
        }
    }

    pub fn is_open(&self) -> bool {
        self.matching_status == MatchingStatus::Open
    }
}

/// Course a member may prefer to cook (advisory only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "course", rename_all = "lowercase")]
pub enum Course {
    Starter,
    Main,
    Dessert,
}

impl Course {
    pub const ALL: [Course; 3] = [Course::Starter, Course::Main, Course::Dessert];

    pub fn role(&self) -> Role {
        match self {
            Course::Starter => Role::Starter,
            Course::Main => Role::Main,
            Course::Dessert => Role::Dessert,
        }
    }
}

/// Role of a member within a circle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "circle_role", rename_all = "lowercase")]
pub enum Role {
    Host,
    Starter,
    Main,
    Dessert,
    Participant,
}

/// Attributes a participant supplies when opting in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptInAttributes {
    #[serde(rename = "hostingAvailable")]
    pub hosting_available: bool,
    #[serde(rename = "dietaryRestrictions", default)]
    pub dietary_restrictions: BTreeSet<String>,
    #[serde(default)]
    pub interests: BTreeSet<String>,
    #[serde(rename = "matchAddress", default)]
    pub match_address: Option<String>,
    #[serde(rename = "coursePreference", default)]
    pub course_preference: Option<Course>,
}

/// A participant's registration for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptInRecord {
    #[serde(rename = "eventId")]
    pub event_id: Uuid,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "partnerUserId")]
    pub partner_user_id: Option<String>,
    #[serde(flatten)]
    pub attributes: OptInAttributes,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl OptInRecord {
    pub fn new(event_id: Uuid, user_id: impl Into<String>, attributes: OptInAttributes) -> Self {
        Self {
            event_id,
            user_id: user_id.into(),
            partner_user_id: None,
            attributes,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn with_partner(mut self, partner_user_id: impl Into<String>) -> Self {
        self.partner_user_id = Some(partner_user_id.into());
        self
    }

    pub fn hosting_available(&self) -> bool {
        self.attributes.hosting_available
    }
}

/// Reference to a partner given at opt-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartnerRef {
    UserId(String),
    Email(String),
}

/// A finalized group of participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub id: Uuid,
    #[serde(rename = "eventId")]
    pub event_id: Uuid,
    pub format: EventFormat,
    /// Holds the remainder when the pool does not divide evenly
    #[serde(rename = "isOverflow")]
    pub is_overflow: bool,
    /// Set when a hosted circle had no member able to host
    #[serde(rename = "needsHost")]
    pub needs_host: bool,
    pub members: Vec<CircleMember>,
}

impl Circle {
    pub fn contains(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    pub fn role_count(&self, role: Role) -> usize {
        self.members.iter().filter(|m| m.role == role).count()
    }
}

/// A member of a circle with its role and a snapshot of opt-in attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleMember {
    #[serde(rename = "circleId")]
    pub circle_id: Uuid,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub role: Role,
    #[serde(rename = "partnerUserId")]
    pub partner_user_id: Option<String>,
    #[serde(rename = "dietaryRestrictions")]
    pub dietary_restrictions: BTreeSet<String>,
    pub interests: BTreeSet<String>,
    #[serde(rename = "matchAddress")]
    pub match_address: Option<String>,
}

impl CircleMember {
    pub fn from_record(circle_id: Uuid, record: &OptInRecord, role: Role) -> Self {
        Self {
            circle_id,
            user_id: record.user_id.clone(),
            role,
            partner_user_id: record.partner_user_id.clone(),
            dietary_restrictions: record.attributes.dietary_restrictions.clone(),
            interests: record.attributes.interests.clone(),
            match_address: record.attributes.match_address.clone(),
        }
    }
}

/// Weights of the diversity metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiversityWeights {
    pub interests: f64,
    pub dietary: f64,
}

impl Default for DiversityWeights {
    fn default() -> Self {
        Self {
            interests: 0.7,
            dietary: 0.3,
        }
    }
}
