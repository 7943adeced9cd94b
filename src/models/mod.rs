// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    Circle, CircleMember, Course, DiversityWeights, Event, EventFormat, MatchingStatus, OptInAttributes,
    OptInRecord, PartnerRef, Role,
};
pub use requests::{CreateEventRequest, OptInRequest};
pub use responses::{
    CirclesResponse, ErrorResponse, HealthResponse, OptOutResponse, StatusResponse, TriggerResponse,
};
