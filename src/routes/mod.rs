// Route exports
pub mod events;

use crate::error::CircleError;
use crate::models::ErrorResponse;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};

pub use events::AppState;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/v1").configure(events::configure));
}

impl ResponseError for CircleError {
    fn status_code(&self) -> StatusCode {
        match self {
            CircleError::AlreadyOptedIn { .. }
            | CircleError::PartnerConflict { .. }
            | CircleError::AlreadyTriggered(_)
            | CircleError::EventNotOpen { .. } => StatusCode::CONFLICT,
            CircleError::NotOptedIn { .. } | CircleError::EventNotFound(_) => StatusCode::NOT_FOUND,
            CircleError::InvalidPartner(_) => StatusCode::BAD_REQUEST,
            CircleError::InsufficientPool { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CircleError::NoHostAvailable { .. }
            | CircleError::CorruptPartnerLink { .. }
            | CircleError::InvalidTransition { .. }
            | CircleError::InvalidConfiguration(_)
            | CircleError::Storage(_)
            | CircleError::Migration(_)
            | CircleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // Internal details stay in the log
        let message = if self.is_internal() {
            tracing::error!("Request failed: {}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: self.kind().to_string(),
            message,
            status_code: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(CircleError::AlreadyTriggered(id).status_code(), StatusCode::CONFLICT);
        assert_eq!(CircleError::EventNotFound(id).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            CircleError::InvalidPartner("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CircleError::InsufficientPool { pool_size: 1, minimum: 6 }.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            CircleError::CorruptPartnerLink {
                user_id: "a".to_string(),
                partner_id: "b".to_string()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
