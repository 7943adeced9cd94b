use crate::auth::AuthUser;
use crate::models::{CreateEventRequest, ErrorResponse, HealthResponse, OptInRequest, OptOutResponse};
use crate::services::{EventStore, MatchingService, OptInService};
use actix_web::{web, HttpResponse};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub opt_in: OptInService,
    pub matching: MatchingService,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>, matching: MatchingService) -> Self {
        Self {
            opt_in: OptInService::new(store.clone()),
            store,
            matching,
        }
    }
}

type HandlerResult = Result<HttpResponse, actix_web::Error>;

/// Configure all event-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/events", web::post().to(create_event))
        .service(
            web::resource("/events/{event_id}/opt-in")
                .route(web::post().to(opt_in))
                .route(web::delete().to(opt_out)),
        )
        .route("/events/{event_id}/trigger", web::post().to(trigger))
        .route("/events/{event_id}/status", web::get().to(status))
        .route("/events/{event_id}/circles", web::get().to(circles));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let store_healthy = state.store.health_check().await.unwrap_or(false);
    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Schedule an event (admin only)
///
/// POST /api/v1/events
async fn create_event(
    state: web::Data<AppState>,
    user: AuthUser,
    req: web::Json<CreateEventRequest>,
) -> HandlerResult {
    user.require_admin()?;
    let event = state.matching.create_event(req.format).await?;
    Ok(HttpResponse::Created().json(event))
}

/// Opt in to an event's matching pool
///
/// POST /api/v1/events/{event_id}/opt-in
///
/// Request body:
/// ```json
/// {
///   "partnerEmail": "partner@example.com",
///   "hostingAvailable": true,
///   "matchAddress": "12 Elm Street",
///   "interests": ["jazz", "hiking"]
/// }
/// ```
async fn opt_in(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    req: web::Json<OptInRequest>,
) -> HandlerResult {
    let event_id = path.into_inner();

    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for opt-in by {}: {:?}", user.user_id, errors);
        return Ok(HttpResponse::BadRequest().json(ErrorResponse {
            error: "validation_failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        }));
    }

    let record = state
        .opt_in
        .opt_in(event_id, &user.user_id, req.attributes(), req.partner_ref())
        .await?;

    Ok(HttpResponse::Created().json(record))
}

/// Opt out of an event, removing the partner too
///
/// DELETE /api/v1/events/{event_id}/opt-in
async fn opt_out(state: web::Data<AppState>, user: AuthUser, path: web::Path<Uuid>) -> HandlerResult {
    let removed_user_ids = state.opt_in.opt_out(path.into_inner(), &user.user_id).await?;
    Ok(HttpResponse::Ok().json(OptOutResponse { removed_user_ids }))
}

/// Run matching and close the event (admin only)
///
/// POST /api/v1/events/{event_id}/trigger
async fn trigger(state: web::Data<AppState>, user: AuthUser, path: web::Path<Uuid>) -> HandlerResult {
    user.require_admin()?;
    let event_id = path.into_inner();
    tracing::info!("Admin {} triggered matching for event {}", user.user_id, event_id);

    let response = state.matching.trigger(event_id).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /api/v1/events/{event_id}/status
async fn status(state: web::Data<AppState>, user: AuthUser, path: web::Path<Uuid>) -> HandlerResult {
    let response = state.matching.status(path.into_inner(), &user.user_id).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /api/v1/events/{event_id}/circles
async fn circles(state: web::Data<AppState>, _user: AuthUser, path: web::Path<Uuid>) -> HandlerResult {
    let response = state.matching.circles(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}
