use crate::core::{MatchOutcome, MatchingPipeline};
use crate::error::CircleError;
use crate::models::{Circle, CirclesResponse, Event, EventFormat, MatchingStatus, StatusResponse, TriggerResponse};
use crate::services::cache::{CacheKey, CacheManager};
use crate::services::store::EventStore;
use std::sync::Arc;
use uuid::Uuid;

/// Event matching lifecycle: the one-shot trigger and the read side
#[derive(Clone)]
pub struct MatchingService {
    store: Arc<dyn EventStore>,
    pipeline: MatchingPipeline,
    cache: Arc<CacheManager>,
    circle_size: usize,
    minimum_pool_size: usize,
}

impl MatchingService {
    pub fn new(
        store: Arc<dyn EventStore>,
        pipeline: MatchingPipeline,
        cache: Arc<CacheManager>,
        circle_size: usize,
        minimum_pool_size: usize,
    ) -> Self {
        Self {
            store,
            pipeline,
            cache,
            circle_size,
            minimum_pool_size,
        }
    }

    /// Schedule an event with the configured circle size and minimum pool
    pub async fn create_event(&self, format: EventFormat) -> Result<Event, CircleError> {
        if self.circle_size < 2 || self.circle_size % 2 != 0 {
            return Err(CircleError::InvalidConfiguration(format!(
                "circle size must be an even number of at least 2, got {}",
                self.circle_size
            )));
        }
        if self.minimum_pool_size == 0 {
            return Err(CircleError::InvalidConfiguration(
                "minimum pool size must be at least 1".to_string(),
            ));
        }

        let event = Event::new(format, self.minimum_pool_size, self.circle_size);
        self.store.create_event(&event).await?;
        tracing::info!("Created {:?} event {}", format, event.id);
        Ok(event)
    }

    /// Close opt-ins and commit circles, at most once per event
    pub async fn trigger(&self, event_id: Uuid) -> Result<TriggerResponse, CircleError> {
        tracing::info!("Matching triggered for event {}", event_id);

        let outcome = match self.store.run_matching(event_id, &self.pipeline).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log_trigger_failure(event_id, &e);
                return Err(e);
            }
        };

        let MatchOutcome {
            circles,
            unhosted_circles,
        } = outcome;

        tracing::info!(
            "Event {} closed: {} circles, {} participants",
            event_id,
            circles.len(),
            circles.iter().map(|c| c.members.len()).sum::<usize>()
        );
        if !unhosted_circles.is_empty() {
            tracing::warn!(
                "Event {} has {} circles without a host: {:?}",
                event_id,
                unhosted_circles.len(),
                unhosted_circles
            );
        }

        self.cache_circles(event_id, &circles).await;

        Ok(TriggerResponse {
            event_id,
            matching_status: MatchingStatus::Closed,
            circles,
            unhosted_circles,
        })
    }

    /// Lifecycle status as seen by one user
    pub async fn status(&self, event_id: Uuid, user_id: &str) -> Result<StatusResponse, CircleError> {
        let event = self.store.get_event(event_id).await?;

        let (pool_count, is_opted_in, user_circle) = match event.matching_status {
            MatchingStatus::Closed => {
                let circles = self.load_circles(event_id).await?;
                let user_circle = circles.into_iter().find(|c| c.contains(user_id));
                (0, false, user_circle)
            }
            MatchingStatus::Open | MatchingStatus::Matching => {
                let pool_count = self.store.pool_count(event_id).await?;
                let is_opted_in = self.store.find_opt_in(event_id, user_id).await?.is_some();
                (pool_count, is_opted_in, None)
            }
        };

        Ok(StatusResponse {
            matching_status: event.matching_status,
            pool_count,
            is_opted_in,
            user_circle,
        })
    }

    /// All circles of the event; empty until the event is closed
    pub async fn circles(&self, event_id: Uuid) -> Result<CirclesResponse, CircleError> {
        let event = self.store.get_event(event_id).await?;

        let circles = if event.matching_status == MatchingStatus::Closed {
            self.load_circles(event_id).await?
        } else {
            Vec::new()
        };

        Ok(CirclesResponse { event_id, circles })
    }

    /// Circles of a closed event, served from cache when possible
    async fn load_circles(&self, event_id: Uuid) -> Result<Vec<Circle>, CircleError> {
        let key = CacheKey::circles(event_id);
        if let Ok(cached) = self.cache.get::<Vec<Circle>>(&key).await {
            return Ok(cached);
        }

        let circles = self.store.list_circles(event_id).await?;
        self.cache_circles(event_id, &circles).await;
        Ok(circles)
    }

    async fn cache_circles(&self, event_id: Uuid, circles: &[Circle]) {
        if let Err(e) = self.cache.set(&CacheKey::circles(event_id), &circles).await {
            tracing::warn!("Failed to cache circles for event {}: {}", event_id, e);
        }
    }
}

fn log_trigger_failure(event_id: Uuid, error: &CircleError) {
    match error {
        CircleError::AlreadyTriggered(_) => {
            tracing::warn!("Redundant trigger for event {}", event_id);
        }
        e if e.is_internal() => {
            tracing::error!("Matching for event {} failed and was rolled back: {}", event_id, e);
        }
        e => {
            tracing::info!("Matching for event {} rejected: {}", event_id, e);
        }
    }
}
