use crate::core::{plan_opt_in, plan_opt_out, sort_pool, MatchOutcome, MatchingPipeline};
use crate::error::CircleError;
use crate::models::{Circle, Event, MatchingStatus, OptInRecord, PartnerRef};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Persistence for events, opt-ins and circles
///
/// Every mutating method is atomic with respect to the event row: opt-in,
/// opt-out and the matching trigger contend on it, and a write is only
/// accepted while the status read inside the same unit of work allows it.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Register an event created by the scheduling side of the platform
    async fn create_event(&self, event: &Event) -> Result<(), CircleError>;

    async fn get_event(&self, event_id: Uuid) -> Result<Event, CircleError>;

    /// Resolve a partner reference to a known user id
    async fn resolve_user(&self, partner: &PartnerRef) -> Result<Option<String>, CircleError>;

    /// Insert the caller's record (and link or create the partner's)
    async fn apply_opt_in(
        &self,
        event_id: Uuid,
        record: OptInRecord,
        partner_id: Option<String>,
    ) -> Result<OptInRecord, CircleError>;

    /// Remove the caller's record and the partner's; returns removed user ids
    async fn apply_opt_out(&self, event_id: Uuid, user_id: &str) -> Result<Vec<String>, CircleError>;

    async fn find_opt_in(&self, event_id: Uuid, user_id: &str) -> Result<Option<OptInRecord>, CircleError>;

    /// The pool ordered by user id
    async fn list_pool(&self, event_id: Uuid) -> Result<Vec<OptInRecord>, CircleError>;

    async fn pool_count(&self, event_id: Uuid) -> Result<usize, CircleError> {
        Ok(self.list_pool(event_id).await?.len())
    }

    /// Move `open -> matching` with a conditional write, run the pipeline on
    /// the pool snapshot, persist its circles and close the event.
    ///
    /// Fails with [`CircleError::AlreadyTriggered`] if the status was not
    /// `open`. Any other failure leaves the event `open` with no circles.
    async fn run_matching(
        &self,
        event_id: Uuid,
        pipeline: &MatchingPipeline,
    ) -> Result<MatchOutcome, CircleError>;

    async fn list_circles(&self, event_id: Uuid) -> Result<Vec<Circle>, CircleError>;

    async fn health_check(&self) -> Result<bool, CircleError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    events: HashMap<Uuid, Event>,
    opt_ins: HashMap<Uuid, BTreeMap<String, OptInRecord>>,
    circles: HashMap<Uuid, Vec<Circle>>,
    /// user id -> email
    users: BTreeMap<String, String>,
}

impl MemoryState {
    fn event(&self, event_id: Uuid) -> Result<&Event, CircleError> {
        self.events
            .get(&event_id)
            .ok_or(CircleError::EventNotFound(event_id))
    }

    fn set_status(&mut self, event_id: Uuid, next: MatchingStatus) -> Result<(), CircleError> {
        let event = self
            .events
            .get_mut(&event_id)
            .ok_or(CircleError::EventNotFound(event_id))?;
        event.matching_status = event.matching_status.transition(next)?;
        Ok(())
    }
}

/// In-process store for tests and local runs
///
/// The matching computation runs on a blocking worker with the lock released,
/// so the transient `matching` status is observable by concurrent callers.
/// The trigger itself runs as a detached task: dropping the caller's future
/// does not stop it from committing or rolling back.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to the directory partner references resolve against
    pub async fn register_user(&self, user_id: impl Into<String>, email: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.users.insert(user_id.into(), email.into().to_lowercase());
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create_event(&self, event: &Event) -> Result<(), CircleError> {
        let mut state = self.state.lock().await;
        state.events.insert(event.id, event.clone());
        state.opt_ins.entry(event.id).or_default();
        Ok(())
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Event, CircleError> {
        let state = self.state.lock().await;
        state.event(event_id).cloned()
    }

    async fn resolve_user(&self, partner: &PartnerRef) -> Result<Option<String>, CircleError> {
        let state = self.state.lock().await;
        let found = match partner {
            PartnerRef::UserId(id) => state.users.contains_key(id).then(|| id.clone()),
            PartnerRef::Email(email) => {
                let email = email.to_lowercase();
                state
                    .users
                    .iter()
                    .find(|(_, e)| **e == email)
                    .map(|(id, _)| id.clone())
            }
        };
        Ok(found)
    }

    async fn apply_opt_in(
        &self,
        event_id: Uuid,
        record: OptInRecord,
        partner_id: Option<String>,
    ) -> Result<OptInRecord, CircleError> {
        let mut state = self.state.lock().await;
        let event = state.event(event_id)?.clone();
        let pool = state.opt_ins.entry(event_id).or_default();

        let plan = plan_opt_in(
            &event,
            pool.get(&record.user_id),
            partner_id.as_deref().map(|id| (id, pool.get(id))),
            record,
        )?;

        for inserted in plan.inserts() {
            pool.insert(inserted.user_id.clone(), inserted.clone());
        }
        if let Some(partner_id) = &plan.link_partner {
            if let Some(partner) = pool.get_mut(partner_id) {
                partner.partner_user_id = Some(plan.record.user_id.clone());
            }
        }

        Ok(plan.record)
    }

    async fn apply_opt_out(&self, event_id: Uuid, user_id: &str) -> Result<Vec<String>, CircleError> {
        let mut state = self.state.lock().await;
        let event = state.event(event_id)?.clone();
        let pool = state.opt_ins.entry(event_id).or_default();

        let removed = plan_opt_out(&event, user_id, pool.get(user_id))?;
        for id in &removed {
            pool.remove(id);
        }
        Ok(removed)
    }

    async fn find_opt_in(&self, event_id: Uuid, user_id: &str) -> Result<Option<OptInRecord>, CircleError> {
        let state = self.state.lock().await;
        state.event(event_id)?;
        Ok(state
            .opt_ins
            .get(&event_id)
            .and_then(|pool| pool.get(user_id))
            .cloned())
    }

    async fn list_pool(&self, event_id: Uuid) -> Result<Vec<OptInRecord>, CircleError> {
        let state = self.state.lock().await;
        state.event(event_id)?;
        let mut pool: Vec<OptInRecord> = state
            .opt_ins
            .get(&event_id)
            .map(|pool| pool.values().cloned().collect())
            .unwrap_or_default();
        sort_pool(&mut pool);
        Ok(pool)
    }

    async fn run_matching(
        &self,
        event_id: Uuid,
        pipeline: &MatchingPipeline,
    ) -> Result<MatchOutcome, CircleError> {
        let state = self.state.clone();
        let pipeline = pipeline.clone();

        tokio::spawn(run_matching_task(state, event_id, pipeline))
            .await
            .map_err(|e| CircleError::Internal(format!("matching task failed: {}", e)))?
    }

    async fn list_circles(&self, event_id: Uuid) -> Result<Vec<Circle>, CircleError> {
        let state = self.state.lock().await;
        state.event(event_id)?;
        Ok(state.circles.get(&event_id).cloned().unwrap_or_default())
    }

    async fn health_check(&self) -> Result<bool, CircleError> {
        Ok(true)
    }
}

/// Claim, compute and commit one trigger on the in-memory state
async fn run_matching_task(
    state: Arc<Mutex<MemoryState>>,
    event_id: Uuid,
    pipeline: MatchingPipeline,
) -> Result<MatchOutcome, CircleError> {
    let (event, snapshot) = {
        let mut guard = state.lock().await;
        let event = guard.event(event_id)?.clone();
        if event.matching_status != MatchingStatus::Open {
            return Err(CircleError::AlreadyTriggered(event_id));
        }
        guard.set_status(event_id, MatchingStatus::Matching)?;

        let snapshot: Vec<OptInRecord> = guard
            .opt_ins
            .get(&event_id)
            .map(|pool| pool.values().cloned().collect())
            .unwrap_or_default();
        (event, snapshot)
    };

    let result = tokio::task::spawn_blocking(move || pipeline.run(&event, snapshot))
        .await
        .map_err(|e| CircleError::Internal(format!("matching worker failed: {}", e)))
        .and_then(|outcome| outcome);

    let mut guard = state.lock().await;
    match result {
        Ok(outcome) => {
            guard.circles.insert(event_id, outcome.circles.clone());
            guard.opt_ins.remove(&event_id);
            guard.set_status(event_id, MatchingStatus::Closed)?;
            Ok(outcome)
        }
        Err(e) => {
            guard.set_status(event_id, MatchingStatus::Open)?;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JaccardDiversity;
    use crate::models::{EventFormat, OptInAttributes};
    use std::sync::Arc;

    fn pipeline() -> MatchingPipeline {
        MatchingPipeline::new(Arc::new(JaccardDiversity::default()))
    }

    async fn store_with_event() -> (MemoryStore, Event) {
        let store = MemoryStore::new();
        let event = Event::new(EventFormat::Rotating, 6, 6);
        store.create_event(&event).await.unwrap();
        (store, event)
    }

    fn record(event: &Event, user_id: &str) -> OptInRecord {
        OptInRecord::new(event.id, user_id, OptInAttributes::default())
    }

    #[tokio::test]
    async fn test_opt_in_and_partner_link() {
        let (store, event) = store_with_event().await;

        store.apply_opt_in(event.id, record(&event, "a"), Some("b".to_string())).await.unwrap();

        let pool = store.list_pool(event.id).await.unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[0].partner_user_id.as_deref(), Some("b"));
        assert_eq!(pool[1].partner_user_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_opt_out_twice_fails() {
        let (store, event) = store_with_event().await;
        store.apply_opt_in(event.id, record(&event, "a"), None).await.unwrap();

        assert_eq!(store.apply_opt_out(event.id, "a").await.unwrap(), vec!["a".to_string()]);
        assert!(matches!(
            store.apply_opt_out(event.id, "a").await,
            Err(CircleError::NotOptedIn { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_matching_rolls_back_to_open() {
        let (store, event) = store_with_event().await;
        for id in ["a", "b", "c"] {
            store.apply_opt_in(event.id, record(&event, id), None).await.unwrap();
        }

        let err = store.run_matching(event.id, &pipeline()).await.unwrap_err();
        assert!(matches!(err, CircleError::InsufficientPool { pool_size: 3, .. }));

        let event = store.get_event(event.id).await.unwrap();
        assert_eq!(event.matching_status, MatchingStatus::Open);
        assert_eq!(store.pool_count(event.id).await.unwrap(), 3);
        assert!(store.list_circles(event.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_matching_closes_event() {
        let (store, event) = store_with_event().await;
        for i in 0..6 {
            store.apply_opt_in(event.id, record(&event, &format!("u{i}")), None).await.unwrap();
        }

        let outcome = store.run_matching(event.id, &pipeline()).await.unwrap();
        assert_eq!(outcome.circles.len(), 1);

        let event = store.get_event(event.id).await.unwrap();
        assert_eq!(event.matching_status, MatchingStatus::Closed);
        assert_eq!(store.pool_count(event.id).await.unwrap(), 0);
        assert_eq!(store.list_circles(event.id).await.unwrap(), outcome.circles);

        assert!(matches!(
            store.run_matching(event.id, &pipeline()).await,
            Err(CircleError::AlreadyTriggered(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_user_by_email() {
        let store = MemoryStore::new();
        store.register_user("u1", "Sam@Example.com").await;

        assert_eq!(
            store.resolve_user(&PartnerRef::Email("sam@example.com".to_string())).await.unwrap(),
            Some("u1".to_string())
        );
        assert_eq!(
            store.resolve_user(&PartnerRef::UserId("u2".to_string())).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_unknown_event() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_event(Uuid::new_v4()).await,
            Err(CircleError::EventNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_trigger_still_finishes() {
        let (store, event) = store_with_event().await;
        for i in 0..600 {
            store
                .apply_opt_in(event.id, record(&event, &format!("u{i:04}")), None)
                .await
                .unwrap();
        }

        // Abandon the caller's future almost immediately
        let _ = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            store.run_matching(event.id, &pipeline()),
        )
        .await;

        let mut status = store.get_event(event.id).await.unwrap().matching_status;
        for _ in 0..500 {
            if status != MatchingStatus::Matching {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            status = store.get_event(event.id).await.unwrap().matching_status;
        }

        assert_eq!(status, MatchingStatus::Closed);
        assert_eq!(store.list_circles(event.id).await.unwrap().len(), 100);
        assert!(matches!(
            store.run_matching(event.id, &pipeline()).await,
            Err(CircleError::AlreadyTriggered(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_failing_trigger_reopens_event() {
        let (store, event) = store_with_event().await;
        store.apply_opt_in(event.id, record(&event, "a"), None).await.unwrap();

        let _ = tokio::time::timeout(
            std::time::Duration::from_millis(0),
            store.run_matching(event.id, &pipeline()),
        )
        .await;

        let mut status = store.get_event(event.id).await.unwrap().matching_status;
        for _ in 0..500 {
            if status == MatchingStatus::Open {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            status = store.get_event(event.id).await.unwrap().matching_status;
        }

        assert_eq!(status, MatchingStatus::Open);
        assert!(store.apply_opt_out(event.id, "a").await.is_ok());
    }
}
