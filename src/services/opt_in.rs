use crate::error::CircleError;
use crate::models::{OptInAttributes, OptInRecord, PartnerRef};
use crate::services::store::EventStore;
use std::sync::Arc;
use uuid::Uuid;

/// Opt-in pool operations for one event at a time
#[derive(Clone)]
pub struct OptInService {
    store: Arc<dyn EventStore>,
}

impl OptInService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Register `user_id` for the event, optionally linked to a partner
    ///
    /// The partner reference is resolved before the store's unit of work;
    /// the status, duplicate and conflict checks happen inside it.
    pub async fn opt_in(
        &self,
        event_id: Uuid,
        user_id: &str,
        attributes: OptInAttributes,
        partner: Option<PartnerRef>,
    ) -> Result<OptInRecord, CircleError> {
        let partner_id = match partner {
            Some(partner_ref) => Some(self.resolve_partner(user_id, &partner_ref).await?),
            None => None,
        };

        let record = OptInRecord::new(event_id, user_id, attributes);
        let record = self.store.apply_opt_in(event_id, record, partner_id).await?;

        tracing::info!(
            "User {} opted in to event {} (partner: {:?})",
            record.user_id,
            event_id,
            record.partner_user_id
        );

        Ok(record)
    }

    /// Remove the caller and their partner from the pool
    pub async fn opt_out(&self, event_id: Uuid, user_id: &str) -> Result<Vec<String>, CircleError> {
        let removed = self.store.apply_opt_out(event_id, user_id).await?;
        tracing::info!("Opted out of event {}: {:?}", event_id, removed);
        Ok(removed)
    }

    /// The pool ordered by user id
    pub async fn list_pool(&self, event_id: Uuid) -> Result<Vec<OptInRecord>, CircleError> {
        self.store.list_pool(event_id).await
    }

    async fn resolve_partner(&self, user_id: &str, partner_ref: &PartnerRef) -> Result<String, CircleError> {
        let resolved = self.store.resolve_user(partner_ref).await?;

        match resolved {
            Some(partner_id) if partner_id == user_id => {
                Err(CircleError::InvalidPartner("cannot partner with yourself".to_string()))
            }
            Some(partner_id) => Ok(partner_id),
            None => {
                tracing::debug!("Partner reference {:?} did not resolve", partner_ref);
                Err(CircleError::InvalidPartner(match partner_ref {
                    PartnerRef::UserId(id) => format!("unknown user {}", id),
                    PartnerRef::Email(email) => format!("no user with email {}", email),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, EventFormat};
    use crate::services::store::MemoryStore;

    async fn setup() -> (OptInService, Arc<MemoryStore>, Event) {
        let store = Arc::new(MemoryStore::new());
        store.register_user("alice", "alice@example.com").await;
        store.register_user("bob", "Bob@Example.com").await;
        store.register_user("carol", "carol@example.com").await;

        let event = Event::new(EventFormat::Rotating, 6, 6);
        store.create_event(&event).await.unwrap();

        (OptInService::new(store.clone()), store, event)
    }

    #[tokio::test]
    async fn test_partner_by_email_creates_partner_record() {
        let (service, store, event) = setup().await;

        let attrs = OptInAttributes {
            hosting_available: true,
            match_address: Some("1 Main St".to_string()),
            ..Default::default()
        };
        let record = service
            .opt_in(event.id, "alice", attrs, Some(PartnerRef::Email("bob@example.com".to_string())))
            .await
            .unwrap();
        assert_eq!(record.partner_user_id.as_deref(), Some("bob"));

        let bob = store.find_opt_in(event.id, "bob").await.unwrap().unwrap();
        assert_eq!(bob.partner_user_id.as_deref(), Some("alice"));
        assert!(bob.hosting_available());
        assert_eq!(bob.attributes.match_address.as_deref(), Some("1 Main St"));
    }

    #[tokio::test]
    async fn test_unknown_partner_rejected() {
        let (service, store, event) = setup().await;

        let result = service
            .opt_in(
                event.id,
                "alice",
                OptInAttributes::default(),
                Some(PartnerRef::UserId("nobody".to_string())),
            )
            .await;
        assert!(matches!(result, Err(CircleError::InvalidPartner(_))));
        assert_eq!(store.pool_count(event.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_self_partner_rejected() {
        let (service, _, event) = setup().await;

        let result = service
            .opt_in(
                event.id,
                "alice",
                OptInAttributes::default(),
                Some(PartnerRef::Email("ALICE@example.com".to_string())),
            )
            .await;
        assert!(matches!(result, Err(CircleError::InvalidPartner(_))));
    }

    #[tokio::test]
    async fn test_partner_conflict() {
        let (service, _, event) = setup().await;

        service
            .opt_in(event.id, "alice", OptInAttributes::default(), Some(PartnerRef::UserId("bob".to_string())))
            .await
            .unwrap();

        let result = service
            .opt_in(event.id, "carol", OptInAttributes::default(), Some(PartnerRef::UserId("bob".to_string())))
            .await;
        assert!(matches!(result, Err(CircleError::PartnerConflict { .. })));
    }

    #[tokio::test]
    async fn test_opt_out_cascades_to_partner() {
        let (service, _, event) = setup().await;

        service
            .opt_in(event.id, "alice", OptInAttributes::default(), Some(PartnerRef::UserId("bob".to_string())))
            .await
            .unwrap();
        service
            .opt_in(event.id, "carol", OptInAttributes::default(), None)
            .await
            .unwrap();

        let mut removed = service.opt_out(event.id, "bob").await.unwrap();
        removed.sort();
        assert_eq!(removed, vec!["alice", "bob"]);

        let pool = service.list_pool(event.id).await.unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].user_id, "carol");
    }
}
