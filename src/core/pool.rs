use crate::error::CircleError;
use crate::models::{Event, OptInRecord};

/// Changes an opt-in makes to the pool, computed from the rows read inside the
/// store's transaction and applied by the store as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct OptInPlan {
    /// The caller's new record
    pub record: OptInRecord,
    /// A record created on behalf of a partner who had not opted in yet
    pub partner_record: Option<OptInRecord>,
    /// An existing partner record to link back to the caller
    pub link_partner: Option<String>,
}

impl OptInPlan {
    /// All records to insert, caller first
    pub fn inserts(&self) -> impl Iterator<Item = &OptInRecord> {
        std::iter::once(&self.record).chain(self.partner_record.iter())
    }
}

/// Decide what an opt-in does to the pool
///
/// # Arguments
/// * `event` - The event, read under lock
/// * `existing` - The caller's current record for the event, if any
/// * `partner` - The resolved partner id and the partner's current record, if any
/// * `record` - The caller's new record (partner link is filled in here)
pub fn plan_opt_in(
    event: &Event,
    existing: Option<&OptInRecord>,
    partner: Option<(&str, Option<&OptInRecord>)>,
    mut record: OptInRecord,
) -> Result<OptInPlan, CircleError> {
    if !event.is_open() {
        return Err(CircleError::EventNotOpen {
            event_id: event.id,
            status: event.matching_status,
        });
    }

    if existing.is_some() {
        return Err(CircleError::AlreadyOptedIn {
            event_id: event.id,
            user_id: record.user_id,
        });
    }

    let Some((partner_id, partner_record)) = partner else {
        record.partner_user_id = None;
        return Ok(OptInPlan {
            record,
            partner_record: None,
            link_partner: None,
        });
    };

    if partner_id == record.user_id {
        return Err(CircleError::InvalidPartner(
            "a participant cannot partner with themselves".to_string(),
        ));
    }

    record.partner_user_id = Some(partner_id.to_string());

    match partner_record {
        Some(existing_partner) => match existing_partner.partner_user_id.as_deref() {
            Some(linked_to) if linked_to != record.user_id => Err(CircleError::PartnerConflict {
                partner_id: partner_id.to_string(),
                linked_to: linked_to.to_string(),
            }),
            // A partner pointing at a caller without a record is a dangling link
            Some(_) => Err(CircleError::CorruptPartnerLink {
                user_id: partner_id.to_string(),
                partner_id: record.user_id,
            }),
            None => Ok(OptInPlan {
                record,
                partner_record: None,
                link_partner: Some(partner_id.to_string()),
            }),
        },
        None => {
            // Households share a home, so the partner inherits hosting and address
            let mut attributes = record.attributes.clone();
            attributes.dietary_restrictions.clear();
            attributes.interests.clear();
            attributes.course_preference = None;

            let partner_record = OptInRecord::new(event.id, partner_id, attributes)
                .with_partner(record.user_id.clone());

            Ok(OptInPlan {
                record,
                partner_record: Some(partner_record),
                link_partner: None,
            })
        }
    }
}

/// Decide which records an opt-out removes: the caller's and, cascading, the partner's
pub fn plan_opt_out(
    event: &Event,
    user_id: &str,
    existing: Option<&OptInRecord>,
) -> Result<Vec<String>, CircleError> {
    if !event.is_open() {
        return Err(CircleError::EventNotOpen {
            event_id: event.id,
            status: event.matching_status,
        });
    }

    let record = existing.ok_or_else(|| CircleError::NotOptedIn {
        event_id: event.id,
        user_id: user_id.to_string(),
    })?;

    let mut removed = vec![record.user_id.clone()];
    if let Some(partner_id) = &record.partner_user_id {
        removed.push(partner_id.clone());
    }

    Ok(removed)
}

/// Order a pool snapshot deterministically by user id
pub fn sort_pool(pool: &mut [OptInRecord]) {
    pool.sort_by(|a, b| a.user_id.cmp(&b.user_id));
}
