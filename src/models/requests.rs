use crate::models::domain::{Course, EventFormat, OptInAttributes, PartnerRef};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Request to opt in to an event
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_partner_ref"))]
pub struct OptInRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "partner_id", rename = "partnerId", default)]
    pub partner_id: Option<String>,
    #[validate(email)]
    #[serde(alias = "partner_email", rename = "partnerEmail", default)]
    pub partner_email: Option<String>,
    #[serde(alias = "hosting_available", rename = "hostingAvailable")]
    pub hosting_available: bool,
    #[validate(length(min = 1, max = 500))]
    #[serde(alias = "match_address", rename = "matchAddress", default)]
    pub match_address: Option<String>,
    #[validate(length(max = 20))]
    #[serde(alias = "dietary_restrictions", rename = "dietaryRestrictions", default)]
    pub dietary_restrictions: Vec<String>,
    #[validate(length(max = 50))]
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(alias = "course_preference", rename = "coursePreference", default)]
    pub course_preference: Option<Course>,
}

fn validate_partner_ref(req: &OptInRequest) -> Result<(), ValidationError> {
    if req.partner_id.is_some() && req.partner_email.is_some() {
        return Err(ValidationError::new("partner_ref")
            .with_message("give either partnerId or partnerEmail, not both".into()));
    }
    Ok(())
}

impl OptInRequest {
    pub fn partner_ref(&self) -> Option<PartnerRef> {
        self.partner_id
            .clone()
            .map(PartnerRef::UserId)
            .or_else(|| self.partner_email.clone().map(PartnerRef::Email))
    }

    /// Tags are trimmed and lowercased so set comparisons are meaningful
    pub fn attributes(&self) -> OptInAttributes {
        OptInAttributes {
            hosting_available: self.hosting_available,
            dietary_restrictions: normalize_tags(&self.dietary_restrictions),
            interests: normalize_tags(&self.interests),
            match_address: self.match_address.clone(),
            course_preference: self.course_preference,
        }
    }
}

/// Request to schedule an event; sizes come from configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub format: EventFormat,
}

fn normalize_tags(tags: &[String]) -> std::collections::BTreeSet<String> {
    tags.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case() {
        let req: OptInRequest = serde_json::from_str(
            r#"{"partnerEmail":"sam@example.com","hostingAvailable":true,"interests":[" Jazz ","jazz","Wine"]}"#,
        )
        .unwrap();

        assert!(req.validate().is_ok());
        assert_eq!(req.partner_ref(), Some(PartnerRef::Email("sam@example.com".to_string())));

        let attrs = req.attributes();
        assert!(attrs.hosting_available);
        assert_eq!(attrs.interests.len(), 2);
        assert!(attrs.interests.contains("jazz"));
    }

    #[test]
    fn test_both_partner_fields_rejected() {
        let req = OptInRequest {
            partner_id: Some("u2".to_string()),
            partner_email: Some("u2@example.com".to_string()),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_invalid_email_rejected() {
        let req = OptInRequest {
            partner_email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }
}
