use crate::models::ErrorResponse;
use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use thiserror::Error;

/// Claims of tokens issued by the platform's identity service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// Verifies HS256 bearer tokens; token creation is only used by tests and tooling
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
        }
    }

    /// Create a token for a user, valid for 24 hours
    pub fn create_token(&self, user_id: &str, is_admin: bool) -> Result<String, AuthError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(24);

        let claims = Claims {
            sub: user_id.to_string(),
            is_admin,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(AuthError::Token)
    }

    /// Verify signature, expiry and issuer
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(AuthError::Token)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authorization token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Admin privileges required")]
    Forbidden,

    #[error("Authentication is not configured")]
    NotConfigured,
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::Token(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error = match self {
            AuthError::MissingToken | AuthError::Token(_) => "unauthorized",
            AuthError::Forbidden => "forbidden",
            AuthError::NotConfigured => "internal_error",
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: error.to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        })
    }
}

/// Authenticated caller, extracted from the `Authorization` header
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: String,
    pub is_admin: bool,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

impl FromRequest for AuthUser {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_auth_user(req))
    }
}

fn extract_auth_user(req: &HttpRequest) -> Result<AuthUser, AuthError> {
    let jwt = req
        .app_data::<web::Data<JwtService>>()
        .ok_or(AuthError::NotConfigured)?;

    let header = req
        .headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    // Accept both "Bearer <token>" and a raw token
    let token = header.strip_prefix("Bearer ").unwrap_or(header);
    let claims = jwt.verify_token(token).map_err(|e| {
        tracing::debug!("Rejected token on {}: {}", req.path(), e);
        e
    })?;

    Ok(AuthUser {
        user_id: claims.sub,
        is_admin: claims.is_admin,
    })
}
