// src/auth.rs
use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::{Request, State};
use serde::{Deserialize, Serialize};

use crate::app_log;
use crate::core::config_manager::AuthSettings;
use crate::core::{Database, UserRepository};
use crate::types::User;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // username
    pub uid: i64,
    pub exp: usize,
    pub iat: usize,
}

/// Sign an HS256 access token for `user`.
pub fn issue_token(settings: &AuthSettings, user: &User) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.username.clone(),
        uid: user.id,
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(settings.token_ttl_hours)).timestamp() as usize,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify_token(settings: &AuthSettings, token: &str) -> Result<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// The user behind a valid bearer token.
pub struct AuthenticatedUser {
    pub user: User,
}

impl AuthenticatedUser {
    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    TokenVerificationFailed,
    UnknownUser,
    InactiveUser,
    DatabaseError,
}

impl AuthError {
    pub fn message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "Authorization token required",
            AuthError::InvalidToken => "Invalid authorization token format",
            AuthError::TokenVerificationFailed => "Token verification failed",
            AuthError::UnknownUser => "Token does not match any user",
            AuthError::InactiveUser => "User account is disabled",
            AuthError::DatabaseError => "Database error occurred",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::TokenVerificationFailed => "TOKEN_VERIFICATION_FAILED",
            AuthError::UnknownUser => "UNKNOWN_USER",
            AuthError::InactiveUser => "INACTIVE_USER",
            AuthError::DatabaseError => "DATABASE_ERROR",
        }
    }
}

/// Last auth failure of a request, read back by the 401 catcher.
#[derive(Debug, Clone, Copy)]
pub struct AuthFailure(pub Option<AuthError>);

fn fail(req: &Request<'_>, status: Status, error: AuthError) -> Outcome<AuthenticatedUser, AuthError> {
    req.local_cache(|| AuthFailure(Some(error)));
    Outcome::Error((status, error))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = AuthError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let settings = match req.guard::<&State<AuthSettings>>().await {
            Outcome::Success(settings) => settings,
            Outcome::Error((status, _)) => return fail(req, status, AuthError::DatabaseError),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        let db = match req.guard::<&State<Database>>().await {
            Outcome::Success(db) => db,
            Outcome::Error((status, _)) => return fail(req, status, AuthError::DatabaseError),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        let token = match req.headers().get_one("Authorization") {
            Some(header) => match header.strip_prefix("Bearer ") {
                Some(token) => token.trim(),
                None => {
                    app_log!(warn, "Invalid Authorization header format");
                    return fail(req, Status::Unauthorized, AuthError::InvalidToken);
                }
            },
            None => {
                app_log!(debug, "Missing Authorization header");
                return fail(req, Status::Unauthorized, AuthError::MissingToken);
            }
        };

        let claims = match verify_token(settings, token) {
            Ok(claims) => claims,
            Err(e) => {
                app_log!(warn, "Token verification failed: {}", e);
                return fail(req, Status::Unauthorized, AuthError::TokenVerificationFailed);
            }
        };

        let user = match UserRepository::new(db.pool()).find_by_id(claims.uid).await {
            Ok(Some(user)) if user.username == claims.sub => user,
            Ok(_) => {
                app_log!(warn, "Token for unknown user: {} ({})", claims.sub, claims.uid);
                return fail(req, Status::Unauthorized, AuthError::UnknownUser);
            }
            Err(e) => {
                app_log!(error, "User lookup failed: {}", e);
                return fail(req, Status::InternalServerError, AuthError::DatabaseError);
            }
        };

        if !user.is_active {
            app_log!(warn, "Inactive user attempted access: {}", user.username);
            return fail(req, Status::Unauthorized, AuthError::InactiveUser);
        }

        app_log!(debug, "User {} authenticated", user.username);
        Outcome::Success(AuthenticatedUser { user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: &str) -> AuthSettings {
        AuthSettings {
            jwt_secret: secret.to_string(),
            token_ttl_hours: 1,
        }
    }

    fn user() -> User {
        User {
            id: 42,
            username: "marti".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_token_round_trip() {
        let settings = settings("s3cret");
        let token = issue_token(&settings, &user()).unwrap();
        let claims = verify_token(&settings, &token).unwrap();
        assert_eq!(claims.sub, "marti");
        assert_eq!(claims.uid, 42);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token(&settings("one"), &user()).unwrap();
        assert!(verify_token(&settings("two"), &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let expired = AuthSettings {
            jwt_secret: "s3cret".to_string(),
            token_ttl_hours: -2,
        };
        let token = issue_token(&expired, &user()).unwrap();
        assert!(verify_token(&expired, &token).is_err());
    }
}
