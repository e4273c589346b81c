use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{errors::Error as JwtError, DecodingKey, Validation};
use rocket::{
    http::Status,
    request::{self, FromRequest},
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::common::election::VoterId;
use crate::Config;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authenticated voter, as asserted by the external authentication service
/// through a signed token cookie.
///
/// Handlers take the voter ID from here and pass it explicitly into every
/// session and submission call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    voter_id: VoterId,
}

impl AuthToken {
    /// Get the voter ID.
    pub fn voter_id(&self) -> &str {
        &self.voter_id
    }

    /// Decode and verify a token.
    pub fn from_jwt(token: &str, config: &Config) -> Result<Self, JwtError> {
        let claims = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )?
        .claims;
        Ok(Self {
            voter_id: claims.sub,
        })
    }
}

/// Token claims: the voter ID plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    sub: VoterId,
    #[serde(with = "ts_seconds")]
    exp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No authentication token provided")]
    Missing,
    #[error("Invalid authentication token: {0}")]
    Invalid(#[from] JwtError),
    #[error("Application config is not available")]
    NoConfig,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = AuthError;

    /// Get an AuthToken from the cookie and verify its signature and expiry.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => {
                return request::Outcome::Failure((
                    Status::InternalServerError,
                    AuthError::NoConfig,
                ))
            }
        };

        let cookie = match req.cookies().get(AUTH_TOKEN_COOKIE) {
            Some(cookie) => cookie,
            None => return request::Outcome::Failure((Status::Unauthorized, AuthError::Missing)),
        };

        match Self::from_jwt(cookie.value(), config) {
            Ok(token) => request::Outcome::Success(token),
            Err(err) => {
                debug!("Rejected voter token: {err}");
                request::Outcome::Failure((Status::Unauthorized, err.into()))
            }
        }
    }
}
