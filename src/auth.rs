use std::fmt;
use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::{Id, User};

/// Secrets and lifetimes for both token kinds.
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_ttl: Duration,
    pub refresh_secret: String,
    pub refresh_ttl: Duration,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_secret", &"<redacted>")
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    #[serde(rename = "_id")]
    pub id: Id,
    pub email: String,
    pub username: String,
    pub fullname: String,
    pub iat: usize,
    pub exp: usize,
}

/// Refresh tokens carry only the user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    #[serde(rename = "_id")]
    pub id: Id,
    pub iat: usize,
    pub exp: usize,
}

/// Stateless HS256 signer/verifier for access and refresh tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

fn issued_now(ttl: Duration) -> (usize, usize) {
    let now = chrono::Utc::now().timestamp().max(0) as usize;
    (now, now + ttl.as_secs() as usize)
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation
}

impl TokenIssuer {
    pub fn new(cfg: &TokenConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(cfg.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(cfg.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            access_ttl: cfg.access_ttl,
            refresh_ttl: cfg.refresh_ttl,
        }
    }

    pub fn issue_access(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let (iat, exp) = issued_now(self.access_ttl);
        let claims = AccessClaims {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            fullname: user.fullname.clone(),
            iat,
            exp,
        };
        encode(&Header::default(), &claims, &self.access_encoding)
    }

    pub fn issue_refresh(&self, user_id: Id) -> Result<String, jsonwebtoken::errors::Error> {
        let (iat, exp) = issued_now(self.refresh_ttl);
        let claims = RefreshClaims { id: user_id, iat, exp };
        encode(&Header::default(), &claims, &self.refresh_encoding)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
        Ok(decode::<AccessClaims>(token, &self.access_decoding, &validation())?.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, jsonwebtoken::errors::Error> {
        Ok(decode::<RefreshClaims>(token, &self.refresh_decoding, &validation())?.claims)
    }
}
