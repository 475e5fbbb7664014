//! Authentication utilities
//!
//! Provides:
//! - Write key validation for the collector routes
//! - JWT verification for dashboard readers
//! - The `Viewer` extractor

use std::sync::{Arc, OnceLock};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::db::{AnalyticsStore, AppProjection};
use crate::errors::{AppError, Result};
use crate::hashing::hash_identifier;

/// Prefix every write key starts with
pub const WRITE_KEY_PREFIX: &str = "gk_";

/// Random characters after the prefix
pub const WRITE_KEY_RANDOM_LEN: usize = 32;

/// Scope granting access to operator endpoints
pub const ADMIN_SCOPE: &str = "admin";

fn write_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^gk_[A-Za-z0-9]{32}$").expect("write key pattern is valid")
    })
}

/// Whether a string has the shape of a write key
pub fn is_well_formed_write_key(key: &str) -> bool {
    write_key_pattern().is_match(key)
}

/// Hash a write key for storage and lookup
pub fn hash_write_key(key: &str) -> String {
    hash_identifier(key)
}

/// Generate a new write key
pub fn generate_write_key() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(WRITE_KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", WRITE_KEY_PREFIX, random)
}

/// Extract the token from an `Authorization: Bearer ...` header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves write keys to the app (and plan) they belong to
#[derive(Clone)]
pub struct WriteKeyAuthenticator {
    store: Arc<dyn AnalyticsStore>,
}

impl WriteKeyAuthenticator {
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self { store }
    }

    /// Resolve a write key.
    ///
    /// A missing key is `Unauthorized`; a malformed, unknown or deactivated
    /// key is `InvalidWriteKey`. Nothing is written.
    pub async fn authenticate(&self, key: Option<&str>) -> Result<AppProjection> {
        let key = key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing write key".to_string(),
            })?;

        if !is_well_formed_write_key(key) {
            return Err(AppError::InvalidWriteKey);
        }

        self.store
            .find_app_by_key_hash(&hash_write_key(key))
            .await?
            .ok_or(AppError::InvalidWriteKey)
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Org the session was issued for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Scopes
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Build from config; the secret is mandatory
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let secret = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "auth.jwt_secret is not set".to_string(),
            })?;
        Ok(Self::new(secret, config.jwt_expiration_secs))
    }

    /// Issue a session token. Sign-in lives elsewhere; this serves tooling and tests.
    pub fn generate_token(
        &self,
        user_id: Uuid,
        org_id: Option<Uuid>,
        scopes: Vec<String>,
    ) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: user_id.to_string(),
            org_id: org_id.map(|id| id.to_string()),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            scopes,
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::Unauthorized {
                    message: "Invalid session token".to_string(),
                },
            })
    }
}

/// Authenticated dashboard user
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user_id: Uuid,
    pub org_id: Option<Uuid>,
    pub scopes: Vec<String>,
}

impl Viewer {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn from_claims(claims: JwtClaims) -> Result<Self> {
        let invalid = || AppError::Unauthorized {
            message: "Invalid session token".to_string(),
        };

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| invalid())?;
        let org_id = claims
            .org_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| invalid())?;

        Ok(Self {
            user_id,
            org_id,
            scopes: claims.scopes,
        })
    }
}

/// Axum extractor for Viewer
impl<S> FromRequestParts<S> for Viewer
where
    Arc<JwtManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing bearer token".to_string(),
            })?;

        let jwt = Arc::<JwtManager>::from_ref(state);
        let claims = jwt.validate_token(token)?;
        Viewer::from_claims(claims)
    }
}
