//! Access/refresh token issuance, verification and rotation.
//!
//! Both tokens are HS256 JWTs with independent secrets and lifetimes. The
//! refresh token is also stored on the user record, one live value per user.
//! Rotation only succeeds for the exact stored value, so a refresh token is
//! single-use and logout revokes it despite its long lifetime.

use anyhow::{Result, anyhow, bail};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{info, warn};
use uuid::Uuid;

use vidtube_db::Database;
use vidtube_db::models::UserRow;
use vidtube_types::api::{AccessClaims, RefreshClaims};

use crate::error::ApiError;
use crate::state::Deadline;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_ttl: Duration,
    pub refresh_secret: String,
    pub refresh_ttl: Duration,
}

/// Parses a lifetime such as `900`, `15m`, `1d` or `10d`. A bare number is
/// seconds; suffixes are `s`, `m`, `h`, `d` and `w`.
pub fn parse_expiry(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let amount: i64 = digits
        .parse()
        .map_err(|_| anyhow!("invalid token expiry '{}'", raw))?;
    if amount == 0 {
        bail!("token expiry '{}' must be positive", raw);
    }
    let duration = match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => bail!("unknown unit in token expiry '{}'", raw),
    };
    duration.ok_or_else(|| anyhow!("token expiry '{}' is out of range", raw))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SigningKeys {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String, ApiError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| ApiError::internal("Something went wrong while generating refresh and access token", e))
    }

    fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<C, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        // Signature, expiry and format failures all look the same to the caller.
        decode::<C>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                warn!("Rejected token: {:?}", e.kind());
                ApiError::Unauthorized("Invalid or expired token".to_string())
            })
    }
}

pub struct TokenService {
    access: SigningKeys,
    refresh: SigningKeys,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            access: SigningKeys::new(&config.access_secret, config.access_ttl),
            refresh: SigningKeys::new(&config.refresh_secret, config.refresh_ttl),
        }
    }

    /// Signs a fresh access/refresh pair for `user` without touching the store.
    pub fn sign_pair(&self, user: &UserRow) -> Result<TokenPair, ApiError> {
        let sub: Uuid = user
            .id
            .parse()
            .map_err(|e| ApiError::internal("Corrupt user id", e))?;
        let now = Utc::now().timestamp();

        let access = AccessClaims {
            sub,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            iat: now,
            exp: now + self.access.ttl.num_seconds(),
        };
        let refresh = RefreshClaims {
            sub,
            iat: now,
            exp: now + self.refresh.ttl.num_seconds(),
            jti: Uuid::new_v4(),
        };

        Ok(TokenPair {
            access_token: self.access.sign(&access)?,
            refresh_token: self.refresh.sign(&refresh)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, ApiError> {
        self.access.verify(token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, ApiError> {
        self.refresh.verify(token)
    }

    /// Issues a new pair for `user_id` and stores its refresh token on the
    /// user, replacing whatever was there.
    pub fn issue(&self, db: &Database, user_id: &str, deadline: Deadline) -> Result<TokenPair, ApiError> {
        let user = db.get_user_by_id(user_id)?.ok_or_else(|| {
            ApiError::internal(
                "Something went wrong while generating refresh and access token",
                format!("user {} vanished before token issue", user_id),
            )
        })?;

        let pair = self.sign_pair(&user)?;
        deadline.check()?;
        if !db.set_refresh_token(&user.id, Some(&pair.refresh_token))? {
            return Err(ApiError::internal(
                "Something went wrong while generating refresh and access token",
                format!("user {} vanished while storing refresh token", user_id),
            ));
        }

        info!("Issued token pair for user {}", user.id);
        Ok(pair)
    }

    /// Exchanges a live refresh token for a new pair. The presented token
    /// must equal the stored one, and the swap only lands if nobody rotated
    /// or revoked it in between.
    pub fn rotate(&self, db: &Database, presented: &str, deadline: Deadline) -> Result<TokenPair, ApiError> {
        let claims = self.verify_refresh(presented)?;

        let user = db
            .get_user_by_id(&claims.sub.to_string())?
            .ok_or_else(|| ApiError::Unauthorized("Invalid refresh token".to_string()))?;

        if user.refresh_token.as_deref() != Some(presented) {
            warn!("Refresh token reuse for user {}", user.id);
            return Err(ApiError::Unauthorized("Refresh token is expired or used".to_string()));
        }

        let pair = self.sign_pair(&user)?;
        deadline.check()?;
        if !db.replace_refresh_token(&user.id, presented, &pair.refresh_token)? {
            warn!("Refresh token for user {} was rotated concurrently", user.id);
            return Err(ApiError::Unauthorized("Refresh token is expired or used".to_string()));
        }

        info!("Rotated token pair for user {}", user.id);
        Ok(pair)
    }

    /// Ends the server-side session: any refresh token issued so far stops
    /// rotating.
    pub fn invalidate(&self, db: &Database, user_id: &str, deadline: Deadline) -> Result<(), ApiError> {
        deadline.check()?;
        db.set_refresh_token(user_id, None)?;
        info!("Cleared refresh token for user {}", user_id);
        Ok(())
    }
}
