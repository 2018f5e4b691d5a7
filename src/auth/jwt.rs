//! Token Issuer
//!
//! Mints and verifies HS256 access and refresh tokens. The two token
//! classes are signed with distinct secrets and lifetimes; an access token
//! never verifies as a refresh token and vice versa.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, RefreshClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::store::UserRecord;

/// Which signing key a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Why a token failed verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("jwt expired")]
    Expired,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("jwt issuer invalid")]
    InvalidIssuer,
    #[error("jwt malformed")]
    Malformed,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
            _ => TokenError::Malformed,
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Auth(AuthError::InvalidToken(err.to_string()))
    }
}

/// Freshly minted access/refresh credentials
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_seconds: i64,
}

impl SigningKey {
    fn from_secret(secret: &str, expiry_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
        }
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    access: SigningKey,
    refresh: SigningKey,
    issuer: String,
}

impl TokenIssuer {
    pub fn new(config: &JwtSettings) -> Self {
        Self {
            access: SigningKey::from_secret(&config.access_token_secret, config.access_token_expiry),
            refresh: SigningKey::from_secret(
                &config.refresh_token_secret,
                config.refresh_token_expiry,
            ),
            issuer: config.issuer.clone(),
        }
    }

    /// Lifetime of access tokens in seconds
    pub fn access_token_expiry(&self) -> i64 {
        self.access.expiry_seconds
    }

    pub fn refresh_token_expiry(&self) -> i64 {
        self.refresh.expiry_seconds
    }

    pub fn issue_access_token(&self, user: &UserRecord) -> Result<String, AppError> {
        let claims = AccessClaims::for_user(user, self.access.expiry_seconds, &self.issuer);
        self.sign(&claims, &self.access)
    }

    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, AppError> {
        let claims = RefreshClaims::for_user(user_id, self.refresh.expiry_seconds, &self.issuer);
        self.sign(&claims, &self.refresh)
    }

    /// Mint a new access/refresh pair for `user`
    pub fn issue_pair(&self, user: &UserRecord) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user)?,
            refresh_token: self.issue_refresh_token(user.id)?,
        })
    }

    /// Check signature, issuer and expiry against the key for `kind`
    pub fn verify<C: DeserializeOwned>(&self, token: &str, kind: TokenKind) -> Result<C, TokenError> {
        let key = match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;

        decode::<C>(token, &key.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(kind = ?kind, "JWT validation error: {}", e);
                TokenError::from(e)
            })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verify(token, TokenKind::Refresh)
    }

    fn sign<C: Serialize>(&self, claims: &C, key: &SigningKey) -> Result<String, AppError> {
        encode(&Header::default(), claims, &key.encoding)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }
}
