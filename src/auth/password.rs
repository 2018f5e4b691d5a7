//! Password hashing and verification
//!
//! Salted bcrypt with a configurable work factor. Every digest embeds the
//! cost it was produced with, so raising the configured cost never breaks
//! verification of digests stored earlier.

use bcrypt::{hash, verify};

use crate::configuration::PasswordSettings;
use crate::error::AppError;

pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

/// A salted one-way digest of a password.
///
/// Only [`PasswordHasher::hash`] constructs one, so a value of this type is
/// never plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, AppError> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
            return Err(AppError::Internal(format!("Invalid bcrypt cost: {}", cost)));
        }
        Ok(Self { cost })
    }

    pub fn from_settings(settings: &PasswordSettings) -> Result<Self, AppError> {
        Self::new(settings.bcrypt_cost)
    }

    /// Hash a plaintext password with a fresh random salt
    ///
    /// # Errors
    /// Returns error if bcrypt hashing fails
    pub fn hash(&self, plaintext: &str) -> Result<PasswordDigest, AppError> {
        hash(plaintext, self.cost)
            .map(PasswordDigest)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored digest
    ///
    /// A mismatch is `Ok(false)`, not an error. Only an unreadable digest
    /// is reported as an internal failure.
    pub fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AppError> {
        verify(plaintext, digest)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }
}
