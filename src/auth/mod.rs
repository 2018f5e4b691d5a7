//! Authentication module
//!
//! Password hashing plus issuance and verification of the access/refresh
//! token pair.

mod claims;
mod jwt;
mod password;

pub use claims::AccessClaims;
pub use claims::RefreshClaims;
pub use jwt::TokenError;
pub use jwt::TokenIssuer;
pub use jwt::TokenKind;
pub use jwt::TokenPair;
pub use password::PasswordDigest;
pub use password::PasswordHasher;
pub use password::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
