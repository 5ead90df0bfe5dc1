//! Authentication for the relay fleet control plane
//!
//! Bearer tokens carry the caller's role and tenant; validation yields the
//! [`relaydeck_proto::CallerScope`] every fleet query is filtered by.
//! Stored key material is sealed with [`KeyCipher`].

pub mod cipher;
pub mod jwt;

pub use cipher::{CipherError, KeyCipher};
pub use jwt::{AuthError, JwtClaims, JwtValidator};

// Re-export useful types
pub use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation};
