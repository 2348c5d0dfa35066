//! # cb-auth-simple
//!
//! Argon2-based implementation of `AuthProvider`.
//! Handles staff password hashing and opaque session tokens.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use base64::Engine;
use cb_core::traits::AuthProvider;
use sha2::{Digest, Sha256};

/// Random bytes per session token (256 bits).
const TOKEN_BYTES: usize = 32;

#[derive(Default)]
pub struct SimpleAuthProvider {
    argon2: Argon2<'static>,
}

impl SimpleAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

fn random_bytes<const N: usize>() -> anyhow::Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).map_err(|e| anyhow::anyhow!("system RNG unavailable: {e}"))?;
    Ok(bytes)
}

#[async_trait]
impl AuthProvider for SimpleAuthProvider {
    fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        let salt_bytes: [u8; 16] = random_bytes()?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow::anyhow!("salt encoding failed: {e}"))?;
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
        Ok(hash.to_string())
    }

    /// Verifies if a provided password matches a stored Argon2 hash.
    /// Runs on the blocking pool; a failed task counts as a mismatch.
    async fn verify_password(&self, password: &str, hash: &str) -> bool {
        let argon2 = self.argon2.clone();
        let (password, hash) = (password.to_owned(), hash.to_owned());

        tokio::task::spawn_blocking(move || match PasswordHash::new(&hash) {
            Ok(parsed_hash) => argon2.verify_password(password.as_bytes(), &parsed_hash).is_ok(),
            Err(_) => false,
        })
        .await
        .unwrap_or(false)
    }

    /// URL-safe so it can travel in a cookie or an `Authorization` header.
    fn new_session_token(&self) -> anyhow::Result<String> {
        let bytes: [u8; TOKEN_BYTES] = random_bytes()?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    fn token_digest(&self, token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_then_verify() {
        let auth = SimpleAuthProvider::new();
        let hash = auth.hash_password("correct horse").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(auth.verify_password("correct horse", &hash).await);
        assert!(!auth.verify_password("battery staple", &hash).await);
        assert!(!auth.verify_password("correct horse", "not a phc string").await);
    }

    #[test]
    fn test_salts_differ() {
        let auth = SimpleAuthProvider::new();
        assert_ne!(auth.hash_password("same").unwrap(), auth.hash_password("same").unwrap());
    }

    #[test]
    fn test_tokens_are_unique_and_digest_is_stable() {
        let auth = SimpleAuthProvider::new();
        let a = auth.new_session_token().unwrap();
        let b = auth.new_session_token().unwrap();

        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert_eq!(auth.token_digest(&a), auth.token_digest(&a));
        assert_ne!(auth.token_digest(&a), auth.token_digest(&b));
        assert_eq!(auth.token_digest(&a).len(), 64);
    }
}
