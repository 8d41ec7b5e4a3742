use sha2::{Digest, Sha256};

use crate::tournament::types::PrincipalId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,
    #[error("malformed bearer token")]
    Malformed,
    #[error("invalid token signature")]
    InvalidSignature,
}

/// Verifies client identity tokens and yields the authenticated principal.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<PrincipalId, AuthError>;
}

/// Tokens of the form `<principal>.<hex(sha256(secret ":" principal))>`.
#[derive(Clone)]
pub struct SharedSecretVerifier {
    secret: String,
}

impl SharedSecretVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn signature(&self, principal: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(principal.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn issue(&self, principal: &str) -> String {
        format!("{principal}.{}", self.signature(principal))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl IdentityVerifier for SharedSecretVerifier {
    fn verify(&self, token: &str) -> Result<PrincipalId, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        let (principal, signature) = token.rsplit_once('.').ok_or(AuthError::Malformed)?;
        if principal.is_empty() || signature.is_empty() {
            return Err(AuthError::Malformed);
        }
        let expected = self.signature(principal);
        if constant_time_eq(expected.as_bytes(), signature.to_ascii_lowercase().as_bytes()) {
            Ok(principal.to_string())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }
}
