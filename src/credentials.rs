//! Credential codec: generation and hashing of opaque secrets.
//!
//! All API keys, client secrets, authorization codes and bearer tokens flow
//! through this module. Secrets are cryptographically-random, base64url
//! encoded, and stored only as SHA-256 digests; the short prefix slice is the
//! non-secret O(1) lookup key. Comparison is constant time to avoid oracle
//! attacks.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of leading plaintext characters used as the indexed lookup key.
pub const PREFIX_LEN: usize = 12;

/// Default entropy for generated secrets, in bytes.
pub const DEFAULT_SECRET_BYTES: usize = 32;

/// Namespacing prefixes for the different credential kinds. The prefix is
/// part of the plaintext, so a leaked value is immediately identifiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    ApiKey,
    ClientSecret,
    AuthorizationCode,
    AccessToken,
    RefreshToken,
    WebhookSecret,
}

impl SecretKind {
    /// Plaintext marker prepended to the random material.
    pub fn marker(&self) -> &'static str {
        match self {
            SecretKind::ApiKey => "key_",
            SecretKind::ClientSecret => "cs_",
            SecretKind::AuthorizationCode => "ac_",
            SecretKind::AccessToken => "at_",
            SecretKind::RefreshToken => "rt_",
            SecretKind::WebhookSecret => "whsec_",
        }
    }
}

/// A freshly generated secret. The plaintext is handed to the caller exactly
/// once; only `prefix` and `hash` are ever persisted.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct GeneratedSecret {
    /// Full plaintext secret. Zeroized on drop.
    pub plaintext: String,
    /// Short, stable, non-secret slice of the plaintext used for lookup.
    #[zeroize(skip)]
    pub prefix: String,
    /// SHA-256 hex digest of the full plaintext.
    #[zeroize(skip)]
    pub hash: String,
}

/// Generate a new secret of `byte_len` random bytes for the given kind.
pub fn generate_secret(kind: SecretKind, byte_len: usize) -> GeneratedSecret {
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);

    let plaintext = format!("{}{}", kind.marker(), base64_url::encode(&bytes));
    bytes.zeroize();

    let prefix = plaintext.chars().take(PREFIX_LEN).collect::<String>();
    let hash = hash_secret(&plaintext);

    GeneratedSecret {
        plaintext,
        prefix,
        hash,
    }
}

/// Generate a secret with the default entropy.
pub fn generate_default_secret(kind: SecretKind) -> GeneratedSecret {
    generate_secret(kind, DEFAULT_SECRET_BYTES)
}

/// Deterministic SHA-256 hex digest of a presented secret.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the lookup prefix from a presented plaintext secret.
pub fn prefix_of(secret: &str) -> String {
    secret.chars().take(PREFIX_LEN).collect()
}

/// Compare a presented secret against a stored digest in constant time.
///
/// A mismatch carries no information about which byte differed; callers must
/// surface it as a generic "invalid credential" result.
pub fn verify_secret(presented: &str, stored_hash: &str) -> bool {
    let presented_hash = hash_secret(presented);
    ConstantTimeEq::ct_eq(presented_hash.as_bytes(), stored_hash.as_bytes()).into()
}

/// Constant-time comparison of two digests.
pub fn digests_match(a: &str, b: &str) -> bool {
    ConstantTimeEq::ct_eq(a.as_bytes(), b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_has_marker_and_prefix() {
        let secret = generate_default_secret(SecretKind::ApiKey);
        assert!(secret.plaintext.starts_with("key_"));
        assert_eq!(secret.prefix.len(), PREFIX_LEN);
        assert!(secret.plaintext.starts_with(&secret.prefix));
    }

    #[test]
    fn hash_is_deterministic_and_hex() {
        let a = hash_secret("key_abc123");
        let b = hash_secret("key_abc123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn two_generations_never_collide() {
        let a = generate_default_secret(SecretKind::AccessToken);
        let b = generate_default_secret(SecretKind::AccessToken);
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn verify_accepts_matching_secret() {
        let secret = generate_default_secret(SecretKind::AuthorizationCode);
        assert!(verify_secret(&secret.plaintext, &secret.hash));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let secret = generate_default_secret(SecretKind::AuthorizationCode);
        assert!(!verify_secret("ac_not-the-secret", &secret.hash));
    }

    #[test]
    fn prefix_of_matches_generation() {
        let secret = generate_default_secret(SecretKind::RefreshToken);
        assert_eq!(prefix_of(&secret.plaintext), secret.prefix);
    }

    #[test]
    fn webhook_secret_uses_whsec_marker() {
        let secret = generate_default_secret(SecretKind::WebhookSecret);
        assert!(secret.plaintext.starts_with("whsec_"));
    }

    #[test]
    fn custom_byte_length_changes_plaintext_size() {
        let short = generate_secret(SecretKind::ApiKey, 16);
        let long = generate_secret(SecretKind::ApiKey, 48);
        assert!(long.plaintext.len() > short.plaintext.len());
    }
}
