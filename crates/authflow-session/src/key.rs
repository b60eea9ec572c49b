//! Opaque session keys.
//!
//! A session key is 256 bits from the operating system's CSPRNG, encoded as
//! unpadded base64url (43 characters). It carries no meaning beyond
//! correlating the legs of one authorization flow.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Number of random bytes in a session key.
pub const SESSION_KEY_BYTES: usize = 32;

/// Length of the encoded session key.
pub const SESSION_KEY_LEN: usize = 43;

/// Opaque, unguessable session key.
///
/// `Debug` output is redacted; use [`SessionKey::fingerprint`] in logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Generates a fresh key from the OS random source.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self::from_bytes(&bytes)
    }

    /// Encodes raw key material.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; SESSION_KEY_BYTES]) -> Self {
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Parses a key received from a caller.
    ///
    /// Returns `None` unless the value is exactly the encoding of
    /// [`SESSION_KEY_BYTES`] bytes.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        if value.len() != SESSION_KEY_LEN {
            return None;
        }
        let decoded = URL_SAFE_NO_PAD.decode(value).ok()?;
        if decoded.len() != SESSION_KEY_BYTES {
            return None;
        }
        Some(Self(value.to_string()))
    }

    /// Returns the encoded key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 of the key, hex encoded.
    ///
    /// Persistent backends index sessions by digest so that a copy of the
    /// table does not reveal usable keys.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Short prefix of the digest, safe to log.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut digest = self.digest();
        digest.truncate(8);
        digest
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey({})", self.fingerprint())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of new session keys.
pub trait KeyGenerator: Send + Sync {
    /// Produces a new candidate key.
    fn generate(&self) -> SessionKey;
}

/// Default generator backed by the OS random source.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsKeyGenerator;

impl KeyGenerator for OsKeyGenerator {
    fn generate(&self) -> SessionKey {
        SessionKey::generate()
    }
}
