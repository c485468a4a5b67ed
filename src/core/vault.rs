//! Local credential vault.
//!
//! `LocalVault` is the development/test implementation of the
//! [`CredentialVault`](crate::core::ports::CredentialVault) port: a keyed
//! XOR keystream with a SHA-256 integrity tag. It detects tampering and key
//! mismatch and keeps credentials out of casual reads, but it is not
//! authenticated encryption; production deployments supply a KMS-backed
//! vault through the same port.
//!
//! Decrypted output is never logged. Log lines reference credentials only
//! through [`fingerprint`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

use crate::core::models::{EncryptedBlob, ProviderCredentials};
use crate::core::ports::CredentialVault;
use crate::error::{CapeError, Result};

/// Keyed local vault.
pub struct LocalVault {
    key: Vec<u8>,
}

impl LocalVault {
    /// Create a vault bound to a key.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Seal credentials into a blob for storage. Inverse of `decrypt`.
    ///
    /// # Errors
    /// Returns `Json` if the credentials cannot be serialized.
    pub fn seal(&self, credentials: &ProviderCredentials) -> Result<EncryptedBlob> {
        let plaintext = serde_json::to_vec(credentials)?;
        let iv = Self::derive_iv(&plaintext);
        let ciphertext = self.keystream_xor(&iv, &plaintext);
        let tag = self.tag(&iv, &ciphertext);
        Ok(EncryptedBlob {
            ciphertext: BASE64.encode(&ciphertext),
            iv: BASE64.encode(iv),
            auth_tag: BASE64.encode(tag),
        })
    }

    // IV derivation only needs uniqueness per plaintext for this vault.
    fn derive_iv(plaintext: &[u8]) -> [u8; 16] {
        let digest = Sha256::digest(plaintext);
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&digest[..16]);
        iv
    }

    fn keystream_xor(&self, iv: &[u8], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        let mut counter: u64 = 0;
        let mut block = [0u8; 32];
        for (i, byte) in data.iter().enumerate() {
            if i % 32 == 0 {
                let mut hasher = Sha256::new();
                hasher.update(&self.key);
                hasher.update(iv);
                hasher.update(counter.to_be_bytes());
                block.copy_from_slice(&hasher.finalize());
                counter += 1;
            }
            out.push(byte ^ block[i % 32]);
        }
        out
    }

    fn tag(&self, iv: &[u8], ciphertext: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(&self.key);
        hasher.update(iv);
        hasher.update(ciphertext);
        hasher.finalize().into()
    }
}

impl CredentialVault for LocalVault {
    fn decrypt(&self, blob: &EncryptedBlob) -> Result<ProviderCredentials> {
        let ciphertext = decode_field(&blob.ciphertext, "ciphertext")?;
        let iv = decode_field(&blob.iv, "iv")?;
        let tag = decode_field(&blob.auth_tag, "auth tag")?;

        let expected = self.tag(&iv, &ciphertext);
        if !constant_time_eq(&expected, &tag) {
            return Err(CapeError::DecryptionFailure {
                reason: "auth tag mismatch".to_string(),
            });
        }

        let plaintext = self.keystream_xor(&iv, &ciphertext);
        serde_json::from_slice(&plaintext).map_err(|_| CapeError::DecryptionFailure {
            reason: "decrypted payload is not valid credential JSON".to_string(),
        })
    }
}

fn decode_field(value: &str, field: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|_| CapeError::DecryptionFailure {
            reason: format!("malformed base64 in {field}"),
        })
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Stable fingerprint of a credential blob for logging and change detection.
///
/// Derived from the ciphertext only, so it can be logged freely.
#[must_use]
pub fn fingerprint(blob: &EncryptedBlob) -> String {
    let digest = Sha256::digest(blob.ciphertext.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn credentials() -> ProviderCredentials {
        ProviderCredentials::new(BTreeMap::from([
            ("access_key_id".to_string(), "AKIAEXAMPLE".to_string()),
            ("secret_access_key".to_string(), "s3cr3t".to_string()),
        ]))
    }

    #[test]
    fn seal_then_decrypt_round_trips() {
        let vault = LocalVault::new(b"test-key".to_vec());
        let blob = vault.seal(&credentials()).unwrap();
        let decrypted = vault.decrypt(&blob).unwrap();
        assert_eq!(decrypted.get("access_key_id"), Some("AKIAEXAMPLE"));
        assert_eq!(decrypted.get("secret_access_key"), Some("s3cr3t"));
    }

    #[test]
    fn sealed_blob_does_not_expose_plaintext() {
        let vault = LocalVault::new(b"test-key".to_vec());
        let blob = vault.seal(&credentials()).unwrap();
        assert!(!blob.ciphertext.contains("AKIAEXAMPLE"));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let vault = LocalVault::new(b"test-key".to_vec());
        let mut blob = vault.seal(&credentials()).unwrap();
        let mut raw = BASE64.decode(&blob.ciphertext).unwrap();
        raw[0] ^= 0xFF;
        blob.ciphertext = BASE64.encode(raw);

        let err = vault.decrypt(&blob).unwrap_err();
        assert!(matches!(err, CapeError::DecryptionFailure { .. }));
        assert!(err.to_string().contains("auth tag mismatch"));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let vault = LocalVault::new(b"test-key".to_vec());
        let blob = vault.seal(&credentials()).unwrap();

        let other = LocalVault::new(b"other-key".to_vec());
        assert!(matches!(
            other.decrypt(&blob),
            Err(CapeError::DecryptionFailure { .. })
        ));
    }

    #[test]
    fn malformed_base64_is_rejected() {
        let vault = LocalVault::new(b"test-key".to_vec());
        let blob = EncryptedBlob {
            ciphertext: "not base64!!".to_string(),
            iv: String::new(),
            auth_tag: String::new(),
        };
        let err = vault.decrypt(&blob).unwrap_err();
        assert!(err.to_string().contains("malformed base64"));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let vault = LocalVault::new(b"test-key".to_vec());
        let blob = vault.seal(&credentials()).unwrap();
        let fp1 = fingerprint(&blob);
        let fp2 = fingerprint(&blob);
        assert_eq!(fp1, fp2);
        assert_eq!(fp1.len(), 16);
    }
}
