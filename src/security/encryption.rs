//! Password-based envelope encryption
//!
//! Envelope layout: base64(salt(16) || nonce(12) || AES-256-GCM ciphertext).
//! Verifier layout: base64(salt(32) || PBKDF2-SHA256 digest(32)).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::core::config::SecurityConfig;
use crate::core::errors::{Result, WalletError};
use crate::crypto::kdf::KeyDerivation;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const VERIFIER_SALT_LEN: usize = 32;
const KEY_LEN: usize = 32;

/// Encrypts payloads and produces password verifiers.
#[derive(Debug, Clone, Copy)]
pub struct WalletSecurity {
    encryption_kdf: KeyDerivation,
    verifier_kdf: KeyDerivation,
}

impl WalletSecurity {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            encryption_kdf: KeyDerivation::pbkdf2(config.pbkdf2_iterations),
            verifier_kdf: KeyDerivation::pbkdf2(config.verifier_iterations),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8], password: &str) -> Result<String> {
        let salt = KeyDerivation::generate_salt(SALT_LEN);
        let key = self.encryption_kdf.derive_key(password.as_bytes(), &salt, KEY_LEN);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| WalletError::CryptoError("Invalid key length".to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        #[allow(deprecated)]
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| WalletError::CryptoError("Encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    /// Fails with `InvalidPassword` when authentication fails; the GCM tag
    /// cannot tell a wrong password from a tampered blob.
    pub fn decrypt(&self, envelope: &str, password: &str) -> Result<Zeroizing<Vec<u8>>> {
        let blob = BASE64
            .decode(envelope.trim())
            .map_err(|e| WalletError::CorruptData(format!("Envelope is not base64: {}", e)))?;
        if blob.len() < SALT_LEN + NONCE_LEN + 16 {
            return Err(WalletError::CorruptData("Envelope too short".to_string()));
        }
        let (salt, rest) = blob.split_at(SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.encryption_kdf.derive_key(password.as_bytes(), salt, KEY_LEN);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| WalletError::CryptoError("Invalid key length".to_string()))?;
        #[allow(deprecated)]
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| WalletError::InvalidPassword)
    }

    pub fn hash_password(&self, password: &str) -> String {
        let salt = KeyDerivation::generate_salt(VERIFIER_SALT_LEN);
        let digest = self.verifier_kdf.derive_key(password.as_bytes(), &salt, KEY_LEN);
        let mut out = salt;
        out.extend_from_slice(&digest);
        BASE64.encode(out)
    }

    /// Constant-time check against a stored verifier. Malformed verifiers never match.
    pub fn verify_password(&self, password: &str, stored: &str) -> bool {
        let Ok(raw) = BASE64.decode(stored.trim()) else {
            return false;
        };
        if raw.len() != VERIFIER_SALT_LEN + KEY_LEN {
            return false;
        }
        let (salt, expected) = raw.split_at(VERIFIER_SALT_LEN);
        let digest = self.verifier_kdf.derive_key(password.as_bytes(), salt, KEY_LEN);
        digest.as_slice().ct_eq(expected).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security() -> WalletSecurity {
        WalletSecurity::new(&SecurityConfig::insecure_for_tests())
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let s = security();
        let env = s.encrypt(b"secret payload", "correct horse").unwrap();
        assert_eq!(s.decrypt(&env, "correct horse").unwrap().as_slice(), b"secret payload");
    }

    #[test]
    fn test_wrong_password_fails_cleanly() {
        let s = security();
        let env = s.encrypt(b"secret payload", "correct horse").unwrap();
        assert!(matches!(s.decrypt(&env, "battery staple"), Err(WalletError::InvalidPassword)));
    }

    #[test]
    fn test_envelopes_are_salted() {
        let s = security();
        assert_ne!(s.encrypt(b"x", "pw").unwrap(), s.encrypt(b"x", "pw").unwrap());
    }

    #[test]
    fn test_truncated_envelope_is_corrupt() {
        let s = security();
        assert!(matches!(s.decrypt("AAAA", "pw"), Err(WalletError::CorruptData(_))));
        assert!(matches!(s.decrypt("%%%", "pw"), Err(WalletError::CorruptData(_))));
    }

    #[test]
    fn test_password_verifier() {
        let s = security();
        let stored = s.hash_password("hunter2");
        assert!(s.verify_password("hunter2", &stored));
        assert!(!s.verify_password("hunter3", &stored));
        assert!(!s.verify_password("hunter2", "not base64!"));
    }
}
