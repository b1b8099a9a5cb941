//! Signing primitives shared by the chain adapters.

use ed25519_dalek::{Signer, SigningKey, Verifier};
use secp256k1::ecdsa::RecoveryId;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use crate::core::errors::{Result, WalletError};

fn message(digest: &[u8]) -> Result<Message> {
    Message::from_digest_slice(digest)
        .map_err(|e| WalletError::CryptoError(format!("Digest must be 32 bytes: {}", e)))
}

/// DER-encoded low-S ECDSA signature over a 32-byte digest.
pub fn sign_digest_der(secret: &SecretKey, digest: &[u8]) -> Result<Vec<u8>> {
    let secp = Secp256k1::signing_only();
    let sig = secp.sign_ecdsa(&message(digest)?, secret);
    Ok(sig.serialize_der().to_vec())
}

/// Compact (r || s) signature plus its recovery id (0 or 1 in practice).
pub fn sign_digest_recoverable(secret: &SecretKey, digest: &[u8]) -> Result<([u8; 64], u8)> {
    let secp = Secp256k1::signing_only();
    let sig = secp.sign_ecdsa_recoverable(&message(digest)?, secret);
    let (recid, compact) = sig.serialize_compact();
    Ok((compact, recovery_byte(recid)))
}

fn recovery_byte(recid: RecoveryId) -> u8 {
    recid.to_i32() as u8
}

pub fn compressed_public_key(secret: &SecretKey) -> PublicKey {
    PublicKey::from_secret_key(&Secp256k1::signing_only(), secret)
}

pub fn sign_ed25519(key: &SigningKey, message: &[u8]) -> [u8; 64] {
    key.sign(message).to_bytes()
}

pub(crate) fn secp256k1_self_test() -> bool {
    let Ok(secret) = SecretKey::from_slice(&[0x42u8; 32]) else {
        return false;
    };
    let digest = [0x17u8; 32];
    let Ok(msg) = Message::from_digest_slice(&digest) else {
        return false;
    };
    let secp = Secp256k1::new();
    let sig = secp.sign_ecdsa(&msg, &secret);
    secp.verify_ecdsa(&msg, &sig, &PublicKey::from_secret_key(&secp, &secret)).is_ok()
}

pub(crate) fn ed25519_self_test() -> bool {
    let key = SigningKey::from_bytes(&[0x42u8; 32]);
    let sig = key.sign(b"self-test");
    key.verifying_key().verify(b"self-test", &sig).is_ok()
}
