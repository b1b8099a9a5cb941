// src/security/mod.rs
//! Vault encryption: PBKDF2-derived AES-256-GCM envelopes and the
//! independent password verifier.

pub mod encryption;

pub use encryption::WalletSecurity;
