//! BIP32/BIP44 HD derivation
//!
//! Path format: m/purpose'/coin_type'/account'/change/address_index
//!
//! secp256k1 keys follow BIP32 (hardened and normal children). ed25519 keys
//! follow SLIP-10, which only defines hardened children, so every segment of
//! an ed25519 path is hardened.

use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::core::errors::{Result, WalletError};

type HmacSha512 = Hmac<Sha512>;

pub const HARDENED: u32 = 0x8000_0000;

/// BIP44-style derivation path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bip44Path {
    /// BIP purpose (44, 49, 84, 86)
    pub purpose: u32,
    /// Registered coin type (0=BTC, 60=ETH...)
    pub coin_type: u32,
    /// Account index
    pub account: u32,
    /// External/internal chain (0=external, 1=internal change)
    pub change: u32,
    /// Address index within the chain
    pub address_index: u32,
}

impl Bip44Path {
    pub fn new(purpose: u32, coin_type: u32, account: u32, address_index: u32) -> Self {
        Self { purpose, coin_type, account, change: 0, address_index }
    }

    /// BIP32 indices: hardened purpose/coin/account, normal change/index.
    pub fn to_derivation_path(&self) -> Vec<u32> {
        vec![
            HARDENED | self.purpose,
            HARDENED | self.coin_type,
            HARDENED | self.account,
            self.change,
            self.address_index,
        ]
    }

    /// SLIP-10 indices: every level hardened.
    pub fn to_hardened_path(&self) -> Vec<u32> {
        self.to_derivation_path().into_iter().map(|i| i | HARDENED).collect()
    }

    pub fn to_string_bip32(&self) -> String {
        format!(
            "m/{}'/{}'/{}'/{}/{}",
            self.purpose, self.coin_type, self.account, self.change, self.address_index
        )
    }

    pub fn to_string_hardened(&self) -> String {
        format!(
            "m/{}'/{}'/{}'/{}'/{}'",
            self.purpose, self.coin_type, self.account, self.change, self.address_index
        )
    }
}

/// Parse `m/44'/0'/0'/0/5` style paths. Accepts `'`, `h` and `H` markers.
pub fn parse_path(path: &str) -> Result<Vec<u32>> {
    let mut parts = path.trim().split('/');
    match parts.next() {
        Some("m") | Some("M") => {}
        _ => return Err(WalletError::KeyDerivationError(format!("Path must start with m/: {}", path))),
    }
    let mut out = Vec::new();
    for part in parts {
        let (digits, hardened) = match part.strip_suffix(['\'', 'h', 'H']) {
            Some(d) => (d, true),
            None => (part, false),
        };
        let index: u32 = digits
            .parse()
            .map_err(|_| WalletError::KeyDerivationError(format!("Bad path segment {:?} in {}", part, path)))?;
        if index >= HARDENED {
            return Err(WalletError::KeyDerivationError(format!("Path index out of range: {}", part)));
        }
        out.push(if hardened { index | HARDENED } else { index });
    }
    Ok(out)
}

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<Zeroizing<[u8; 64]>> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| WalletError::CryptoError(format!("HMAC initialization failed: {}", e)))?;
    for p in parts {
        mac.update(p);
    }
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// BIP32 secp256k1 extended private key
pub struct Bip32 {
    chain_code: [u8; 32],
    key: SecretKey,
}

impl Bip32 {
    /// Create master key from BIP39 seed
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        if seed.len() < 16 {
            return Err(WalletError::KeyDerivationError(
                "Seed length must be at least 16 bytes".to_string(),
            ));
        }
        let i = hmac_sha512(b"Bitcoin seed", &[seed])?;
        let key = SecretKey::from_slice(&i[..32])?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);
        Ok(Self { chain_code, key })
    }

    pub fn derive_child(&self, index: u32) -> Result<Self> {
        let secp = Secp256k1::signing_only();
        let index_bytes = index.to_be_bytes();
        let i = if index >= HARDENED {
            // 0x00 || k || i
            let k = Zeroizing::new(self.key.secret_bytes());
            hmac_sha512(&self.chain_code, &[&[0u8], k.as_slice(), &index_bytes])?
        } else {
            // serP(K) || i
            let pubkey = PublicKey::from_secret_key(&secp, &self.key).serialize();
            hmac_sha512(&self.chain_code, &[&pubkey, &index_bytes])?
        };

        let mut il = Zeroizing::new([0u8; 32]);
        il.copy_from_slice(&i[..32]);
        let tweak = Scalar::from_be_bytes(*il)
            .map_err(|_| WalletError::KeyDerivationError("Derived tweak out of range".to_string()))?;
        let key = self.key.add_tweak(&tweak)?;

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);
        Ok(Self { chain_code, key })
    }

    pub fn derive_indices(&self, indices: &[u32]) -> Result<Self> {
        let mut current = Self { chain_code: self.chain_code, key: self.key };
        for &index in indices {
            current = current.derive_child(index)?;
        }
        Ok(current)
    }

    /// Walks every level of a BIP44 path from this key.
    pub fn derive_path(&self, path: &Bip44Path) -> Result<Self> {
        self.derive_indices(&path.to_derivation_path())
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.key
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_secret_key(&Secp256k1::signing_only(), &self.key)
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }
}

/// SLIP-10 ed25519 extended private key
pub struct Slip10Ed25519 {
    chain_code: [u8; 32],
    key: Zeroizing<[u8; 32]>,
}

impl Slip10Ed25519 {
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let i = hmac_sha512(b"ed25519 seed", &[seed])?;
        Ok(Self::split(&i))
    }

    fn split(i: &[u8; 64]) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&i[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);
        Self { chain_code, key }
    }

    pub fn derive_child(&self, index: u32) -> Result<Self> {
        if index < HARDENED {
            return Err(WalletError::KeyDerivationError(
                "ed25519 supports hardened derivation only".to_string(),
            ));
        }
        let i = hmac_sha512(&self.chain_code, &[&[0u8], self.key.as_slice(), &index.to_be_bytes()])?;
        Ok(Self::split(&i))
    }

    pub fn derive_indices(&self, indices: &[u32]) -> Result<Self> {
        let mut current = Self { chain_code: self.chain_code, key: self.key.clone() };
        for &index in indices {
            current = current.derive_child(index)?;
        }
        Ok(current)
    }

    /// 32-byte ed25519 seed for `ed25519_dalek::SigningKey::from_bytes`.
    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bip44_path_strings() {
        let path = Bip44Path::new(84, 0, 0, 7);
        assert_eq!(path.to_string_bip32(), "m/84'/0'/0'/0/7");
        assert_eq!(path.to_string_hardened(), "m/84'/0'/0'/0'/7'");
        assert_eq!(parse_path(&path.to_string_bip32()).unwrap(), path.to_derivation_path());
    }

    #[test]
    fn test_parse_path_rejects_garbage() {
        assert!(parse_path("44'/0'").is_err());
        assert!(parse_path("m/abc").is_err());
        assert!(parse_path("m/2147483648").is_err());
        assert_eq!(parse_path("m").unwrap(), Vec::<u32>::new());
        assert_eq!(parse_path("m/1h/2").unwrap(), vec![HARDENED | 1, 2]);
    }

    // BIP32 test vector 1
    #[test]
    fn test_bip32_vector_one() {
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let master = Bip32::from_seed(&seed).unwrap();
        assert_eq!(
            hex::encode(master.secret_key().secret_bytes()),
            "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35"
        );
        // m/0'/1/2'/2/1000000000
        let child = master
            .derive_indices(&[HARDENED, 1, HARDENED | 2, 2, 1_000_000_000])
            .unwrap();
        assert_eq!(
            hex::encode(child.secret_key().secret_bytes()),
            "471b76e389e528d6de6d816857e012c5455051cad6660850e58372a6c3e6e7c8"
        );
    }

    // SLIP-10 ed25519 test vector 1
    #[test]
    fn test_slip10_vector_one() {
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let master = Slip10Ed25519::from_seed(&seed).unwrap();
        assert_eq!(
            hex::encode(master.secret_bytes()),
            "2b4be7f19ee27bbf30c667b642d5f4aa69fd169872f8fc3059c08ebae2eb19e7"
        );
        let child = master.derive_indices(&[HARDENED]).unwrap();
        assert_eq!(
            hex::encode(child.secret_bytes()),
            "68e0fe46dfb67e368c75379acec591dad19df3cde26e63b93a8e704f1dade7a3"
        );
    }

    #[test]
    fn test_slip10_rejects_normal_child() {
        let master = Slip10Ed25519::from_seed(&[7u8; 32]).unwrap();
        assert!(master.derive_child(0).is_err());
    }

    #[test]
    fn test_short_seed_rejected() {
        assert!(Bip32::from_seed(&[1u8; 8]).is_err());
    }
}
