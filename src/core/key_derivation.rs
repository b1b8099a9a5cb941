//! Key derivation engine
//!
//! Pure functions from (mnemonic, coin, format, account, index) to an
//! [`AddressRecord`]. Nothing here touches disk or network.

use bip39::Mnemonic;
use ed25519_dalek::SigningKey;
use ethers::types::Address as EthAddress;
use ethers::utils::to_checksum;
use rand::RngCore;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;
use tracing::debug;
use zeroize::Zeroizing;

use crate::blockchain::bitcoin::address::{self as utxo_address, base58check, decode_wif, encode_wif};
use crate::core::bip44::{Bip32, Bip44Path, Slip10Ed25519};
use crate::core::coins::{base_coins, AddressFormat, ChainFamily, CoinConfig, CoinRegistry, Curve, Derivation};
use crate::core::errors::{Result, WalletError};
use crate::core::wallet_info::{AddressBook, AddressRecord};

pub const TRON_ADDRESS_PREFIX: u8 = 0x41;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnemonicStrength {
    /// 12 words
    Bits128,
    /// 24 words
    Bits256,
}

impl MnemonicStrength {
    fn entropy_len(self) -> usize {
        match self {
            MnemonicStrength::Bits128 => 16,
            MnemonicStrength::Bits256 => 32,
        }
    }
}

impl TryFrom<u32> for MnemonicStrength {
    type Error = WalletError;

    fn try_from(bits: u32) -> Result<Self> {
        match bits {
            128 => Ok(MnemonicStrength::Bits128),
            256 => Ok(MnemonicStrength::Bits256),
            other => Err(WalletError::ValidationError(format!(
                "Mnemonic strength must be 128 or 256 bits, got {}",
                other
            ))),
        }
    }
}

/// Lowercase, single-spaced form used for parsing and storage.
pub fn normalize_mnemonic(phrase: &str) -> Zeroizing<String> {
    Zeroizing::new(
        phrase
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

pub struct KeyDerivationEngine;

impl KeyDerivationEngine {
    pub fn generate_mnemonic(strength: MnemonicStrength) -> Result<Zeroizing<String>> {
        let mut entropy = Zeroizing::new(vec![0u8; strength.entropy_len()]);
        rand::rngs::OsRng.fill_bytes(&mut entropy);
        let mnemonic = Mnemonic::from_entropy(&entropy)?;
        Ok(Zeroizing::new(mnemonic.to_string()))
    }

    /// Checksum-verified parse of a BIP39 English phrase.
    pub fn validate_mnemonic(phrase: &str) -> bool {
        Mnemonic::parse_normalized(&normalize_mnemonic(phrase)).is_ok()
    }

    fn seed(phrase: &str) -> Result<Zeroizing<[u8; 64]>> {
        let mnemonic = Mnemonic::parse_normalized(&normalize_mnemonic(phrase))?;
        Ok(Zeroizing::new(mnemonic.to_seed_normalized("")))
    }

    /// Derive one record. Coins that share another coin's address get a copy
    /// of that coin's SINGLE record tagged with `shared_from`.
    pub fn derive_address(
        mnemonic: &str,
        coin: &CoinConfig,
        format: AddressFormat,
        account: u32,
        index: u32,
    ) -> Result<AddressRecord> {
        let seed = Self::seed(mnemonic)?;
        Self::derive_from_seed(&seed, coin, format, account, index)
    }

    /// Every registered format of every coin, for one (account, index).
    pub fn derive_all(mnemonic: &str, registry: &CoinRegistry, account: u32, index: u32) -> Result<AddressBook> {
        let seed = Self::seed(mnemonic)?;
        let mut book = AddressBook::new();
        for coin in registry.iter() {
            let mut per_format = BTreeMap::new();
            for format in coin.formats() {
                let record = Self::derive_from_seed(&seed, coin, format, account, index)?;
                per_format.insert(format, record);
            }
            book.insert(coin.symbol.clone(), per_format);
        }
        debug!(coins = book.len(), account, index, "derived address book");
        Ok(book)
    }

    fn derive_from_seed(
        seed: &[u8; 64],
        coin: &CoinConfig,
        format: AddressFormat,
        account: u32,
        index: u32,
    ) -> Result<AddressRecord> {
        let (coin_type, curve, formats) = match &coin.derivation {
            Derivation::Own { coin_type, curve, formats, .. } => (*coin_type, *curve, formats),
            Derivation::SharesWith(parent_symbol) => {
                if format != AddressFormat::Single {
                    return Err(unregistered(coin, format));
                }
                let parent = base_coins()
                    .iter()
                    .find(|c| &c.symbol == parent_symbol && matches!(c.derivation, Derivation::Own { .. }))
                    .ok_or_else(|| {
                        WalletError::KeyDerivationError(format!("{} shares with unknown coin {}", coin.symbol, parent_symbol))
                    })?;
                let mut record = Self::derive_from_seed(seed, parent, AddressFormat::Single, account, index)?;
                record.shared_from = Some(parent.symbol.clone());
                return Ok(record);
            }
        };
        if !formats.contains(&format) {
            return Err(unregistered(coin, format));
        }

        let path = Bip44Path::new(format.purpose(), coin_type, account, index);
        match curve {
            Curve::Secp256k1 => {
                let node = Bip32::from_seed(seed)?.derive_path(&path)?;
                let (address, private_key) = encode_secp256k1(&coin.family, format, node.secret_key())?;
                Ok(AddressRecord {
                    address,
                    public_key: hex::encode(node.public_key().serialize()),
                    private_key,
                    path: path.to_string_bip32(),
                    format,
                    account,
                    index,
                    shared_from: None,
                })
            }
            Curve::Ed25519 => {
                let node = Slip10Ed25519::from_seed(seed)?.derive_indices(&path.to_hardened_path())?;
                let signing_key = SigningKey::from_bytes(node.secret_bytes());
                let public = signing_key.verifying_key().to_bytes();
                let keypair = Zeroizing::new(signing_key.to_keypair_bytes());
                Ok(AddressRecord {
                    address: bs58::encode(public).into_string(),
                    public_key: hex::encode(public),
                    private_key: bs58::encode(keypair.as_slice()).into_string(),
                    path: path.to_string_hardened(),
                    format,
                    account,
                    index,
                    shared_from: None,
                })
            }
        }
    }
}

fn unregistered(coin: &CoinConfig, format: AddressFormat) -> WalletError {
    WalletError::KeyDerivationError(format!("Format {} is not registered for {}", format, coin.symbol))
}

fn encode_secp256k1(family: &ChainFamily, format: AddressFormat, secret: &SecretKey) -> Result<(String, String)> {
    let public = PublicKey::from_secret_key(&Secp256k1::signing_only(), secret);
    let secret_bytes = Zeroizing::new(secret.secret_bytes());
    match family {
        ChainFamily::Utxo(chain) => {
            let address = utxo_address::encode(*chain, format, &public)?;
            Ok((address, encode_wif(*chain, &secret_bytes)))
        }
        ChainFamily::EvmNative { .. } | ChainFamily::EvmToken { .. } => {
            Ok((evm_address(&public), format!("0x{}", hex::encode(secret_bytes.as_slice()))))
        }
        ChainFamily::Tron => Ok((tron_address(&public), hex::encode(secret_bytes.as_slice()))),
        ChainFamily::Solana => Err(WalletError::KeyDerivationError("Solana keys are ed25519".to_string())),
    }
}

fn keccak_address_bytes(public: &PublicKey) -> [u8; 20] {
    let uncompressed = public.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    out
}

/// EIP-55 checksummed address.
pub fn evm_address(public: &PublicKey) -> String {
    to_checksum(&EthAddress::from_slice(&keccak_address_bytes(public)), None)
}

pub fn tron_address(public: &PublicKey) -> String {
    base58check(TRON_ADDRESS_PREFIX, &keccak_address_bytes(public))
}

/// Accepts 64-hex (optionally 0x-prefixed) or WIF.
pub fn parse_secp256k1_key(input: &str) -> Result<SecretKey> {
    let trimmed = input.trim();
    let hex_body = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex_body.len() == 64 && hex_body.chars().all(|c| c.is_ascii_hexdigit()) {
        let bytes = Zeroizing::new(
            hex::decode(hex_body).map_err(|e| WalletError::ValidationError(format!("Invalid key hex: {}", e)))?,
        );
        return Ok(SecretKey::from_slice(&bytes)?);
    }
    match decode_wif(trimmed) {
        Some(bytes) => Ok(SecretKey::from_slice(bytes.as_slice())?),
        None => Err(WalletError::ValidationError("Unrecognised secp256k1 private key encoding".to_string())),
    }
}

/// Accepts a base58 64-byte keypair, a base58 32-byte seed, or 64-hex.
pub fn parse_ed25519_key(input: &str) -> Result<SigningKey> {
    let trimmed = input.trim();
    if trimmed.len() == 64 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut seed = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(trimmed, seed.as_mut_slice())
            .map_err(|e| WalletError::ValidationError(format!("Invalid key hex: {}", e)))?;
        return Ok(SigningKey::from_bytes(&seed));
    }
    let raw = Zeroizing::new(
        bs58::decode(trimmed)
            .into_vec()
            .map_err(|_| WalletError::ValidationError("Invalid base58 ed25519 key".to_string()))?,
    );
    match raw.len() {
        64 => {
            let mut pair = Zeroizing::new([0u8; 64]);
            pair.copy_from_slice(&raw);
            SigningKey::from_keypair_bytes(&pair)
                .map_err(|e| WalletError::ValidationError(format!("Inconsistent ed25519 keypair: {}", e)))
        }
        32 => {
            let mut seed = Zeroizing::new([0u8; 32]);
            seed.copy_from_slice(&raw);
            Ok(SigningKey::from_bytes(&seed))
        }
        n => Err(WalletError::ValidationError(format!("ed25519 key must be 32 or 64 bytes, got {}", n))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ABANDON: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn coin(symbol: &str) -> CoinConfig {
        CoinRegistry::new().get(symbol).cloned().unwrap()
    }

    #[test]
    fn bip84_vector() {
        let r = KeyDerivationEngine::derive_address(ABANDON, &coin("BTC"), AddressFormat::Bip84, 0, 0).unwrap();
        assert_eq!(r.address, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
        assert_eq!(r.path, "m/84'/0'/0'/0/0");
        assert_eq!(r.public_key, "0330d54fd0dd420a6e5f8d3624f5f3482cae350f79d5f0753bf5beef9c2d91af3c");
    }

    #[test]
    fn bip44_bip49_bip86_vectors() {
        let btc = coin("BTC");
        let addr = |f| KeyDerivationEngine::derive_address(ABANDON, &btc, f, 0, 0).unwrap().address;
        assert_eq!(addr(AddressFormat::Bip44), "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");
        assert_eq!(addr(AddressFormat::Bip49), "37VucYSaXLCAsxYyAPfbSi9eh4iEcbShgf");
        assert_eq!(
            addr(AddressFormat::Bip86),
            "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr"
        );
    }

    #[test]
    fn ethereum_vector_and_siblings() {
        let eth = KeyDerivationEngine::derive_address(ABANDON, &coin("ETH"), AddressFormat::Single, 0, 0).unwrap();
        assert_eq!(eth.address, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
        assert_eq!(eth.path, "m/44'/60'/0'/0/0");

        let usdt = KeyDerivationEngine::derive_address(ABANDON, &coin("USDT"), AddressFormat::Single, 0, 0).unwrap();
        assert_eq!(usdt.address, eth.address);
        assert_eq!(usdt.private_key, eth.private_key);
        assert_eq!(usdt.shared_from.as_deref(), Some("ETH"));
    }

    #[test]
    fn unregistered_format_fails() {
        let err = KeyDerivationEngine::derive_address(ABANDON, &coin("DOGE"), AddressFormat::Bip84, 0, 0);
        assert!(matches!(err, Err(WalletError::KeyDerivationError(_))));
        let err = KeyDerivationEngine::derive_address(ABANDON, &coin("BNB"), AddressFormat::Bip44, 0, 0);
        assert!(err.is_err());
    }

    #[test]
    fn solana_and_tron_shapes() {
        let sol = KeyDerivationEngine::derive_address(ABANDON, &coin("SOL"), AddressFormat::Single, 0, 0).unwrap();
        assert_eq!(sol.path, "m/44'/501'/0'/0'/0'");
        crate::core::validation::validate_solana_address(&sol.address).unwrap();
        let signer = parse_ed25519_key(&sol.private_key).unwrap();
        assert_eq!(bs58::encode(signer.verifying_key().to_bytes()).into_string(), sol.address);

        let trx = KeyDerivationEngine::derive_address(ABANDON, &coin("TRX"), AddressFormat::Single, 0, 0).unwrap();
        assert!(trx.address.starts_with('T'));
        crate::core::validation::validate_tron_address(&trx.address).unwrap();
    }

    #[test]
    fn derive_all_covers_every_format() {
        let book = KeyDerivationEngine::derive_all(ABANDON, &CoinRegistry::new(), 0, 0).unwrap();
        assert_eq!(book.len(), base_coins().len());
        assert_eq!(book["BTC"].len(), 4);
        assert_eq!(book["LTC"].len(), 3);
        assert_eq!(book["BNB"][&AddressFormat::Single].address, book["ETH"][&AddressFormat::Single].address);
        assert!(book["BCH"][&AddressFormat::Bip44].address.starts_with("bitcoincash:q"));
    }

    #[test]
    fn mnemonic_generation_and_checksum() {
        let m12 = KeyDerivationEngine::generate_mnemonic(MnemonicStrength::Bits128).unwrap();
        let m24 = KeyDerivationEngine::generate_mnemonic(MnemonicStrength::Bits256).unwrap();
        assert_eq!(m12.split_whitespace().count(), 12);
        assert_eq!(m24.split_whitespace().count(), 24);
        assert!(KeyDerivationEngine::validate_mnemonic(&m12));
        assert!(KeyDerivationEngine::validate_mnemonic("  Abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon ABOUT "));
        // checksum word swapped
        assert!(!KeyDerivationEngine::validate_mnemonic(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon"
        ));
        assert!(MnemonicStrength::try_from(160).is_err());
    }

    #[test]
    fn private_key_parsers_accept_record_encodings() {
        let btc = KeyDerivationEngine::derive_address(ABANDON, &coin("BTC"), AddressFormat::Bip84, 0, 0).unwrap();
        let eth = KeyDerivationEngine::derive_address(ABANDON, &coin("ETH"), AddressFormat::Single, 0, 0).unwrap();
        let from_wif = parse_secp256k1_key(&btc.private_key).unwrap();
        let public = PublicKey::from_secret_key(&Secp256k1::signing_only(), &from_wif);
        assert_eq!(hex::encode(public.serialize()), btc.public_key);
        assert!(parse_secp256k1_key(&eth.private_key).is_ok());
        assert!(parse_secp256k1_key("zz").is_err());
    }
}
