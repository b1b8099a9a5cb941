//! UTXO address encodings
//!
//! Bitcoin formats go through the `bitcoin` crate. Litecoin, Dogecoin and
//! Bitcoin Cash reuse the same hash160 payloads with their own version
//! bytes, bech32 hrp or CashAddr encoding.

use bech32::{u5, FromBase32, ToBase32, Variant};
use bitcoin::address::Address;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::{PublicKey as Secp256k1PublicKey, Secp256k1};
use bitcoin::{Network, PublicKey as BitcoinPublicKey};
use std::str::FromStr;
use zeroize::{Zeroize, Zeroizing};

use crate::core::coins::{AddressFormat, UtxoChain};
use crate::core::errors::{Result, WalletError};

pub const LTC_P2PKH: u8 = 0x30;
pub const LTC_P2SH: u8 = 0x32;
pub const LTC_LEGACY_P2SH: u8 = 0x05;
pub const DOGE_P2PKH: u8 = 0x1e;
pub const DOGE_P2SH: u8 = 0x16;
pub const BTC_P2PKH: u8 = 0x00;
pub const BTC_P2SH: u8 = 0x05;

const CASHADDR_PREFIX: &str = "bitcoincash";
const CASHADDR_CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

pub fn hash160(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}

pub fn base58check(version: u8, payload: &[u8]) -> String {
    bs58::encode(payload).with_check_version(version).into_string()
}

/// Decode a Base58Check string into (version, payload).
pub fn decode_base58check(s: &str) -> Option<(u8, Vec<u8>)> {
    let raw = bs58::decode(s).with_check(None).into_vec().ok()?;
    let (version, payload) = raw.split_first()?;
    Some((*version, payload.to_vec()))
}

fn wif_version(chain: UtxoChain) -> u8 {
    match chain {
        UtxoChain::Bitcoin | UtxoChain::BitcoinCash => 0x80,
        UtxoChain::Litecoin => 0xb0,
        UtxoChain::Dogecoin => 0x9e,
    }
}

/// Compressed-key WIF for `chain`.
pub fn encode_wif(chain: UtxoChain, secret: &[u8; 32]) -> String {
    let mut payload = Vec::with_capacity(33);
    payload.extend_from_slice(secret);
    payload.push(0x01);
    let wif = base58check(wif_version(chain), &payload);
    payload.zeroize();
    wif
}

/// Secret bytes from a WIF string of any supported chain.
pub fn decode_wif(wif: &str) -> Option<Zeroizing<[u8; 32]>> {
    let (version, mut payload) = decode_base58check(wif)?;
    if ![0x80, 0xb0, 0x9e].contains(&version) {
        payload.zeroize();
        return None;
    }
    let valid = payload.len() == 32 || (payload.len() == 33 && payload[32] == 0x01);
    let out = valid.then(|| {
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&payload[..32]);
        key
    });
    payload.zeroize();
    out
}

/// Encode `public_key` for `chain` in `format`.
pub fn encode(chain: UtxoChain, format: AddressFormat, public_key: &Secp256k1PublicKey) -> Result<String> {
    match chain {
        UtxoChain::Bitcoin => bitcoin_address(format, public_key),
        UtxoChain::Litecoin => litecoin_address(format, public_key),
        UtxoChain::Dogecoin => match format {
            AddressFormat::Bip44 => Ok(base58check(DOGE_P2PKH, &hash160(&public_key.serialize()))),
            other => Err(unsupported(chain, other)),
        },
        UtxoChain::BitcoinCash => match format {
            AddressFormat::Bip44 => Ok(cashaddr_encode(0x00, &hash160(&public_key.serialize()))),
            other => Err(unsupported(chain, other)),
        },
    }
}

fn unsupported(chain: UtxoChain, format: AddressFormat) -> WalletError {
    WalletError::KeyDerivationError(format!("{} is not registered for {:?}", format, chain))
}

fn bitcoin_address(format: AddressFormat, public_key: &Secp256k1PublicKey) -> Result<String> {
    let btc_pubkey = BitcoinPublicKey::new(*public_key);
    let address = match format {
        AddressFormat::Bip44 => Address::p2pkh(&btc_pubkey, Network::Bitcoin),
        AddressFormat::Bip49 => Address::p2shwpkh(&btc_pubkey, Network::Bitcoin)
            .map_err(|e| WalletError::KeyDerivationError(format!("P2SH-P2WPKH failed: {}", e)))?,
        AddressFormat::Bip84 => Address::p2wpkh(&btc_pubkey, Network::Bitcoin)
            .map_err(|e| WalletError::KeyDerivationError(format!("P2WPKH failed: {}", e)))?,
        AddressFormat::Bip86 => {
            // p2tr applies the BIP341 tweak itself; pass the untweaked key
            let secp = Secp256k1::verification_only();
            let (internal_key, _parity) = public_key.x_only_public_key();
            Address::p2tr(&secp, internal_key, None, Network::Bitcoin)
        }
        AddressFormat::Single => return Err(unsupported(UtxoChain::Bitcoin, format)),
    };
    Ok(address.to_string())
}

fn litecoin_address(format: AddressFormat, public_key: &Secp256k1PublicKey) -> Result<String> {
    let pubkey_hash = hash160(&public_key.serialize());
    match format {
        AddressFormat::Bip44 => Ok(base58check(LTC_P2PKH, &pubkey_hash)),
        AddressFormat::Bip49 => {
            let mut redeem_script = vec![0x00, 0x14];
            redeem_script.extend_from_slice(&pubkey_hash);
            Ok(base58check(LTC_P2SH, &hash160(&redeem_script)))
        }
        AddressFormat::Bip84 => segwit_v0("ltc", &pubkey_hash),
        other => Err(unsupported(UtxoChain::Litecoin, other)),
    }
}

fn segwit_v0(hrp: &str, program: &[u8]) -> Result<String> {
    let version = u5::try_from_u8(0).map_err(|e| WalletError::CryptoError(e.to_string()))?;
    let mut data = vec![version];
    data.extend(program.to_base32());
    bech32::encode(hrp, data, Variant::Bech32)
        .map_err(|e| WalletError::KeyDerivationError(format!("bech32 encoding failed: {}", e)))
}

/// True when `address` is a checksummed v0 segwit address under `hrp`.
pub fn is_valid_segwit_v0(hrp: &str, address: &str) -> bool {
    let Ok((decoded_hrp, data, variant)) = bech32::decode(address) else {
        return false;
    };
    if decoded_hrp != hrp || variant != Variant::Bech32 {
        return false;
    }
    let Some((version, program)) = data.split_first() else {
        return false;
    };
    if version.to_u8() != 0 {
        return false;
    }
    matches!(Vec::<u8>::from_base32(program), Ok(p) if p.len() == 20 || p.len() == 32)
}

/// Bitcoin mainnet validation through the `bitcoin` crate parser.
pub fn is_valid_bitcoin(address: &str) -> bool {
    match Address::from_str(address) {
        Ok(address) => address.is_valid_for_network(Network::Bitcoin),
        Err(_) => false,
    }
}

fn cashaddr_polymod(values: &[u8]) -> u64 {
    let mut c: u64 = 1;
    for d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07_ffff_ffff) << 5) ^ u64::from(*d);
        if c0 & 0x01 != 0 { c ^= 0x98_f2bc_8e61; }
        if c0 & 0x02 != 0 { c ^= 0x79_b76d_99e2; }
        if c0 & 0x04 != 0 { c ^= 0xf3_3e5f_b3c4; }
        if c0 & 0x08 != 0 { c ^= 0xae_2eab_e2a8; }
        if c0 & 0x10 != 0 { c ^= 0x1e_4f43_e470; }
    }
    c ^ 1
}

fn cashaddr_prefix_expanded() -> Vec<u8> {
    let mut out: Vec<u8> = CASHADDR_PREFIX.bytes().map(|b| b & 0x1f).collect();
    out.push(0);
    out
}

/// CashAddr with a 160-bit hash. `version_byte` 0x00 = P2PKH, 0x08 = P2SH.
pub fn cashaddr_encode(version_byte: u8, hash: &[u8; 20]) -> String {
    let mut payload = vec![version_byte];
    payload.extend_from_slice(hash);
    let data: Vec<u8> = payload.to_base32().into_iter().map(|v| v.to_u8()).collect();

    let mut checksum_input = cashaddr_prefix_expanded();
    checksum_input.extend_from_slice(&data);
    checksum_input.extend_from_slice(&[0u8; 8]);
    let poly = cashaddr_polymod(&checksum_input);

    let mut out = String::with_capacity(CASHADDR_PREFIX.len() + 1 + data.len() + 8);
    out.push_str(CASHADDR_PREFIX);
    out.push(':');
    for v in data {
        out.push(CASHADDR_CHARSET[v as usize] as char);
    }
    for i in 0..8 {
        let v = ((poly >> (5 * (7 - i))) & 0x1f) as usize;
        out.push(CASHADDR_CHARSET[v] as char);
    }
    out
}

/// Accepts `bitcoincash:q...` or the bare payload. Lowercase only.
pub fn is_valid_cashaddr(address: &str) -> bool {
    let body = address.strip_prefix("bitcoincash:").unwrap_or(address);
    if body.len() != 42 || !(body.starts_with('q') || body.starts_with('p')) {
        return false;
    }
    let mut values = cashaddr_prefix_expanded();
    for ch in body.bytes() {
        match CASHADDR_CHARSET.iter().position(|&c| c == ch) {
            Some(v) => values.push(v as u8),
            None => return false,
        }
    }
    cashaddr_polymod(&values) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::SecretKey;

    fn test_pubkey() -> Secp256k1PublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[0x11u8; 32]).unwrap();
        Secp256k1PublicKey::from_secret_key(&secp, &sk)
    }

    #[test]
    fn test_cashaddr_matches_legacy_payload() {
        let (version, hash) = decode_base58check("1BpEi6DfDAUFd7GtittLSdBeYJvcoaVggu").unwrap();
        assert_eq!(version, BTC_P2PKH);
        let hash: [u8; 20] = hash.try_into().unwrap();
        assert_eq!(
            cashaddr_encode(0x00, &hash),
            "bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a"
        );
    }

    #[test]
    fn test_wif_roundtrip_known_vector() {
        let secret: [u8; 32] =
            hex::decode("0c28fca386c7a227600b2fe50b7cae11ec86d3bf1fbe471be89827e19d72aa1d")
                .unwrap()
                .try_into()
                .unwrap();
        let wif = encode_wif(UtxoChain::Bitcoin, &secret);
        assert_eq!(wif, "KwdMAjGmerYanjeui5SHS7JkmpZvVipYvB2LJGU1ZxJwYvP98617");
        assert_eq!(*decode_wif(&wif).unwrap(), secret);
        assert!(decode_wif("not-a-wif").is_none());
    }

    #[test]
    fn test_cashaddr_validation() {
        assert!(is_valid_cashaddr("bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a"));
        assert!(is_valid_cashaddr("qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a"));
        assert!(!is_valid_cashaddr("bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6b"));
        assert!(!is_valid_cashaddr("bitcoincash:"));
    }

    #[test]
    fn test_litecoin_prefixes() {
        let pk = test_pubkey();
        assert!(encode(UtxoChain::Litecoin, AddressFormat::Bip44, &pk).unwrap().starts_with('L'));
        assert!(encode(UtxoChain::Litecoin, AddressFormat::Bip49, &pk).unwrap().starts_with('M'));
        let segwit = encode(UtxoChain::Litecoin, AddressFormat::Bip84, &pk).unwrap();
        assert!(segwit.starts_with("ltc1q"));
        assert!(is_valid_segwit_v0("ltc", &segwit));
        assert!(!is_valid_segwit_v0("bc", &segwit));
    }

    #[test]
    fn test_dogecoin_prefix_and_unregistered_format() {
        let pk = test_pubkey();
        let addr = encode(UtxoChain::Dogecoin, AddressFormat::Bip44, &pk).unwrap();
        assert!(addr.starts_with('D'));
        assert_eq!(decode_base58check(&addr).map(|(v, _)| v), Some(DOGE_P2PKH));
        assert!(encode(UtxoChain::Dogecoin, AddressFormat::Bip84, &pk).is_err());
    }

    #[test]
    fn test_bitcoin_formats_validate() {
        let pk = test_pubkey();
        for (format, prefix) in [
            (AddressFormat::Bip44, "1"),
            (AddressFormat::Bip49, "3"),
            (AddressFormat::Bip84, "bc1q"),
            (AddressFormat::Bip86, "bc1p"),
        ] {
            let addr = encode(UtxoChain::Bitcoin, format, &pk).unwrap();
            assert!(addr.starts_with(prefix), "{} -> {}", format, addr);
            assert!(is_valid_bitcoin(&addr));
        }
    }
}
