use once_cell::sync::Lazy;
use regex::Regex;
use sha3::{Digest, Keccak256};

use crate::blockchain::bitcoin::address::{
    decode_base58check, is_valid_bitcoin, is_valid_cashaddr, is_valid_segwit_v0, BTC_P2PKH, BTC_P2SH,
    DOGE_P2PKH, DOGE_P2SH, LTC_LEGACY_P2SH, LTC_P2PKH, LTC_P2SH,
};
use crate::core::coins::{ChainFamily, UtxoChain};
use crate::core::errors::{Result, WalletError};

static ETH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static regex"));
static TRON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^T[1-9A-HJ-NP-Za-km-z]{33}$").expect("static regex"));
static BASE58_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]+$").expect("static regex"));
static BTC_LEGACY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[13][1-9A-HJ-NP-Za-km-z]{25,34}$").expect("static regex"));
static BTC_BECH32_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^bc1[qp][ac-hj-np-z02-9]{38,58}$").expect("static regex"));
static LTC_LEGACY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[LM3][1-9A-HJ-NP-Za-km-z]{26,33}$").expect("static regex"));
static LTC_BECH32_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ltc1[ac-hj-np-z02-9]{38,58}$").expect("static regex"));
static DOGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[DA9][1-9A-HJ-NP-Za-km-z]{25,34}$").expect("static regex"));

fn invalid(reason: impl Into<String>) -> WalletError {
    WalletError::ValidationError(reason.into())
}

/// Validates an Ethereum address.
pub fn validate_ethereum_address(address: &str) -> Result<()> {
    if !address.starts_with("0x") || address.len() != 42 {
        return Err(invalid("Invalid Ethereum address format (expected 0x + 40 hex chars)"));
    }
    if !ETH_RE.is_match(address) {
        return Err(invalid("Invalid Ethereum address characters"));
    }
    // EIP-55: if mixed-case, enforce checksum. All-lower or all-upper acceptable for compatibility.
    let body = &address[2..];
    let is_all_lower = body.chars().all(|c| !c.is_ascii_uppercase());
    let is_all_upper = body.chars().all(|c| !c.is_ascii_lowercase());
    if is_all_lower || is_all_upper {
        return Ok(());
    }
    if !is_eip55_checksum_valid(address) {
        return Err(invalid("Invalid EIP-55 checksum for Ethereum address"));
    }
    Ok(())
}

fn is_eip55_checksum_valid(addr: &str) -> bool {
    let body = &addr[2..];
    let lower = body.to_lowercase();
    let hash = Keccak256::digest(lower.as_bytes());
    for (i, ch) in body.chars().enumerate() {
        let nibble = (hash[i / 2] >> (4 * (1 - (i % 2)))) & 0x0f;
        match ch {
            'a'..='f' if nibble >= 8 => return false,
            'A'..='F' if nibble < 8 => return false,
            _ => {}
        }
    }
    true
}

pub fn validate_solana_address(address: &str) -> Result<()> {
    if address.len() < 32 || address.len() > 44 {
        return Err(invalid("Invalid Solana address length (expected 32-44 chars)"));
    }
    if !BASE58_RE.is_match(address) {
        return Err(invalid("Invalid Solana address characters"));
    }
    match bs58::decode(address).into_vec() {
        Ok(decoded) if decoded.len() == 32 => Ok(()),
        Ok(_) => Err(invalid("Invalid Solana address: not a 32-byte public key")),
        Err(_) => Err(invalid("Invalid Solana address encoding")),
    }
}

pub fn validate_tron_address(address: &str) -> Result<()> {
    if !TRON_RE.is_match(address) {
        return Err(invalid("Invalid Tron address (expected T + 33 base58 chars)"));
    }
    match decode_base58check(address) {
        Some((0x41, payload)) if payload.len() == 20 => Ok(()),
        _ => Err(invalid("Invalid Tron address checksum")),
    }
}

fn base58_version_in(address: &str, versions: &[u8]) -> bool {
    matches!(decode_base58check(address), Some((v, payload)) if payload.len() == 20 && versions.contains(&v))
}

pub fn validate_utxo_address(chain: UtxoChain, address: &str) -> Result<()> {
    let ok = match chain {
        UtxoChain::Bitcoin => {
            if !(BTC_LEGACY_RE.is_match(address) || BTC_BECH32_RE.is_match(address)) {
                return Err(invalid("Invalid Bitcoin address format (expected 1..., 3..., bc1q... or bc1p...)"));
            }
            is_valid_bitcoin(address)
        }
        UtxoChain::Litecoin => {
            if LTC_BECH32_RE.is_match(address) {
                is_valid_segwit_v0("ltc", address)
            } else if LTC_LEGACY_RE.is_match(address) {
                base58_version_in(address, &[LTC_P2PKH, LTC_P2SH, LTC_LEGACY_P2SH])
            } else {
                return Err(invalid("Invalid Litecoin address format (expected L..., M..., 3... or ltc1...)"));
            }
        }
        UtxoChain::Dogecoin => {
            if !DOGE_RE.is_match(address) {
                return Err(invalid("Invalid Dogecoin address format (expected D..., A... or 9...)"));
            }
            base58_version_in(address, &[DOGE_P2PKH, DOGE_P2SH])
        }
        UtxoChain::BitcoinCash => {
            if BTC_LEGACY_RE.is_match(address) {
                base58_version_in(address, &[BTC_P2PKH, BTC_P2SH])
            } else {
                is_valid_cashaddr(address)
            }
        }
    };
    if ok {
        Ok(())
    } else {
        Err(invalid("Address checksum mismatch"))
    }
}

/// Validate `address` against a chain family. Empty input is rejected with a reason.
pub fn validate_for_family(family: &ChainFamily, address: &str) -> Result<()> {
    let address = address.trim();
    if address.is_empty() {
        return Err(invalid("Address is empty"));
    }
    match family {
        ChainFamily::Utxo(chain) => validate_utxo_address(*chain, address),
        ChainFamily::EvmNative { .. } | ChainFamily::EvmToken { .. } => validate_ethereum_address(address),
        ChainFamily::Solana => validate_solana_address(address),
        ChainFamily::Tron => validate_tron_address(address),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("0x52908400098527886E0F7030069857D2E4169EE7", true; "checksummed upper")]
    #[test_case("0xde709f2102306220921060314715629080e2fb77", true; "all lower")]
    #[test_case("0x52908400098527886e0F7030069857D2E4169EE7", false; "broken checksum")]
    #[test_case("0x123", false; "too short")]
    #[test_case("52908400098527886E0F7030069857D2E4169EE7", false; "missing prefix")]
    fn ethereum(address: &str, ok: bool) {
        assert_eq!(validate_ethereum_address(address).is_ok(), ok);
    }

    #[test]
    fn tron_known_address() {
        assert!(validate_tron_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t").is_ok());
        assert!(validate_tron_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6u").is_err());
        assert!(validate_tron_address("0x52908400098527886E0F7030069857D2E4169EE7").is_err());
    }

    #[test]
    fn solana_system_program_is_32_bytes() {
        assert!(validate_solana_address("11111111111111111111111111111111").is_ok());
        assert!(validate_solana_address("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl").is_err());
    }

    #[test]
    fn empty_is_rejected_with_reason() {
        let err = validate_for_family(&ChainFamily::Solana, "   ").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Address is empty");
    }

    #[test]
    fn bitcoin_known_addresses() {
        assert!(validate_utxo_address(UtxoChain::Bitcoin, "1BpEi6DfDAUFd7GtittLSdBeYJvcoaVggu").is_ok());
        assert!(validate_utxo_address(UtxoChain::Bitcoin, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu").is_ok());
        assert!(validate_utxo_address(UtxoChain::Bitcoin, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyv").is_err());
        assert!(validate_utxo_address(UtxoChain::Bitcoin, "ltc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu").is_err());
    }

    #[test]
    fn bitcoin_cash_accepts_both_encodings() {
        assert!(validate_utxo_address(UtxoChain::BitcoinCash, "1BpEi6DfDAUFd7GtittLSdBeYJvcoaVggu").is_ok());
        assert!(validate_utxo_address(
            UtxoChain::BitcoinCash,
            "bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a"
        )
        .is_ok());
    }
}
