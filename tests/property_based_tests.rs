//! Property-based tests for HD derivation and address validation.

use nexus_wallet::core::coins::{base_coins, AddressFormat};
use nexus_wallet::core::key_derivation::KeyDerivationEngine;
use nexus_wallet::core::validation::validate_for_family;
use proptest::prelude::*;

fn phrase_from(entropy: [u8; 16]) -> String {
    bip39::Mnemonic::from_entropy(&entropy).unwrap().to_string()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Every default address derived from any valid phrase passes its own
    /// family's validator, and derivation is repeatable.
    #[test]
    fn derived_addresses_validate(entropy in proptest::array::uniform16(any::<u8>())) {
        let phrase = phrase_from(entropy);
        prop_assert!(KeyDerivationEngine::validate_mnemonic(&phrase));
        for coin in base_coins() {
            let format = coin.default_format();
            let first = KeyDerivationEngine::derive_address(&phrase, coin, format, 0, 0).unwrap();
            let again = KeyDerivationEngine::derive_address(&phrase, coin, format, 0, 0).unwrap();
            prop_assert_eq!(&first.address, &again.address);
            prop_assert!(
                validate_for_family(&coin.family, &first.address).is_ok(),
                "{} produced invalid address {}", coin.symbol, first.address
            );
        }
    }

    #[test]
    fn distinct_indices_give_distinct_addresses(
        entropy in proptest::array::uniform16(any::<u8>()),
        index in 1u32..1000,
    ) {
        let phrase = phrase_from(entropy);
        let btc = base_coins().iter().find(|c| c.symbol == "BTC").unwrap();
        let zero = KeyDerivationEngine::derive_address(&phrase, btc, AddressFormat::Bip84, 0, 0).unwrap();
        let other = KeyDerivationEngine::derive_address(&phrase, btc, AddressFormat::Bip84, 0, index).unwrap();
        prop_assert_ne!(zero.address, other.address);
        let suffix = format!("/{}", index);
        prop_assert!(other.path.ends_with(&suffix));
    }

    #[test]
    fn mutated_evm_checksum_is_rejected(flip in 2usize..42) {
        let eth = base_coins().iter().find(|c| c.symbol == "ETH").unwrap();
        let good = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";
        let mut chars: Vec<char> = good.chars().collect();
        prop_assume!(chars[flip].is_ascii_alphabetic());
        chars[flip] = if chars[flip].is_ascii_uppercase() {
            chars[flip].to_ascii_lowercase()
        } else {
            chars[flip].to_ascii_uppercase()
        };
        let bad: String = chars.into_iter().collect();
        prop_assert!(validate_for_family(&eth.family, &bad).is_err());
    }
}
