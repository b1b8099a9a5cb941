use thiserror::Error;

/// Error type for wallet, vault and derivation operations.
///
/// Transaction sends never surface this type; they resolve to a
/// [`TxResult`](crate::blockchain::traits::TxResult) instead.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// I/O failures while reading or writing wallet files.
    #[error("Storage error: {0}")]
    StorageError(String),
    /// Encryption/decryption primitive failures.
    #[error("Crypto error: {0}")]
    CryptoError(String),
    /// Bad user input (address, name, amount...).
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// Mnemonic generation/parsing errors.
    #[error("Mnemonic error: {0}")]
    MnemonicError(String),
    /// Key derivation errors, including unregistered formats.
    #[error("Key derivation error: {0}")]
    KeyDerivationError(String),
    /// Wrong password for a stored wallet or backup.
    #[error("Invalid password")]
    InvalidPassword,
    /// Stored data could not be authenticated or parsed.
    #[error("Corrupt data: {0}")]
    CorruptData(String),
    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// Resource not found errors.
    #[error("Not found: {0}")]
    NotFoundError(String),
    /// Secret access attempted while no wallet is unlocked.
    #[error("Wallet is locked")]
    WalletLocked,
    /// Symbol absent from both the base registry and the custom overlay.
    #[error("Unsupported coin: {0}")]
    UnsupportedCoin(String),
    /// Network errors.
    #[error("Network error: {0}")]
    NetworkError(String),
}

impl From<std::io::Error> for WalletError {
    fn from(err: std::io::Error) -> Self {
        WalletError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::SerializationError(err.to_string())
    }
}

impl From<bip39::Error> for WalletError {
    fn from(err: bip39::Error) -> Self {
        WalletError::MnemonicError(err.to_string())
    }
}

impl From<secp256k1::Error> for WalletError {
    fn from(err: secp256k1::Error) -> Self {
        WalletError::KeyDerivationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;
