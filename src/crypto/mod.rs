pub mod kdf;

pub use self::kdf::KeyDerivation;
