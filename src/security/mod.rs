//! Document protection: standard-handler encryption and detached signing.

pub mod encrypt;
pub mod sign;

pub use encrypt::{authenticate, EncryptionAlgorithm, EncryptionSetup, Permissions};
pub use sign::{SignatureFormat, SigningMaterial};
