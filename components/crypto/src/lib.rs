#![crate_type = "lib"]
#![deny(trivial_numeric_casts)]

pub mod hash;
pub mod identity;

pub use self::identity::{verify_signature, CryptoError, Signer, SoftwareSecpIdentity};
