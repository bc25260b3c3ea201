#![crate_type = "lib"]
#![deny(trivial_numeric_casts)]

// Re-exported for use inside the define_fixed_bytes! expansion.
pub use hex;
pub use serde;

#[macro_use]
pub mod define_fixed_bytes;
pub mod canonical_serialize;
pub mod conn;
pub mod int_convert;
