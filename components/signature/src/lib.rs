#![crate_type = "lib"]
#![deny(trivial_numeric_casts)]

pub mod signature_buff;
pub mod verify;
