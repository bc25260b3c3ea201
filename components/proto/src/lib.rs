#![crate_type = "lib"]
#![deny(trivial_numeric_casts)]

pub mod messages;
pub mod migration;
pub mod report;
pub mod types;
