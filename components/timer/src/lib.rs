#![crate_type = "lib"]
#![deny(trivial_numeric_casts)]

mod timer;

pub use self::timer::{interval_stream, TimerTick};
