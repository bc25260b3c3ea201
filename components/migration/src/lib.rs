#![crate_type = "lib"]
#![deny(trivial_numeric_casts)]

#[macro_use]
extern crate log;

pub mod peer;
pub mod processor;

pub use self::peer::{PeerClient, PeerClientError};
pub use self::processor::{
    MigrateChannelProcessor, MigrationConfig, MigrationError, CHAN_MIGRATION_DEADLINE,
    CHAN_MIGRATION_INTERVAL,
};
