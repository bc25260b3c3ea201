#![crate_type = "lib"]
#![deny(trivial_numeric_casts)]

#[macro_use]
extern crate log;

pub mod dal;
pub mod store;

pub use self::dal::{
    ChanMigrationRecord, ChannelBalance, ChannelRecord, ChannelStore, MigrationStore,
    MigrationTx, PayRoute, RoutingStore, StoreError,
};
pub use self::store::Store;
