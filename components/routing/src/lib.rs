#![crate_type = "lib"]
#![deny(trivial_numeric_casts)]

#[macro_use]
extern crate log;

pub mod builder;
pub mod controller;
pub mod explorer;
pub mod forwarder;
pub mod graph;
pub mod recover;
pub(crate) mod utils;

pub use self::builder::{BuilderConfig, BuilderError, NeighborInfo, OspInfo, RoutingTableBuilder};
pub use self::controller::{BcastSendCallback, Controller, ControllerConfig, RoutingMsgError};
pub use self::forwarder::{Forwarder, ForwarderConfig, RouteLookupError, RoutingPolicy};
pub use self::recover::{recover_routing_table, RecoverError, RoutingSnapshot};
