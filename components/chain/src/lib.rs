#![crate_type = "lib"]
#![deny(trivial_numeric_casts)]

#[macro_use]
extern crate log;

pub mod client;
pub mod dummy_chain;
pub mod events;
pub mod wait;

pub use self::client::{ChainError, ChainReader, LedgerLogScanner, RouterRegistry, TxReceipt};
pub use self::dummy_chain::DummyChain;
pub use self::events::{
    ChannelLogEvent, ConfirmSettleEvent, EventMonitor, MigrateChannelToEvent, OpenChannelEvent,
    RouterEvent, RouterOp,
};
pub use self::wait::{delay_ticks, wait_tx_mined, TxWaitError, WaitConfig};
