use common::conn::BoxStream;

use proto::types::{Address, ChannelId, TokenAddr};

/// Router registry operation codes, as emitted on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterOp {
    Added,
    Removed,
    Refreshed,
}

impl RouterOp {
    pub fn from_op_code(op: u8) -> Option<RouterOp> {
        match op {
            0 => Some(RouterOp::Added),
            1 => Some(RouterOp::Removed),
            2 => Some(RouterOp::Refreshed),
            _ => None,
        }
    }
}

/// A parsed `RouterUpdated` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterEvent {
    pub router: Address,
    pub op: u8,
    pub block_number: u64,
}

/// A parsed `OpenChannel` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenChannelEvent {
    pub cid: ChannelId,
    pub peers: [Address; 2],
    pub token: TokenAddr,
}

/// A parsed `ConfirmSettle` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmSettleEvent {
    pub cid: ChannelId,
}

/// A parsed `MigrateChannelTo` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateChannelToEvent {
    pub cid: ChannelId,
    pub new_ledger: Address,
}

/// Channel lifecycle events returned by historical log scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelLogEvent {
    Opened(OpenChannelEvent),
    Settled(ConfirmSettleEvent),
}

/// Live event subscriptions. Implementations deliver events in block order
/// per contract; consumers merge the streams into their own event loops.
pub trait EventMonitor: Send + Sync {
    fn router_updated_events(&self, start_block: u64) -> BoxStream<'static, RouterEvent>;
    fn migrate_channel_to_events(
        &self,
        ledger: Address,
        start_block: u64,
    ) -> BoxStream<'static, MigrateChannelToEvent>;
}
