use serde::{Deserialize, Serialize};

use common::canonical_serialize::CanonicalSerialize;

use crate::types::{Address, ChannelId, Signature, TokenAddr};

/// A payment channel between two participants for one token, as seen by the
/// routing layer. The channel is undirected; `p1`/`p2` carry no ordering
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub p1: Address,
    pub p2: Address,
    pub cid: ChannelId,
    pub token: TokenAddr,
}

/// Lifecycle state of a channel, as recorded in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChanState {
    Opened,
    Settling,
    Closed,
}

/// Self reported free balance on one channel, carried inside a routing
/// update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRoutingInfo {
    pub cid: ChannelId,
    pub balance: u128,
}

impl CanonicalSerialize for ChannelRoutingInfo {
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        res_data.extend_from_slice(&self.cid.canonical_serialize());
        res_data.extend_from_slice(&self.balance.canonical_serialize());
        res_data
    }
}

/// Dynamic routing information originated by one OSP: its channel balances
/// at time `ts`. The signature of the origin covers the canonical
/// serialization of this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingUpdate {
    pub origin: Address,
    pub ts: u64,
    pub channels: Vec<ChannelRoutingInfo>,
}

impl CanonicalSerialize for RoutingUpdate {
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        res_data.extend_from_slice(&self.origin.canonical_serialize());
        res_data.extend_from_slice(&self.ts.canonical_serialize());
        res_data.extend_from_slice(&self.channels.canonical_serialize());
        res_data
    }
}

/// A routing update together with the origin's signature and the remaining
/// hop budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRoutingUpdate {
    pub update: RoutingUpdate,
    pub sig: Signature,
    pub ttl: u64,
}

/// The peer to peer routing broadcast message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRequest {
    pub updates: Vec<SignedRoutingUpdate>,
    /// The direct sender of this message, filled by the forwarding OSP.
    pub sender: Option<Address>,
}
