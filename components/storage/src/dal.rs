use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use proto::messages::{ChanState, Edge};
use proto::migration::{ChannelMigrationRequest, MigrationState};
use proto::types::{Address, ChannelId, PayId, TokenAddr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    ChannelNotFound,
    Serialize(String),
    Io(String),
}

/// Free balances of one channel, from this node's point of view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBalance {
    pub my_free: u128,
    pub peer_free: u128,
}

/// One of this node's own channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub cid: ChannelId,
    pub peer: Address,
    pub token: TokenAddr,
    pub state: ChanState,
    /// The ledger contract currently backing this channel.
    pub ledger: Address,
    pub balance: ChannelBalance,
}

/// A stored channel migration agreement, keyed by `(cid, to_ledger)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChanMigrationRecord {
    pub deadline: u64,
    pub state: MigrationState,
    pub onchain_request: ChannelMigrationRequest,
}

/// Ingress/egress channels recorded per payment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayRoute {
    pub ingress: Option<ChannelId>,
    pub egress: Option<ChannelId>,
}

/// Persistence contract of the routing table builder. All writes become
/// durable before the corresponding in-memory state is considered
/// authoritative.
pub trait RoutingStore: Send + Sync {
    fn get_all_edges(&self) -> Result<HashMap<TokenAddr, HashMap<ChannelId, Edge>>, StoreError>;
    fn insert_edge(&self, edge: &Edge) -> Result<(), StoreError>;
    fn delete_edge(&self, token: &TokenAddr, cid: &ChannelId) -> Result<(), StoreError>;

    /// token -> dest OSP -> next hop cid
    fn get_all_routing_cids(
        &self,
    ) -> Result<HashMap<TokenAddr, HashMap<Address, ChannelId>>, StoreError>;
    fn upsert_routing(
        &self,
        dest: &Address,
        token: &TokenAddr,
        cid: &ChannelId,
    ) -> Result<(), StoreError>;
    fn delete_routing(&self, dest: &Address, token: &TokenAddr) -> Result<(), StoreError>;

    /// token -> client -> access OSP set
    fn get_all_dest_token_osps(
        &self,
    ) -> Result<HashMap<TokenAddr, HashMap<Address, HashSet<Address>>>, StoreError>;
    fn insert_dest_token(
        &self,
        dest: &Address,
        token: &TokenAddr,
        osps: &HashSet<Address>,
    ) -> Result<(), StoreError>;
    fn update_dest_token_osps(
        &self,
        dest: &Address,
        token: &TokenAddr,
        osps: &HashSet<Address>,
    ) -> Result<(), StoreError>;
    fn delete_dest_token(&self, dest: &Address, token: &TokenAddr) -> Result<(), StoreError>;

    /// Channels this node has directly open with `peer`.
    fn get_cid_tokens_by_peer(
        &self,
        peer: &Address,
    ) -> Result<Vec<(ChannelId, TokenAddr)>, StoreError>;
}

/// Read access to this node's own channel, payment and routing records.
pub trait ChannelStore: Send + Sync {
    fn get_cid_by_peer_token(
        &self,
        peer: &Address,
        token: &TokenAddr,
    ) -> Result<Option<ChannelId>, StoreError>;
    fn get_chan_peer(&self, cid: &ChannelId) -> Result<Option<Address>, StoreError>;
    fn get_peer_cids(&self, peer: &Address) -> Result<Vec<ChannelId>, StoreError>;
    fn get_chan_for_migration(
        &self,
        cid: &ChannelId,
    ) -> Result<Option<(ChanState, Address)>, StoreError>;
    fn get_chan_ledger(&self, cid: &ChannelId) -> Result<Option<Address>, StoreError>;
    fn get_all_chan_ledgers(&self) -> Result<Vec<Address>, StoreError>;
    fn get_balance(&self, cid: &ChannelId) -> Result<Option<ChannelBalance>, StoreError>;
    fn count_payments(&self) -> Result<u64, StoreError>;

    fn get_dest_token_osps(
        &self,
        dest: &Address,
        token: &TokenAddr,
    ) -> Result<Vec<Address>, StoreError>;
    fn get_routing_cid(
        &self,
        dest: &Address,
        token: &TokenAddr,
    ) -> Result<Option<ChannelId>, StoreError>;

    fn get_pay_route(&self, pay_id: &PayId) -> Result<Option<PayRoute>, StoreError>;
}

/// Mutations available inside a migration transaction. The whole closure
/// commits atomically or not at all.
pub trait MigrationTx {
    fn get_chan_migration(
        &self,
        cid: &ChannelId,
        to_ledger: &Address,
    ) -> Option<ChanMigrationRecord>;
    fn upsert_chan_migration(
        &mut self,
        cid: &ChannelId,
        to_ledger: &Address,
        record: ChanMigrationRecord,
    );
    fn delete_chan_migration(&mut self, cid: &ChannelId);
    fn update_chan_ledger(&mut self, cid: &ChannelId, ledger: &Address)
        -> Result<(), StoreError>;
}

pub trait MigrationStore: Send + Sync {
    fn get_chan_migration(
        &self,
        cid: &ChannelId,
        to_ledger: &Address,
    ) -> Result<Option<ChanMigrationRecord>, StoreError>;

    fn transactional(
        &self,
        tx_body: &mut dyn FnMut(&mut dyn MigrationTx) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
}
