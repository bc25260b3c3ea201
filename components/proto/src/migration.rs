use serde::{Deserialize, Serialize};

use common::canonical_serialize::CanonicalSerialize;

use crate::types::{Address, ChannelId, Signature};

/// The payload both channel peers sign when agreeing to move a channel to a
/// new ledger contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMigrationInfo {
    pub channel_id: ChannelId,
    pub from_ledger: Address,
    pub to_ledger: Address,
    /// Block number after which the signed request is no longer submittable.
    pub migration_deadline: u64,
}

impl CanonicalSerialize for ChannelMigrationInfo {
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        res_data.extend_from_slice(&self.channel_id.canonical_serialize());
        res_data.extend_from_slice(&self.from_ledger.canonical_serialize());
        res_data.extend_from_slice(&self.to_ledger.canonical_serialize());
        res_data.extend_from_slice(&self.migration_deadline.canonical_serialize());
        res_data
    }
}

/// State of a locally stored migration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationState {
    Initialized,
    Submitted,
}

/// Peer RPC: ask the channel peer to co-sign a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateChannelRequest {
    pub migration_info: ChannelMigrationInfo,
    pub requester_sig: Signature,
}

/// Peer RPC response carrying the approver's signature over the same
/// migration info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateChannelResponse {
    pub approver_sig: Signature,
}

/// The fully signed request submittable on-chain. Signatures are ordered by
/// ascending signer address, independent of who initiated the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMigrationRequest {
    pub migration_info: ChannelMigrationInfo,
    pub sigs: Vec<Signature>,
}
