use common::canonical_serialize::CanonicalSerialize;

use crypto::hash::keccak256;

use proto::messages::RoutingUpdate;
use proto::migration::ChannelMigrationInfo;

pub const ROUTING_UPDATE_PREFIX: &[u8] = b"ROUTING_UPDATE";
pub const CHAN_MIGRATION_PREFIX: &[u8] = b"CHANNEL_MIGRATION";

/// The buffer an OSP signs when broadcasting its dynamic routing info.
/// The hashed prefix separates the signing domains of the protocol.
pub fn routing_update_signature_buff(update: &RoutingUpdate) -> Vec<u8> {
    let mut sbuffer = Vec::new();
    sbuffer.extend_from_slice(&keccak256(ROUTING_UPDATE_PREFIX));
    sbuffer.extend_from_slice(&update.canonical_serialize());
    sbuffer
}

/// The buffer both channel peers sign when agreeing on a ledger migration.
pub fn channel_migration_signature_buff(migration_info: &ChannelMigrationInfo) -> Vec<u8> {
    let mut sbuffer = Vec::new();
    sbuffer.extend_from_slice(&keccak256(CHAN_MIGRATION_PREFIX));
    sbuffer.extend_from_slice(&migration_info.canonical_serialize());
    sbuffer
}

#[cfg(test)]
mod tests {
    use super::*;

    use proto::types::{Address, ChannelId};

    #[test]
    fn test_signing_domains_are_separated() {
        let update = RoutingUpdate {
            origin: Address::from(&[0x01u8; 20]),
            ts: 7,
            channels: Vec::new(),
        };
        let migration_info = ChannelMigrationInfo {
            channel_id: ChannelId::from(&[0x02u8; 32]),
            from_ledger: Address::from(&[0x03u8; 20]),
            to_ledger: Address::from(&[0x04u8; 20]),
            migration_deadline: 7,
        };
        let routing_buff = routing_update_signature_buff(&update);
        let migration_buff = channel_migration_signature_buff(&migration_info);
        assert_ne!(routing_buff[..32], migration_buff[..32]);
    }
}
