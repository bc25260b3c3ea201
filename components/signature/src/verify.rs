use crypto::identity::verify_signature;

use proto::messages::SignedRoutingUpdate;
use proto::migration::ChannelMigrationInfo;
use proto::types::{Address, Signature};

use crate::signature_buff::{channel_migration_signature_buff, routing_update_signature_buff};

/// Verify the origin's signature over a routing update. The claimed origin
/// address is part of the signed payload itself.
pub fn verify_routing_update(signed_update: &SignedRoutingUpdate) -> bool {
    let sbuffer = routing_update_signature_buff(&signed_update.update);
    verify_signature(&signed_update.update.origin, &sbuffer, &signed_update.sig)
}

/// Verify one party's signature over a channel migration payload.
pub fn verify_migration_info(
    migration_info: &ChannelMigrationInfo,
    signer: &Address,
    sig: &Signature,
) -> bool {
    let sbuffer = channel_migration_signature_buff(migration_info);
    verify_signature(signer, &sbuffer, sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crypto::identity::{Signer, SoftwareSecpIdentity};
    use proto::messages::RoutingUpdate;

    #[test]
    fn test_verify_routing_update() {
        let identity = SoftwareSecpIdentity::from_secret_bytes(&[0x31u8; 32]).unwrap();
        let update = RoutingUpdate {
            origin: identity.address(),
            ts: 1000,
            channels: Vec::new(),
        };
        let sig = identity
            .sign_message(&routing_update_signature_buff(&update))
            .unwrap();
        let signed_update = SignedRoutingUpdate {
            update,
            sig,
            ttl: 15,
        };
        assert!(verify_routing_update(&signed_update));

        // Claiming another origin must fail verification.
        let mut forged = signed_update;
        forged.update.origin = Address::from(&[0x07u8; 20]);
        assert!(!verify_routing_update(&forged));
    }
}
