use common::conn::BoxFuture;

use proto::migration::{MigrateChannelRequest, MigrateChannelResponse};
use proto::types::Address;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerClientError {
    PeerUnreachable,
    Remote(String),
}

/// RPC access to channel peers. The transport behind it is external; the
/// processor only needs the migration round trip.
pub trait PeerClient: Send + Sync {
    fn migrate_channel(
        &self,
        peer: &Address,
        request: MigrateChannelRequest,
    ) -> BoxFuture<'_, Result<MigrateChannelResponse, PeerClientError>>;
}
