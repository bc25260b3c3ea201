use std::sync::Arc;

use proto::types::{Address, ChannelId, PayId, TokenAddr};
use storage::{ChannelStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// Always route through the fixed gateway OSP.
    Gateway(Address),
    /// Multi-hop routing over the computed tables.
    ServiceProvider,
}

#[derive(Debug, Clone, Copy)]
pub struct ForwarderConfig {
    pub policy: RoutingPolicy,
    /// Access OSP of last resort when every lookup misses.
    pub default_route: Option<Address>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RouteLookupError {
    RouteNotFound,
    PeerNotFound,
    PayNotFound,
    PayNoIngress,
    PayNoEgress,
    Store(StoreError),
}

impl From<StoreError> for RouteLookupError {
    fn from(e: StoreError) -> RouteLookupError {
        RouteLookupError::Store(e)
    }
}

/// The read path of routing: answers "which channel does this payment leave
/// through" from the tables the builder maintains.
pub struct Forwarder {
    config: ForwarderConfig,
    store: Arc<dyn ChannelStore>,
}

impl Forwarder {
    pub fn new(config: ForwarderConfig, store: Arc<dyn ChannelStore>) -> Forwarder {
        Forwarder { config, store }
    }

    pub fn lookup_next_channel_on_token(
        &self,
        dest: &Address,
        token: &TokenAddr,
    ) -> Result<(ChannelId, Address), RouteLookupError> {
        let gateway_osp = match self.config.policy {
            RoutingPolicy::Gateway(gateway_osp) => Some(gateway_osp),
            RoutingPolicy::ServiceProvider => None,
        };
        if let Some(gateway_osp) = gateway_osp {
            let cid = self
                .store
                .get_cid_by_peer_token(&gateway_osp, token)?
                .ok_or(RouteLookupError::RouteNotFound)?;
            return self.cid_and_peer(cid);
        }

        // Direct channel with the destination wins.
        if let Some(cid) = self.store.get_cid_by_peer_token(dest, token)? {
            return self.cid_and_peer(cid);
        }

        // Two-step lookup: an access OSP of the destination, then the
        // route towards it.
        for osp in self.store.get_dest_token_osps(dest, token)? {
            if let Some(cid) = self.store.get_routing_cid(&osp, token)? {
                return self.cid_and_peer(cid);
            }
        }

        // The destination may be an OSP itself, without access OSPs.
        if let Some(cid) = self.store.get_routing_cid(dest, token)? {
            return self.cid_and_peer(cid);
        }

        if let Some(default_route) = self.config.default_route {
            if let Some(cid) = self.store.get_routing_cid(&default_route, token)? {
                return self.cid_and_peer(cid);
            }
            if let Some(cid) = self.store.get_cid_by_peer_token(&default_route, token)? {
                return self.cid_and_peer(cid);
            }
        }

        Err(RouteLookupError::RouteNotFound)
    }

    pub fn lookup_ingress_channel_on_pay(
        &self,
        pay_id: &PayId,
    ) -> Result<(ChannelId, Address), RouteLookupError> {
        let pay_route = self
            .store
            .get_pay_route(pay_id)?
            .ok_or(RouteLookupError::PayNotFound)?;
        let cid = pay_route.ingress.ok_or(RouteLookupError::PayNoIngress)?;
        self.cid_and_peer(cid)
    }

    pub fn lookup_egress_channel_on_pay(
        &self,
        pay_id: &PayId,
    ) -> Result<(ChannelId, Address), RouteLookupError> {
        let pay_route = self
            .store
            .get_pay_route(pay_id)?
            .ok_or(RouteLookupError::PayNotFound)?;
        let cid = pay_route.egress.ok_or(RouteLookupError::PayNoEgress)?;
        self.cid_and_peer(cid)
    }

    fn cid_and_peer(&self, cid: ChannelId) -> Result<(ChannelId, Address), RouteLookupError> {
        let peer = self
            .store
            .get_chan_peer(&cid)?
            .ok_or(RouteLookupError::PeerNotFound)?;
        Ok((cid, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proto::messages::ChanState;
    use storage::{ChannelBalance, ChannelRecord, PayRoute, RoutingStore, Store};

    fn addr(byte: u8) -> Address {
        Address::from(&[byte; 20])
    }

    fn cid(byte: u8) -> ChannelId {
        ChannelId::from(&[byte; 32])
    }

    fn put_channel(store: &Store, cid_byte: u8, peer: Address, token: TokenAddr) {
        store
            .put_channel(ChannelRecord {
                cid: cid(cid_byte),
                peer,
                token,
                state: ChanState::Opened,
                ledger: addr(0xee),
                balance: ChannelBalance::default(),
            })
            .unwrap();
    }

    fn service_provider_forwarder(store: Arc<Store>, default_route: Option<Address>) -> Forwarder {
        Forwarder::new(
            ForwarderConfig {
                policy: RoutingPolicy::ServiceProvider,
                default_route,
            },
            store,
        )
    }

    #[test]
    fn test_direct_channel_wins() {
        let store = Arc::new(Store::in_memory());
        let dest = addr(0x02);
        let token = addr(0x00);
        put_channel(&store, 0x01, dest, token);

        let forwarder = service_provider_forwarder(store, None);
        assert_eq!(
            forwarder.lookup_next_channel_on_token(&dest, &token).unwrap(),
            (cid(0x01), dest)
        );
    }

    #[test]
    fn test_two_step_lookup_through_access_osp() {
        let store = Arc::new(Store::in_memory());
        let token = addr(0x00);
        let client = addr(0x05);
        let osp = addr(0x06);
        let next_hop_peer = addr(0x07);

        // Route to the access OSP goes out through the channel with
        // next_hop_peer.
        put_channel(&store, 0x01, next_hop_peer, token);
        let mut osps = std::collections::HashSet::new();
        osps.insert(osp);
        store.insert_dest_token(&client, &token, &osps).unwrap();
        store.upsert_routing(&osp, &token, &cid(0x01)).unwrap();

        let forwarder = service_provider_forwarder(store, None);
        assert_eq!(
            forwarder
                .lookup_next_channel_on_token(&client, &token)
                .unwrap(),
            (cid(0x01), next_hop_peer)
        );
    }

    #[test]
    fn test_dest_as_osp_lookup() {
        let store = Arc::new(Store::in_memory());
        let token = addr(0x00);
        let dest_osp = addr(0x06);
        let next_hop_peer = addr(0x07);

        put_channel(&store, 0x01, next_hop_peer, token);
        store.upsert_routing(&dest_osp, &token, &cid(0x01)).unwrap();

        let forwarder = service_provider_forwarder(store, None);
        assert_eq!(
            forwarder
                .lookup_next_channel_on_token(&dest_osp, &token)
                .unwrap(),
            (cid(0x01), next_hop_peer)
        );
    }

    #[test]
    fn test_default_route_fallback() {
        let store = Arc::new(Store::in_memory());
        let token = addr(0x00);
        let default_osp = addr(0x09);
        put_channel(&store, 0x01, default_osp, token);

        let forwarder = service_provider_forwarder(store, Some(default_osp));
        // Unknown destination falls back to the direct channel with the
        // default route OSP.
        assert_eq!(
            forwarder
                .lookup_next_channel_on_token(&addr(0x55), &token)
                .unwrap(),
            (cid(0x01), default_osp)
        );
    }

    #[test]
    fn test_route_not_found() {
        let store = Arc::new(Store::in_memory());
        let forwarder = service_provider_forwarder(store, None);
        assert_eq!(
            forwarder.lookup_next_channel_on_token(&addr(0x55), &addr(0x00)),
            Err(RouteLookupError::RouteNotFound)
        );
    }

    #[test]
    fn test_gateway_policy_always_uses_gateway() {
        let store = Arc::new(Store::in_memory());
        let token = addr(0x00);
        let gateway = addr(0x03);
        let dest = addr(0x02);
        // Even with a direct channel to dest, gateway policy goes through
        // the gateway.
        put_channel(&store, 0x01, dest, token);
        put_channel(&store, 0x02, gateway, token);

        let forwarder = Forwarder::new(
            ForwarderConfig {
                policy: RoutingPolicy::Gateway(gateway),
                default_route: None,
            },
            store,
        );
        assert_eq!(
            forwarder.lookup_next_channel_on_token(&dest, &token).unwrap(),
            (cid(0x02), gateway)
        );
    }

    #[test]
    fn test_pay_lookups() {
        let store = Arc::new(Store::in_memory());
        let token = addr(0x00);
        let peer = addr(0x02);
        put_channel(&store, 0x01, peer, token);

        let pay_id = PayId::from(&[0x0cu8; 32]);
        store
            .put_pay_route(
                pay_id,
                PayRoute {
                    ingress: Some(cid(0x01)),
                    egress: None,
                },
            )
            .unwrap();

        let forwarder = service_provider_forwarder(store, None);
        assert_eq!(
            forwarder.lookup_ingress_channel_on_pay(&pay_id).unwrap(),
            (cid(0x01), peer)
        );
        assert_eq!(
            forwarder.lookup_egress_channel_on_pay(&pay_id),
            Err(RouteLookupError::PayNoEgress)
        );
        assert_eq!(
            forwarder.lookup_ingress_channel_on_pay(&PayId::from(&[0x0du8; 32])),
            Err(RouteLookupError::PayNotFound)
        );
    }
}
