use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use proto::messages::Edge;
use proto::types::{Address, ChannelId, TokenAddr};

use storage::{RoutingStore, StoreError};

use crate::graph::WeightedGraph;
use crate::utils::unix_now;

#[derive(Debug, Clone, Copy)]
pub struct BuilderConfig {
    /// Seconds after which an OSP or an OSP-OSP edge without a liveness
    /// proof is excluded from route computation.
    pub alive_timeout: u64,
}

#[derive(Debug)]
pub enum BuilderError {
    EdgeNotFound,
    Store(StoreError),
}

impl From<StoreError> for BuilderError {
    fn from(e: StoreError) -> BuilderError {
        BuilderError::Store(e)
    }
}

/// A known router and when it last proved liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OspInfo {
    pub registry_block: u64,
    pub update_time: u64,
}

/// An OSP peer directly channel-connected to this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborInfo {
    pub update_time: u64,
    pub token_cids: HashMap<TokenAddr, ChannelId>,
}

/// Self reported balances on an edge between two OSPs. Only edges refreshed
/// within the alive timeout participate in route computation.
#[derive(Debug, Clone, Copy)]
struct OspEdge {
    balance1: u128,
    balance2: u128,
    update_time: u64,
}

struct GraphState {
    /// token -> cid -> edge
    edges: HashMap<TokenAddr, HashMap<ChannelId, Edge>>,
    osp_edges: HashMap<ChannelId, OspEdge>,
    osps: HashMap<Address, OspInfo>,
    neighbors: HashMap<Address, NeighborInfo>,
}

struct RouteState {
    /// token -> client -> access OSP set, as last persisted.
    access_osps: HashMap<TokenAddr, HashMap<Address, HashSet<Address>>>,
    /// token -> dest OSP -> next hop cid, as last persisted.
    next_hop_cids: HashMap<TokenAddr, HashMap<Address, ChannelId>>,
}

/// Owns the live view of all payment channel edges and incrementally
/// recomputes per token routing tables.
///
/// Locking is striped three ways: `graph_state` (read-mostly topology and
/// liveness), `route_state` (last persisted table snapshots), and
/// `build_lock`, which serializes the whole build pipeline so concurrent
/// builds cannot race on diff computation. Readers always get copies.
pub struct RoutingTableBuilder {
    src_addr: Address,
    store: Arc<dyn RoutingStore>,
    alive_timeout: u64,
    graph_state: RwLock<GraphState>,
    route_state: Mutex<RouteState>,
    build_lock: Mutex<()>,
}

impl RoutingTableBuilder {
    pub fn new(
        src_addr: Address,
        store: Arc<dyn RoutingStore>,
        config: BuilderConfig,
    ) -> Result<RoutingTableBuilder, BuilderError> {
        let edges = store.get_all_edges()?;
        let next_hop_cids = store.get_all_routing_cids()?;
        let access_osps = store.get_all_dest_token_osps()?;
        Ok(RoutingTableBuilder {
            src_addr,
            store,
            alive_timeout: config.alive_timeout,
            graph_state: RwLock::new(GraphState {
                edges,
                osp_edges: HashMap::new(),
                osps: HashMap::new(),
                neighbors: HashMap::new(),
            }),
            route_state: Mutex::new(RouteState {
                access_osps,
                next_hop_cids,
            }),
            build_lock: Mutex::new(()),
        })
    }

    fn is_alive(&self, update_time: u64, now: u64) -> bool {
        update_time + self.alive_timeout > now
    }

    /// The peer of an edge this node participates in, if any.
    fn direct_peer(&self, edge: &Edge) -> Option<Address> {
        if edge.p1 == self.src_addr {
            Some(edge.p2)
        } else if edge.p2 == self.src_addr {
            Some(edge.p1)
        } else {
            None
        }
    }

    /// Persist and record a new channel edge. On storage failure nothing
    /// changes in memory.
    pub fn add_edge(
        &self,
        p1: Address,
        p2: Address,
        cid: ChannelId,
        token: TokenAddr,
    ) -> Result<(), BuilderError> {
        info!("adding edge, cid: {}", cid);
        let edge = Edge { p1, p2, cid, token };
        self.store.insert_edge(&edge)?;

        let now = unix_now();
        let mut graph = self.graph_state.write().unwrap();
        graph
            .edges
            .entry(token)
            .or_insert_with(HashMap::new)
            .insert(cid, edge);
        // A freshly opened channel starts routable; gossip keeps it alive.
        graph.osp_edges.insert(
            cid,
            OspEdge {
                balance1: 0,
                balance2: 0,
                update_time: now,
            },
        );

        if let Some(peer) = self.direct_peer(&edge) {
            if graph.osps.contains_key(&peer) {
                let neighbor = graph
                    .neighbors
                    .entry(peer)
                    .or_insert_with(|| NeighborInfo {
                        update_time: now,
                        token_cids: HashMap::new(),
                    });
                neighbor.token_cids.insert(token, cid);
            }
        }
        Ok(())
    }

    /// Remove a settled channel edge. Errors if the cid is unknown to every
    /// token.
    pub fn remove_edge(&self, cid: ChannelId) -> Result<(), BuilderError> {
        info!("removing edge, cid: {}", cid);
        let mut graph = self.graph_state.write().unwrap();
        let token = graph
            .edges
            .iter()
            .find_map(|(token, token_edges)| {
                if token_edges.contains_key(&cid) {
                    Some(*token)
                } else {
                    None
                }
            })
            .ok_or(BuilderError::EdgeNotFound)?;
        self.store.delete_edge(&token, &cid)?;

        let edge = {
            let token_edges = graph.edges.get_mut(&token).unwrap();
            let edge = token_edges.remove(&cid).unwrap();
            if token_edges.is_empty() {
                graph.edges.remove(&token);
            }
            edge
        };
        graph.osp_edges.remove(&cid);

        if let Some(peer) = self.direct_peer(&edge) {
            let mut prune_neighbor = false;
            if let Some(neighbor) = graph.neighbors.get_mut(&peer) {
                if neighbor.token_cids.get(&token) == Some(&cid) {
                    neighbor.token_cids.remove(&token);
                }
                prune_neighbor = neighbor.token_cids.is_empty();
            }
            if prune_neighbor {
                graph.neighbors.remove(&peer);
            }
        }
        Ok(())
    }

    /// Mark an address as a registered router. Idempotent: an already known
    /// router only gets its registry block and liveness bumped. A newly
    /// seen router also gets its neighbor bookkeeping initialized from
    /// storage, covering channels opened before the peer registered.
    pub fn mark_osp(&self, osp: Address, registry_block: u64) -> Result<(), BuilderError> {
        info!("{} joining as router at block {}", osp, registry_block);
        let now = unix_now();
        let mut graph = self.graph_state.write().unwrap();
        if let Some(info) = graph.osps.get_mut(&osp) {
            info.registry_block = registry_block;
            if now > info.update_time {
                info.update_time = now;
            }
            return Ok(());
        }

        let cid_tokens = self.store.get_cid_tokens_by_peer(&osp)?;
        graph.osps.insert(
            osp,
            OspInfo {
                registry_block,
                update_time: now,
            },
        );
        if !cid_tokens.is_empty() {
            let mut token_cids = HashMap::new();
            for (cid, token) in cid_tokens {
                token_cids.insert(token, cid);
            }
            graph.neighbors.insert(
                osp,
                NeighborInfo {
                    update_time: now,
                    token_cids,
                },
            );
        }
        Ok(())
    }

    /// Drop an address's router status. Its channels stay in the edge map.
    pub fn unmark_osp(&self, osp: &Address) {
        info!("{} leaving as router", osp);
        let mut graph = self.graph_state.write().unwrap();
        graph.osps.remove(osp);
        graph.neighbors.remove(osp);
    }

    pub fn has_osp(&self, osp: &Address) -> bool {
        let graph = self.graph_state.read().unwrap();
        graph.osps.contains_key(osp)
    }

    /// Monotonic liveness bump from a routing broadcast. Out of order
    /// timestamps are ignored. An unknown origin becomes a router with no
    /// registry block; the expiry scan removes it unless the chain
    /// confirms it.
    pub fn keep_osp_alive(&self, osp: Address, ts: u64) {
        let mut graph = self.graph_state.write().unwrap();
        match graph.osps.get_mut(&osp) {
            Some(info) => {
                if ts > info.update_time {
                    info.update_time = ts;
                }
            }
            None => {
                graph.osps.insert(
                    osp,
                    OspInfo {
                        registry_block: 0,
                        update_time: ts,
                    },
                );
            }
        }
    }

    /// Liveness bump for a direct neighbor that just sent us a message.
    pub fn keep_neighbor_alive(&self, osp: &Address) {
        let now = unix_now();
        let mut graph = self.graph_state.write().unwrap();
        if let Some(neighbor) = graph.neighbors.get_mut(osp) {
            if now > neighbor.update_time {
                neighbor.update_time = now;
            }
        }
    }

    /// Apply a gossiped channel balance to the matching OSP edge side.
    pub fn apply_channel_balance(&self, origin: &Address, cid: &ChannelId, balance: u128, ts: u64) {
        let mut graph = self.graph_state.write().unwrap();
        let edge = match graph
            .edges
            .values()
            .find_map(|token_edges| token_edges.get(cid))
        {
            Some(edge) => *edge,
            None => {
                debug!("balance update for unknown cid {}", cid);
                return;
            }
        };
        if let Some(osp_edge) = graph.osp_edges.get_mut(cid) {
            if edge.p1 == *origin {
                osp_edge.balance1 = balance;
            } else if edge.p2 == *origin {
                osp_edge.balance2 = balance;
            } else {
                debug!("balance update from non participant {}", origin);
                return;
            }
            if ts > osp_edge.update_time {
                osp_edge.update_time = ts;
            }
        }
    }

    /// All tokens any edge was ever seen on.
    pub fn get_all_tokens(&self) -> HashSet<TokenAddr> {
        let graph = self.graph_state.read().unwrap();
        graph.edges.keys().cloned().collect()
    }

    pub fn get_all_osps(&self) -> HashMap<Address, OspInfo> {
        let graph = self.graph_state.read().unwrap();
        graph.osps.clone()
    }

    pub fn get_all_neighbors(&self) -> HashMap<Address, NeighborInfo> {
        let graph = self.graph_state.read().unwrap();
        graph.neighbors.clone()
    }

    pub fn get_alive_neighbors(&self) -> HashMap<Address, NeighborInfo> {
        let now = unix_now();
        let graph = self.graph_state.read().unwrap();
        graph
            .neighbors
            .iter()
            .filter(|(_, neighbor)| self.is_alive(neighbor.update_time, now))
            .map(|(addr, neighbor)| (*addr, neighbor.clone()))
            .collect()
    }

    pub fn get_neighbor_addrs(&self) -> Vec<Address> {
        let graph = self.graph_state.read().unwrap();
        graph.neighbors.keys().cloned().collect()
    }

    /// Recompute the routing table for one token and write the changed
    /// entries through to storage.
    ///
    /// Returns `Ok(None)` without computing when this node cannot act as a
    /// relay for the token: no edges, or no live direct neighbor carrying
    /// it. A storage failure on one entry reverts that entry in memory so
    /// the next build retries it; the rest of the batch proceeds.
    pub fn build_table(
        &self,
        token: TokenAddr,
    ) -> Result<Option<HashMap<Address, ChannelId>>, BuilderError> {
        let _build_guard = self.build_lock.lock().unwrap();
        info!("building routing table for token {}", token);
        let now = unix_now();

        // Snapshot the graph under the read lock; compute afterwards.
        let (token_edges, osp_edges, live_osps) = {
            let graph = self.graph_state.read().unwrap();
            let token_edges = match graph.edges.get(&token) {
                Some(token_edges) if !token_edges.is_empty() => token_edges.clone(),
                _ => {
                    debug!("no edges on token {}, skipping build", token);
                    return Ok(None);
                }
            };
            let has_alive_neighbor = graph.neighbors.values().any(|neighbor| {
                self.is_alive(neighbor.update_time, now)
                    && neighbor.token_cids.contains_key(&token)
            });
            if !has_alive_neighbor {
                debug!("no alive neighbor on token {}, skipping build", token);
                return Ok(None);
            }
            let mut live_osps = graph
                .osps
                .iter()
                .filter(|(_, info)| self.is_alive(info.update_time, now))
                .map(|(addr, _)| *addr)
                .collect::<HashSet<_>>();
            live_osps.insert(self.src_addr);
            (token_edges, graph.osp_edges.clone(), live_osps)
        };

        let mut graph = WeightedGraph::new();
        let mut vertex_addrs: HashMap<String, Address> = HashMap::new();
        let mut peer_to_cid: HashMap<Address, ChannelId> = HashMap::new();
        let mut serving_osps: HashMap<Address, HashSet<Address>> = HashMap::new();

        for (cid, edge) in &token_edges {
            // Record direct channels first: table values are next hop cids.
            if let Some(peer) = self.direct_peer(edge) {
                peer_to_cid.insert(peer, *cid);
            }

            let p1_is_osp = live_osps.contains(&edge.p1);
            let p2_is_osp = live_osps.contains(&edge.p2);
            if !p1_is_osp && !p2_is_osp {
                continue;
            }

            if p1_is_osp && p2_is_osp {
                match osp_edges.get(cid) {
                    Some(osp_edge) if self.is_alive(osp_edge.update_time, now) => {
                        debug!(
                            "adding edge {}, reported balances {} / {}",
                            cid, osp_edge.balance1, osp_edge.balance2
                        );
                    }
                    _ => {
                        debug!("edge {} between routers is stale, excluded", cid);
                        continue;
                    }
                }
                let p1_str = edge.p1.to_string();
                let p2_str = edge.p2.to_string();
                vertex_addrs.insert(p1_str.clone(), edge.p1);
                vertex_addrs.insert(p2_str.clone(), edge.p2);
                graph.add_edge(&p1_str, &p2_str, 1);
                graph.add_edge(&p2_str, &p1_str, 1);
            } else if p1_is_osp {
                // p2 is a client served by the OSP p1. The client takes no
                // part in route computation.
                serving_osps
                    .entry(edge.p2)
                    .or_insert_with(HashSet::new)
                    .insert(edge.p1);
                vertex_addrs.insert(edge.p1.to_string(), edge.p1);
                graph.add_vertex(&edge.p1.to_string());
            } else {
                serving_osps
                    .entry(edge.p1)
                    .or_insert_with(HashSet::new)
                    .insert(edge.p2);
                vertex_addrs.insert(edge.p2.to_string(), edge.p2);
                graph.add_vertex(&edge.p2.to_string());
            }
        }

        let (_distances, paths) = graph.dijkstra(&self.src_addr.to_string());

        let mut next_hop_cids: HashMap<Address, ChannelId> = HashMap::new();
        for osp in live_osps.iter().filter(|osp| **osp != self.src_addr) {
            let path = match paths.get(&osp.to_string()) {
                Some(path) if path.len() >= 2 => path,
                _ => {
                    debug!(
                        "no route to {}, could be a natural result of network partition",
                        osp
                    );
                    continue;
                }
            };
            let next_hop = match vertex_addrs.get(&path[1]) {
                Some(next_hop) => *next_hop,
                None => continue,
            };
            match peer_to_cid.get(&next_hop) {
                Some(cid) => {
                    next_hop_cids.insert(*osp, *cid);
                }
                None => warn!("no direct channel to next hop {}", next_hop),
            }
        }

        // Diff against the previous snapshots and only touch changed
        // entries in storage.
        let mut route = self.route_state.lock().unwrap();

        let last_serving = route.access_osps.get(&token).cloned().unwrap_or_default();
        let mut new_serving = serving_osps;
        for (client, osps) in new_serving.clone() {
            match last_serving.get(&client) {
                Some(last_osps) if *last_osps == osps => {}
                Some(last_osps) => {
                    debug!("updating access osps of client {}", client);
                    if let Err(e) = self.store.update_dest_token_osps(&client, &token, &osps) {
                        error!("update access osps of {} err: {:?}", client, e);
                        new_serving.insert(client, last_osps.clone());
                    }
                }
                None => {
                    debug!("inserting access osps of client {}", client);
                    if let Err(e) = self.store.insert_dest_token(&client, &token, &osps) {
                        error!("insert access osps of {} err: {:?}", client, e);
                        new_serving.remove(&client);
                    }
                }
            }
        }
        for (client, last_osps) in &last_serving {
            if new_serving.contains_key(client) {
                continue;
            }
            debug!("deleting access osps of client {}", client);
            if let Err(e) = self.store.delete_dest_token(client, &token) {
                error!("delete access osps of {} err: {:?}", client, e);
                new_serving.insert(*client, last_osps.clone());
            }
        }
        route.access_osps.insert(token, new_serving);

        let last_routes = route.next_hop_cids.get(&token).cloned().unwrap_or_default();
        let mut new_routes = next_hop_cids;
        for (dest, cid) in new_routes.clone() {
            if last_routes.get(&dest) == Some(&cid) {
                continue;
            }
            debug!("adding route to {} on token {}", dest, token);
            if let Err(e) = self.store.upsert_routing(&dest, &token, &cid) {
                error!("upsert routing to {} err: {:?}", dest, e);
                match last_routes.get(&dest) {
                    Some(last_cid) => {
                        new_routes.insert(dest, *last_cid);
                    }
                    None => {
                        new_routes.remove(&dest);
                    }
                }
            }
        }
        for (dest, last_cid) in &last_routes {
            if new_routes.contains_key(dest) {
                continue;
            }
            debug!("deleting route to {} on token {}", dest, token);
            if let Err(e) = self.store.delete_routing(dest, &token) {
                error!("delete routing to {} err: {:?}", dest, e);
                new_routes.insert(*dest, *last_cid);
            }
        }
        route.next_hop_cids.insert(token, new_routes.clone());

        Ok(Some(new_routes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proto::messages::ChanState;
    use storage::{ChannelBalance, ChannelRecord, Store};

    const ALIVE_TIMEOUT: u64 = 600;

    fn addr(byte: u8) -> Address {
        Address::from(&[byte; 20])
    }

    fn cid(byte: u8) -> ChannelId {
        ChannelId::from(&[byte; 32])
    }

    fn new_builder(src: Address) -> RoutingTableBuilder {
        RoutingTableBuilder::new(
            src,
            Arc::new(Store::in_memory()),
            BuilderConfig {
                alive_timeout: ALIVE_TIMEOUT,
            },
        )
        .unwrap()
    }

    /// Record one of this node's own channels, the way the channel
    /// management layer does before the routing layer hears about peers.
    fn put_own_channel(store: &Store, cid: ChannelId, peer: Address, token: TokenAddr) {
        store
            .put_channel(ChannelRecord {
                cid,
                peer,
                token,
                state: ChanState::Opened,
                ledger: addr(0xee),
                balance: ChannelBalance::default(),
            })
            .unwrap();
    }

    /// The five edge topology used across build tests:
    ///
    ///   c1 -- osp1 -- me -- c2
    ///           \
    ///            osp2 -- c3
    struct TestNet {
        me: Address,
        osp1: Address,
        osp2: Address,
        c1: Address,
        c2: Address,
        c3: Address,
        token: TokenAddr,
        builder: RoutingTableBuilder,
    }

    fn build_test_net() -> TestNet {
        let me = Address::from_hex("ba756d65a1a03f07d205749f35e2406e4a8522a1").unwrap();
        let osp1 = Address::from_hex("6a6d2a97da1c453a4e099e8054865a0a59728862").unwrap();
        let osp2 = Address::from_hex("6a6d2a97da1c453a4e099e8054865a0a59728863").unwrap();
        let c1 = Address::from_hex("ba756d65a1a03f07d205749f35e2406e4a8522a3").unwrap();
        let c2 = Address::from_hex("6a6d2a97da1c453a4e099e8054865a0a59728864").unwrap();
        let c3 = Address::from_hex("6a6d2a97da1c453a4e099e8054865a0a59728865").unwrap();
        let token = addr(0x00);

        let store = Arc::new(Store::in_memory());
        // This node's own channels, as the channel layer records them.
        put_own_channel(&store, cid(0x01), osp1, token);
        put_own_channel(&store, cid(0x03), c2, token);

        let builder = RoutingTableBuilder::new(
            me,
            store,
            BuilderConfig {
                alive_timeout: ALIVE_TIMEOUT,
            },
        )
        .unwrap();
        builder.add_edge(me, osp1, cid(0x01), token).unwrap();
        builder.add_edge(c1, osp1, cid(0x02), token).unwrap();
        builder.add_edge(me, c2, cid(0x03), token).unwrap();
        builder.add_edge(osp2, c3, cid(0x04), token).unwrap();
        builder.add_edge(osp2, osp1, cid(0x05), token).unwrap();
        for osp in &[osp1, me, osp2] {
            builder.mark_osp(*osp, 1).unwrap();
        }

        TestNet {
            me,
            osp1,
            osp2,
            c1,
            c2,
            c3,
            token,
            builder,
        }
    }

    fn access_osps_of(
        builder: &RoutingTableBuilder,
        token: &TokenAddr,
    ) -> HashMap<Address, HashSet<Address>> {
        builder
            .store
            .get_all_dest_token_osps()
            .unwrap()
            .get(token)
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn test_basic_routing() {
        let net = build_test_net();
        let rt = net.builder.build_table(net.token).unwrap().unwrap();

        assert_eq!(net.builder.get_all_tokens().len(), 1);
        assert!(net.builder.get_all_tokens().contains(&net.token));

        // Both routers are reached through the direct channel to osp1.
        assert_eq!(rt.len(), 2);
        assert_eq!(rt[&net.osp1], cid(0x01));
        assert_eq!(rt[&net.osp2], cid(0x01));

        let serving = access_osps_of(&net.builder, &net.token);
        assert_eq!(serving.len(), 3);
        assert!(serving[&net.c1].contains(&net.osp1));
        assert!(serving[&net.c2].contains(&net.me));
        assert!(serving[&net.c3].contains(&net.osp2));

        // Stored routing table matches the returned one.
        let stored = net.builder.store.get_all_routing_cids().unwrap();
        assert_eq!(stored[&net.token], rt);
    }

    #[test]
    fn test_rebuild_after_client_edge_removal() {
        let net = build_test_net();
        net.builder.build_table(net.token).unwrap().unwrap();

        // Removing me<->c2: every osp stays reachable, but c2 loses its
        // access OSP.
        net.builder.remove_edge(cid(0x03)).unwrap();
        let rt = net.builder.build_table(net.token).unwrap().unwrap();

        let serving = access_osps_of(&net.builder, &net.token);
        assert_eq!(serving.len(), 2);
        assert!(serving.get(&net.c2).is_none());
        assert!(serving[&net.c1].contains(&net.osp1));
        assert!(serving[&net.c3].contains(&net.osp2));

        assert_eq!(rt.len(), 2);
        assert_eq!(rt[&net.osp1], cid(0x01));
        assert_eq!(rt[&net.osp2], cid(0x01));
    }

    #[test]
    fn test_rebuild_after_osp_edge_removal() {
        let net = build_test_net();
        net.builder.build_table(net.token).unwrap().unwrap();
        net.builder.remove_edge(cid(0x03)).unwrap();
        net.builder.build_table(net.token).unwrap().unwrap();

        // Removing osp1<->osp2 partitions osp2 away.
        net.builder.remove_edge(cid(0x05)).unwrap();
        let rt = net.builder.build_table(net.token).unwrap().unwrap();

        let serving = access_osps_of(&net.builder, &net.token);
        assert_eq!(serving.len(), 2);
        assert!(serving[&net.c1].contains(&net.osp1));
        assert!(serving[&net.c3].contains(&net.osp2));

        assert_eq!(rt.len(), 1);
        assert_eq!(rt[&net.osp1], cid(0x01));

        let stored = net.builder.store.get_all_routing_cids().unwrap();
        assert_eq!(stored[&net.token], rt);
    }

    #[test]
    fn test_add_then_remove_edge_restores_state() {
        let me = addr(0x0a);
        let osp1 = addr(0x0b);
        let builder = new_builder(me);
        builder.mark_osp(osp1, 1).unwrap();

        let tokens_before = builder.get_all_tokens();
        let neighbors_before = builder.get_all_neighbors();
        let edges_before = builder.store.get_all_edges().unwrap();

        builder.add_edge(me, osp1, cid(0x01), addr(0x00)).unwrap();
        builder.remove_edge(cid(0x01)).unwrap();

        assert_eq!(builder.get_all_tokens(), tokens_before);
        assert_eq!(builder.get_all_neighbors(), neighbors_before);
        assert_eq!(builder.store.get_all_edges().unwrap(), edges_before);
    }

    #[test]
    fn test_remove_unknown_edge_errors() {
        let builder = new_builder(addr(0x0a));
        match builder.remove_edge(cid(0x42)) {
            Err(BuilderError::EdgeNotFound) => {}
            other => panic!("expected EdgeNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_add_edge_repairs_neighbor_tokens() {
        let me = addr(0x0a);
        let osp1 = addr(0x0b);
        let token = addr(0x00);
        let builder = new_builder(me);

        // Peer becomes a router before any channel exists.
        builder.mark_osp(osp1, 1).unwrap();
        assert!(builder.get_all_neighbors().is_empty());

        builder.add_edge(me, osp1, cid(0x01), token).unwrap();
        let neighbors = builder.get_all_neighbors();
        assert_eq!(neighbors[&osp1].token_cids[&token], cid(0x01));
    }

    #[test]
    fn test_mark_osp_initializes_neighbor_from_storage() {
        let me = addr(0x0a);
        let osp1 = addr(0x0b);
        let token = addr(0x00);

        let store = Arc::new(Store::in_memory());
        put_own_channel(&store, cid(0x01), osp1, token);

        let builder = RoutingTableBuilder::new(
            me,
            store,
            BuilderConfig {
                alive_timeout: ALIVE_TIMEOUT,
            },
        )
        .unwrap();

        // The channel predates the router registration; marking must pick
        // it up from storage.
        builder.mark_osp(osp1, 1).unwrap();
        let neighbors = builder.get_all_neighbors();
        assert_eq!(neighbors[&osp1].token_cids[&token], cid(0x01));
    }

    #[test]
    fn test_build_skips_without_edges_or_neighbors() {
        let me = addr(0x0a);
        let builder = new_builder(me);
        assert!(builder.build_table(addr(0x00)).unwrap().is_none());

        // An edge not involving any alive neighbor still skips the build.
        builder
            .add_edge(addr(0x01), addr(0x02), cid(0x01), addr(0x00))
            .unwrap();
        assert!(builder.build_table(addr(0x00)).unwrap().is_none());
    }

    #[test]
    fn test_keep_osp_alive_is_monotonic() {
        let builder = new_builder(addr(0x0a));
        let osp = addr(0x0b);
        builder.keep_osp_alive(osp, 2000);
        builder.keep_osp_alive(osp, 1000);
        assert_eq!(builder.get_all_osps()[&osp].update_time, 2000);
        builder.keep_osp_alive(osp, 3000);
        assert_eq!(builder.get_all_osps()[&osp].update_time, 3000);
        // Gossip created routers carry no registry block.
        assert_eq!(builder.get_all_osps()[&osp].registry_block, 0);
    }

    #[test]
    fn test_unmark_osp_keeps_edges() {
        let net = build_test_net();
        net.builder.unmark_osp(&net.osp2);
        assert!(!net.builder.has_osp(&net.osp2));
        assert!(net.builder.get_all_neighbors().get(&net.osp2).is_none());
        // The edges are still tracked for the token.
        assert_eq!(net.builder.get_all_tokens().len(), 1);

        let rt = net.builder.build_table(net.token).unwrap().unwrap();
        // osp2 is no longer a routing destination, and its client edge now
        // counts osp2 as a plain client of osp1.
        assert_eq!(rt.len(), 1);
        assert_eq!(rt[&net.osp1], cid(0x01));
    }

    /// A store wrapper that fails routing upserts for chosen destinations.
    struct FlakyStore {
        inner: Arc<Store>,
        fail_dests: Mutex<HashSet<Address>>,
    }

    impl RoutingStore for FlakyStore {
        fn get_all_edges(
            &self,
        ) -> Result<HashMap<TokenAddr, HashMap<ChannelId, Edge>>, StoreError> {
            self.inner.get_all_edges()
        }
        fn insert_edge(&self, edge: &Edge) -> Result<(), StoreError> {
            self.inner.insert_edge(edge)
        }
        fn delete_edge(&self, token: &TokenAddr, cid: &ChannelId) -> Result<(), StoreError> {
            self.inner.delete_edge(token, cid)
        }
        fn get_all_routing_cids(
            &self,
        ) -> Result<HashMap<TokenAddr, HashMap<Address, ChannelId>>, StoreError> {
            self.inner.get_all_routing_cids()
        }
        fn upsert_routing(
            &self,
            dest: &Address,
            token: &TokenAddr,
            cid: &ChannelId,
        ) -> Result<(), StoreError> {
            if self.fail_dests.lock().unwrap().contains(dest) {
                return Err(StoreError::Io("injected failure".to_owned()));
            }
            self.inner.upsert_routing(dest, token, cid)
        }
        fn delete_routing(&self, dest: &Address, token: &TokenAddr) -> Result<(), StoreError> {
            self.inner.delete_routing(dest, token)
        }
        fn get_all_dest_token_osps(
            &self,
        ) -> Result<HashMap<TokenAddr, HashMap<Address, HashSet<Address>>>, StoreError> {
            self.inner.get_all_dest_token_osps()
        }
        fn insert_dest_token(
            &self,
            dest: &Address,
            token: &TokenAddr,
            osps: &HashSet<Address>,
        ) -> Result<(), StoreError> {
            self.inner.insert_dest_token(dest, token, osps)
        }
        fn update_dest_token_osps(
            &self,
            dest: &Address,
            token: &TokenAddr,
            osps: &HashSet<Address>,
        ) -> Result<(), StoreError> {
            self.inner.update_dest_token_osps(dest, token, osps)
        }
        fn delete_dest_token(&self, dest: &Address, token: &TokenAddr) -> Result<(), StoreError> {
            self.inner.delete_dest_token(dest, token)
        }
        fn get_cid_tokens_by_peer(
            &self,
            peer: &Address,
        ) -> Result<Vec<(ChannelId, TokenAddr)>, StoreError> {
            self.inner.get_cid_tokens_by_peer(peer)
        }
    }

    #[test]
    fn test_build_reverts_entry_on_storage_failure() {
        let me = addr(0x0a);
        let osp1 = addr(0x0b);
        let osp2 = addr(0x0c);
        let token = addr(0x00);

        let inner = Arc::new(Store::in_memory());
        put_own_channel(&inner, cid(0x01), osp1, token);
        let flaky = Arc::new(FlakyStore {
            inner,
            fail_dests: Mutex::new(HashSet::new()),
        });
        let builder = RoutingTableBuilder::new(
            me,
            flaky.clone(),
            BuilderConfig {
                alive_timeout: ALIVE_TIMEOUT,
            },
        )
        .unwrap();
        builder.add_edge(me, osp1, cid(0x01), token).unwrap();
        builder.add_edge(osp1, osp2, cid(0x02), token).unwrap();
        for osp in &[me, osp1, osp2] {
            builder.mark_osp(*osp, 1).unwrap();
        }

        flaky.fail_dests.lock().unwrap().insert(osp2);
        let rt = builder.build_table(token).unwrap().unwrap();
        // The failed entry is dropped from memory so it stays consistent
        // with storage; the healthy entry persists.
        assert_eq!(rt.len(), 1);
        assert_eq!(rt[&osp1], cid(0x01));
        let stored = flaky.get_all_routing_cids().unwrap();
        assert!(stored[&token].get(&osp2).is_none());

        // Once storage recovers, the next build fills the gap.
        flaky.fail_dests.lock().unwrap().clear();
        let rt = builder.build_table(token).unwrap().unwrap();
        assert_eq!(rt.len(), 2);
        assert_eq!(rt[&osp2], cid(0x01));
        let stored = flaky.get_all_routing_cids().unwrap();
        assert_eq!(stored[&token][&osp2], cid(0x01));
    }
}
