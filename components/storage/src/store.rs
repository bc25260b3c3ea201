use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use proto::messages::{ChanState, Edge};
use proto::types::{Address, ChannelId, PayId, TokenAddr};

use crate::dal::{
    ChanMigrationRecord, ChannelBalance, ChannelRecord, ChannelStore, MigrationStore,
    MigrationTx, PayRoute, RoutingStore, StoreError,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    /// token -> cid -> edge (the network wide channel graph mirror)
    edges: HashMap<TokenAddr, HashMap<ChannelId, Edge>>,
    /// token -> dest OSP -> next hop cid
    routes: HashMap<TokenAddr, HashMap<Address, ChannelId>>,
    /// token -> client -> access OSP set
    dest_token_osps: HashMap<TokenAddr, HashMap<Address, HashSet<Address>>>,
    /// This node's own channels.
    channels: HashMap<ChannelId, ChannelRecord>,
    /// cid -> to_ledger -> migration record
    migrations: HashMap<ChannelId, HashMap<Address, ChanMigrationRecord>>,
    pay_routes: HashMap<PayId, PayRoute>,
    payment_count: u64,
}

/// The node's data access layer: a single state image guarded by a mutex,
/// optionally bound to a JSON file that is rewritten atomically on every
/// mutation. Mutations are applied to a copy and committed only after the
/// file write succeeds, so a failed write leaves both memory and disk at the
/// previous state.
pub struct Store {
    state: Mutex<StoreState>,
    path: Option<PathBuf>,
}

impl Store {
    pub fn in_memory() -> Store {
        Store {
            state: Mutex::new(StoreState::default()),
            path: None,
        }
    }

    /// Open a file backed store, creating an empty one if the file does not
    /// exist yet.
    pub fn load_or_create(path: PathBuf) -> Result<Store, StoreError> {
        let state = if path.exists() {
            let data = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::Io(format!("{}", e)))?;
            serde_json::from_str(&data).map_err(|e| StoreError::Serialize(format!("{}", e)))?
        } else {
            let state = StoreState::default();
            persist(&path, &state)?;
            state
        };
        Ok(Store {
            state: Mutex::new(state),
            path: Some(path),
        })
    }

    fn read<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&StoreState) -> T,
    {
        let guard = self.state.lock().unwrap();
        f(&guard)
    }

    fn mutate<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreState) -> Result<(), StoreError>,
    {
        let mut guard = self.state.lock().unwrap();
        let mut new_state = guard.clone();
        f(&mut new_state)?;
        if let Some(path) = &self.path {
            persist(path, &new_state)?;
        }
        *guard = new_state;
        Ok(())
    }

    // Admin entry points used by the channel management layer and tests.

    pub fn put_channel(&self, record: ChannelRecord) -> Result<(), StoreError> {
        self.mutate(|state| {
            state.channels.insert(record.cid, record);
            Ok(())
        })
    }

    pub fn set_channel_state(
        &self,
        cid: &ChannelId,
        chan_state: ChanState,
    ) -> Result<(), StoreError> {
        self.mutate(|state| {
            let record = state
                .channels
                .get_mut(cid)
                .ok_or(StoreError::ChannelNotFound)?;
            record.state = chan_state;
            Ok(())
        })
    }

    pub fn put_pay_route(&self, pay_id: PayId, pay_route: PayRoute) -> Result<(), StoreError> {
        self.mutate(|state| {
            state.pay_routes.insert(pay_id, pay_route);
            Ok(())
        })
    }

    pub fn set_payment_count(&self, payment_count: u64) -> Result<(), StoreError> {
        self.mutate(|state| {
            state.payment_count = payment_count;
            Ok(())
        })
    }
}

fn persist(path: &PathBuf, state: &StoreState) -> Result<(), StoreError> {
    let serialized =
        serde_json::to_string(state).map_err(|e| StoreError::Serialize(format!("{}", e)))?;
    let af = atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite);
    af.write(|fw| fw.write_all(serialized.as_bytes()))
        .map_err(|e| StoreError::Io(format!("{}", e)))
}

impl RoutingStore for Store {
    fn get_all_edges(&self) -> Result<HashMap<TokenAddr, HashMap<ChannelId, Edge>>, StoreError> {
        Ok(self.read(|state| state.edges.clone()))
    }

    fn insert_edge(&self, edge: &Edge) -> Result<(), StoreError> {
        let edge = *edge;
        self.mutate(move |state| {
            state
                .edges
                .entry(edge.token)
                .or_insert_with(HashMap::new)
                .insert(edge.cid, edge);
            Ok(())
        })
    }

    fn delete_edge(&self, token: &TokenAddr, cid: &ChannelId) -> Result<(), StoreError> {
        self.mutate(|state| {
            if let Some(token_edges) = state.edges.get_mut(token) {
                token_edges.remove(cid);
                if token_edges.is_empty() {
                    state.edges.remove(token);
                }
            }
            Ok(())
        })
    }

    fn get_all_routing_cids(
        &self,
    ) -> Result<HashMap<TokenAddr, HashMap<Address, ChannelId>>, StoreError> {
        Ok(self.read(|state| state.routes.clone()))
    }

    fn upsert_routing(
        &self,
        dest: &Address,
        token: &TokenAddr,
        cid: &ChannelId,
    ) -> Result<(), StoreError> {
        self.mutate(|state| {
            state
                .routes
                .entry(*token)
                .or_insert_with(HashMap::new)
                .insert(*dest, *cid);
            Ok(())
        })
    }

    fn delete_routing(&self, dest: &Address, token: &TokenAddr) -> Result<(), StoreError> {
        self.mutate(|state| {
            if let Some(token_routes) = state.routes.get_mut(token) {
                token_routes.remove(dest);
                if token_routes.is_empty() {
                    state.routes.remove(token);
                }
            }
            Ok(())
        })
    }

    fn get_all_dest_token_osps(
        &self,
    ) -> Result<HashMap<TokenAddr, HashMap<Address, HashSet<Address>>>, StoreError> {
        Ok(self.read(|state| state.dest_token_osps.clone()))
    }

    fn insert_dest_token(
        &self,
        dest: &Address,
        token: &TokenAddr,
        osps: &HashSet<Address>,
    ) -> Result<(), StoreError> {
        self.update_dest_token_osps(dest, token, osps)
    }

    fn update_dest_token_osps(
        &self,
        dest: &Address,
        token: &TokenAddr,
        osps: &HashSet<Address>,
    ) -> Result<(), StoreError> {
        self.mutate(|state| {
            state
                .dest_token_osps
                .entry(*token)
                .or_insert_with(HashMap::new)
                .insert(*dest, osps.clone());
            Ok(())
        })
    }

    fn delete_dest_token(&self, dest: &Address, token: &TokenAddr) -> Result<(), StoreError> {
        self.mutate(|state| {
            if let Some(token_osps) = state.dest_token_osps.get_mut(token) {
                token_osps.remove(dest);
                if token_osps.is_empty() {
                    state.dest_token_osps.remove(token);
                }
            }
            Ok(())
        })
    }

    fn get_cid_tokens_by_peer(
        &self,
        peer: &Address,
    ) -> Result<Vec<(ChannelId, TokenAddr)>, StoreError> {
        Ok(self.read(|state| {
            let mut cid_tokens = state
                .channels
                .values()
                .filter(|record| record.peer == *peer)
                .map(|record| (record.cid, record.token))
                .collect::<Vec<_>>();
            cid_tokens.sort();
            cid_tokens
        }))
    }
}

impl ChannelStore for Store {
    fn get_cid_by_peer_token(
        &self,
        peer: &Address,
        token: &TokenAddr,
    ) -> Result<Option<ChannelId>, StoreError> {
        Ok(self.read(|state| {
            state
                .channels
                .values()
                .find(|record| record.peer == *peer && record.token == *token)
                .map(|record| record.cid)
        }))
    }

    fn get_chan_peer(&self, cid: &ChannelId) -> Result<Option<Address>, StoreError> {
        Ok(self.read(|state| state.channels.get(cid).map(|record| record.peer)))
    }

    fn get_peer_cids(&self, peer: &Address) -> Result<Vec<ChannelId>, StoreError> {
        Ok(self.read(|state| {
            let mut cids = state
                .channels
                .values()
                .filter(|record| record.peer == *peer)
                .map(|record| record.cid)
                .collect::<Vec<_>>();
            cids.sort();
            cids
        }))
    }

    fn get_chan_for_migration(
        &self,
        cid: &ChannelId,
    ) -> Result<Option<(ChanState, Address)>, StoreError> {
        Ok(self.read(|state| {
            state
                .channels
                .get(cid)
                .map(|record| (record.state, record.ledger))
        }))
    }

    fn get_chan_ledger(&self, cid: &ChannelId) -> Result<Option<Address>, StoreError> {
        Ok(self.read(|state| state.channels.get(cid).map(|record| record.ledger)))
    }

    fn get_all_chan_ledgers(&self) -> Result<Vec<Address>, StoreError> {
        Ok(self.read(|state| {
            let mut ledgers = state
                .channels
                .values()
                .map(|record| record.ledger)
                .collect::<Vec<_>>();
            ledgers.sort();
            ledgers.dedup();
            ledgers
        }))
    }

    fn get_balance(&self, cid: &ChannelId) -> Result<Option<ChannelBalance>, StoreError> {
        Ok(self.read(|state| state.channels.get(cid).map(|record| record.balance)))
    }

    fn count_payments(&self) -> Result<u64, StoreError> {
        Ok(self.read(|state| state.payment_count))
    }

    fn get_dest_token_osps(
        &self,
        dest: &Address,
        token: &TokenAddr,
    ) -> Result<Vec<Address>, StoreError> {
        Ok(self.read(|state| {
            let mut osps = state
                .dest_token_osps
                .get(token)
                .and_then(|token_osps| token_osps.get(dest))
                .map(|osps| osps.iter().cloned().collect::<Vec<_>>())
                .unwrap_or_default();
            osps.sort();
            osps
        }))
    }

    fn get_routing_cid(
        &self,
        dest: &Address,
        token: &TokenAddr,
    ) -> Result<Option<ChannelId>, StoreError> {
        Ok(self.read(|state| {
            state
                .routes
                .get(token)
                .and_then(|token_routes| token_routes.get(dest))
                .cloned()
        }))
    }

    fn get_pay_route(&self, pay_id: &PayId) -> Result<Option<PayRoute>, StoreError> {
        Ok(self.read(|state| state.pay_routes.get(pay_id).cloned()))
    }
}

struct TxView<'a> {
    state: &'a mut StoreState,
}

impl<'a> MigrationTx for TxView<'a> {
    fn get_chan_migration(
        &self,
        cid: &ChannelId,
        to_ledger: &Address,
    ) -> Option<ChanMigrationRecord> {
        self.state
            .migrations
            .get(cid)
            .and_then(|by_ledger| by_ledger.get(to_ledger))
            .cloned()
    }

    fn upsert_chan_migration(
        &mut self,
        cid: &ChannelId,
        to_ledger: &Address,
        record: ChanMigrationRecord,
    ) {
        self.state
            .migrations
            .entry(*cid)
            .or_insert_with(HashMap::new)
            .insert(*to_ledger, record);
    }

    fn delete_chan_migration(&mut self, cid: &ChannelId) {
        self.state.migrations.remove(cid);
    }

    fn update_chan_ledger(
        &mut self,
        cid: &ChannelId,
        ledger: &Address,
    ) -> Result<(), StoreError> {
        let record = self
            .state
            .channels
            .get_mut(cid)
            .ok_or(StoreError::ChannelNotFound)?;
        record.ledger = *ledger;
        Ok(())
    }
}

impl MigrationStore for Store {
    fn get_chan_migration(
        &self,
        cid: &ChannelId,
        to_ledger: &Address,
    ) -> Result<Option<ChanMigrationRecord>, StoreError> {
        Ok(self.read(|state| {
            state
                .migrations
                .get(cid)
                .and_then(|by_ledger| by_ledger.get(to_ledger))
                .cloned()
        }))
    }

    fn transactional(
        &self,
        tx_body: &mut dyn FnMut(&mut dyn MigrationTx) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut guard = self.state.lock().unwrap();
        let mut new_state = guard.clone();
        {
            let mut tx_view = TxView {
                state: &mut new_state,
            };
            tx_body(&mut tx_view)?;
        }
        if let Some(path) = &self.path {
            persist(path, &new_state)?;
        }
        *guard = new_state;
        debug!("store transaction committed");
        Ok(())
    }
}
