use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream;
use futures::task::{Spawn, SpawnExt};
use futures::{Stream, StreamExt};

use chain::{
    delay_ticks, wait_tx_mined, ChainError, ChainReader, EventMonitor, LedgerLogScanner,
    RouterEvent, RouterOp, RouterRegistry, WaitConfig,
};
use crypto::Signer;
use proto::messages::{ChannelRoutingInfo, RoutingRequest, RoutingUpdate, SignedRoutingUpdate};
use proto::report::{OspReport, PeerBalances, StdOpenChanConfig};
use proto::types::{Address, ChannelId, TokenAddr, TxHash};
use signature::signature_buff::routing_update_signature_buff;
use signature::verify::verify_routing_update;
use storage::ChannelStore;
use timer::TimerTick;

use crate::builder::{BuilderError, NeighborInfo, RoutingTableBuilder};
use crate::explorer::{ExplorerClient, ExplorerReportBody};
use crate::recover::{recover_routing_table, RecoverError};
use crate::utils::unix_now;

/// Estimation of block numbers during one week, fluctuation tolerant.
pub const EXPIRE_INTERVAL_BLOCK: u64 = 46_500;
/// Registration age above which a starting OSP refreshes itself on-chain.
pub const REFRESH_THRESHOLD: u64 = 10_000;
/// Hop budget of routing broadcasts.
pub const ROUTE_TTL: u64 = 15;

const TX_POLL_INTERVAL: Duration = Duration::from_secs(15);
const TX_WAIT_TIMEOUT_TICKS: usize = 240;

pub type BcastSendCallback = Arc<dyn Fn(RoutingRequest, Vec<Address>) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Seconds before a silent OSP or OSP edge stops being routable.
    pub alive_timeout: u64,
    pub expire_interval_block: u64,
    pub refresh_threshold: u64,
    pub route_ttl: u64,
    /// Confirmation depth awaited on own registry transactions.
    pub tx_block_delay: u64,
    /// Identity fields of the explorer report.
    pub rpc_host: String,
    pub open_accept: bool,
    pub std_open_chan_configs: Vec<StdOpenChanConfig>,
}

impl Default for ControllerConfig {
    fn default() -> ControllerConfig {
        ControllerConfig {
            alive_timeout: 600,
            expire_interval_block: EXPIRE_INTERVAL_BLOCK,
            refresh_threshold: REFRESH_THRESHOLD,
            route_ttl: ROUTE_TTL,
            tx_block_delay: 2,
            rpc_host: String::new(),
            open_accept: true,
            std_open_chan_configs: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum ControllerError {
    Chain(ChainError),
    Builder(BuilderError),
}

#[derive(Debug, PartialEq, Eq)]
pub enum RoutingMsgError {
    /// Batched updates are not supported; exactly one per request.
    InvalidUpdateCount(usize),
    InvalidSignature(Address),
}

enum ControllerEvent {
    RouterUpdated(RouterEvent),
    ScanTick,
    RefreshTick,
    BcastTick,
    BuildTick,
    ReportTick,
}

/// The event driven orchestrator around [`RoutingTableBuilder`]: consumes
/// router registry events and peer broadcasts, runs the periodic jobs, and
/// reports topology to the explorer.
pub struct Controller<S> {
    src_addr: Address,
    registry: Arc<dyn RouterRegistry>,
    chain: Arc<dyn ChainReader>,
    monitor: Arc<dyn EventMonitor>,
    chan_store: Arc<dyn ChannelStore>,
    signer: Arc<dyn Signer>,
    bcast_send: BcastSendCallback,
    explorer: Option<Arc<dyn ExplorerClient>>,
    builder: RoutingTableBuilder,
    /// Dynamic routing updates from OSPs are gathered here, then folded
    /// into the next table recomputation.
    routing_batch: Mutex<HashMap<Address, RoutingUpdate>>,
    config: ControllerConfig,
    spawner: S,
}

impl<S> Controller<S>
where
    S: Spawn + Send + Sync,
{
    pub fn new(
        src_addr: Address,
        registry: Arc<dyn RouterRegistry>,
        chain: Arc<dyn ChainReader>,
        monitor: Arc<dyn EventMonitor>,
        chan_store: Arc<dyn ChannelStore>,
        signer: Arc<dyn Signer>,
        bcast_send: BcastSendCallback,
        explorer: Option<Arc<dyn ExplorerClient>>,
        builder: RoutingTableBuilder,
        config: ControllerConfig,
        spawner: S,
    ) -> Controller<S> {
        Controller {
            src_addr,
            registry,
            chain,
            monitor,
            chan_store,
            signer,
            bcast_send,
            explorer,
            builder,
            routing_batch: Mutex::new(HashMap::new()),
            config,
            spawner,
        }
    }

    /// Bootstrap the routing graph from a snapshot blob plus an on-chain
    /// log backfill. A no-op unless the builder starts from scratch.
    pub async fn recover(
        &self,
        routing_data: &[u8],
        scanner: &dyn LedgerLogScanner,
    ) -> Result<(), RecoverError> {
        let current_block = self
            .chain
            .current_block_number()
            .await
            .map_err(RecoverError::Chain)?;
        recover_routing_table(current_block, routing_data, scanner, &self.builder).await
    }

    /// Instantiate this OSP as a router and drive it until every event
    /// source ends. A node that was never registered on-chain stays a leaf
    /// client and returns immediately.
    pub async fn run<TS>(
        &self,
        scan_ticks: TS,
        refresh_ticks: TS,
        bcast_ticks: TS,
        build_ticks: TS,
        report_ticks: TS,
    ) -> Result<(), ControllerError>
    where
        TS: Stream<Item = TimerTick> + Send + Unpin + 'static,
    {
        let registry_block = match self.registry.router_info(&self.src_addr).await {
            Ok(registry_block) => registry_block,
            Err(e) => {
                // The node keeps operating as a leaf client.
                error!("query router registry err: {:?}", e);
                return Ok(());
            }
        };
        if registry_block == 0 {
            warn!(
                "NOT able to join the OSP network because this node is \
                 not registered on-chain as a router"
            );
            return Ok(());
        }
        info!("router registered / refreshed at block {}", registry_block);

        let current_block = self
            .chain
            .current_block_number()
            .await
            .map_err(ControllerError::Chain)?;
        if current_block.saturating_sub(registry_block) > self.config.refresh_threshold {
            self.refresh_router_registry().await;
        }

        // Backtrack one expiry interval so a restart re-learns the whole
        // active router set.
        let start_block = current_block.saturating_sub(self.config.expire_interval_block);
        let router_events = self.monitor.router_updated_events(start_block);

        let mut events = stream::select_all(vec![
            router_events.map(ControllerEvent::RouterUpdated).boxed(),
            scan_ticks.map(|_| ControllerEvent::ScanTick).boxed(),
            refresh_ticks.map(|_| ControllerEvent::RefreshTick).boxed(),
            bcast_ticks.map(|_| ControllerEvent::BcastTick).boxed(),
            build_ticks.map(|_| ControllerEvent::BuildTick).boxed(),
            report_ticks.map(|_| ControllerEvent::ReportTick).boxed(),
        ]);

        while let Some(event) = events.next().await {
            match event {
                ControllerEvent::RouterUpdated(router_event) => {
                    self.handle_router_event(router_event)
                }
                ControllerEvent::ScanTick => self.remove_expired_routers().await,
                ControllerEvent::RefreshTick => self.refresh_router_registry().await,
                ControllerEvent::BcastTick => self.bcast_router_info(),
                ControllerEvent::BuildTick => self.build_routing_table(),
                ControllerEvent::ReportTick => self.report_osp_info(),
            }
        }
        Ok(())
    }

    fn handle_router_event(&self, event: RouterEvent) {
        info!(
            "seeing RouterUpdated event, router addr: {}, blkNum: {}",
            event.router, event.block_number
        );
        match RouterOp::from_op_code(event.op) {
            Some(RouterOp::Added) | Some(RouterOp::Refreshed) => {
                if let Err(e) = self.builder.mark_osp(event.router, event.block_number) {
                    error!("mark osp {} err: {:?}", event.router, e);
                }
            }
            Some(RouterOp::Removed) => {
                if self.builder.has_osp(&event.router) {
                    self.builder.unmark_osp(&event.router);
                }
            }
            None => warn!(
                "unknown router operation from router registry contract: {}",
                event.op
            ),
        }
    }

    /// Scan the router set and unmark the ones whose registration aged out.
    pub async fn remove_expired_routers(&self) {
        let current_block = match self.chain.current_block_number().await {
            Ok(current_block) => current_block,
            Err(e) => {
                error!("current block number err: {:?}", e);
                return;
            }
        };
        for (addr, info) in self.builder.get_all_osps() {
            if is_router_expired(
                info.registry_block,
                current_block,
                self.config.expire_interval_block,
            ) {
                self.builder.unmark_osp(&addr);
            }
        }
    }

    async fn refresh_router_registry(&self) {
        info!("sending RefreshRouter tx");
        match self.registry.refresh_router().await {
            Ok(tx_hash) => self.spawn_tx_wait("RefreshRouter", tx_hash),
            Err(e) => error!("fail to refresh the router: {:?}", e),
        }
    }

    pub async fn send_register_router_transaction(&self) {
        info!("sending RegisterRouter tx");
        match self.registry.register_router().await {
            Ok(tx_hash) => self.spawn_tx_wait("RegisterRouter", tx_hash),
            Err(e) => error!("fail to register as a router: {:?}", e),
        }
    }

    pub async fn send_deregister_router_transaction(&self) {
        info!("sending DeregisterRouter tx");
        // Stop acting as a router regardless of the transaction's fate.
        if self.builder.has_osp(&self.src_addr) {
            self.builder.unmark_osp(&self.src_addr);
        }
        match self.registry.deregister_router().await {
            Ok(tx_hash) => self.spawn_tx_wait("DeregisterRouter", tx_hash),
            Err(e) => error!("fail to deregister router's registry: {:?}", e),
        }
    }

    /// Await mining in the background and log the outcome.
    fn spawn_tx_wait(&self, label: &'static str, tx_hash: TxHash) {
        let reader = self.chain.clone();
        let wait_config = WaitConfig {
            block_delay: self.config.tx_block_delay,
            timeout_ticks: TX_WAIT_TIMEOUT_TICKS,
        };
        let res = self.spawner.spawn(async move {
            match wait_tx_mined(&*reader, delay_ticks(TX_POLL_INTERVAL), tx_hash, wait_config)
                .await
            {
                Ok(receipt) if receipt.success => {
                    info!("{} transaction {} succeeded", label, tx_hash)
                }
                Ok(_) => error!("{} transaction {} failed", label, tx_hash),
                Err(e) => error!("{} transaction {} wait err: {:?}", label, tx_hash, e),
            }
        });
        if res.is_err() {
            error!("fail to spawn wait task for {} tx {}", label, tx_hash);
        }
    }

    /// Sign this node's dynamic routing info and broadcast it to peer OSPs.
    /// The update is also enqueued locally for the next recomputation.
    pub fn bcast_router_info(&self) {
        let channels = self.gather_channel_info();
        let update = RoutingUpdate {
            origin: self.src_addr,
            ts: unix_now(),
            channels,
        };
        let sig = match self.signer.sign_message(&routing_update_signature_buff(&update)) {
            Ok(sig) => sig,
            Err(e) => {
                error!("sign routing update err: {:?}", e);
                return;
            }
        };
        let signed_update = SignedRoutingUpdate {
            update: update.clone(),
            sig,
            ttl: self.config.route_ttl,
        };

        self.enqueue_router_info(update, self.config.route_ttl);

        let request = RoutingRequest {
            updates: vec![signed_update],
            sender: None,
        };
        self.bcast(request, &self.src_addr, None);
    }

    fn gather_channel_info(&self) -> Vec<ChannelRoutingInfo> {
        let mut channels = Vec::new();
        for (_addr, neighbor) in self.builder.get_alive_neighbors() {
            for (_token, cid) in neighbor.token_cids {
                match self.chan_store.get_balance(&cid) {
                    Ok(Some(balance)) => channels.push(ChannelRoutingInfo {
                        cid,
                        balance: balance.my_free,
                    }),
                    Ok(None) => warn!("no balance found for cid {}", cid),
                    Err(e) => error!("get balance of {} err: {:?}", cid, e),
                }
            }
        }
        channels
    }

    /// Enqueue dynamic routing info; returns whether it should be
    /// propagated further (new to this OSP and hop budget left).
    fn enqueue_router_info(&self, update: RoutingUpdate, ttl: u64) -> bool {
        if ttl == 0 {
            return false;
        }
        let origin = update.origin;
        let ts = update.ts;

        let mut batch = self.routing_batch.lock().unwrap();
        if let Some(old_update) = batch.get(&origin) {
            if old_update.ts >= ts {
                // Already have newer info from this origin.
                return false;
            }
        }
        self.builder.keep_osp_alive(origin, ts);
        batch.insert(origin, update);
        ttl > 1
    }

    /// New routing information arrived from another OSP. Verify, enqueue
    /// for the next recomputation, and forward to peers while the hop
    /// budget lasts.
    pub fn recv_bcast_routing_info(
        &self,
        mut request: RoutingRequest,
    ) -> Result<(), RoutingMsgError> {
        if request.updates.len() != 1 {
            return Err(RoutingMsgError::InvalidUpdateCount(request.updates.len()));
        }
        let signed_update = &request.updates[0];
        if !verify_routing_update(signed_update) {
            return Err(RoutingMsgError::InvalidSignature(
                signed_update.update.origin,
            ));
        }
        let update = signed_update.update.clone();
        let ttl = signed_update.ttl;
        debug!(
            "receive router updates, origin: {}, sender: {:?}",
            update.origin, request.sender
        );

        let sender = request.sender;
        if let Some(sender) = &sender {
            self.builder.keep_neighbor_alive(sender);
        }
        let origin = update.origin;
        if self.enqueue_router_info(update, ttl) {
            request.updates[0].ttl -= 1;
            self.bcast(request, &origin, sender);
        }
        Ok(())
    }

    /// Send the routing request to peer OSPs, excluding self, the origin,
    /// and the direct sender.
    fn bcast(&self, mut request: RoutingRequest, origin: &Address, sender: Option<Address>) {
        let mut osp_addrs = Vec::new();
        for addr in self.builder.get_neighbor_addrs() {
            if addr == self.src_addr || addr == *origin || Some(addr) == sender {
                continue;
            }
            osp_addrs.push(addr);
        }
        if osp_addrs.is_empty() {
            return;
        }
        request.sender = Some(self.src_addr);
        debug!(
            "bcast router updates, origin: {}, to {} peers",
            origin,
            osp_addrs.len()
        );
        (self.bcast_send)(request, osp_addrs);
    }

    /// Fold the gathered routing updates into the builder's edge liveness
    /// state, then rebuild every per-token table.
    pub fn build_routing_table(&self) {
        let batch = {
            let mut batch = self.routing_batch.lock().unwrap();
            std::mem::replace(&mut *batch, HashMap::new())
        };
        debug!("computing routing table from {} OSP updates", batch.len());
        for (_origin, update) in batch {
            for channel in &update.channels {
                self.builder.apply_channel_balance(
                    &update.origin,
                    &channel.cid,
                    channel.balance,
                    update.ts,
                );
            }
        }
        for token in self.builder.get_all_tokens() {
            if let Err(e) = self.builder.build_table(token) {
                error!("build table for token {} err: {:?}", token, e);
            }
        }
    }

    /// Snapshot peer balances and node configuration, sign, and POST to
    /// the explorer. Failures are logged only.
    pub fn report_osp_info(&self) {
        let explorer = match &self.explorer {
            Some(explorer) => explorer.clone(),
            None => return,
        };

        let mut osp_peers = Vec::new();
        for (addr, neighbor) in self.builder.get_alive_neighbors() {
            let mut balances = Vec::new();
            for (token, cid) in neighbor.token_cids {
                match self.chan_store.get_balance(&cid) {
                    Ok(Some(balance)) => balances.push(proto::report::ChannelBalanceReport {
                        cid,
                        token,
                        self_balance: balance.my_free,
                        peer_balance: balance.peer_free,
                    }),
                    Ok(None) => warn!("no balance found for cid {}", cid),
                    Err(e) => error!("get balance of {} err: {:?}", cid, e),
                }
            }
            osp_peers.push(PeerBalances {
                peer: addr,
                balances,
            });
        }
        let payments = match self.chan_store.count_payments() {
            Ok(payments) => payments,
            Err(e) => {
                error!("count payments err: {:?}", e);
                0
            }
        };
        let report = OspReport {
            eth_addr: self.src_addr,
            rpc_host: self.config.rpc_host.clone(),
            open_accept: self.config.open_accept,
            osp_peers,
            std_openchan_configs: self.config.std_open_chan_configs.clone(),
            payments,
            timestamp: unix_now(),
        };

        let report_bytes = match serde_json::to_vec(&report) {
            Ok(report_bytes) => report_bytes,
            Err(e) => {
                error!("marshal OSP report err: {}", e);
                return;
            }
        };
        let sig = match self.signer.sign_message(&report_bytes) {
            Ok(sig) => sig,
            Err(e) => {
                error!("sign OSP report err: {:?}", e);
                return;
            }
        };
        let body = ExplorerReportBody {
            osp_info: hex::encode(&report_bytes),
            sig: hex::encode(sig.as_ref()),
        };
        if let Err(e) = explorer.post_osp_report(&body) {
            warn!("explorer report err: {:?}", e);
        }
    }

    // Pass-throughs for the channel event layer.

    pub fn add_edge(
        &self,
        p1: Address,
        p2: Address,
        cid: ChannelId,
        token: TokenAddr,
    ) -> Result<(), BuilderError> {
        self.builder.add_edge(p1, p2, cid, token)
    }

    pub fn remove_edge(&self, cid: ChannelId) -> Result<(), BuilderError> {
        self.builder.remove_edge(cid)
    }

    pub fn build_table(
        &self,
        token: TokenAddr,
    ) -> Result<Option<HashMap<Address, ChannelId>>, BuilderError> {
        self.builder.build_table(token)
    }

    pub fn get_all_neighbors(&self) -> HashMap<Address, NeighborInfo> {
        self.builder.get_all_neighbors()
    }

    pub fn builder(&self) -> &RoutingTableBuilder {
        &self.builder
    }
}

pub fn is_router_expired(router_block: u64, current_block: u64, expire_interval_block: u64) -> bool {
    router_block + expire_interval_block < current_block
}
