use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use futures::channel::mpsc;
use futures::stream;

use common::conn::{BoxFuture, BoxStream};
use proto::types::{Address, TxHash};

use crate::client::{ChainError, ChainReader, LedgerLogScanner, RouterRegistry, TxReceipt};
use crate::events::{ChannelLogEvent, EventMonitor, MigrateChannelToEvent, RouterEvent};

/// An in-memory chain used by tests: every capability trait implemented over
/// mutexed tables, with control methods to script the chain's behavior.
pub struct DummyChain {
    current_block: AtomicU64,
    router_blocks: Mutex<HashMap<Address, u64>>,
    receipts: Mutex<HashMap<TxHash, TxReceipt>>,
    pending: Mutex<HashSet<TxHash>>,
    channel_logs: Mutex<Vec<ChannelLogEvent>>,
    sent_transactions: Mutex<Vec<String>>,
    next_tx_id: AtomicU64,
    router_event_stream: Mutex<Option<mpsc::Receiver<RouterEvent>>>,
    migrate_event_streams: Mutex<HashMap<Address, mpsc::Receiver<MigrateChannelToEvent>>>,
    router_subscribe_start: Mutex<Option<u64>>,
}

impl DummyChain {
    pub fn new() -> DummyChain {
        DummyChain {
            current_block: AtomicU64::new(0),
            router_blocks: Mutex::new(HashMap::new()),
            receipts: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashSet::new()),
            channel_logs: Mutex::new(Vec::new()),
            sent_transactions: Mutex::new(Vec::new()),
            next_tx_id: AtomicU64::new(1),
            router_event_stream: Mutex::new(None),
            migrate_event_streams: Mutex::new(HashMap::new()),
            router_subscribe_start: Mutex::new(None),
        }
    }

    pub fn set_current_block(&self, block_number: u64) {
        self.current_block.store(block_number, Ordering::SeqCst);
    }

    pub fn set_router_info(&self, addr: Address, block_number: u64) {
        self.router_blocks.lock().unwrap().insert(addr, block_number);
    }

    pub fn add_receipt(&self, tx_hash: TxHash, block_number: u64, success: bool) {
        self.receipts.lock().unwrap().insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number,
                success,
            },
        );
    }

    pub fn remove_receipt(&self, tx_hash: &TxHash) {
        self.receipts.lock().unwrap().remove(tx_hash);
    }

    pub fn set_pending(&self, tx_hash: TxHash, is_pending: bool) {
        let mut pending = self.pending.lock().unwrap();
        if is_pending {
            pending.insert(tx_hash);
        } else {
            pending.remove(&tx_hash);
        }
    }

    pub fn set_channel_logs(&self, logs: Vec<ChannelLogEvent>) {
        *self.channel_logs.lock().unwrap() = logs;
    }

    pub fn set_router_event_stream(&self, receiver: mpsc::Receiver<RouterEvent>) {
        *self.router_event_stream.lock().unwrap() = Some(receiver);
    }

    pub fn set_migrate_event_stream(
        &self,
        ledger: Address,
        receiver: mpsc::Receiver<MigrateChannelToEvent>,
    ) {
        self.migrate_event_streams
            .lock()
            .unwrap()
            .insert(ledger, receiver);
    }

    /// Names of the transactions sent so far, in order.
    pub fn sent_transactions(&self) -> Vec<String> {
        self.sent_transactions.lock().unwrap().clone()
    }

    /// The start block the router event subscription asked for.
    pub fn router_subscribe_start(&self) -> Option<u64> {
        *self.router_subscribe_start.lock().unwrap()
    }

    fn send_transaction(&self, name: &str) -> TxHash {
        self.sent_transactions.lock().unwrap().push(name.to_owned());
        let tx_id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        let mut tx_bytes = [0x00u8; 32];
        tx_bytes[24..].copy_from_slice(&tx_id.to_be_bytes());
        TxHash::from(tx_bytes)
    }
}

impl Default for DummyChain {
    fn default() -> DummyChain {
        DummyChain::new()
    }
}

impl ChainReader for DummyChain {
    fn current_block_number(&self) -> BoxFuture<'_, Result<u64, ChainError>> {
        Box::pin(async move { Ok(self.current_block.load(Ordering::SeqCst)) })
    }

    fn receipt(&self, tx_hash: &TxHash) -> BoxFuture<'_, Result<Option<TxReceipt>, ChainError>> {
        let receipt = self.receipts.lock().unwrap().get(tx_hash).cloned();
        Box::pin(async move { Ok(receipt) })
    }

    fn is_pending(&self, tx_hash: &TxHash) -> BoxFuture<'_, Result<bool, ChainError>> {
        let is_pending = self.pending.lock().unwrap().contains(tx_hash);
        Box::pin(async move { Ok(is_pending) })
    }
}

impl RouterRegistry for DummyChain {
    fn router_info(&self, addr: &Address) -> BoxFuture<'_, Result<u64, ChainError>> {
        let block_number = self
            .router_blocks
            .lock()
            .unwrap()
            .get(addr)
            .cloned()
            .unwrap_or(0);
        Box::pin(async move { Ok(block_number) })
    }

    fn register_router(&self) -> BoxFuture<'_, Result<TxHash, ChainError>> {
        let tx_hash = self.send_transaction("register_router");
        Box::pin(async move { Ok(tx_hash) })
    }

    fn deregister_router(&self) -> BoxFuture<'_, Result<TxHash, ChainError>> {
        let tx_hash = self.send_transaction("deregister_router");
        Box::pin(async move { Ok(tx_hash) })
    }

    fn refresh_router(&self) -> BoxFuture<'_, Result<TxHash, ChainError>> {
        let tx_hash = self.send_transaction("refresh_router");
        Box::pin(async move { Ok(tx_hash) })
    }
}

impl LedgerLogScanner for DummyChain {
    fn filter_channel_logs(
        &self,
        _from_block: u64,
        _to_block: u64,
    ) -> BoxFuture<'_, Result<Vec<ChannelLogEvent>, ChainError>> {
        let logs = self.channel_logs.lock().unwrap().clone();
        Box::pin(async move { Ok(logs) })
    }
}

impl EventMonitor for DummyChain {
    fn router_updated_events(&self, start_block: u64) -> BoxStream<'static, RouterEvent> {
        *self.router_subscribe_start.lock().unwrap() = Some(start_block);
        match self.router_event_stream.lock().unwrap().take() {
            Some(receiver) => Box::pin(receiver),
            None => Box::pin(stream::empty()),
        }
    }

    fn migrate_channel_to_events(
        &self,
        ledger: Address,
        _start_block: u64,
    ) -> BoxStream<'static, MigrateChannelToEvent> {
        match self.migrate_event_streams.lock().unwrap().remove(&ledger) {
            Some(receiver) => Box::pin(receiver),
            None => Box::pin(stream::empty()),
        }
    }
}
