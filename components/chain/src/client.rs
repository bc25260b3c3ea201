use common::conn::BoxFuture;

use proto::types::{Address, TxHash};

use crate::events::ChannelLogEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    Rpc(String),
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

/// Read side of the chain connection.
pub trait ChainReader: Send + Sync {
    fn current_block_number(&self) -> BoxFuture<'_, Result<u64, ChainError>>;
    fn receipt(&self, tx_hash: &TxHash) -> BoxFuture<'_, Result<Option<TxReceipt>, ChainError>>;
    /// Whether the transaction is still waiting in the mempool.
    fn is_pending(&self, tx_hash: &TxHash) -> BoxFuture<'_, Result<bool, ChainError>>;
}

/// Calls and transactions against the router registry contract. Transactions
/// resolve as soon as they are accepted into the mempool; mining is awaited
/// separately through [`crate::wait::wait_tx_mined`].
pub trait RouterRegistry: Send + Sync {
    /// Block number at which `addr` registered or last refreshed, zero when
    /// not registered.
    fn router_info(&self, addr: &Address) -> BoxFuture<'_, Result<u64, ChainError>>;
    fn register_router(&self) -> BoxFuture<'_, Result<TxHash, ChainError>>;
    fn deregister_router(&self) -> BoxFuture<'_, Result<TxHash, ChainError>>;
    fn refresh_router(&self) -> BoxFuture<'_, Result<TxHash, ChainError>>;
}

/// Historical log queries against the ledger contract, used by routing
/// recovery to catch up from a snapshot.
pub trait LedgerLogScanner: Send + Sync {
    /// Channel open/settle events between the two block heights, in log
    /// order.
    fn filter_channel_logs(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> BoxFuture<'_, Result<Vec<ChannelLogEvent>, ChainError>>;
}
