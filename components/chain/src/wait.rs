use std::time::Duration;

use futures::{stream, Stream, StreamExt};
use futures_timer::Delay;

use common::conn::BoxStream;
use proto::types::TxHash;
use timer::TimerTick;

use crate::client::{ChainError, ChainReader, TxReceipt};

/// Consecutive polls with neither a receipt nor a mempool entry before a
/// transaction is considered dropped.
const DROPPED_CONSECUTIVE_MISSES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxWaitError {
    /// The transaction left the mempool without being mined.
    Dropped,
    /// The tick budget was exhausted before confirmation.
    Timeout,
    Chain(ChainError),
}

#[derive(Debug, Clone, Copy)]
pub struct WaitConfig {
    /// Confirmation depth: a receipt at block `b` is final once the chain
    /// reaches `b + block_delay`.
    pub block_delay: u64,
    /// Wall clock budget, measured in polling ticks.
    pub timeout_ticks: usize,
}

/// Await the mining of a transaction, polling once per tick.
///
/// A receipt that disappears after having been seen means the chain
/// reorganized; the wait restarts internally rather than surfacing an error.
pub async fn wait_tx_mined<TS>(
    reader: &dyn ChainReader,
    mut ticks: TS,
    tx_hash: TxHash,
    config: WaitConfig,
) -> Result<TxReceipt, TxWaitError>
where
    TS: Stream<Item = TimerTick> + Unpin,
{
    let mut seen_receipt = false;
    let mut misses = 0;

    for _ in 0..config.timeout_ticks {
        if ticks.next().await.is_none() {
            // Tick source is gone; treat as a timeout.
            break;
        }

        match reader.receipt(&tx_hash).await.map_err(TxWaitError::Chain)? {
            Some(receipt) => {
                seen_receipt = true;
                misses = 0;
                let current_block = reader
                    .current_block_number()
                    .await
                    .map_err(TxWaitError::Chain)?;
                if current_block >= receipt.block_number + config.block_delay {
                    return Ok(receipt);
                }
            }
            None => {
                if seen_receipt {
                    warn!("tx {} receipt disappeared, chain reorg, waiting again", tx_hash);
                    seen_receipt = false;
                    misses = 0;
                    continue;
                }
                if reader
                    .is_pending(&tx_hash)
                    .await
                    .map_err(TxWaitError::Chain)?
                {
                    misses = 0;
                } else {
                    misses += 1;
                    if misses >= DROPPED_CONSECUTIVE_MISSES {
                        return Err(TxWaitError::Dropped);
                    }
                }
            }
        }
    }
    Err(TxWaitError::Timeout)
}

/// An endless tick stream backed by a real timer, for fire-and-forget waits
/// outside of tests.
pub fn delay_ticks(interval: Duration) -> BoxStream<'static, TimerTick> {
    Box::pin(stream::unfold((), move |()| async move {
        Delay::new(interval).await;
        Some((TimerTick, ()))
    }))
}
