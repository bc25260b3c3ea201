use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use chain::{ChainError, ChannelLogEvent, LedgerLogScanner};
use proto::messages::Edge;

use crate::builder::{BuilderError, RoutingTableBuilder};

/// A snapshot of all channels known at `end_block_number`, distributed
/// out-of-band so a fresh node does not have to scan the chain from
/// genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingSnapshot {
    pub end_block_number: u64,
    pub channels: Vec<Edge>,
}

#[derive(Debug)]
pub enum RecoverError {
    Snapshot(String),
    Builder(BuilderError),
    Chain(ChainError),
}

/// Repopulate an empty routing graph: replay the snapshot, catch up on
/// channel open/settle logs between the snapshot and the current block,
/// then build every touched token.
///
/// Fail fast: any error aborts the whole recovery, since a node believing
/// it has complete routing state when it does not is worse than a node
/// with none. Does nothing when `routing_data` is empty or the builder
/// already tracks tokens (the node does not start from scratch).
pub async fn recover_routing_table(
    current_block: u64,
    routing_data: &[u8],
    scanner: &dyn LedgerLogScanner,
    builder: &RoutingTableBuilder,
) -> Result<(), RecoverError> {
    if routing_data.is_empty() {
        return Ok(());
    }
    if !builder.get_all_tokens().is_empty() {
        return Ok(());
    }

    info!("starting to recover routing data");
    let snapshot: RoutingSnapshot =
        serde_json::from_slice(routing_data).map_err(|e| RecoverError::Snapshot(format!("{}", e)))?;

    let mut tokens = HashSet::new();
    for channel in &snapshot.channels {
        builder
            .add_edge(channel.p1, channel.p2, channel.cid, channel.token)
            .map_err(RecoverError::Builder)?;
        tokens.insert(channel.token);
    }

    info!(
        "fetching logs from {} to {}",
        snapshot.end_block_number, current_block
    );
    let logs = scanner
        .filter_channel_logs(snapshot.end_block_number, current_block)
        .await
        .map_err(RecoverError::Chain)?;
    for log_event in logs {
        match log_event {
            ChannelLogEvent::Opened(open) => {
                builder
                    .add_edge(open.peers[0], open.peers[1], open.cid, open.token)
                    .map_err(RecoverError::Builder)?;
                tokens.insert(open.token);
            }
            ChannelLogEvent::Settled(settle) => {
                builder
                    .remove_edge(settle.cid)
                    .map_err(RecoverError::Builder)?;
            }
        }
    }

    for token in tokens {
        builder.build_table(token).map_err(RecoverError::Builder)?;
    }
    info!("routing recovery done");
    Ok(())
}
