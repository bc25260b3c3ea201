use serde::{Deserialize, Serialize};

use crate::types::{Address, ChannelId, TokenAddr};

/// Free balances of one channel with a peer, as reported to the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBalanceReport {
    pub cid: ChannelId,
    pub token: TokenAddr,
    pub self_balance: u128,
    pub peer_balance: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerBalances {
    pub peer: Address,
    pub balances: Vec<ChannelBalanceReport>,
}

/// Deposit limits this OSP accepts for standard open-channel requests on one
/// token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdOpenChanConfig {
    pub token: TokenAddr,
    pub min_deposit: u128,
    pub max_deposit: u128,
}

/// Operational topology snapshot periodically reported to the explorer
/// service. Best effort telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OspReport {
    pub eth_addr: Address,
    pub rpc_host: String,
    pub open_accept: bool,
    pub osp_peers: Vec<PeerBalances>,
    pub std_openchan_configs: Vec<StdOpenChanConfig>,
    pub payments: u64,
    pub timestamp: u64,
}
