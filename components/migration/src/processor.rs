use std::sync::Arc;

use futures::{stream, StreamExt};

use chain::{ChainError, ChainReader, EventMonitor};
use crypto::{CryptoError, Signer};
use proto::messages::ChanState;
use proto::migration::{
    ChannelMigrationInfo, ChannelMigrationRequest, MigrateChannelRequest, MigrateChannelResponse,
    MigrationState,
};
use proto::types::{Address, ChannelId, Signature};
use signature::signature_buff::channel_migration_signature_buff;
use signature::verify::verify_migration_info;
use storage::{ChanMigrationRecord, ChannelStore, MigrationStore, StoreError};

use crate::peer::{PeerClient, PeerClientError};

/// Estimation of block numbers produced in one year.
pub const CHAN_MIGRATION_DEADLINE: u64 = 2_425_846;
/// Estimation of block numbers produced in one month, the margin a
/// responder requires before the deadline.
pub const CHAN_MIGRATION_INTERVAL: u64 = 199_384;

#[derive(Debug, Clone, Copy)]
pub struct MigrationConfig {
    /// The ledger contract channels should be running on.
    pub latest_ledger: Address,
    pub deadline_blocks: u64,
    pub interval_blocks: u64,
}

impl MigrationConfig {
    pub fn new(latest_ledger: Address) -> MigrationConfig {
        MigrationConfig {
            latest_ledger,
            deadline_blocks: CHAN_MIGRATION_DEADLINE,
            interval_blocks: CHAN_MIGRATION_INTERVAL,
        }
    }
}

#[derive(Debug)]
pub enum MigrationError {
    ChannelNotFound,
    NoCurrentLedger,
    InconsistentCurrentLedger { want: Address, got: Address },
    InconsistentLatestLedger { want: Address, got: Address },
    DeadlinePassed,
    InvalidSignature(Address),
    Store(StoreError),
    Chain(ChainError),
    Peer(PeerClientError),
    Crypto(CryptoError),
}

impl From<StoreError> for MigrationError {
    fn from(e: StoreError) -> MigrationError {
        MigrationError::Store(e)
    }
}

impl From<ChainError> for MigrationError {
    fn from(e: ChainError) -> MigrationError {
        MigrationError::Chain(e)
    }
}

impl From<CryptoError> for MigrationError {
    fn from(e: CryptoError) -> MigrationError {
        MigrationError::Crypto(e)
    }
}

/// Coordinates the two-party signed handshake that moves a channel from a
/// deprecated ledger contract to the configured latest one, and reconciles
/// local state with the on-chain migration events.
pub struct MigrateChannelProcessor {
    src_addr: Address,
    signer: Arc<dyn Signer>,
    chan_store: Arc<dyn ChannelStore>,
    mig_store: Arc<dyn MigrationStore>,
    peers: Arc<dyn PeerClient>,
    chain: Arc<dyn ChainReader>,
    config: MigrationConfig,
}

impl MigrateChannelProcessor {
    pub fn new(
        src_addr: Address,
        signer: Arc<dyn Signer>,
        chan_store: Arc<dyn ChannelStore>,
        mig_store: Arc<dyn MigrationStore>,
        peers: Arc<dyn PeerClient>,
        chain: Arc<dyn ChainReader>,
        config: MigrationConfig,
    ) -> MigrateChannelProcessor {
        MigrateChannelProcessor {
            src_addr,
            signer,
            chan_store,
            mig_store,
            peers,
            chain,
            config,
        }
    }

    /// Check every channel with `peer` for a pending ledger migration.
    /// Per-channel failures are logged, not propagated.
    pub async fn check_peer_channel_migration(&self, peer: &Address) {
        let cids = match self.chan_store.get_peer_cids(peer) {
            Ok(cids) => cids,
            Err(e) => {
                error!("get cids of peer {} err: {:?}", peer, e);
                return;
            }
        };
        if cids.is_empty() {
            debug!("no channels found for peer {}", peer);
            return;
        }
        for cid in cids {
            if let Err(e) = self.check_channel_migration(peer, &cid).await {
                error!("check migration of channel {} err: {:?}", cid, e);
            }
        }
    }

    /// Initiate the migration handshake for one channel whose ledger is
    /// outdated. Idempotent per `(cid, latest_ledger)`: an existing record
    /// that is submitted or still within its deadline makes this a no-op.
    pub async fn check_channel_migration(
        &self,
        peer: &Address,
        cid: &ChannelId,
    ) -> Result<(), MigrationError> {
        let latest_ledger = self.config.latest_ledger;
        let (state, current_ledger) = self
            .chan_store
            .get_chan_for_migration(cid)?
            .ok_or(MigrationError::ChannelNotFound)?;
        debug!(
            "current ledger is {}, latest ledger is {}",
            current_ledger, latest_ledger
        );
        if state != ChanState::Opened {
            return Ok(());
        }
        if current_ledger == latest_ledger {
            return Ok(());
        }

        let current_block = self.chain.current_block_number().await?;
        if let Some(record) = self.mig_store.get_chan_migration(cid, &latest_ledger)? {
            if record.state == MigrationState::Submitted || record.deadline > current_block {
                return Ok(());
            }
        }

        info!("start migrating channel {} for peer {}", cid, peer);
        let deadline = current_block + self.config.deadline_blocks;
        let migration_info = ChannelMigrationInfo {
            channel_id: *cid,
            from_ledger: current_ledger,
            to_ledger: latest_ledger,
            migration_deadline: deadline,
        };

        let sbuffer = channel_migration_signature_buff(&migration_info);
        let requester_sig = self.signer.sign_message(&sbuffer)?;
        let request = MigrateChannelRequest {
            migration_info,
            requester_sig,
        };
        let response = self
            .peers
            .migrate_channel(peer, request)
            .await
            .map_err(MigrationError::Peer)?;

        if !verify_migration_info(&migration_info, peer, &response.approver_sig) {
            return Err(MigrationError::InvalidSignature(*peer));
        }

        let onchain_request =
            self.new_onchain_request(peer, migration_info, requester_sig, response.approver_sig);
        self.store_migration(cid, &latest_ledger, deadline, onchain_request)?;

        info!(
            "migrate channel initiation done for cid {}, from ledger {} to ledger {}",
            cid, current_ledger, latest_ledger
        );
        Ok(())
    }

    /// The responder side of the handshake: validate the request against
    /// local channel state, co-sign, and store the same record the
    /// initiator stores.
    pub async fn process_migrate_channel_request(
        &self,
        request: &MigrateChannelRequest,
    ) -> Result<MigrateChannelResponse, MigrationError> {
        let migration_info = request.migration_info;
        let cid = migration_info.channel_id;
        info!("process migrate channel request for channel {}", cid);

        let latest_ledger = self.config.latest_ledger;
        let current_ledger = self
            .chan_store
            .get_chan_ledger(&cid)?
            .ok_or(MigrationError::NoCurrentLedger)?;

        if migration_info.from_ledger != current_ledger {
            return Err(MigrationError::InconsistentCurrentLedger {
                want: current_ledger,
                got: migration_info.from_ledger,
            });
        }
        if migration_info.to_ledger != latest_ledger {
            return Err(MigrationError::InconsistentLatestLedger {
                want: latest_ledger,
                got: migration_info.to_ledger,
            });
        }

        let current_block = self.chain.current_block_number().await?;
        let deadline = migration_info.migration_deadline;
        // Leave a tolerant range before the deadline.
        if current_block + self.config.interval_blocks >= deadline {
            warn!(
                "channel migration deadline check failed, current: {}, deadline: {}",
                current_block, deadline
            );
            return Err(MigrationError::DeadlinePassed);
        }

        let peer = self
            .chan_store
            .get_chan_peer(&cid)?
            .ok_or(MigrationError::ChannelNotFound)?;
        if !verify_migration_info(&migration_info, &peer, &request.requester_sig) {
            return Err(MigrationError::InvalidSignature(peer));
        }

        let sbuffer = channel_migration_signature_buff(&migration_info);
        let approver_sig = self.signer.sign_message(&sbuffer)?;

        let onchain_request =
            self.new_onchain_request(&peer, migration_info, approver_sig, request.requester_sig);
        self.store_migration(&cid, &latest_ledger, deadline, onchain_request)?;

        info!(
            "channel migration response done for peer {} and channel {}",
            peer, cid
        );
        Ok(MigrateChannelResponse { approver_sig })
    }

    /// Store the migration record as initialized. A record that was already
    /// submitted on-chain short-circuits inside the transaction.
    fn store_migration(
        &self,
        cid: &ChannelId,
        to_ledger: &Address,
        deadline: u64,
        onchain_request: ChannelMigrationRequest,
    ) -> Result<(), MigrationError> {
        self.mig_store.transactional(&mut |tx| {
            if let Some(record) = tx.get_chan_migration(cid, to_ledger) {
                if record.state == MigrationState::Submitted {
                    return Ok(());
                }
            }
            tx.upsert_chan_migration(
                cid,
                to_ledger,
                ChanMigrationRecord {
                    deadline,
                    state: MigrationState::Initialized,
                    onchain_request: onchain_request.clone(),
                },
            );
            Ok(())
        })?;
        Ok(())
    }

    /// Assemble the on-chain request with signatures in ascending signer
    /// address order, so both parties produce the same bytes.
    fn new_onchain_request(
        &self,
        peer: &Address,
        migration_info: ChannelMigrationInfo,
        own_sig: Signature,
        peer_sig: Signature,
    ) -> ChannelMigrationRequest {
        let sigs = if self.src_addr > *peer {
            vec![peer_sig, own_sig]
        } else {
            vec![own_sig, peer_sig]
        };
        ChannelMigrationRequest {
            migration_info,
            sigs,
        }
    }

    /// Watch `MigrateChannelTo` on every deprecated ledger this node knows
    /// and reconcile local state as events arrive.
    pub async fn run(&self, monitor: Arc<dyn EventMonitor>) -> Result<(), MigrationError> {
        let current_block = self.chain.current_block_number().await?;
        let mut streams = Vec::new();
        for ledger in self.chan_store.get_all_chan_ledgers()? {
            if ledger == self.config.latest_ledger {
                continue;
            }
            info!(
                "start monitoring on-chain channel migration events for ledger {}",
                ledger
            );
            streams.push(monitor.migrate_channel_to_events(ledger, current_block));
        }
        if streams.is_empty() {
            return Ok(());
        }

        let mut events = stream::select_all(streams);
        while let Some(event) = events.next().await {
            if let Err(e) = self.handle_migrate_channel_event(&event.cid, &event.new_ledger) {
                error!("handle migrate channel event err: {:?}", e);
            }
        }
        Ok(())
    }

    /// A channel migrated on-chain: move the local ledger pointer and drop
    /// the migration record. Channel ids this node does not know belong to
    /// other nodes and are ignored.
    pub fn handle_migrate_channel_event(
        &self,
        cid: &ChannelId,
        new_ledger: &Address,
    ) -> Result<(), MigrationError> {
        if self.chan_store.get_chan_ledger(cid)?.is_none() {
            return Ok(());
        }
        self.mig_store.transactional(&mut |tx| {
            tx.update_chan_ledger(cid, new_ledger)?;
            tx.delete_chan_migration(cid);
            Ok(())
        })?;
        info!("channel {} migrated to ledger {}", cid, new_ledger);
        Ok(())
    }
}
