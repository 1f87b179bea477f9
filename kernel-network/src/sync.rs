//! Header-first synchronization and inventory relay.
//!
//! These handlers run inside each peer task, strictly in message order for
//! that peer. Anything that mutates chain state goes through the chain
//! manager, which provides its own serialization.

use std::sync::Arc;

use tracing::{debug, info, warn};

use kernel_chain::{
    block::Block,
    parameters::genesis::GENESIS_HASH,
    transaction::Transaction,
};
use kernel_state::StateError;
use kernel_consensus::BlockError;

use crate::constants::MAX_HEADERS;
use crate::meta_addr::MetaAddr;
use crate::peer_set::PeerHandle;
use crate::protocol::external::{GetHeaders, InventoryHash, Message};
use crate::NetworkContext;

/// Kick off synchronization after an initiator handshake: ask the peer for
/// headers after our tip.
pub(crate) fn request_headers_from_tip(ctx: &NetworkContext, peer: &PeerHandle) {
    let locator = match ctx.chain.tip() {
        Some(tip) => tip.hash,
        None => *GENESIS_HASH,
    };
    debug!(peer = %peer.addr, %locator, "requesting headers");
    peer.send(Message::GetHeaders(GetHeaders::from_tip(locator)));
}

/// Serve a peer's `getheaders`: main-chain headers after its locator.
pub(crate) fn handle_get_headers(ctx: &NetworkContext, peer: &PeerHandle, request: GetHeaders) {
    let mut headers = match ctx.chain.store().headers_after(&request.start_block, MAX_HEADERS) {
        Ok(headers) => headers,
        Err(error) => {
            warn!(%error, "getheaders lookup failed");
            return;
        }
    };
    if let Some(stop) = request.stop_hash {
        if let Some(position) = headers.iter().position(|header| header.hash() == stop) {
            headers.truncate(position + 1);
        }
    }
    debug!(peer = %peer.addr, count = headers.len(), "serving headers");
    peer.send(Message::Headers(headers));
}

/// Screen a `headers` batch and request the blocks we are missing.
///
/// The batch must be internally continuous and every header must satisfy
/// its own proof of work; a batch failing either check is discarded whole.
pub(crate) fn handle_headers(
    ctx: &NetworkContext,
    peer: &PeerHandle,
    headers: Vec<kernel_chain::block::Header>,
) {
    if headers.is_empty() {
        debug!(peer = %peer.addr, "headers sync complete");
        return;
    }
    for window in headers.windows(2) {
        if window[1].previous_block_hash != window[0].hash() {
            warn!(peer = %peer.addr, "discarding discontinuous headers batch");
            return;
        }
    }
    for header in &headers {
        let hash = header.hash();
        let target = match header.difficulty_threshold.to_expanded() {
            Some(target) => target,
            None => {
                warn!(peer = %peer.addr, %hash, "discarding headers batch with invalid difficulty");
                return;
            }
        };
        if !(hash < target) {
            warn!(peer = %peer.addr, %hash, "discarding headers batch with bad proof of work");
            return;
        }
    }

    let mut wanted = Vec::new();
    for header in &headers {
        let hash = header.hash();
        match ctx.chain.store().contains_block(&hash) {
            Ok(false) => wanted.push(InventoryHash::Block(hash)),
            Ok(true) => {}
            Err(error) => {
                warn!(%error, "block lookup failed");
                return;
            }
        }
    }
    if !wanted.is_empty() {
        debug!(peer = %peer.addr, count = wanted.len(), "requesting blocks");
        peer.send(Message::GetData(wanted));
    }
}

/// Request any advertised objects we do not already have.
pub(crate) fn handle_inv(ctx: &NetworkContext, peer: &PeerHandle, items: Vec<InventoryHash>) {
    let mut wanted = Vec::new();
    for item in items {
        match item {
            InventoryHash::Tx(txid) => {
                let in_mempool = ctx.chain.mempool().contains(&txid);
                let confirmed = matches!(ctx.chain.store().tx_location(&txid), Ok(Some(_)));
                if !in_mempool && !confirmed {
                    wanted.push(item);
                }
            }
            InventoryHash::Block(hash) => {
                if let Ok(false) = ctx.chain.store().contains_block(&hash) {
                    wanted.push(item);
                }
            }
        }
    }
    if !wanted.is_empty() {
        peer.send(Message::GetData(wanted));
    }
}

/// Serve full objects out of the mempool and the block store.
///
/// Objects we do not have are silently skipped, like most of this message's
/// ancestors.
pub(crate) fn handle_get_data(ctx: &NetworkContext, peer: &PeerHandle, items: Vec<InventoryHash>) {
    for item in items {
        match item {
            InventoryHash::Tx(txid) => {
                if let Some(transaction) = ctx.chain.mempool().transaction(&txid) {
                    peer.send(Message::Tx(Arc::new(transaction)));
                }
            }
            InventoryHash::Block(hash) => {
                if let Ok(Some(block)) = ctx.chain.store().block(&hash) {
                    peer.send(Message::Block(block));
                }
            }
        }
    }
}

/// Feed a received block to the chain manager and relay it on acceptance.
pub(crate) fn handle_block(ctx: &NetworkContext, peer: &PeerHandle, block: Arc<Block>) {
    let hash = block.hash();
    match ctx.chain.process_new_block(block) {
        Ok(true) => {
            info!(peer = %peer.addr, %hash, "relaying block accepted from peer");
            ctx.peers
                .broadcast(Message::Inv(vec![InventoryHash::Block(hash)]), Some(peer.addr));
        }
        Ok(false) => {
            // Already known: nothing to relay.
        }
        Err(StateError::Block(BlockError::UnknownParent(hash, parent))) => {
            // We are missing ancestors; pull the peer's view of the chain
            // from the bottom and let ordinary processing reconnect it.
            debug!(peer = %peer.addr, %hash, %parent, "block has unknown parent, requesting history");
            peer.send(Message::GetHeaders(GetHeaders::from_tip(*GENESIS_HASH)));
        }
        Err(error) => {
            // An invalid object is not grounds for dropping the peer; it may
            // be an honest relay of someone else's bad block.
            warn!(peer = %peer.addr, %hash, %error, "rejected block from peer");
        }
    }
}

/// Feed a received transaction to the mempool and relay it on acceptance.
pub(crate) fn handle_tx(ctx: &NetworkContext, peer: &PeerHandle, transaction: Arc<Transaction>) {
    let txid = transaction.hash();
    if ctx.chain.mempool().contains(&txid) {
        return;
    }
    match ctx
        .chain
        .mempool()
        .admit((*transaction).clone(), ctx.chain.store())
    {
        Ok(_) => {
            debug!(peer = %peer.addr, %txid, "relaying transaction accepted from peer");
            ctx.peers
                .broadcast(Message::Inv(vec![InventoryHash::Tx(txid)]), Some(peer.addr));
        }
        Err(error) => {
            debug!(peer = %peer.addr, %txid, %error, "rejected transaction from peer");
        }
    }
}

/// Dial any newly learned addresses.
pub(crate) fn handle_addr(ctx: &NetworkContext, addresses: Vec<MetaAddr>) {
    for address in addresses {
        let dial = address.dial_string();
        let resolved: Option<std::net::SocketAddr> = dial.parse().ok();
        if let Some(addr) = resolved {
            if addr == ctx.local_addr || ctx.peers.contains(&addr) {
                continue;
            }
            let ctx = ctx.clone();
            tokio::spawn(async move {
                crate::peer::connect(ctx, addr).await;
            });
        }
    }
}

/// Announce an object we originated (a mined block or a wallet transaction)
/// to every peer.
pub fn announce(ctx: &NetworkContext, item: InventoryHash) {
    ctx.peers.broadcast(Message::Inv(vec![item]), None);
}
