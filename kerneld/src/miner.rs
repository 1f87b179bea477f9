//! The built-in proof-of-work miner.
//!
//! A dedicated OS thread: build a template on the current tip, then grind
//! nonces over a pre-serialized header, patching the nonce bytes in place
//! rather than re-serializing eighty bytes per attempt. Between batches it
//! polls the tip watch channel and the shutdown flag, so a better tip
//! abandons the template within one batch.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use kernel_chain::{
    block::Header,
    serialization::sha256d,
    work::difficulty::ExpandedDifficulty,
    KernelSerialize,
};
use kernel_network::{sync, InventoryHash, NetworkContext};
use kernel_state::{ChainManager, TipInfo};

/// Nonces tried between tip/shutdown polls.
const BATCH_SIZE: u32 = 1_000;

pub struct Miner {
    chain: Arc<ChainManager>,
    network: NetworkContext,
    miner_pub_key_hash: [u8; 20],
    tips: watch::Receiver<Option<TipInfo>>,
    shutdown: watch::Receiver<bool>,
}

impl Miner {
    pub fn new(
        chain: Arc<ChainManager>,
        network: NetworkContext,
        miner_pub_key_hash: [u8; 20],
        shutdown: watch::Receiver<bool>,
    ) -> Miner {
        let tips = chain.tip_watcher();
        Miner {
            chain,
            network,
            miner_pub_key_hash,
            tips,
            shutdown,
        }
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// The blocking mining loop; run it on its own thread.
    pub fn run(mut self) {
        info!("miner started");
        while !self.shutting_down() {
            let template = match self.chain.build_block_template(&self.miner_pub_key_hash) {
                Ok(template) => template,
                Err(error) => {
                    warn!(%error, "could not build a block template");
                    std::thread::sleep(std::time::Duration::from_secs(2));
                    continue;
                }
            };
            let template_parent = template.previous_block_hash;
            let height = template.height;
            let target = match template.bits.to_expanded() {
                Some(target) => target,
                None => {
                    warn!("template carries an unusable difficulty, retrying");
                    std::thread::sleep(std::time::Duration::from_secs(2));
                    continue;
                }
            };

            // Serialize once; every attempt only rewrites the nonce bytes.
            let mut header_bytes = template
                .header_with_nonce(0)
                .kernel_serialize_to_vec()
                .expect("serializing to a vec never fails");

            match self.grind(&mut header_bytes, target, template_parent) {
                Some(nonce) => {
                    let block = Arc::new(template.into_block(nonce));
                    let hash = block.hash();
                    info!(%hash, height = height.0, nonce, "block mined");
                    // Mined blocks take the same path as blocks from peers.
                    match self.chain.process_new_block(block) {
                        Ok(true) => sync::announce(&self.network, InventoryHash::Block(hash)),
                        Ok(false) => debug!(%hash, "mined block was already known"),
                        Err(error) => warn!(%hash, %error, "mined block was rejected"),
                    }
                }
                None => {
                    // Tip moved or shutdown: just build a fresh template.
                    continue;
                }
            }
        }
        info!("miner stopped");
    }

    /// Search for a nonce whose header hash beats `target`. Returns `None`
    /// if the tip moves away from `parent` (someone else won) or shutdown
    /// is requested.
    fn grind(
        &mut self,
        header_bytes: &mut [u8],
        target: ExpandedDifficulty,
        parent: kernel_chain::block::Hash,
    ) -> Option<u32> {
        let mut nonce: u32 = 0;
        loop {
            if self.shutting_down() {
                return None;
            }
            match *self.tips.borrow() {
                Some(tip) if tip.hash != parent => {
                    debug!(new_tip = %tip.hash, "tip changed, abandoning template");
                    return None;
                }
                _ => {}
            }

            for _ in 0..BATCH_SIZE {
                header_bytes[Header::nonce_offset()..].copy_from_slice(&nonce.to_le_bytes());
                let hash = kernel_chain::block::Hash(sha256d::digest(header_bytes));
                if hash < target {
                    return Some(nonce);
                }
                match nonce.checked_add(1) {
                    Some(next) => nonce = next,
                    // The nonce space is spent; rebuild the template with a
                    // fresh timestamp.
                    None => return None,
                }
            }
        }
    }
}
