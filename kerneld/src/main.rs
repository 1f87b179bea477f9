//! The Kernel daemon: wires storage, consensus, networking, RPC and the
//! miner together and runs until asked to stop.

mod config;
mod miner;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use color_eyre::eyre::{eyre, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use kernel_network::{peer, NetworkContext, PeerSet};
use kernel_rpc::RpcContext;
use kernel_state::{ChainManager, Mempool, Store};
use kernel_wallet::WalletStore;

use config::Config;
use miner::Miner;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data/config.toml".to_string());
    let config = Config::load_or_create(Path::new(&config_path))?;
    info!(?config_path, "configuration loaded");

    // State: open the store, bootstrap genesis, reconcile the UTXO set.
    let state_config = kernel_state::Config::new(&config.network.data_dir);
    let store = Store::open(&state_config)?;
    let mempool = Mempool::new(&store)?;
    let chain = ChainManager::new(store.clone(), mempool)?;
    chain.init_genesis()?;
    chain.check_utxo_consistency()?;
    let tip = chain.tip().ok_or_else(|| eyre!("no tip after genesis bootstrap"))?;
    info!(height = tip.height.0, hash = %tip.hash, "chain state ready");

    // Wallets and the miner payout key.
    let wallets = WalletStore::open(&config.network.data_dir)?;
    let miner_pub_key_hash = if config.mining.enabled && !config.mining.wallet.is_empty() {
        match wallets
            .get(&config.mining.wallet)
            .and_then(|wallet| wallet.address())
        {
            Ok(address) => Some(address.pub_key_hash()),
            Err(error) => {
                warn!(
                    wallet = %config.mining.wallet,
                    %error,
                    "miner wallet could not be loaded; mining disabled"
                );
                None
            }
        }
    } else {
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let p2p_addr: SocketAddr = format!("{}:{}", config.network.host, config.p2p.port)
        .parse()
        .map_err(|_| eyre!("invalid [network] host / [p2p] port combination"))?;
    let rpc_addr: SocketAddr = format!("{}:{}", config.network.host, config.rpc_port())
        .parse()
        .map_err(|_| eyre!("invalid [network] host / [api] port combination"))?;

    let peers = Arc::new(PeerSet::new());
    let network = NetworkContext {
        chain: chain.clone(),
        peers,
        shutdown: shutdown_rx.clone(),
        local_addr: p2p_addr,
    };

    // The miner gets its own OS thread; everything else runs on the tokio
    // runtime.
    let miner_thread = miner_pub_key_hash.map(|pub_key_hash| {
        let miner = Miner::new(
            chain.clone(),
            network.clone(),
            pub_key_hash,
            shutdown_rx.clone(),
        );
        std::thread::Builder::new()
            .name("miner".to_string())
            .spawn(move || miner.run())
            .expect("spawning the miner thread succeeds")
    });
    if miner_thread.is_none() {
        info!("built-in miner is disabled");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let p2p_listener = TcpListener::bind(p2p_addr).await?;
        tokio::spawn(peer::listen(network.clone(), p2p_listener));

        let rpc_listener = TcpListener::bind(rpc_addr).await?;
        let rpc_context = RpcContext {
            chain: chain.clone(),
            wallets,
            network: network.clone(),
            miner_pub_key_hash,
            shutdown: shutdown_tx.clone(),
        };
        tokio::spawn(kernel_rpc::serve(rpc_context, rpc_listener));
        info!(p2p = %p2p_addr, rpc = %rpc_addr, "listeners started");

        for (label, address) in &config.seed_nodes {
            match address.parse::<SocketAddr>() {
                Ok(addr) => {
                    info!(seed = %label, %addr, "dialing seed node");
                    tokio::spawn(peer::connect(network.clone(), addr));
                }
                Err(_) => warn!(seed = %label, %address, "seed node address does not parse"),
            }
        }

        // Run until an RPC shutdown or a signal.
        let mut shutdown = shutdown_rx.clone();
        tokio::select! {
            _ = shutdown.changed() => {
                info!("shutdown requested");
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("interrupt received, shutting down");
                let _ = shutdown_tx.send(true);
            }
        }

        // Give peer and server tasks a moment to observe the flag.
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        Ok::<(), color_eyre::eyre::Report>(())
    })?;

    if let Some(handle) = miner_thread {
        if handle.join().is_err() {
            warn!("miner thread panicked during shutdown");
        }
    }
    store.flush()?;
    info!("shutdown complete");
    Ok(())
}
