//! The local RPC surface: line-oriented JSON over TCP.
//!
//! One request per line, `{"command": "...", "params": {...}}`; one JSON
//! response per line, `{"status": "success", ...}` or
//! `{"status": "error", "message": "..."}`. This is a trusted local
//! interface for the wallet front-end and mining control; it is not meant
//! to face the open network.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use kernel_chain::{
    amount::{Amount, COIN},
    block::Block,
    transparent::Address,
    KernelDeserialize, KernelSerialize,
};
use kernel_network::{sync, InventoryHash, NetworkContext};
use kernel_state::ChainManager;
use kernel_wallet::{SendRequest, WalletStore};

/// How long `get_work` blocks waiting for a tip change before returning the
/// current template anyway.
const GET_WORK_WAIT: Duration = Duration::from_secs(60);

/// Shared handles for request dispatch.
#[derive(Clone)]
pub struct RpcContext {
    pub chain: Arc<ChainManager>,
    pub wallets: WalletStore,
    pub network: NetworkContext,
    /// The miner payout key, when mining is configured.
    pub miner_pub_key_hash: Option<[u8; 20]>,
    /// Flipping this asks the whole daemon to stop.
    pub shutdown: Arc<watch::Sender<bool>>,
}

#[derive(Deserialize)]
struct Request {
    command: String,
    #[serde(default)]
    params: Value,
}

/// Accept-and-serve loop. Returns when shutdown flips.
pub async fn serve(ctx: RpcContext, listener: TcpListener) {
    info!(
        addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        "RPC server listening"
    );
    let mut shutdown = ctx.shutdown.subscribe();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!(%addr, "RPC connection");
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        if let Err(error) = serve_connection(ctx, stream).await {
                            debug!(%addr, %error, "RPC connection ended");
                        }
                    });
                }
                Err(error) => warn!(%error, "RPC accept failed"),
            },
            _ = shutdown.changed() => {
                info!("RPC server stopping");
                return;
            }
        }
    }
}

async fn serve_connection(ctx: RpcContext, stream: TcpStream) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(&ctx, request).await,
            Err(error) => error_response(format!("request is not valid JSON: {}", error)),
        };
        let mut payload = response.to_string();
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await?;
    }
    Ok(())
}

fn error_response(message: impl Into<String>) -> Value {
    json!({ "status": "error", "message": message.into() })
}

async fn dispatch(ctx: &RpcContext, request: Request) -> Value {
    debug!(command = %request.command, "RPC request");
    match request.command.as_str() {
        "ping" => json!({ "status": "success", "message": "pong" }),
        "create_wallet" => create_wallet(ctx, &request.params),
        "get_wallets" => get_wallets(ctx),
        "send_tx" => send_tx(ctx, &request.params),
        "get_work" => get_work(ctx).await,
        "submit_block" => submit_block(ctx, &request.params),
        "get_chain_height" => {
            let height = ctx
                .chain
                .tip()
                .map(|tip| tip.height.0 as i64)
                .unwrap_or(-1);
            json!({ "status": "success", "height": height })
        }
        "shutdown" => {
            info!("shutdown requested over RPC");
            let _ = ctx.shutdown.send(true);
            json!({ "status": "success", "message": "daemon shutdown initiated" })
        }
        other => error_response(format!("command '{}' not recognized", other)),
    }
}

fn create_wallet(ctx: &RpcContext, params: &Value) -> Value {
    let name = match params.get("name").and_then(Value::as_str) {
        Some(name) => name,
        None => return error_response("wallet name is required"),
    };
    match ctx.wallets.create(name) {
        Ok(wallet) => json!({
            "status": "success",
            "message": format!("wallet '{}' created", name),
            "wallet": { "WalletName": wallet.name, "PublicAddress": wallet.public_address },
        }),
        Err(error) => error_response(error.to_string()),
    }
}

fn get_wallets(ctx: &RpcContext) -> Value {
    let wallets = match ctx.wallets.list() {
        Ok(wallets) => wallets,
        Err(error) => return error_response(error.to_string()),
    };
    let mut listed = Vec::new();
    for wallet in wallets {
        let balance = wallet
            .address()
            .ok()
            .and_then(|address| {
                ctx.chain
                    .store()
                    .balance_by_pub_key_hash(&address.pub_key_hash())
                    .ok()
            })
            .unwrap_or(Amount::zero());
        listed.push(json!({
            "WalletName": wallet.name,
            "PublicAddress": wallet.public_address,
            "balance": balance.to_coins(),
        }));
    }
    json!({ "status": "success", "wallets": listed })
}

#[derive(Deserialize)]
struct SendTxParams {
    from: String,
    to: String,
    amount: f64,
    #[serde(default = "default_fee_rate")]
    fee_rate: u64,
}

fn default_fee_rate() -> u64 {
    5
}

fn send_tx(ctx: &RpcContext, params: &Value) -> Value {
    let params: SendTxParams = match serde_json::from_value(params.clone()) {
        Ok(params) => params,
        Err(error) => return error_response(format!("bad send_tx parameters: {}", error)),
    };
    if !params.amount.is_finite() || params.amount <= 0.0 {
        return error_response("amount must be a positive number of coins");
    }
    let amount = Amount::from_base_units((params.amount * COIN as f64) as u64);
    let to = match Address::from_str(&params.to) {
        Ok(address) => address,
        Err(_) => return error_response("receiving address does not decode"),
    };
    let wallet = match ctx.wallets.find_by_address(&params.from) {
        Ok(wallet) => wallet,
        Err(error) => return error_response(error.to_string()),
    };

    let request = SendRequest {
        to,
        amount,
        fee_rate: params.fee_rate,
    };
    let tx = match kernel_wallet::send::build_transaction(
        &wallet,
        &request,
        ctx.chain.store(),
        ctx.chain.mempool(),
    ) {
        Ok(tx) => tx,
        Err(error) => return error_response(error.to_string()),
    };
    let txid = tx.hash();

    if let Err(error) = ctx.chain.mempool().admit(tx, ctx.chain.store()) {
        return error_response(format!("transaction rejected: {}", error));
    }
    sync::announce(&ctx.network, InventoryHash::Tx(txid));
    json!({
        "status": "success",
        "message": "transaction accepted and relayed",
        "txid": txid.to_string(),
    })
}

/// Wait (up to a bound) for a new tip, then return a block template for
/// external miners.
async fn get_work(ctx: &RpcContext) -> Value {
    let miner = match ctx.miner_pub_key_hash {
        Some(miner) => miner,
        None => return error_response("mining is not configured (no miner wallet)"),
    };
    let mut tips = ctx.chain.tip_watcher();
    let _ = timeout(GET_WORK_WAIT, tips.changed()).await;

    let template = match ctx.chain.build_block_template(&miner) {
        Ok(template) => template,
        Err(error) => return error_response(error.to_string()),
    };
    let transactions: Vec<String> = template
        .transactions
        .iter()
        .map(|tx| {
            hex::encode(
                tx.kernel_serialize_to_vec()
                    .expect("serializing to a vec never fails"),
            )
        })
        .collect();
    json!({
        "status": "success",
        "template": {
            "version": template.version,
            "previous_block_hash": template.previous_block_hash.to_string(),
            "height": template.height.0,
            "time": template.time.timestamp(),
            "bits": template.bits.to_string(),
            "merkle_root": template.merkle_root.to_string(),
            "transactions": transactions,
            "total_fees": template.total_fees.base_units(),
        },
    })
}

fn submit_block(ctx: &RpcContext, params: &Value) -> Value {
    let block_hex = match params.get("block_hex").and_then(Value::as_str) {
        Some(block_hex) => block_hex,
        None => return error_response("block_hex parameter is required"),
    };
    let raw = match hex::decode(block_hex) {
        Ok(raw) => raw,
        Err(_) => return error_response("block_hex is not valid hex"),
    };
    let block = match Block::kernel_deserialize(&raw[..]) {
        Ok(block) => Arc::new(block),
        Err(error) => return error_response(format!("block does not parse: {}", error)),
    };
    let hash = block.hash();
    match ctx.chain.process_new_block(block) {
        Ok(true) => {
            sync::announce(&ctx.network, InventoryHash::Block(hash));
            json!({
                "status": "success",
                "message": format!("block {} accepted", hash),
            })
        }
        Ok(false) => error_response("block is already known"),
        Err(error) => error_response(format!("block rejected: {}", error)),
    }
}
