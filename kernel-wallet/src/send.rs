//! Coin selection, fee estimation, and signing.

use secp256k1::{Message, Secp256k1};
use thiserror::Error;
use tracing::debug;

use kernel_chain::{
    amount::Amount,
    parameters::TX_VERSION,
    transaction::{LockTime, SighashError, Transaction, SIGHASH_ALL},
    transparent::{Address, Input, OutPoint, Output, Script, SEQUENCE_FINAL},
};
use kernel_state::{Mempool, Store, StateError};

use crate::WalletFile;

/// Size model for fee estimation, in bytes: a fixed overhead plus a cost
/// per input and per output. Inputs dominate (outpoint + signature +
/// public key).
pub const TX_BASE_SIZE: usize = 10;
pub const TX_INPUT_SIZE: usize = 148;
pub const TX_OUTPUT_SIZE: usize = 34;

#[derive(Error, Debug)]
pub enum SendError {
    #[error("no spendable outputs for this wallet")]
    NoSpendableOutputs,

    #[error("insufficient funds: {required} required (amount + fee), {available} available")]
    InsufficientFunds { available: Amount, required: Amount },

    #[error("the stored key cannot sign this transaction")]
    BadKey,

    #[error("amount arithmetic overflowed")]
    AmountOverflow,

    #[error("signature hash failure: {0}")]
    Sighash(#[from] SighashError),

    #[error("state read failed: {0}")]
    State(#[from] StateError),

    #[error("wallet error: {0}")]
    Wallet(#[from] crate::WalletError),
}

/// A requested payment.
#[derive(Clone, Debug)]
pub struct SendRequest {
    pub to: Address,
    pub amount: Amount,
    /// Base units per estimated byte.
    pub fee_rate: u64,
}

fn estimate_size(inputs: usize, outputs: usize) -> usize {
    TX_BASE_SIZE + inputs * TX_INPUT_SIZE + outputs * TX_OUTPUT_SIZE
}

fn fee_for(inputs: usize, outputs: usize, fee_rate: u64) -> Amount {
    Amount::from_base_units(estimate_size(inputs, outputs) as u64 * fee_rate)
}

/// Build and sign a payment from `wallet`.
///
/// Coins are selected smallest-first from the wallet's confirmed unspent
/// outputs, skipping anything already spent by a mempool transaction.
/// Change (when nonzero) returns to the sender.
pub fn build_transaction(
    wallet: &WalletFile,
    request: &SendRequest,
    store: &Store,
    mempool: &Mempool,
) -> Result<Transaction, SendError> {
    let from = wallet.address()?;
    let from_script = from.lock_script();
    let secret = wallet.secret_key()?;

    // Confirmed outputs not already promised to a pending transaction.
    let pending_spends = mempool.spent_outpoints();
    let mut spendable: Vec<(OutPoint, Amount)> = store
        .spendable_outputs(&from.pub_key_hash())?
        .into_iter()
        .filter(|(outpoint, _)| !pending_spends.contains(outpoint))
        .collect();
    if spendable.is_empty() {
        return Err(SendError::NoSpendableOutputs);
    }
    spendable.sort_by_key(|(_, value)| *value);

    // Select coins until the running total covers amount + fee at the
    // current input count (two outputs assumed: payment + change).
    let mut selected: Vec<OutPoint> = Vec::new();
    let mut total = Amount::zero();
    for (outpoint, value) in spendable {
        selected.push(outpoint);
        total = total
            .checked_add(value)
            .map_err(|_| SendError::AmountOverflow)?;
        let fee = fee_for(selected.len(), 2, request.fee_rate);
        if let Ok(covered) = total.checked_sub(request.amount) {
            if covered >= fee {
                break;
            }
        }
    }

    let fee = fee_for(selected.len(), 2, request.fee_rate);
    let required = request
        .amount
        .checked_add(fee)
        .map_err(|_| SendError::AmountOverflow)?;
    if total < required {
        return Err(SendError::InsufficientFunds {
            available: total,
            required,
        });
    }

    let change = total
        .checked_sub(required)
        .expect("required is covered by total");
    let mut outputs = vec![Output::new(request.amount, request.to.lock_script())];
    if change > Amount::zero() {
        outputs.push(Output::new(change, from_script.clone()));
    }

    let mut tx = Transaction::new(
        TX_VERSION,
        selected.iter().map(|&outpoint| Input::new_spend(outpoint)).collect(),
        outputs,
        LockTime::none(),
    );

    // Sign every input against the sender's lock script.
    let secp = Secp256k1::new();
    let public = secp256k1::PublicKey::from_secret_key(&secp, &secret);
    for index in 0..tx.inputs.len() {
        let sighash = tx.sighash(index, &from_script)?;
        let message = Message::from_slice(sighash.as_ref()).map_err(|_| SendError::BadKey)?;
        let signature = secp.sign(&message, &secret);
        let mut sig_bytes = signature.serialize_der().to_vec();
        sig_bytes.push(SIGHASH_ALL as u8);
        let outpoint = selected[index];
        tx.inputs[index] = Input::PrevOut {
            outpoint,
            unlock_script: Script::new_p2pkh_unlock(&sig_bytes, &public.serialize()),
            sequence: SEQUENCE_FINAL,
        };
    }

    debug!(
        txid = %tx.hash(),
        inputs = tx.inputs.len(),
        outputs = tx.outputs.len(),
        fee = fee.base_units(),
        "transaction built"
    );
    Ok(tx)
}
