//! The script interpreter.
//!
//! The only spendable script form on this chain is pay-to-public-key-hash,
//! so the machine supports data pushes plus the four opcodes that P2PKH
//! needs: `DUP`, `HASH160`, `EQUALVERIFY` and `CHECKSIG`. A spend verifies
//! by evaluating the unlock script followed by the lock script against the
//! spending transaction's signature hash; it succeeds iff the final stack
//! has a truthy top element.

use lazy_static::lazy_static;
use secp256k1::{Message, PublicKey, Secp256k1, Signature, VerifyOnly};
use thiserror::Error;

use kernel_chain::transaction::{SigHash, SighashError, Transaction};
use kernel_chain::transparent::{opcode, Script};

lazy_static! {
    static ref SECP: Secp256k1<VerifyOnly> = Secp256k1::verification_only();
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ScriptError {
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("push of {0} bytes runs past the end of the script")]
    TruncatedPush(usize),

    #[error("stack underflow while executing 0x{0:02x}")]
    StackUnderflow(u8),

    #[error("EQUALVERIFY failed: top two stack elements differ")]
    EqualVerifyFailed,

    #[error("CHECKSIG operand was not a well-formed signature or key")]
    MalformedSignature,

    #[error("script finished with a false or empty stack top")]
    FalseStackTop,

    #[error("signature hash could not be computed: {0}")]
    Sighash(#[from] SighashError),
}

/// Verify input `input_index` of `tx` against the lock script of the output
/// it spends.
pub fn verify_spend(
    tx: &Transaction,
    input_index: usize,
    lock_script: &Script,
) -> Result<(), ScriptError> {
    let sighash = tx.sighash(input_index, lock_script)?;
    let unlock = tx
        .inputs
        .get(input_index)
        .map(|input| input.unlock_script_bytes())
        .unwrap_or_default();
    evaluate(&unlock, lock_script.as_raw_bytes(), &sighash)
}

/// Evaluate `unlock ∥ lock` against the signature hash `sighash`.
pub fn evaluate(unlock: &[u8], lock: &[u8], sighash: &SigHash) -> Result<(), ScriptError> {
    let mut stack: Vec<Vec<u8>> = Vec::new();
    run(unlock, &mut stack, sighash)?;
    run(lock, &mut stack, sighash)?;

    match stack.pop() {
        Some(top) if is_truthy(&top) => Ok(()),
        _ => Err(ScriptError::FalseStackTop),
    }
}

fn run(script: &[u8], stack: &mut Vec<Vec<u8>>, sighash: &SigHash) -> Result<(), ScriptError> {
    let mut pc = 0usize;
    while pc < script.len() {
        let op = script[pc];
        pc += 1;
        match op {
            1..=opcode::MAX_PUSH => {
                let len = op as usize;
                if pc + len > script.len() {
                    return Err(ScriptError::TruncatedPush(len));
                }
                stack.push(script[pc..pc + len].to_vec());
                pc += len;
            }
            opcode::DUP => {
                let top = stack
                    .last()
                    .cloned()
                    .ok_or(ScriptError::StackUnderflow(op))?;
                stack.push(top);
            }
            opcode::HASH160 => {
                let top = stack.pop().ok_or(ScriptError::StackUnderflow(op))?;
                stack.push(kernel_chain::transparent::hash160(&top).to_vec());
            }
            opcode::EQUALVERIFY => {
                let a = stack.pop().ok_or(ScriptError::StackUnderflow(op))?;
                let b = stack.pop().ok_or(ScriptError::StackUnderflow(op))?;
                if a != b {
                    return Err(ScriptError::EqualVerifyFailed);
                }
            }
            opcode::CHECKSIG => {
                let pub_key = stack.pop().ok_or(ScriptError::StackUnderflow(op))?;
                let sig_with_type = stack.pop().ok_or(ScriptError::StackUnderflow(op))?;
                stack.push(if check_sig(&sig_with_type, &pub_key, sighash)? {
                    vec![1]
                } else {
                    vec![]
                });
            }
            other => return Err(ScriptError::UnknownOpcode(other)),
        }
    }
    Ok(())
}

/// ECDSA verification of `<DER signature ∥ sighash byte>` by `pub_key` over
/// the 32-byte digest.
///
/// A structurally broken signature or key is an error; a well-formed
/// signature that simply does not verify pushes false, like Bitcoin's
/// CHECKSIG.
fn check_sig(
    sig_with_type: &[u8],
    pub_key: &[u8],
    sighash: &SigHash,
) -> Result<bool, ScriptError> {
    if sig_with_type.is_empty() {
        return Err(ScriptError::MalformedSignature);
    }
    let der = &sig_with_type[..sig_with_type.len() - 1];
    let signature = Signature::from_der(der).map_err(|_| ScriptError::MalformedSignature)?;
    let pub_key = PublicKey::from_slice(pub_key).map_err(|_| ScriptError::MalformedSignature)?;
    let message =
        Message::from_slice(sighash.as_ref()).map_err(|_| ScriptError::MalformedSignature)?;
    Ok(SECP.verify(&message, &signature, &pub_key).is_ok())
}

fn is_truthy(element: &[u8]) -> bool {
    element.iter().any(|&b| b != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_chain::transaction::SIGHASH_ALL;

    fn dummy_sighash() -> SigHash {
        SigHash([0x5au8; 32])
    }

    #[test]
    fn empty_scripts_leave_a_false_stack() {
        assert_eq!(
            evaluate(&[], &[], &dummy_sighash()),
            Err(ScriptError::FalseStackTop)
        );
    }

    #[test]
    fn push_and_equalverify() {
        // <1> <1> EQUALVERIFY <1> leaves a truthy top.
        let script = [0x01, 0x07, 0x01, 0x07, opcode::EQUALVERIFY, 0x01, 0x01];
        assert!(evaluate(&script, &[], &dummy_sighash()).is_ok());

        let bad = [0x01, 0x07, 0x01, 0x08, opcode::EQUALVERIFY];
        assert_eq!(
            evaluate(&bad, &[], &dummy_sighash()),
            Err(ScriptError::EqualVerifyFailed)
        );
    }

    #[test]
    fn truncated_pushes_are_rejected() {
        let script = [0x05, 0x01];
        assert_eq!(
            evaluate(&script, &[], &dummy_sighash()),
            Err(ScriptError::TruncatedPush(5))
        );
    }

    #[test]
    fn unknown_opcodes_are_rejected() {
        assert_eq!(
            evaluate(&[0x51], &[], &dummy_sighash()),
            Err(ScriptError::UnknownOpcode(0x51))
        );
    }

    #[test]
    fn p2pkh_end_to_end() {
        use kernel_chain::{
            amount::Amount,
            transaction::{LockTime, Transaction},
            transparent::{Address, Input, OutPoint, Output, Script},
        };
        use secp256k1::{rand::rngs::OsRng, Secp256k1};

        let secp = Secp256k1::new();
        let mut rng = OsRng::new().expect("OS rng is available");
        let (secret_key, public_key) = secp.generate_keypair(&mut rng);
        let address = Address::from_pub_key(&public_key);
        let lock_script = address.lock_script();

        let mut tx = Transaction::new(
            1,
            vec![Input::new_spend(OutPoint {
                hash: kernel_chain::transaction::Hash([0x44; 32]),
                index: 0,
            })],
            vec![Output::new(
                Amount::from_base_units(1_000_000_000),
                Script::new_p2pkh(&[0x55; 20]),
            )],
            LockTime::none(),
        );

        // Sign input 0 the way the wallet does.
        let sighash = tx.sighash(0, &lock_script).unwrap();
        let message = Message::from_slice(sighash.as_ref()).unwrap();
        let signature = secp.sign(&message, &secret_key);
        let mut sig_bytes = signature.serialize_der().to_vec();
        sig_bytes.push(SIGHASH_ALL as u8);
        tx.inputs[0] = Input::PrevOut {
            outpoint: OutPoint {
                hash: kernel_chain::transaction::Hash([0x44; 32]),
                index: 0,
            },
            unlock_script: Script::new_p2pkh_unlock(&sig_bytes, &public_key.serialize()),
            sequence: kernel_chain::transparent::SEQUENCE_FINAL,
        };

        assert!(verify_spend(&tx, 0, &lock_script).is_ok());

        // Flipping a signature byte must fail verification.
        let mut bad_sig = sig_bytes.clone();
        bad_sig[10] ^= 0x01;
        let mut bad_tx = tx.clone();
        bad_tx.inputs[0] = Input::PrevOut {
            outpoint: OutPoint {
                hash: kernel_chain::transaction::Hash([0x44; 32]),
                index: 0,
            },
            unlock_script: Script::new_p2pkh_unlock(&bad_sig, &public_key.serialize()),
            sequence: kernel_chain::transparent::SEQUENCE_FINAL,
        };
        assert!(verify_spend(&bad_tx, 0, &lock_script).is_err());

        // Paying to a different key hash must fail EQUALVERIFY.
        let wrong_lock = Script::new_p2pkh(&[0x99; 20]);
        assert_eq!(
            verify_spend(&tx, 0, &wrong_lock),
            Err(ScriptError::EqualVerifyFailed)
        );
    }
}
