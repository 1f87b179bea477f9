//! Transaction checks.

use kernel_chain::{
    amount::Amount,
    block::MAX_BLOCK_BYTES,
    transaction::Transaction,
    transparent::Input,
};

use crate::{error::TransactionError, script, CoinView};

/// Checks that the transaction has inputs and outputs.
pub fn has_inputs_and_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        Err(TransactionError::NoInputs)
    } else if tx.outputs.is_empty() {
        Err(TransactionError::NoOutputs)
    } else {
        Ok(())
    }
}

/// Checks that the serialized transaction would fit in a block.
pub fn fits_in_a_block(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.serialized_len() as u64 > MAX_BLOCK_BYTES {
        Err(TransactionError::OversizedTransaction)
    } else {
        Ok(())
    }
}

/// Checks that a coinbase input never appears alongside other inputs.
///
/// The coinbase form is exactly one input with the sentinel outpoint; a
/// transaction smuggling a coinbase input among real spends is malformed.
pub fn coinbase_shape(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.contains_coinbase_input() && !tx.is_coinbase() {
        Err(TransactionError::CoinbaseInputFound)
    } else {
        Ok(())
    }
}

/// Contextual validation of a non-coinbase transaction against the unspent
/// output set: every input must exist, the outputs must not exceed the
/// inputs, and every unlock script must verify.
///
/// Returns the fee (inputs − outputs).
pub fn spend_is_valid(
    tx: &Transaction,
    view: &impl CoinView,
) -> Result<Amount, TransactionError> {
    if tx.is_coinbase() {
        return Err(TransactionError::UnexpectedCoinbase);
    }
    has_inputs_and_outputs(tx)?;
    coinbase_shape(tx)?;

    // First pass: all referenced outputs must exist; sum their values.
    let mut referenced = Vec::with_capacity(tx.inputs.len());
    let mut input_sum = Amount::zero();
    for input in &tx.inputs {
        let outpoint = input
            .outpoint()
            .expect("coinbase_shape rejected coinbase inputs");
        let output = view
            .unspent_output(&outpoint)
            .ok_or(TransactionError::MissingPreviousOutput(outpoint))?;
        input_sum = input_sum.checked_add(output.value)?;
        referenced.push(output);
    }

    let output_sum = Amount::sum(tx.outputs.iter().map(|out| out.value))?;
    if output_sum > input_sum {
        return Err(TransactionError::ValueOverspend {
            inputs: input_sum.base_units(),
            outputs: output_sum.base_units(),
        });
    }

    // Second pass: every input's unlock script must satisfy the lock script
    // of the output it spends.
    for (input_index, output) in referenced.iter().enumerate() {
        script::verify_spend(tx, input_index, &output.lock_script).map_err(|source| {
            TransactionError::Script {
                input_index,
                source,
            }
        })?;
    }

    input_sum
        .checked_sub(output_sum)
        .map_err(TransactionError::from)
}

/// The outpoints a transaction spends. Empty for coinbases.
pub fn spent_outpoints(tx: &Transaction) -> impl Iterator<Item = kernel_chain::transparent::OutPoint> + '_ {
    tx.inputs.iter().filter_map(Input::outpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use kernel_chain::{
        block::Height,
        transaction::LockTime,
        transparent::{CoinbaseData, OutPoint, Output, Script},
    };

    fn coinbase() -> Transaction {
        Transaction::new(
            1,
            vec![Input::new_coinbase(Height(1), CoinbaseData::default())],
            vec![Output::new(
                Amount::from_base_units(5_000_000_000),
                Script::new_p2pkh(&[1; 20]),
            )],
            LockTime::none(),
        )
    }

    #[test]
    fn empty_sides_are_rejected() {
        let no_inputs = Transaction::new(
            1,
            vec![],
            vec![Output::new(Amount::zero(), Script::empty())],
            LockTime::none(),
        );
        assert!(matches!(
            has_inputs_and_outputs(&no_inputs),
            Err(TransactionError::NoInputs)
        ));

        let no_outputs = Transaction::new(
            1,
            vec![Input::new_spend(OutPoint {
                hash: kernel_chain::transaction::Hash([1; 32]),
                index: 0,
            })],
            vec![],
            LockTime::none(),
        );
        assert!(matches!(
            has_inputs_and_outputs(&no_outputs),
            Err(TransactionError::NoOutputs)
        ));
    }

    #[test]
    fn missing_previous_output_is_rejected() {
        let view: HashMap<OutPoint, Output> = HashMap::new();
        let spend = Transaction::new(
            1,
            vec![Input::new_spend(OutPoint {
                hash: kernel_chain::transaction::Hash([2; 32]),
                index: 0,
            })],
            vec![Output::new(Amount::from_base_units(1), Script::empty())],
            LockTime::none(),
        );
        assert!(matches!(
            spend_is_valid(&spend, &view),
            Err(TransactionError::MissingPreviousOutput(_))
        ));
    }

    #[test]
    fn overspends_are_rejected_before_signature_checks() {
        let prev = OutPoint {
            hash: kernel_chain::transaction::Hash([3; 32]),
            index: 0,
        };
        let mut view = HashMap::new();
        view.insert(
            prev,
            Output::new(Amount::from_base_units(100), Script::new_p2pkh(&[4; 20])),
        );
        let spend = Transaction::new(
            1,
            vec![Input::new_spend(prev)],
            vec![Output::new(Amount::from_base_units(101), Script::empty())],
            LockTime::none(),
        );
        assert!(matches!(
            spend_is_valid(&spend, &view),
            Err(TransactionError::ValueOverspend {
                inputs: 100,
                outputs: 101
            })
        ));
    }

    #[test]
    fn coinbases_are_not_spends() {
        let view: HashMap<OutPoint, Output> = HashMap::new();
        assert!(matches!(
            spend_is_valid(&coinbase(), &view),
            Err(TransactionError::UnexpectedCoinbase)
        ));
        assert!(coinbase_shape(&coinbase()).is_ok());
    }
}
