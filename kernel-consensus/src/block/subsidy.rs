//! Block subsidies and miner fees.

use primitive_types::U256;

use kernel_chain::{amount::Amount, block::Block, block::Height, transaction::Transaction};

use crate::{
    error::{BlockError, SubsidyError},
    parameters::{HALVING_INTERVAL, INITIAL_REWARD, REDUCTION_DENOMINATOR, REDUCTION_NUMERATOR},
    CoinView,
};

/// The block subsidy at `height`.
///
/// Starts at `INITIAL_REWARD` and shrinks by the 3/4 reduction factor every
/// `HALVING_INTERVAL` blocks: `⌊INITIAL_REWARD · 3^k / 4^k⌋`, computed in
/// exact 256-bit arithmetic so the schedule never depends on float rounding.
/// The subsidy reaches zero (at the 78th reduction) and stays there.
pub fn block_subsidy(height: Height) -> Amount {
    let reductions = height.0 / HALVING_INTERVAL;
    // 3^k overflows a U256 long after the subsidy hits zero.
    if reductions >= 100 {
        return Amount::zero();
    }
    let k = U256::from(reductions);
    let numerator = U256::from(INITIAL_REWARD) * U256::from(REDUCTION_NUMERATOR).pow(k);
    let subsidy = numerator / U256::from(REDUCTION_DENOMINATOR).pow(k);
    Amount::from_base_units(subsidy.low_u64())
}

/// The fee paid by a non-coinbase transaction: referenced inputs minus
/// outputs.
pub fn transaction_fee(
    tx: &Transaction,
    view: &impl CoinView,
) -> Result<Amount, SubsidyError> {
    let mut input_sum = Amount::zero();
    for input in &tx.inputs {
        if let Some(outpoint) = input.outpoint() {
            let output = view
                .unspent_output(&outpoint)
                .ok_or(SubsidyError::MissingFeeInput(outpoint))?;
            input_sum = input_sum.checked_add(output.value)?;
        }
    }
    let output_sum = Amount::sum(tx.outputs.iter().map(|out| out.value))?;
    Ok(input_sum.checked_sub(output_sum)?)
}

/// Returns `Ok(())` if the coinbase claims no more than the block subsidy
/// plus `total_fees`.
pub fn coinbase_value_is_valid(
    block: &Block,
    height: Height,
    total_fees: Amount,
) -> Result<(), BlockError> {
    let coinbase = block
        .transactions
        .get(0)
        .ok_or(SubsidyError::NoCoinbase)?;
    let claimed = Amount::sum(coinbase.outputs.iter().map(|out| out.value))
        .map_err(SubsidyError::from)?;
    let allowed = block_subsidy(height)
        .checked_add(total_fees)
        .map_err(SubsidyError::from)?;
    if claimed > allowed {
        return Err(SubsidyError::ExcessiveCoinbase {
            claimed: claimed.base_units(),
            allowed: allowed.base_units(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsidy_schedule_matches_the_published_values() {
        assert_eq!(
            block_subsidy(Height(0)),
            Amount::from_base_units(5_000_000_000)
        );
        assert_eq!(
            block_subsidy(Height(HALVING_INTERVAL - 1)),
            Amount::from_base_units(5_000_000_000)
        );
        assert_eq!(
            block_subsidy(Height(HALVING_INTERVAL)),
            Amount::from_base_units(3_750_000_000)
        );
        assert_eq!(
            block_subsidy(Height(2 * HALVING_INTERVAL)),
            Amount::from_base_units(2_812_500_000)
        );
    }

    #[test]
    fn subsidy_reaches_zero_and_stays_there() {
        // 50·10⁸ · (3/4)^77 ≈ 1.19, and one reduction later it is below 1.
        assert_eq!(
            block_subsidy(Height(77 * HALVING_INTERVAL)),
            Amount::from_base_units(1)
        );
        assert_eq!(block_subsidy(Height(78 * HALVING_INTERVAL)), Amount::zero());
        assert_eq!(
            block_subsidy(Height(200 * HALVING_INTERVAL)),
            Amount::zero()
        );
        for reductions in 1..100u32 {
            let here = block_subsidy(Height(reductions * HALVING_INTERVAL));
            let before = block_subsidy(Height((reductions - 1) * HALVING_INTERVAL));
            assert!(here <= before);
        }
    }
}
