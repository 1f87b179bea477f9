//! Consensus constants: the emission schedule and the retarget rule.

use kernel_chain::amount::COIN;

/// The block subsidy before the first reduction, in base units.
pub const INITIAL_REWARD: u64 = 50 * COIN;

/// Every `HALVING_INTERVAL` blocks, the subsidy is multiplied by
/// `REDUCTION_NUMERATOR / REDUCTION_DENOMINATOR` and truncated.
pub const HALVING_INTERVAL: u32 = 250_000;

/// The subsidy reduction factor, 3/4, kept as a ratio so the schedule is
/// exact integer arithmetic.
pub const REDUCTION_NUMERATOR: u64 = 3;
pub const REDUCTION_DENOMINATOR: u64 = 4;

/// The difficulty target is recomputed every `RESET_INTERVAL` blocks.
pub const RESET_INTERVAL: u32 = 10;

/// The block interval the retarget rule aims for, in seconds.
pub const TARGET_BLOCK_TIME: i64 = 120;

/// The observed mining span a retarget window is compared against.
pub const EXPECTED_SPAN: i64 = RESET_INTERVAL as i64 * TARGET_BLOCK_TIME;

/// Header timestamps more than this many seconds past the local clock are
/// rejected (until the clock catches up).
pub const MAX_FUTURE_BLOCK_TIME: i64 = 7_200;
