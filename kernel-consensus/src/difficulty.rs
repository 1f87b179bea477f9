//! The difficulty retarget rule.
//!
//! Every `RESET_INTERVAL` blocks, the target is scaled by the ratio of the
//! observed span of the previous window to the expected span, clamped to
//! [0.25, 4.0]. Off-retarget blocks inherit their parent's bits.

use primitive_types::U256;
use tracing::debug;

use kernel_chain::{
    block::Height,
    work::difficulty::{CompactDifficulty, ExpandedDifficulty},
};

use crate::parameters::{EXPECTED_SPAN, RESET_INTERVAL};

/// Is `height` a block at which the target is recomputed?
pub fn retarget_due(height: Height) -> bool {
    height.0 > 0 && height.0 % RESET_INTERVAL == 0
}

/// The bits for a block at `height`, given its parent's bits and the
/// observed span of the closing window (parent timestamp minus the timestamp
/// `RESET_INTERVAL` blocks before it).
///
/// Callers pass `observed_span` only on retarget heights; elsewhere the
/// parent bits flow through untouched.
pub fn next_difficulty(
    height: Height,
    parent_bits: CompactDifficulty,
    observed_span: impl FnOnce() -> Option<i64>,
) -> CompactDifficulty {
    if !retarget_due(height) {
        return parent_bits;
    }
    let span = match observed_span() {
        Some(span) => span,
        // A window shorter than the chain (right after genesis) keeps the
        // parent bits.
        None => return parent_bits,
    };
    let new_bits = retarget(parent_bits, span);
    if new_bits != parent_bits {
        debug!(%new_bits, %parent_bits, span, "difficulty readjusted");
    }
    new_bits
}

/// Scale `parent_bits` by `observed_span / EXPECTED_SPAN`, clamping the
/// ratio to [0.25, 4.0] and the result to the target limit.
///
/// A non-positive span (clock skew across the window) clamps to 0.25× like
/// any other too-fast window.
pub fn retarget(parent_bits: CompactDifficulty, observed_span: i64) -> CompactDifficulty {
    let last_target = match parent_bits.to_expanded() {
        Some(target) => target,
        // A degenerate encoding cannot be scaled; keep it.
        None => return parent_bits,
    };

    let clamped_span = observed_span.max(EXPECTED_SPAN / 4).min(EXPECTED_SPAN * 4) as u64;

    // last_target · clamped_span / EXPECTED_SPAN in 256 bits, splitting the
    // division so the intermediate product cannot overflow silently:
    // ⌊t·c/e⌋ = ⌊t/e⌋·c + ⌊(t mod e)·c/e⌋.
    let t = last_target.to_u256();
    let c = U256::from(clamped_span);
    let e = U256::from(EXPECTED_SPAN as u64);
    let limit = ExpandedDifficulty::target_difficulty_limit().to_u256();
    let scaled = match (t / e).checked_mul(c) {
        Some(whole) => match whole.checked_add((t % e) * c / e) {
            Some(sum) => sum,
            None => limit,
        },
        // Overflow past 2²⁵⁶ is far past the limit.
        None => limit,
    };

    let capped = scaled.min(limit);
    ExpandedDifficulty::from_u256(capped).to_compact()
}
