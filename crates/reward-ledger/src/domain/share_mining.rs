//! Share mining reward derivation
//!
//! `reward_i = reward_per_block * balance_i / total_supply`, truncated to 18
//! fractional digits. Holders without a positive balance receive nothing, and
//! a block with zero supply credits nobody.

use super::balances::total_supply;
use super::config::ShareMiningSchedule;
use shared_types::{Address, Amount, AmountError, BlockNumber};

/// Credits owed for `block_number` given the token balances after the block.
///
/// Returns an empty list outside the schedule window.
pub fn share_credits(
    schedule: &ShareMiningSchedule,
    block_number: BlockNumber,
    balances: &[(Address, Amount)],
) -> Result<Vec<(Address, Amount)>, AmountError> {
    if !schedule.covers(block_number) || !schedule.reward_per_block.is_positive() {
        return Ok(Vec::new());
    }

    let supply = total_supply(balances.iter().map(|(_, b)| *b))?;
    if supply.is_zero() {
        return Ok(Vec::new());
    }

    let mut credits = Vec::new();
    for (holder, balance) in balances.iter().filter(|(_, b)| b.is_positive()) {
        let reward = schedule.reward_per_block.mul_div_down(*balance, supply)?;
        if reward.is_positive() {
            credits.push((*holder, reward));
        }
    }
    Ok(credits)
}
