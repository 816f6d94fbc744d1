//! Balance aggregation
//!
//! Incrementally maintained `(token, holder) -> balance` cache. The stored
//! token events remain the source of truth; see
//! `LedgerService::recompute_balance`.

use shared_types::{Address, Amount, AmountError};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct BalanceBook {
    balances: HashMap<Address, HashMap<Address, Amount>>,
}

impl BalanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `holder` in `token`; zero for unknown pairs.
    pub fn balance_of(&self, token: &Address, holder: &Address) -> Amount {
        self.balances
            .get(token)
            .and_then(|holders| holders.get(holder))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Add a signed delta. Zero balances are dropped from the cache.
    pub fn apply_delta(
        &mut self,
        token: &Address,
        holder: &Address,
        delta: Amount,
    ) -> Result<Amount, AmountError> {
        let next = self
            .balance_of(token, holder)
            .checked_add(delta)
            .ok_or(AmountError::Overflow)?;

        let holders = self.balances.entry(*token).or_default();
        if next.is_zero() {
            holders.remove(holder);
            if holders.is_empty() {
                self.balances.remove(token);
            }
        } else {
            holders.insert(*holder, next);
        }
        Ok(next)
    }

    /// Non-zero balances of a token, ordered by holder.
    pub fn holders(&self, token: &Address) -> Vec<(Address, Amount)> {
        let mut holders: Vec<(Address, Amount)> = self
            .balances
            .get(token)
            .map(|h| h.iter().map(|(a, b)| (*a, *b)).collect())
            .unwrap_or_default();
        holders.sort_by(|a, b| a.0.cmp(&b.0));
        holders
    }

    /// Sum of positive balances. Mint sources carry negative balances and are
    /// excluded.
    pub fn total_supply(&self, token: &Address) -> Result<Amount, AmountError> {
        total_supply(self.holders(token).iter().map(|(_, b)| *b))
    }
}

pub(crate) fn total_supply<I>(balances: I) -> Result<Amount, AmountError>
where
    I: IntoIterator<Item = Amount>,
{
    Amount::checked_sum(balances.into_iter().filter(|b| b.is_positive()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: Address = [0xAA; 20];
    const ALICE: Address = [1u8; 20];
    const BOB: Address = [2u8; 20];

    #[test]
    fn test_unknown_pair_is_zero() {
        let book = BalanceBook::new();
        assert_eq!(book.balance_of(&TOKEN, &ALICE), Amount::ZERO);
    }

    #[test]
    fn test_signed_deltas_accumulate() {
        let mut book = BalanceBook::new();
        book.apply_delta(&TOKEN, &ALICE, Amount::from_whole(100)).unwrap();
        book.apply_delta(&TOKEN, &ALICE, Amount::from_whole(-30)).unwrap();
        assert_eq!(book.balance_of(&TOKEN, &ALICE), Amount::from_whole(70));
    }

    #[test]
    fn test_zero_balance_removed_from_holders() {
        let mut book = BalanceBook::new();
        book.apply_delta(&TOKEN, &ALICE, Amount::from_whole(5)).unwrap();
        book.apply_delta(&TOKEN, &BOB, Amount::from_whole(3)).unwrap();
        book.apply_delta(&TOKEN, &ALICE, Amount::from_whole(-5)).unwrap();
        assert_eq!(book.holders(&TOKEN), vec![(BOB, Amount::from_whole(3))]);
    }

    #[test]
    fn test_total_supply_ignores_mint_source() {
        let mut book = BalanceBook::new();
        let mint = [0u8; 20];
        book.apply_delta(&TOKEN, &mint, Amount::from_whole(-10)).unwrap();
        book.apply_delta(&TOKEN, &ALICE, Amount::from_whole(6)).unwrap();
        book.apply_delta(&TOKEN, &BOB, Amount::from_whole(4)).unwrap();
        assert_eq!(book.total_supply(&TOKEN).unwrap(), Amount::from_whole(10));
    }

    #[test]
    fn test_overflow_leaves_balance_unchanged() {
        let mut book = BalanceBook::new();
        book.apply_delta(&TOKEN, &ALICE, Amount::from_raw(i128::MAX)).unwrap();
        assert_eq!(
            book.apply_delta(&TOKEN, &ALICE, Amount::from_raw(1)),
            Err(AmountError::Overflow)
        );
        assert_eq!(book.balance_of(&TOKEN, &ALICE), Amount::from_raw(i128::MAX));
    }
}
