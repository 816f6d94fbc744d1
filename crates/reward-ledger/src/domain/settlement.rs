//! Payment settlement bookkeeping
//!
//! Payments, their round allocations and the running paid total per
//! (round, holder). The invariant maintained by the service:
//! `paid(round, holder) <= mature(round, holder)`.
//!
//! Failed payments keep their rows but drop out of the paid total.

use super::entities::{
    Allocation, Payment, PaymentRequest, PaymentStatus, PaymentSummary, RoundPayment,
};
use crate::error::{LedgerError, LedgerResult};
use shared_types::{Address, Amount, AmountError, RoundId};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct SettlementBook {
    payments: BTreeMap<u64, Payment>,
    allocations: BTreeMap<u64, Vec<RoundPayment>>,
    nonces: BTreeMap<u64, u64>,
    paid: HashMap<(RoundId, Address), Amount>,
}

impl SettlementBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paid(&self, round: &RoundId, holder: &Address) -> Amount {
        self.paid
            .get(&(round.clone(), *holder))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn payment(&self, id: u64) -> Option<&Payment> {
        self.payments.get(&id)
    }

    pub fn payment_by_nonce(&self, nonce: u64) -> Option<&Payment> {
        self.nonces.get(&nonce).and_then(|id| self.payments.get(id))
    }

    pub fn highest_nonce(&self) -> Option<u64> {
        self.nonces.keys().next_back().copied()
    }

    pub fn allocations(&self, payment_id: u64) -> &[RoundPayment] {
        self.allocations
            .get(&payment_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Payments authorized but not yet broadcast, in nonce order.
    pub fn pending(&self) -> Vec<Payment> {
        self.with_status(PaymentStatus::Authorized)
    }

    /// Broadcast payments awaiting a receipt, in nonce order.
    pub fn unconfirmed(&self) -> Vec<Payment> {
        self.with_status(PaymentStatus::Broadcast)
    }

    fn with_status(&self, status: PaymentStatus) -> Vec<Payment> {
        let mut payments: Vec<Payment> = self
            .payments
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.nonce);
        payments
    }

    pub fn payments_of(&self, holder: &Address) -> Vec<Payment> {
        self.payments
            .values()
            .filter(|p| &p.holder == holder)
            .cloned()
            .collect()
    }

    pub fn summary(&self, holder: &Address) -> Result<PaymentSummary, AmountError> {
        let payments = self.payments_of(holder);
        let count = |status: PaymentStatus| {
            payments.iter().filter(|p| p.status == status).count()
        };
        Ok(PaymentSummary {
            holder: *holder,
            total_paid: Amount::checked_sum(
                payments
                    .iter()
                    .filter(|p| p.status.counts_as_paid())
                    .map(|p| p.amount),
            )?,
            payment_count: payments.len(),
            unbroadcast_count: count(PaymentStatus::Authorized),
            unconfirmed_count: count(PaymentStatus::Broadcast),
            failed_count: count(PaymentStatus::Failed),
        })
    }

    /// Register a committed payment and its allocations.
    pub fn insert(&mut self, payment: Payment, allocations: Vec<RoundPayment>) -> Result<(), AmountError> {
        if payment.status.counts_as_paid() {
            for allocation in &allocations {
                self.add_paid(allocation, allocation.amount)?;
            }
        }
        self.nonces.insert(payment.nonce, payment.id);
        self.allocations.insert(payment.id, allocations);
        self.payments.insert(payment.id, payment);
        Ok(())
    }

    /// Replace a payment after a status change. A payment that turns
    /// `Failed` releases its allocations.
    pub fn update(&mut self, payment: Payment) -> Result<(), AmountError> {
        let was_paid = self
            .payments
            .get(&payment.id)
            .is_some_and(|p| p.status.counts_as_paid());
        if was_paid && !payment.status.counts_as_paid() {
            let released = self.allocations.get(&payment.id).cloned().unwrap_or_default();
            for allocation in &released {
                let negated = allocation.amount.checked_neg().ok_or(AmountError::Overflow)?;
                self.add_paid(allocation, negated)?;
            }
        }
        self.payments.insert(payment.id, payment);
        Ok(())
    }

    fn add_paid(&mut self, allocation: &RoundPayment, amount: Amount) -> Result<(), AmountError> {
        let key = (allocation.mining_round.clone(), allocation.holder);
        let paid = self.paid.get(&key).copied().unwrap_or(Amount::ZERO);
        let next = paid.checked_add(amount).ok_or(AmountError::Overflow)?;
        self.paid.insert(key, next);
        Ok(())
    }

    /// True when `payment` and its allocations describe exactly `request`.
    pub fn matches_request(&self, payment: &Payment, request: &PaymentRequest) -> bool {
        if payment.holder != request.holder || payment.amount != request.amount {
            return false;
        }
        let mut stored: Vec<(RoundId, Amount)> = self
            .allocations(payment.id)
            .iter()
            .map(|a| (a.mining_round.clone(), a.amount))
            .collect();
        let mut requested: Vec<(RoundId, Amount)> = request
            .allocations
            .iter()
            .map(|a| (a.round.clone(), a.amount))
            .collect();
        stored.sort();
        requested.sort();
        stored == requested
    }
}

/// Structural checks on a payment request: positive amounts, each round
/// mentioned once, allocations adding up to the payment exactly.
pub fn validate_request(request: &PaymentRequest) -> LedgerResult<()> {
    if !request.amount.is_positive() {
        return Err(LedgerError::InvalidAmount {
            reason: format!("payment amount must be positive, got {}", request.amount),
        });
    }
    if request.allocations.is_empty() {
        return Err(LedgerError::AllocationMismatch {
            reason: "payment has no round allocations".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for Allocation { round, amount } in &request.allocations {
        if !amount.is_positive() {
            return Err(LedgerError::AllocationMismatch {
                reason: format!("allocation to round {round} must be positive, got {amount}"),
            });
        }
        if !seen.insert(round) {
            return Err(LedgerError::AllocationMismatch {
                reason: format!("round {round} allocated more than once"),
            });
        }
    }

    let allocated = Amount::checked_sum(request.allocations.iter().map(|a| a.amount))?;
    if allocated != request.amount {
        return Err(LedgerError::AllocationMismatch {
            reason: format!(
                "allocations sum to {allocated}, payment amount is {}",
                request.amount
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = [1u8; 20];

    fn round(id: &str) -> RoundId {
        RoundId::new(id).unwrap()
    }

    fn request(amount: i64, allocations: &[(&str, i64)]) -> PaymentRequest {
        PaymentRequest {
            holder: ALICE,
            amount: Amount::from_whole(amount),
            allocations: allocations
                .iter()
                .map(|(r, a)| Allocation::new(round(r), Amount::from_whole(*a)))
                .collect(),
            nonce: None,
        }
    }

    fn payment(id: u64, nonce: u64, amount: i64) -> Payment {
        Payment {
            id,
            holder: ALICE,
            amount: Amount::from_whole(amount),
            pay_time: 0,
            nonce,
            transaction_hash: None,
            status: PaymentStatus::Authorized,
        }
    }

    fn allocation(id: u64, round_id: &str, amount: i64, payment_id: u64) -> RoundPayment {
        RoundPayment {
            id,
            mining_round: round(round_id),
            holder: ALICE,
            amount: Amount::from_whole(amount),
            payment_id,
        }
    }

    #[test]
    fn test_valid_split_request() {
        assert!(validate_request(&request(30, &[("r1", 10), ("r2", 20)])).is_ok());
    }

    #[test]
    fn test_allocation_sum_must_match() {
        assert!(matches!(
            validate_request(&request(30, &[("r1", 10), ("r2", 10)])),
            Err(LedgerError::AllocationMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_round_rejected() {
        assert!(matches!(
            validate_request(&request(20, &[("r1", 10), ("r1", 10)])),
            Err(LedgerError::AllocationMismatch { .. })
        ));
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        assert!(matches!(
            validate_request(&request(0, &[("r1", 0)])),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(matches!(
            validate_request(&request(10, &[("r1", 15), ("r2", -5)])),
            Err(LedgerError::AllocationMismatch { .. })
        ));
        assert!(matches!(
            validate_request(&request(10, &[])),
            Err(LedgerError::AllocationMismatch { .. })
        ));
    }

    #[test]
    fn test_insert_tracks_paid_and_pending() {
        let mut book = SettlementBook::new();
        let allocations = vec![RoundPayment {
            id: 1,
            mining_round: round("r1"),
            holder: ALICE,
            amount: Amount::from_whole(5),
            payment_id: 1,
        }];
        book.insert(payment(1, 7, 5), allocations).unwrap();

        assert_eq!(book.paid(&round("r1"), &ALICE), Amount::from_whole(5));
        assert_eq!(book.highest_nonce(), Some(7));
        assert_eq!(book.pending().len(), 1);

        let mut broadcast = payment(1, 7, 5);
        broadcast.transaction_hash = Some([1u8; 32]);
        broadcast.status = PaymentStatus::Broadcast;
        book.update(broadcast).unwrap();
        assert!(book.pending().is_empty());
        assert_eq!(book.unconfirmed().len(), 1);

        let summary = book.summary(&ALICE).unwrap();
        assert_eq!(summary.total_paid, Amount::from_whole(5));
        assert_eq!(summary.unbroadcast_count, 0);
        assert_eq!(summary.unconfirmed_count, 1);
    }

    #[test]
    fn test_failed_payment_releases_allocations() {
        let mut book = SettlementBook::new();
        book.insert(
            payment(1, 0, 8),
            vec![allocation(1, "r1", 5, 1), allocation(2, "r2", 3, 1)],
        )
        .unwrap();
        book.insert(payment(2, 1, 2), vec![allocation(3, "r1", 2, 2)]).unwrap();

        let mut failed = payment(1, 0, 8);
        failed.status = PaymentStatus::Failed;
        book.update(failed.clone()).unwrap();
        assert_eq!(book.paid(&round("r1"), &ALICE), Amount::from_whole(2));
        assert_eq!(book.paid(&round("r2"), &ALICE), Amount::ZERO);

        // Repeating the update releases nothing more
        book.update(failed.clone()).unwrap();
        assert_eq!(book.paid(&round("r1"), &ALICE), Amount::from_whole(2));

        // The nonce stays taken
        assert_eq!(book.payment_by_nonce(0).map(|p| p.status), Some(PaymentStatus::Failed));

        let summary = book.summary(&ALICE).unwrap();
        assert_eq!(summary.total_paid, Amount::from_whole(2));
        assert_eq!(summary.payment_count, 2);
        assert_eq!(summary.failed_count, 1);

        // Reloading a failed payment does not count it
        let mut reloaded = SettlementBook::new();
        reloaded
            .insert(failed, vec![allocation(1, "r1", 5, 1), allocation(2, "r2", 3, 1)])
            .unwrap();
        assert_eq!(reloaded.paid(&round("r1"), &ALICE), Amount::ZERO);
    }

    #[test]
    fn test_matches_request_ignores_allocation_order() {
        let mut book = SettlementBook::new();
        let allocations = vec![
            RoundPayment {
                id: 1,
                mining_round: round("r1"),
                holder: ALICE,
                amount: Amount::from_whole(10),
                payment_id: 1,
            },
            RoundPayment {
                id: 2,
                mining_round: round("r2"),
                holder: ALICE,
                amount: Amount::from_whole(20),
                payment_id: 1,
            },
        ];
        book.insert(payment(1, 0, 30), allocations).unwrap();

        let stored = book.payment(1).cloned().unwrap();
        assert!(book.matches_request(&stored, &request(30, &[("r2", 20), ("r1", 10)])));
        assert!(!book.matches_request(&stored, &request(30, &[("r1", 20), ("r2", 10)])));
    }
}
