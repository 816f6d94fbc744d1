//! # Payout Cycle
//!
//! Drives the wallet side of settlement: every payment is authorized in the
//! ledger before it is handed to the broadcaster, and a payment whose send
//! fails stays pending until a later cycle re-sends it under the same nonce.
//!
//! A cycle first resolves the receipts of earlier broadcasts. While any of
//! them is still unconfirmed the cycle sends nothing new. A reverted
//! payment is failed in the ledger, so its amount is paid again under a
//! fresh nonce.

use crate::domain::entities::{Allocation, Payment, PaymentRequest};
use crate::error::LedgerResult;
use crate::ports::inbound::RewardLedgerApi;
use crate::ports::outbound::{Broadcaster, PaymentOrder, ReceiptStatus};
use shared_types::{address_hex, hash_hex, Address, Amount, RoundId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Counters for one payout cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayoutReport {
    pub cycle_id: Uuid,
    /// Broadcasts from earlier cycles confirmed in this one.
    pub settled: usize,
    /// Broadcasts whose transaction reverted.
    pub reverted: usize,
    /// Broadcasts still without a receipt; they hold back the cycle.
    pub unconfirmed: usize,
    /// Pending payments from earlier cycles that were sent again.
    pub retried: usize,
    /// Payments authorized in this cycle.
    pub authorized: usize,
    /// Payments whose broadcast hash was recorded.
    pub broadcast: usize,
    /// Sends that failed; those payments remain pending.
    pub failed: usize,
}

pub struct Payer<L, B> {
    ledger: Arc<L>,
    broadcaster: B,
}

impl<L, B> Payer<L, B>
where
    L: RewardLedgerApi,
    B: Broadcaster,
{
    pub fn new(ledger: Arc<L>, broadcaster: B) -> Self {
        Self {
            ledger,
            broadcaster,
        }
    }

    pub fn broadcaster(&self) -> &B {
        &self.broadcaster
    }

    /// Run one cycle over `rounds`.
    ///
    /// 1. Settle or fail every broadcast payment whose receipt is known
    /// 2. Re-send every payment still lacking a transaction hash
    /// 3. Authorize one payment per holder covering the unpaid entitlement of
    ///    every matured round in `rounds`
    /// 4. Send each new payment and record its hash
    pub async fn run_once(&self, rounds: &[RoundId]) -> LedgerResult<PayoutReport> {
        let mut report = PayoutReport {
            cycle_id: Uuid::new_v4(),
            ..PayoutReport::default()
        };
        debug!(cycle = %report.cycle_id, rounds = rounds.len(), "[ledger] payout cycle started");

        for payment in self.ledger.unconfirmed_payments() {
            self.confirm(&payment, &mut report).await?;
        }
        if report.unconfirmed > 0 {
            info!(
                cycle = %report.cycle_id,
                unconfirmed = report.unconfirmed,
                "[ledger] ⏳ waiting for receipts, no new payments this cycle"
            );
            return Ok(report);
        }

        for payment in self.ledger.pending_broadcasts() {
            report.retried += 1;
            self.send(&payment, &mut report).await?;
        }

        for (holder, allocations) in self.unpaid_by_holder(rounds) {
            let amount = Amount::checked_sum(allocations.iter().map(|a| a.amount))?;
            let payment = self.ledger.authorize_payment(PaymentRequest {
                holder,
                amount,
                allocations,
                nonce: None,
            })?;
            report.authorized += 1;
            self.send(&payment, &mut report).await?;
        }

        info!(
            cycle = %report.cycle_id,
            settled = report.settled,
            reverted = report.reverted,
            retried = report.retried,
            authorized = report.authorized,
            broadcast = report.broadcast,
            failed = report.failed,
            "[ledger] 💸 payout cycle complete"
        );
        Ok(report)
    }

    fn unpaid_by_holder(&self, rounds: &[RoundId]) -> BTreeMap<Address, Vec<Allocation>> {
        let mut by_holder: BTreeMap<Address, Vec<Allocation>> = BTreeMap::new();
        for round in rounds {
            for entitlement in self.ledger.unpaid_rewards(round) {
                by_holder
                    .entry(entitlement.holder)
                    .or_default()
                    .push(Allocation::new(entitlement.mining_round, entitlement.unpaid));
            }
        }
        by_holder
    }

    async fn confirm(&self, payment: &Payment, report: &mut PayoutReport) -> LedgerResult<()> {
        let Some(hash) = payment.transaction_hash else {
            return Ok(());
        };
        match self.broadcaster.receipt(&hash).await {
            Ok(ReceiptStatus::Succeeded) => {
                self.ledger.settle_payment(payment.id)?;
                report.settled += 1;
            }
            Ok(ReceiptStatus::Failed) => {
                warn!(
                    cycle = %report.cycle_id,
                    payment_id = payment.id,
                    tx = %hash_hex(&hash),
                    "[ledger] ⚠️ transaction reverted, payment will be reissued"
                );
                self.ledger.fail_payment(payment.id)?;
                report.reverted += 1;
            }
            Ok(ReceiptStatus::Pending) => report.unconfirmed += 1,
            Err(e) => {
                warn!(
                    cycle = %report.cycle_id,
                    payment_id = payment.id,
                    error = %e,
                    "[ledger] ⚠️ receipt lookup failed"
                );
                report.unconfirmed += 1;
            }
        }
        Ok(())
    }

    async fn send(&self, payment: &Payment, report: &mut PayoutReport) -> LedgerResult<()> {
        let order = PaymentOrder {
            payment_id: payment.id,
            holder: payment.holder,
            amount: payment.amount,
            nonce: payment.nonce,
        };
        match self.broadcaster.send(&order).await {
            Ok(hash) => {
                self.ledger.record_broadcast(payment.id, hash)?;
                report.broadcast += 1;
            }
            Err(e) => {
                warn!(
                    cycle = %report.cycle_id,
                    payment_id = payment.id,
                    holder = %address_hex(&payment.holder),
                    error = %e,
                    "[ledger] ⚠️ broadcast failed, payment stays pending"
                );
                report.failed += 1;
            }
        }
        Ok(())
    }
}
