//! Payment authorization and reconciliation.

use super::state::LedgerState;
use super::LedgerService;
use crate::domain::entities::{
    Entitlement, LedgerMetadata, Payment, PaymentRequest, PaymentStatus, PaymentSummary,
    RoundPayment,
};
use crate::domain::settlement::validate_request;
use crate::domain::KeyPrefix;
use crate::error::{LedgerError, LedgerResult};
use crate::ports::outbound::{ChainReader, KeyValueStore, RecordCodec, TimeSource};
use shared_types::{address_hex, hash_hex, Address, Amount, AmountError, Hash, RoundId};
use tracing::{info, warn};

impl<S, R, T, C> LedgerService<S, R, T, C>
where
    S: KeyValueStore,
    R: ChainReader,
    T: TimeSource,
    C: RecordCodec,
{
    /// Authorize a payment charged entirely against one round.
    pub fn authorize(&self, round: &RoundId, holder: &Address, amount: Amount) -> LedgerResult<Payment> {
        self.authorize_payment(PaymentRequest::single(round.clone(), *holder, amount))
    }

    /// Authorize a payment against matured rewards.
    ///
    /// The payment, its round allocations and the advanced counters are
    /// written in one batch. Re-submitting an identical request under the
    /// same nonce returns the payment already recorded.
    pub fn authorize_payment(&self, request: PaymentRequest) -> LedgerResult<Payment> {
        validate_request(&request)?;
        let mut state = self.state.write();

        if let Some(nonce) = request.nonce {
            if let Some(existing) = state.settlement.payment_by_nonce(nonce) {
                if state.settlement.matches_request(existing, &request) {
                    return Ok(existing.clone());
                }
                warn!(nonce, payment_id = existing.id, "[ledger] ⚠️ nonce already in use");
                return Err(LedgerError::NonceConflict {
                    nonce,
                    payment_id: existing.id,
                });
            }
        }

        for allocation in &request.allocations {
            let available = available_entitlement(&state, &allocation.round, &request.holder)?;
            if allocation.amount > available {
                return Err(LedgerError::InsufficientEntitlement {
                    round: allocation.round.clone(),
                    holder: request.holder,
                    requested: allocation.amount,
                    available,
                });
            }
        }

        let nonce = request.nonce.unwrap_or(state.meta.next_nonce);
        let payment = Payment {
            id: state.meta.next_payment_id,
            holder: request.holder,
            amount: request.amount,
            pay_time: self.clock.now(),
            nonce,
            transaction_hash: None,
            status: PaymentStatus::Authorized,
        };
        let round_payments: Vec<RoundPayment> = request
            .allocations
            .iter()
            .zip(state.meta.next_round_payment_id..)
            .map(|(allocation, id)| RoundPayment {
                id,
                mining_round: allocation.round.clone(),
                holder: request.holder,
                amount: allocation.amount,
                payment_id: payment.id,
            })
            .collect();
        let meta = LedgerMetadata {
            next_payment_id: payment.id + 1,
            next_round_payment_id: state.meta.next_round_payment_id + round_payments.len() as u64,
            next_nonce: state.meta.next_nonce.max(nonce.saturating_add(1)),
        };

        let mut ops = Vec::with_capacity(round_payments.len() + 2);
        ops.push(state.put(KeyPrefix::payment_key(payment.id), &payment)?);
        for rp in &round_payments {
            ops.push(state.put(KeyPrefix::round_payment_key(rp.id), rp)?);
        }
        ops.push(state.put(KeyPrefix::metadata_key(), &meta)?);
        state.store.atomic_batch_write(ops)?;

        state.settlement.insert(payment.clone(), round_payments)?;
        state.meta = meta;

        info!(
            payment_id = payment.id,
            holder = %address_hex(&payment.holder),
            amount = %payment.amount,
            nonce = payment.nonce,
            "[ledger] 💸 payment authorized"
        );
        Ok(payment)
    }

    /// Attach the broadcast transaction hash to a payment.
    ///
    /// Recording the same hash again is a no-op.
    pub fn record_broadcast(&self, payment_id: u64, transaction_hash: Hash) -> LedgerResult<Payment> {
        let mut state = self.state.write();
        let mut payment = state
            .settlement
            .payment(payment_id)
            .cloned()
            .ok_or(LedgerError::PaymentNotFound { payment_id })?;

        match payment.transaction_hash {
            Some(existing) if existing == transaction_hash => return Ok(payment),
            Some(existing) => {
                return Err(LedgerError::AlreadyBroadcast {
                    payment_id,
                    transaction_hash: existing,
                })
            }
            None => {}
        }
        if payment.status != PaymentStatus::Authorized {
            return Err(LedgerError::InvalidPaymentStatus {
                payment_id,
                status: payment.status,
                target: PaymentStatus::Broadcast,
            });
        }

        payment.transaction_hash = Some(transaction_hash);
        payment.status = PaymentStatus::Broadcast;
        let op = state.put(KeyPrefix::payment_key(payment_id), &payment)?;
        state.store.atomic_batch_write(vec![op])?;
        state.settlement.update(payment.clone())?;

        info!(
            payment_id,
            tx = %hash_hex(&transaction_hash),
            "[ledger] 📡 broadcast recorded"
        );
        Ok(payment)
    }

    /// Mark a broadcast payment as confirmed on chain.
    pub fn settle_payment(&self, payment_id: u64) -> LedgerResult<Payment> {
        self.transition(payment_id, PaymentStatus::Settled)
    }

    /// Mark a payment as failed, returning its allocations to the unpaid
    /// entitlement. Its nonce stays used.
    pub fn fail_payment(&self, payment_id: u64) -> LedgerResult<Payment> {
        self.transition(payment_id, PaymentStatus::Failed)
    }

    /// Settle or fail a payment. Repeating a transition is a no-op.
    fn transition(&self, payment_id: u64, target: PaymentStatus) -> LedgerResult<Payment> {
        let mut state = self.state.write();
        let mut payment = state
            .settlement
            .payment(payment_id)
            .cloned()
            .ok_or(LedgerError::PaymentNotFound { payment_id })?;
        if payment.status == target {
            return Ok(payment);
        }

        let allowed = match target {
            PaymentStatus::Settled => payment.status == PaymentStatus::Broadcast,
            PaymentStatus::Failed => matches!(
                payment.status,
                PaymentStatus::Authorized | PaymentStatus::Broadcast
            ),
            PaymentStatus::Authorized | PaymentStatus::Broadcast => false,
        };
        if !allowed {
            warn!(payment_id, status = %payment.status, %target, "[ledger] ⚠️ payment transition refused");
            return Err(LedgerError::InvalidPaymentStatus {
                payment_id,
                status: payment.status,
                target,
            });
        }

        payment.status = target;
        let op = state.put(KeyPrefix::payment_key(payment_id), &payment)?;
        state.store.atomic_batch_write(vec![op])?;
        state.settlement.update(payment.clone())?;

        if target == PaymentStatus::Failed {
            warn!(
                payment_id,
                holder = %address_hex(&payment.holder),
                amount = %payment.amount,
                "[ledger] ❌ payment failed, allocations released"
            );
        } else {
            info!(payment_id, nonce = payment.nonce, "[ledger] ✅ payment settled");
        }
        Ok(payment)
    }

    /// Payments authorized but not yet broadcast, in nonce order.
    pub fn pending_broadcasts(&self) -> Vec<Payment> {
        self.state.read().settlement.pending()
    }

    /// Broadcast payments awaiting a receipt, in nonce order.
    pub fn unconfirmed_payments(&self) -> Vec<Payment> {
        self.state.read().settlement.unconfirmed()
    }

    /// Holders of a matured round with something left to pay, by holder.
    pub fn unpaid_rewards(&self, round: &RoundId) -> Vec<Entitlement> {
        let state = self.state.read();
        let Some(holders) = state.mature.get(round) else {
            return Vec::new();
        };
        holders
            .keys()
            .map(|holder| entitlement(&state, round, holder))
            .filter(|e| e.unpaid.is_positive())
            .collect()
    }

    pub fn entitlement(&self, round: &RoundId, holder: &Address) -> Entitlement {
        entitlement(&self.state.read(), round, holder)
    }

    pub fn payment(&self, payment_id: u64) -> Option<Payment> {
        self.state.read().settlement.payment(payment_id).cloned()
    }

    pub fn payments_of(&self, holder: &Address) -> Vec<Payment> {
        self.state.read().settlement.payments_of(holder)
    }

    pub fn round_payments(&self, payment_id: u64) -> Vec<RoundPayment> {
        self.state.read().settlement.allocations(payment_id).to_vec()
    }

    pub fn payment_summary(&self, holder: &Address) -> LedgerResult<PaymentSummary> {
        Ok(self.state.read().settlement.summary(holder)?)
    }
}

fn entitlement<S, C>(state: &LedgerState<S, C>, round: &RoundId, holder: &Address) -> Entitlement
where
    S: KeyValueStore,
    C: RecordCodec,
{
    let mature = state.mature_of(round, holder);
    let paid = state.settlement.paid(round, holder);
    Entitlement {
        mining_round: round.clone(),
        holder: *holder,
        mature,
        paid,
        unpaid: mature.checked_sub(paid).unwrap_or(Amount::ZERO),
    }
}

fn available_entitlement<S, C>(
    state: &LedgerState<S, C>,
    round: &RoundId,
    holder: &Address,
) -> LedgerResult<Amount>
where
    S: KeyValueStore,
    C: RecordCodec,
{
    let record = state
        .rounds
        .get(round)
        .ok_or_else(|| LedgerError::UnknownRound {
            round: round.clone(),
        })?;
    if !record.is_matured() {
        return Err(LedgerError::RoundNotMatured {
            round: round.clone(),
            state: record.state,
        });
    }

    let mature = state.mature_of(round, holder);
    let paid = state.settlement.paid(round, holder);
    Ok(mature.checked_sub(paid).ok_or(AmountError::Overflow)?)
}
