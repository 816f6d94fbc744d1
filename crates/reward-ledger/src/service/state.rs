//! In-memory view of the ledger, rebuilt from the store on open.

use super::staging::StagedChanges;
use crate::domain::cursor::BlockCursor;
use crate::domain::entities::{
    ImmatureMiningReward, LedgerMetadata, MatureMiningReward, Payment, RoundPayment, RoundRecord,
    TokenEvent,
};
use crate::domain::{AccrualBook, BalanceBook, KeyPrefix, LedgerConfig, SettlementBook};
use crate::error::LedgerResult;
use crate::ports::outbound::{BatchOperation, KeyValueStore, RecordCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{Address, Amount, BlockHeader, RoundId};
use std::collections::{BTreeMap, HashMap};

/// Store plus every aggregate derived from it.
///
/// Aggregates change only after the corresponding batch is committed.
pub(crate) struct LedgerState<S, C> {
    pub store: S,
    pub codec: C,
    pub cursor: BlockCursor,
    pub balances: BalanceBook,
    pub accrual: AccrualBook,
    pub rounds: BTreeMap<RoundId, RoundRecord>,
    pub mature: BTreeMap<RoundId, BTreeMap<Address, Amount>>,
    pub settlement: SettlementBook,
    pub meta: LedgerMetadata,
}

impl<S: KeyValueStore, C: RecordCodec> LedgerState<S, C> {
    pub fn load(store: S, codec: C, config: &LedgerConfig) -> LedgerResult<Self> {
        let meta = match store.get(&KeyPrefix::metadata_key())? {
            Some(bytes) => codec.decode(&bytes)?,
            None => LedgerMetadata::new(config.initial_nonce),
        };

        let headers: Vec<BlockHeader> = scan_records(&store, &codec, KeyPrefix::Block.as_bytes())?;
        let cursor = BlockCursor::from_headers(config.max_reorg_depth, headers);

        let mut balances = BalanceBook::new();
        let events: Vec<TokenEvent> = scan_records(&store, &codec, KeyPrefix::Event.as_bytes())?;
        for event in &events {
            balances.apply_delta(&event.token, &event.holder, event.amount)?;
        }

        let rounds: BTreeMap<RoundId, RoundRecord> =
            scan_records::<_, _, RoundRecord>(&store, &codec, KeyPrefix::Round.as_bytes())?
                .into_iter()
                .map(|r| (r.mining_round.clone(), r))
                .collect();

        let mut accrual = AccrualBook::new();
        let credits: Vec<ImmatureMiningReward> =
            scan_records(&store, &codec, KeyPrefix::Credit.as_bytes())?;
        for credit in &credits {
            let matured = rounds
                .get(&credit.mining_round)
                .is_some_and(RoundRecord::is_matured);
            if !matured {
                accrual.apply_delta(&credit.mining_round, &credit.holder, credit.mcb_balance)?;
            }
        }

        let mut mature: BTreeMap<RoundId, BTreeMap<Address, Amount>> = BTreeMap::new();
        let rows: Vec<MatureMiningReward> =
            scan_records(&store, &codec, KeyPrefix::Mature.as_bytes())?;
        for row in rows {
            mature
                .entry(row.mining_round)
                .or_default()
                .insert(row.holder, row.mcb_balance);
        }

        let mut allocations: HashMap<u64, Vec<RoundPayment>> = HashMap::new();
        let round_payments: Vec<RoundPayment> =
            scan_records(&store, &codec, KeyPrefix::RoundPayment.as_bytes())?;
        for rp in round_payments {
            allocations.entry(rp.payment_id).or_default().push(rp);
        }

        let mut settlement = SettlementBook::new();
        let payments: Vec<Payment> = scan_records(&store, &codec, KeyPrefix::Payment.as_bytes())?;
        for payment in payments {
            let allocs = allocations.remove(&payment.id).unwrap_or_default();
            settlement.insert(payment, allocs)?;
        }

        tracing::info!(
            tip = cursor.tip().map(|t| t.number),
            events = events.len(),
            credits = credits.len(),
            rounds = rounds.len(),
            "[ledger] 💾 Loaded ledger state"
        );

        Ok(Self {
            store,
            codec,
            cursor,
            balances,
            accrual,
            rounds,
            mature,
            settlement,
            meta,
        })
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> LedgerResult<Vec<u8>> {
        Ok(self.codec.encode(value)?)
    }

    pub fn put<T: Serialize>(&self, key: Vec<u8>, value: &T) -> LedgerResult<BatchOperation> {
        Ok(BatchOperation::put(key, self.encode(value)?))
    }

    pub fn scan<T: DeserializeOwned>(&self, prefix: &[u8]) -> LedgerResult<Vec<T>> {
        scan_records(&self.store, &self.codec, prefix)
    }

    pub fn tip_number(&self) -> Option<u64> {
        self.cursor.tip().map(|t| t.number)
    }

    pub fn mature_of(&self, round: &RoundId, holder: &Address) -> Amount {
        self.mature
            .get(round)
            .and_then(|holders| holders.get(holder))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn mature_rows(&self, round: &RoundId) -> Vec<MatureMiningReward> {
        self.mature
            .get(round)
            .map(|holders| {
                holders
                    .iter()
                    .map(|(holder, amount)| MatureMiningReward {
                        mining_round: round.clone(),
                        holder: *holder,
                        mcb_balance: *amount,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Write one batch, then fold the staged deltas into the aggregates.
    pub fn commit_staged(&mut self, changes: StagedChanges) -> LedgerResult<()> {
        let StagedChanges {
            ops,
            balance_delta,
            summary_delta,
            opened_rounds,
            truncate_from,
            accepted,
        } = changes;

        self.store.atomic_batch_write(ops)?;

        for ((token, holder), delta) in balance_delta {
            self.balances.apply_delta(&token, &holder, delta)?;
        }
        for ((round, holder), delta) in summary_delta {
            self.accrual.apply_delta(&round, &holder, delta)?;
        }
        self.rounds.extend(opened_rounds);
        if let Some(from) = truncate_from {
            self.cursor.truncate_from(from);
        }
        for header in accepted {
            self.cursor.accept(header);
        }
        Ok(())
    }
}

fn scan_records<S, C, T>(store: &S, codec: &C, prefix: &[u8]) -> LedgerResult<Vec<T>>
where
    S: KeyValueStore,
    C: RecordCodec,
    T: DeserializeOwned,
{
    store
        .prefix_scan(prefix)?
        .into_iter()
        .map(|(_, value)| Ok(codec.decode(&value)?))
        .collect()
}
