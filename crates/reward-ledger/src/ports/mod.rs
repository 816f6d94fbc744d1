//! Port traits (hexagonal architecture).

pub mod inbound;
pub mod outbound;

pub use inbound::RewardLedgerApi;
pub use outbound::{
    BatchOperation, Broadcaster, ChainReader, FinalizationPolicy, KeyValueStore, PaymentOrder,
    RecordCodec, ScanResult, TimeSource,
};
