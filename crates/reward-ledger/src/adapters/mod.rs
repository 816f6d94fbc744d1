//! Adapters implementing the outbound ports.

pub mod broadcaster;
pub mod chain;
pub mod codec;
pub mod policy;
pub mod storage;
pub mod time;

pub use broadcaster::MockBroadcaster;
pub use chain::{NoCanonicalChain, StaticChainReader};
pub use codec::BincodeCodec;
pub use policy::{ConfirmationDepthPolicy, ManualFinalization};
pub use storage::{FileBackedKVStore, InMemoryKVStore};
pub use time::{FixedTimeSource, SystemTimeSource};
