mod common;
pub mod plru;
pub mod protocol;
pub mod bus;
pub mod cache;
pub mod memory;
pub mod stats;
pub mod error;
pub mod system;
pub mod processor;
pub mod sim;
pub mod trace;

pub use common::*;
pub use plru::ReplacementIndex;
pub use protocol::{transition, CoherenceState, Trigger, Transition};
pub use bus::{Bus, BusOp, Transaction, SnoopReply, Snooper};
pub use cache::{Cache, CacheLine};
pub use memory::Memory;
pub use stats::{CacheStats, Stats, Report};
pub use error::*;
pub use system::System;
pub use processor::Processor;
pub use sim::{simulate, MemorySystem};
