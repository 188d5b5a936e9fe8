//! Record store implementations

mod memory;

pub use memory::{MemoryRecordStore, ParentRecord};
