//! Memory store implementations for FerroAct.

pub mod in_memory;

pub use in_memory::InMemoryStore;
