//! LLM provider layer for FerroAct.
//!
//! The [`ProviderManager`] selects among registered providers by priority,
//! fails over when one is down, and reports per-provider health.
//! [`HttpProvider`] adapts any endpoint speaking the generic JSON contract.

pub mod http;
pub mod manager;

pub use http::HttpProvider;
pub use manager::ProviderManager;
