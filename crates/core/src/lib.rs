//! # FerroAct Core
//!
//! Domain types, traits, and error definitions for the FerroAct agent runtime.
//! Nothing in here talks to the network or the filesystem; it defines the
//! vocabulary every other crate implements against.
//!
//! ## Layout
//!
//! - [`provider`] and [`tool`] are the two capability traits the engine drives
//! - [`memory`] and [`settings`] are the narrow collaborator interfaces
//!   (persistence, secrets/config) the core consumes but never implements
//! - [`category`] names the resource categories the resilience layer protects
//! - [`error`] holds the full error taxonomy

pub mod agent;
pub mod category;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod settings;
pub mod tool;

pub use agent::{AgentResponse, MessageContext, ResponseStatus};
pub use category::ResourceCategory;
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{ConversationContext, MemoryStore};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{HealthStatus, LlmRequest, LlmResponse, Provider, ProviderHealth, Usage};
pub use settings::ConfigSource;
pub use tool::{ParameterDefinition, ParameterType, Tool, ToolArgs, ToolCall, ToolDefinition, ToolResult};
