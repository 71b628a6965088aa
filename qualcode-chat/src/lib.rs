//! Structured-chat client for qualcode.
//!
//! This crate owns everything that talks to a model:
//!
//! - [`schema::Schema`] - declarative output shapes and their JSON Schema form
//! - [`session::StructuredChat`] / [`session::ChatSession`] - the session seam
//! - [`openai::OpenAiChat`] - rig-backed sessions for OpenAI-compatible endpoints
//! - [`extraction::ExtractionLoop`] - per-row parse/validate/retry loop
//! - [`usage::CostEstimate`] - token accounting and list-price cost estimates

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod extraction;
pub mod feedback;
pub mod openai;
pub mod schema;
pub mod session;
pub mod usage;

pub use config::{ChatConfig, EchoMode, ExtractionConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use error::{AttemptRecord, ChatError};
pub use openai::OpenAiChat;
pub use schema::{Field, Schema, SchemaError};
pub use session::{ChatSession, RigCompleter, RigSession, StructuredChat};
pub use usage::{CostEstimate, TokenUsage};
