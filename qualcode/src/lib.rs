//! # qualcode
//!
//! Apply LLM-based qualitative coding to survey or interview data.
//!
//! Give [`Coder`](coder::Coder) a table (or a list of texts), the column that
//! holds the text, and a [`Schema`](qualcode_chat::Schema) describing the
//! codes you want per row. It sends one structured-extraction request per
//! row through a single chat session and returns the input table with the
//! codes appended, or the bare results.
//!
//! ## Example
//!
//! ```no_run
//! # use qualcode::prelude::*;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut table = Table::new(["id", "text"])?;
//! table.push_row(vec![Cell::Int(1), "I like bananas".into()])?;
//! table.push_row(vec![Cell::Int(2), "I prefer apples".into()])?;
//!
//! let schema = Schema::object(vec![Field::new("favorite_fruits", Schema::string())]);
//!
//! let coded = Coder::new(OpenAiChat::new())
//!     .model(ModelConfig::new("gpt-4o-mini").with_seed(1))
//!     .code(table, &schema, "text")
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! The API key is taken from [`ModelConfig::api_key`](config::ModelConfig)
//! or, failing that, from `OPENAI_API_KEY`.

#![deny(missing_docs)]

/// The coding orchestrator.
pub mod coder;

/// Model and session configuration.
pub mod config;

/// Confirmation providers for large inputs.
pub mod confirm;

/// Credential sources.
pub mod credentials;

/// Public error types.
pub mod errors;

/// CSV and JSON input/output.
pub mod io;

/// Tables, cells and column selection.
pub mod table;

/// Commonly used types and traits.
pub mod prelude;

pub use coder::{Coded, Coder};
pub use errors::CodingError;
