//! Common imports for qualcode usage.
//!
//! ```
//! use qualcode::prelude::*;
//! ```

pub use crate::coder::{Coded, Coder};
pub use crate::config::{ModelConfig, SessionConfig};
pub use crate::confirm::{AlwaysAllow, AlwaysDeny, Confirm, Confirmation, ConsoleConfirm};
pub use crate::credentials::{CredentialSource, EnvCredentials, StaticCredentials};
pub use crate::errors::CodingError;
pub use crate::table::{Cell, ColumnSelector, Input, Table};

// Chat client types needed to build a call
pub use qualcode_chat::{ChatSession, EchoMode, Field, OpenAiChat, Schema, StructuredChat};
