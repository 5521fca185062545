//! # xclient
//!
//! A client engine for the MySQL X Protocol:
//! - Value bridge from dynamically typed front-end values to wire operands
//! - CRUD builders for tables and document collections
//! - Sessions with authentication and one statement in flight at a time
//! - Streaming result sets with multi-result traversal
//! - A readiness-driven socket reactor on its own thread
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Caller / Scripting Front-end                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ DynamicValue
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │          Value Bridge  →  CRUD Builder  →  Statement         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Session   │◄────────►│  Resultset  │
//!   │ (lifecycle) │  stream  │  (cursor)   │
//!   └──────┬──────┘          └─────────────┘
//!          │ frames
//!          ▼
//!   ┌─────────────┐
//!   │   Reactor   │
//!   │  (thread)   │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod crud;
pub mod protocol;
pub mod reactor;
pub mod resultset;
pub mod session;
pub mod value;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{AuthMethod, ReactorConfig, SessionConfig, SslMode};
pub use crud::{CrudRequest, DataModel, Statement};
pub use error::{Result, XError};
pub use reactor::ReactorHandle;
pub use resultset::{ColumnMetadata, Document, Resultset, Row};
pub use session::{CancelHandle, Session, SessionState};
pub use value::{map, DynamicValue, Expression, WireValue};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of xclient
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
