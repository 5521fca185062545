//! CRUD Module
//!
//! Builds table and collection operations out of wire values.
//!
//! ## Responsibilities
//! - Accumulate clauses (projection, filter, ordering, limit, assignments)
//! - Validate arity and clause placement while building
//! - Freeze the result into an immutable [`CrudRequest`]
//! - Render a request into a SQL [`Statement`] for dispatch
//!
//! Builders never look inside operand values: legality is settled by the
//! value bridge before an operand reaches them.
//!
//! ## Example
//! ```
//! use xclient::crud::TableSelect;
//!
//! let request = TableSelect::new("alpha")
//!     .fields(&["idalpha", "alphacol"]).unwrap()
//!     .where_("idalpha > :min").unwrap()
//!     .bind("min", 1).unwrap()
//!     .build().unwrap();
//!
//! let statement = request.to_statement().unwrap();
//! assert_eq!(
//!     statement.sql(),
//!     "SELECT idalpha, alphacol FROM `alpha` WHERE idalpha > ?"
//! );
//! ```

mod builder;
mod render;

pub use builder::{
    CollectionAdd, CollectionFind, CollectionModify, CollectionRemove, TableDelete, TableInsert,
    TableSelect, TableUpdate,
};
pub use render::{quote_identifier, Statement};

use crate::error::Result;
use crate::value::WireValue;

/// Name of the JSON column holding collection documents
pub const DOC_COLUMN: &str = "doc";

/// Shape of the rows an operation works on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataModel {
    /// Plain table rows
    Table,
    /// JSON documents stored in a collection table
    Document,
}

/// Operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrudKind {
    Find,
    Insert,
    Update,
    Delete,
}

impl CrudKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrudKind::Find => "find",
            CrudKind::Insert => "insert",
            CrudKind::Update => "update",
            CrudKind::Delete => "delete",
        }
    }
}

/// Table or collection an operation targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub schema: Option<String>,
    pub name: String,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn in_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        match name.split_once('.') {
            Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
                Target::in_schema(schema, table)
            }
            _ => Target::new(name),
        }
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::from(name.as_str())
    }
}

/// One assignment of an update or modify
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// Set a column, or a document path, to a value
    Set { target: String, value: WireValue },
    /// Remove a document path
    Unset { target: String },
}

impl Assignment {
    pub fn target(&self) -> &str {
        match self {
            Assignment::Set { target, .. } | Assignment::Unset { target } => target,
        }
    }
}

/// A finished CRUD operation
///
/// Built only through the builders in this module, so every request here
/// has passed their validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CrudRequest {
    pub(crate) kind: CrudKind,
    pub(crate) model: DataModel,
    pub(crate) target: Target,
    pub(crate) projection: Vec<String>,
    pub(crate) criteria: Option<String>,
    pub(crate) bindings: Vec<(String, WireValue)>,
    pub(crate) order: Vec<String>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<WireValue>>,
    pub(crate) assignments: Vec<Assignment>,
}

impl CrudRequest {
    pub(crate) fn new(kind: CrudKind, model: DataModel, target: Target) -> Self {
        Self {
            kind,
            model,
            target,
            projection: Vec::new(),
            criteria: None,
            bindings: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            columns: Vec::new(),
            rows: Vec::new(),
            assignments: Vec::new(),
        }
    }

    pub fn kind(&self) -> CrudKind {
        self.kind
    }

    pub fn data_model(&self) -> DataModel {
        self.model
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    pub fn criteria(&self) -> Option<&str> {
        self.criteria.as_deref()
    }

    pub fn bindings(&self) -> &[(String, WireValue)] {
        &self.bindings
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<WireValue>] {
        &self.rows
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Render into a SQL statement with positional arguments
    pub fn to_statement(&self) -> Result<Statement> {
        render::render(self)
    }
}
