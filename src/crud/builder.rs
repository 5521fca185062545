//! CRUD builders
//!
//! One builder per operation. Clause methods consume the builder and hand
//! it back, or fail with an argument error that names the offending clause.
//! Nothing here performs I/O.

use crate::error::{Result, XError};
use crate::value::{map, DynamicValue, WireValue};

use super::render::placeholders;
use super::{Assignment, CrudKind, CrudRequest, DataModel, Target};

// =============================================================================
// Shared Clauses
// =============================================================================

/// Clause state shared by every builder
#[derive(Debug, Clone)]
struct Clauses {
    request: CrudRequest,
}

impl Clauses {
    fn new(kind: CrudKind, model: DataModel, target: Target) -> Self {
        Self {
            request: CrudRequest::new(kind, model, target),
        }
    }

    fn operation(&self) -> &'static str {
        self.request.kind.as_str()
    }

    fn projection(&mut self, fields: &[&str]) -> Result<()> {
        if !self.request.projection.is_empty() {
            return Err(repeated(self.operation(), "fields"));
        }
        if fields.is_empty() {
            return Err(XError::argument("Field selection criteria can not be empty"));
        }
        let mut projection = Vec::with_capacity(fields.len());
        for field in fields {
            let field = field.trim();
            if field.is_empty() {
                return Err(XError::argument("Field selection criteria can not be empty"));
            }
            projection.push(field.to_string());
        }
        self.request.projection = projection;
        Ok(())
    }

    fn criteria(&mut self, criteria: &str) -> Result<()> {
        if self.request.criteria.is_some() {
            return Err(repeated(self.operation(), "filter"));
        }
        let criteria = criteria.trim();
        if criteria.is_empty() {
            return Err(XError::argument(format!(
                "{}: Requires a search condition",
                self.operation()
            )));
        }
        self.request.criteria = Some(criteria.to_string());
        Ok(())
    }

    fn order(&mut self, criteria: &[&str]) -> Result<()> {
        if !self.request.order.is_empty() {
            return Err(repeated(self.operation(), "sort"));
        }
        if criteria.is_empty() {
            return Err(XError::argument("Sort criteria can not be empty"));
        }
        let mut order = Vec::with_capacity(criteria.len());
        for item in criteria {
            let item = item.trim();
            if item.is_empty() {
                return Err(XError::argument("Sort criteria can not be empty"));
            }
            order.push(item.to_string());
        }
        self.request.order = order;
        Ok(())
    }

    fn limit(&mut self, limit: u64) -> Result<()> {
        if self.request.limit.is_some() {
            return Err(repeated(self.operation(), "limit"));
        }
        self.request.limit = Some(limit);
        Ok(())
    }

    fn offset(&mut self, offset: u64) -> Result<()> {
        if self.request.limit.is_none() {
            return Err(XError::argument(format!(
                "{}: offset requires a limit",
                self.operation()
            )));
        }
        if self.request.offset.is_some() {
            return Err(repeated(self.operation(), "offset"));
        }
        self.request.offset = Some(offset);
        Ok(())
    }

    fn bind(&mut self, name: &str, value: WireValue) -> Result<()> {
        let name = name.trim_start_matches(':');
        if name.is_empty() {
            return Err(XError::argument("Placeholder name can not be empty"));
        }
        match self.request.bindings.iter_mut().find(|(n, _)| n == name) {
            // Rebinding replaces the earlier value
            Some(slot) => slot.1 = value,
            None => self.request.bindings.push((name.to_string(), value)),
        }
        Ok(())
    }

    fn assign(&mut self, assignment: Assignment) -> Result<()> {
        if assignment.target().trim().is_empty() {
            return Err(XError::argument(format!(
                "{}: target can not be empty",
                self.operation()
            )));
        }
        self.request.assignments.push(assignment);
        Ok(())
    }

    /// Final checks shared by all operations
    fn finish(self) -> Result<CrudRequest> {
        let request = self.request;
        let names = match request.criteria.as_deref() {
            Some(criteria) => placeholders(criteria),
            None => Vec::new(),
        };

        let missing: Vec<&str> = names
            .iter()
            .filter(|name| !request.bindings.iter().any(|(n, _)| n == *name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(XError::argument(format!(
                "Missing value bindings for: {}",
                missing.join(", ")
            )));
        }

        if let Some((unknown, _)) = request
            .bindings
            .iter()
            .find(|(n, _)| !names.iter().any(|name| name == n))
        {
            return Err(XError::argument(format!(
                "Unable to bind value for unexisting placeholder: {}",
                unknown
            )));
        }

        Ok(request)
    }
}

fn repeated(operation: &str, clause: &str) -> XError {
    XError::argument(format!("{}: {} was already given", operation, clause))
}

/// Clause methods shared by every builder holding a `clauses` field
macro_rules! clause_methods {
    (filter = $filter:ident) => {
        /// Filter condition; `:name` placeholders are filled by `bind`
        pub fn $filter(mut self, criteria: &str) -> Result<Self> {
            self.clauses.criteria(criteria)?;
            Ok(self)
        }

        /// Bind a value to a `:name` placeholder of the filter
        pub fn bind(mut self, name: &str, value: impl Into<WireValue>) -> Result<Self> {
            self.clauses.bind(name, value.into())?;
            Ok(self)
        }

        /// Bind a front-end value, mapping it through the value bridge
        pub fn bind_value(mut self, name: &str, value: &DynamicValue) -> Result<Self> {
            self.clauses.bind(name, map(value)?)?;
            Ok(self)
        }
    };
    (order = $order:ident) => {
        /// Ordering criteria, e.g. `"name DESC"`
        pub fn $order(mut self, criteria: &[&str]) -> Result<Self> {
            self.clauses.order(criteria)?;
            Ok(self)
        }

        pub fn limit(mut self, limit: u64) -> Result<Self> {
            self.clauses.limit(limit)?;
            Ok(self)
        }
    };
    (offset) => {
        /// Rows to skip; only valid after `limit`
        pub fn offset(mut self, offset: u64) -> Result<Self> {
            self.clauses.offset(offset)?;
            Ok(self)
        }
    };
}

// =============================================================================
// Table Operations
// =============================================================================

/// `SELECT` over a table
#[derive(Debug, Clone)]
pub struct TableSelect {
    clauses: Clauses,
}

impl TableSelect {
    pub fn new(target: impl Into<Target>) -> Self {
        Self {
            clauses: Clauses::new(CrudKind::Find, DataModel::Table, target.into()),
        }
    }

    /// Projection as raw expression fragments, e.g. `"alphacol AS a"`
    pub fn fields(mut self, fields: &[&str]) -> Result<Self> {
        self.clauses.projection(fields)?;
        Ok(self)
    }

    clause_methods!(filter = where_);
    clause_methods!(order = order_by);
    clause_methods!(offset);

    pub fn build(self) -> Result<CrudRequest> {
        self.clauses.finish()
    }
}

/// `INSERT` into a table
#[derive(Debug, Clone)]
pub struct TableInsert {
    clauses: Clauses,
}

impl TableInsert {
    pub fn new(target: impl Into<Target>) -> Self {
        Self {
            clauses: Clauses::new(CrudKind::Insert, DataModel::Table, target.into()),
        }
    }

    /// Column list; rows added afterwards must match its length
    pub fn columns(mut self, columns: &[&str]) -> Result<Self> {
        let request = &mut self.clauses.request;
        if !request.columns.is_empty() {
            return Err(repeated("insert", "columns"));
        }
        if !request.rows.is_empty() {
            return Err(XError::argument("insert: columns must precede values"));
        }
        if columns.is_empty() {
            return Err(XError::argument("insert: column list can not be empty"));
        }
        if columns.iter().any(|c| c.trim().is_empty()) {
            return Err(XError::argument("insert: column names can not be empty"));
        }
        request.columns = columns.iter().map(|c| c.trim().to_string()).collect();
        Ok(self)
    }

    /// Append one row
    pub fn values(mut self, row: Vec<WireValue>) -> Result<Self> {
        let request = &mut self.clauses.request;
        if row.is_empty() {
            return Err(XError::argument("insert: a row needs at least one value"));
        }
        let expected = if request.columns.is_empty() {
            request.rows.first().map(Vec::len)
        } else {
            Some(request.columns.len())
        };
        if let Some(expected) = expected {
            if row.len() != expected {
                return Err(XError::argument(format!(
                    "insert: row has {} values, expected {}",
                    row.len(),
                    expected
                )));
            }
        }
        request.rows.push(row);
        Ok(self)
    }

    /// Append one row of front-end values
    pub fn values_dynamic(self, row: &[DynamicValue]) -> Result<Self> {
        let row = row.iter().map(map).collect::<Result<Vec<_>>>()?;
        self.values(row)
    }

    pub fn build(self) -> Result<CrudRequest> {
        if self.clauses.request.rows.is_empty() {
            return Err(XError::argument("insert: Missing values for insert"));
        }
        self.clauses.finish()
    }
}

/// `UPDATE` of a table
#[derive(Debug, Clone)]
pub struct TableUpdate {
    clauses: Clauses,
}

impl TableUpdate {
    pub fn new(target: impl Into<Target>) -> Self {
        Self {
            clauses: Clauses::new(CrudKind::Update, DataModel::Table, target.into()),
        }
    }

    /// Assign a column
    pub fn set(mut self, column: &str, value: impl Into<WireValue>) -> Result<Self> {
        self.clauses.assign(Assignment::Set {
            target: column.trim().to_string(),
            value: value.into(),
        })?;
        Ok(self)
    }

    clause_methods!(filter = where_);
    clause_methods!(order = order_by);

    pub fn build(self) -> Result<CrudRequest> {
        if self.clauses.request.assignments.is_empty() {
            return Err(XError::argument("update: No fields specified for update"));
        }
        self.clauses.finish()
    }
}

/// `DELETE` from a table
#[derive(Debug, Clone)]
pub struct TableDelete {
    clauses: Clauses,
}

impl TableDelete {
    pub fn new(target: impl Into<Target>) -> Self {
        Self {
            clauses: Clauses::new(CrudKind::Delete, DataModel::Table, target.into()),
        }
    }

    clause_methods!(filter = where_);
    clause_methods!(order = order_by);

    pub fn build(self) -> Result<CrudRequest> {
        self.clauses.finish()
    }
}

// =============================================================================
// Collection Operations
// =============================================================================

/// Document search in a collection
#[derive(Debug, Clone)]
pub struct CollectionFind {
    clauses: Clauses,
}

impl CollectionFind {
    pub fn new(target: impl Into<Target>) -> Self {
        Self {
            clauses: Clauses::new(CrudKind::Find, DataModel::Document, target.into()),
        }
    }

    /// Document fields to keep, e.g. `"name"` or `"$.address.city"`
    pub fn fields(mut self, fields: &[&str]) -> Result<Self> {
        self.clauses.projection(fields)?;
        Ok(self)
    }

    clause_methods!(filter = filter);
    clause_methods!(order = sort);
    clause_methods!(offset);

    pub fn build(self) -> Result<CrudRequest> {
        self.clauses.finish()
    }
}

/// Document insertion into a collection
#[derive(Debug, Clone)]
pub struct CollectionAdd {
    clauses: Clauses,
}

impl CollectionAdd {
    pub fn new(target: impl Into<Target>) -> Self {
        Self {
            clauses: Clauses::new(CrudKind::Insert, DataModel::Document, target.into()),
        }
    }

    /// Add a document given as JSON text or as an expression
    pub fn add(mut self, document: impl Into<WireValue>) -> Result<Self> {
        let document = document.into();
        match &document {
            WireValue::String(text) => {
                let parsed: serde_json::Value = serde_json::from_str(text)
                    .map_err(|e| XError::argument(format!("add: Invalid document: {}", e)))?;
                if !parsed.is_object() {
                    return Err(XError::argument(
                        "add: Invalid document: expected a JSON object",
                    ));
                }
            }
            WireValue::Expression(_) => {}
            other => {
                return Err(XError::argument(format!(
                    "add: Invalid document: {} value",
                    other.kind()
                )))
            }
        }
        self.clauses.request.rows.push(vec![document]);
        Ok(self)
    }

    /// Add a document built with `serde_json`
    pub fn add_json(self, document: &serde_json::Value) -> Result<Self> {
        if !document.is_object() {
            return Err(XError::argument(
                "add: Invalid document: expected a JSON object",
            ));
        }
        self.add(WireValue::String(document.to_string()))
    }

    pub fn build(self) -> Result<CrudRequest> {
        if self.clauses.request.rows.is_empty() {
            return Err(XError::argument("add: Missing documents for add"));
        }
        self.clauses.finish()
    }
}

/// Document modification in a collection
#[derive(Debug, Clone)]
pub struct CollectionModify {
    clauses: Clauses,
}

impl CollectionModify {
    /// A search condition is mandatory for modify
    pub fn new(target: impl Into<Target>, condition: &str) -> Result<Self> {
        let mut clauses = Clauses::new(CrudKind::Update, DataModel::Document, target.into());
        clauses.criteria(condition)?;
        Ok(Self { clauses })
    }

    /// Set a document path
    pub fn set(mut self, path: &str, value: impl Into<WireValue>) -> Result<Self> {
        self.clauses.assign(Assignment::Set {
            target: path.trim().to_string(),
            value: value.into(),
        })?;
        Ok(self)
    }

    /// Remove document paths
    pub fn unset(mut self, paths: &[&str]) -> Result<Self> {
        if paths.is_empty() {
            return Err(XError::argument("modify: unset requires at least one field"));
        }
        for path in paths {
            self.clauses.assign(Assignment::Unset {
                target: path.trim().to_string(),
            })?;
        }
        Ok(self)
    }

    /// Bind a value to a `:name` placeholder of the condition
    pub fn bind(mut self, name: &str, value: impl Into<WireValue>) -> Result<Self> {
        self.clauses.bind(name, value.into())?;
        Ok(self)
    }

    pub fn bind_value(mut self, name: &str, value: &DynamicValue) -> Result<Self> {
        self.clauses.bind(name, map(value)?)?;
        Ok(self)
    }

    clause_methods!(order = sort);

    pub fn build(self) -> Result<CrudRequest> {
        if self.clauses.request.assignments.is_empty() {
            return Err(XError::argument("modify: No changes specified"));
        }
        self.clauses.finish()
    }
}

/// Document removal from a collection
#[derive(Debug, Clone)]
pub struct CollectionRemove {
    clauses: Clauses,
}

impl CollectionRemove {
    /// Without a filter every document is removed, up to `limit`
    pub fn new(target: impl Into<Target>) -> Self {
        Self {
            clauses: Clauses::new(CrudKind::Delete, DataModel::Document, target.into()),
        }
    }

    clause_methods!(filter = filter);
    clause_methods!(order = sort);

    pub fn build(self) -> Result<CrudRequest> {
        self.clauses.finish()
    }
}
