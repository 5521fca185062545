//! Statement rendering
//!
//! Turns a [`CrudRequest`] into SQL text plus positional arguments.
//! Operands travel as typed `?` arguments; expression literals are spliced
//! into the text verbatim. Collections are tables with a JSON `doc` column.

use std::fmt;

use crate::error::{Result, XError};
use crate::protocol::Scalar;
use crate::value::{map, DynamicValue, WireValue};

use super::{Assignment, CrudKind, CrudRequest, DataModel, Target, DOC_COLUMN};

/// SQL text with its positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    args: Vec<WireValue>,
    model: DataModel,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
            model: DataModel::Table,
        }
    }

    /// Append a positional argument for the next `?`
    pub fn bind(mut self, value: impl Into<WireValue>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Append a front-end value, mapped through the value bridge
    pub fn bind_value(self, value: &DynamicValue) -> Result<Self> {
        Ok(self.bind(map(value)?))
    }

    /// Rows of this statement hold documents in the `doc` column
    pub fn with_data_model(mut self, model: DataModel) -> Self {
        self.model = model;
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[WireValue] {
        &self.args
    }

    pub fn data_model(&self) -> DataModel {
        self.model
    }

    /// Arguments as protocol scalars
    ///
    /// Expression literals can not be sent as arguments and fail here,
    /// before anything reaches the wire.
    pub(crate) fn scalar_args(&self) -> Result<Vec<Scalar>> {
        self.args.iter().map(Scalar::try_from).collect()
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::new(sql)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

// =============================================================================
// Quoting
// =============================================================================

/// Back-tick quote an identifier
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn quote_string(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "''"))
}

fn render_target(target: &Target) -> String {
    match &target.schema {
        Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(&target.name)),
        None => quote_identifier(&target.name),
    }
}

// =============================================================================
// Expression Scanning
// =============================================================================

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_path_char(c: char) -> bool {
    is_name_char(c) || matches!(c, '.' | '[' | ']' | '*' | '$')
}

/// Words that stay SQL when they appear bare in a document expression
const SQL_WORDS: &[&str] = &[
    "AND", "AS", "ASC", "BETWEEN", "BINARY", "CASE", "DESC", "DIV", "ELSE", "END", "ESCAPE",
    "FALSE", "IN", "INTERVAL", "IS", "LIKE", "MOD", "NOT", "NULL", "OR", "REGEXP", "RLIKE",
    "SOUNDS", "THEN", "TRUE", "UNKNOWN", "WHEN", "XOR", "MICROSECOND", "SECOND", "MINUTE",
    "HOUR", "DAY", "WEEK", "MONTH", "QUARTER", "YEAR",
];

fn is_field_char(c: char) -> bool {
    is_name_char(c) || matches!(c, '.' | '[' | ']')
}

/// A bare word that is a keyword, a function name or the `doc` column
fn is_sql_word(word: &str, rest: &[char]) -> bool {
    if rest.iter().find(|c| !c.is_whitespace()) == Some(&'(') {
        return true;
    }
    word == DOC_COLUMN || SQL_WORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Index just past the quoted run starting at `start`
fn quoted_end(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && quote != '`' {
            i += 2;
            continue;
        }
        if c == quote {
            if i + 1 < chars.len() && chars[i + 1] == quote {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Rewrite expression text
///
/// `:name` placeholders are handed to `placeholder`, which writes their
/// replacement. In document mode `$.path` references and bare field names
/// become `doc` lookups; keywords and function names stay as they are.
/// Quoted strings and identifiers are copied untouched.
fn rewrite<F>(text: &str, model: DataModel, mut placeholder: F) -> Result<String>
where
    F: FnMut(&str, &mut String) -> Result<()>,
{
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                let end = quoted_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            ':' if i + 1 < chars.len()
                && is_name_char(chars[i + 1])
                && (i == 0 || chars[i - 1] != ':') =>
            {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_name_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                placeholder(&name, &mut out)?;
                i = end;
            }
            '$' if model == DataModel::Document => {
                let mut end = i + 1;
                while end < chars.len() && is_path_char(chars[end]) {
                    end += 1;
                }
                if end == i + 1 {
                    out.push('$');
                } else {
                    let path: String = chars[i..end].iter().collect();
                    out.push_str(&document_field(&path));
                }
                i = end;
            }
            c if model == DataModel::Document && c.is_ascii_digit() => {
                let mut end = i + 1;
                while end < chars.len() && is_field_char(chars[end]) {
                    end += 1;
                }
                out.extend(&chars[i..end]);
                i = end;
            }
            c if model == DataModel::Document && (c.is_ascii_alphabetic() || c == '_') => {
                let mut end = i + 1;
                while end < chars.len() && is_field_char(chars[end]) {
                    end += 1;
                }
                let word: String = chars[i..end].iter().collect();
                if (i > 0 && chars[i - 1] == '@') || is_sql_word(&word, &chars[end..]) {
                    out.push_str(&word);
                } else {
                    out.push_str(&document_field(&document_path(&word)));
                }
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(out)
}

/// Distinct `:name` placeholders in order of first appearance
pub(crate) fn placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let _ = rewrite(text, DataModel::Table, |name, _| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        Ok(())
    });
    names
}

fn document_path(field: &str) -> String {
    if field.starts_with('$') {
        field.to_string()
    } else {
        format!("$.{}", field)
    }
}

fn document_field(path: &str) -> String {
    format!("JSON_EXTRACT({},{})", DOC_COLUMN, quote_string(path))
}

// =============================================================================
// Rendering
// =============================================================================

struct Renderer<'a> {
    request: &'a CrudRequest,
    sql: String,
    args: Vec<WireValue>,
}

impl<'a> Renderer<'a> {
    fn new(request: &'a CrudRequest) -> Self {
        Self {
            request,
            sql: String::with_capacity(128),
            args: Vec::new(),
        }
    }

    fn operand(&mut self, value: &WireValue) {
        match value {
            WireValue::Expression(expr) => self.sql.push_str(expr.as_str()),
            other => {
                self.sql.push('?');
                self.args.push(other.clone());
            }
        }
    }

    fn criteria(&mut self) -> Result<()> {
        let request = self.request;
        let Some(criteria) = request.criteria.as_deref() else {
            return Ok(());
        };
        let mut args = Vec::new();
        let text = rewrite(criteria, request.model, |name, out| {
            let (_, value) = request
                .bindings
                .iter()
                .find(|(n, _)| n == name)
                .ok_or_else(|| XError::argument(format!("Missing value bindings for: {}", name)))?;
            match value {
                WireValue::Expression(expr) => out.push_str(expr.as_str()),
                other => {
                    out.push('?');
                    args.push(other.clone());
                }
            }
            Ok(())
        })?;
        self.sql.push_str(" WHERE ");
        self.sql.push_str(&text);
        self.args.extend(args);
        Ok(())
    }

    fn order(&mut self) -> Result<()> {
        if self.request.order.is_empty() {
            return Ok(());
        }
        let mut items = Vec::with_capacity(self.request.order.len());
        for item in &self.request.order {
            items.push(match self.request.model {
                DataModel::Table => item.clone(),
                DataModel::Document => document_sort_item(item)?,
            });
        }
        self.sql.push_str(" ORDER BY ");
        self.sql.push_str(&items.join(", "));
        Ok(())
    }

    fn limit(&mut self) {
        if let Some(limit) = self.request.limit {
            self.sql.push_str(&format!(" LIMIT {}", limit));
            if let Some(offset) = self.request.offset {
                self.sql.push_str(&format!(" OFFSET {}", offset));
            }
        }
    }

    fn projection(&mut self) {
        let projection = &self.request.projection;
        match self.request.model {
            DataModel::Table if projection.is_empty() => self.sql.push('*'),
            DataModel::Table => self.sql.push_str(&projection.join(", ")),
            DataModel::Document if projection.is_empty() => self.sql.push_str(DOC_COLUMN),
            DataModel::Document => {
                let pairs: Vec<String> = projection
                    .iter()
                    .map(|field| {
                        let (path, key) = split_alias(field);
                        let path = document_path(path);
                        format!("{}, {}", quote_string(&key), document_field(&path))
                    })
                    .collect();
                self.sql.push_str(&format!(
                    "JSON_OBJECT({}) AS {}",
                    pairs.join(", "),
                    DOC_COLUMN
                ));
            }
        }
    }

    fn render(mut self) -> Result<Statement> {
        let target = render_target(&self.request.target);
        match self.request.kind {
            CrudKind::Find => {
                self.sql.push_str("SELECT ");
                self.projection();
                self.sql.push_str(" FROM ");
                self.sql.push_str(&target);
                self.criteria()?;
                self.order()?;
                self.limit();
            }
            CrudKind::Insert => {
                self.sql.push_str("INSERT INTO ");
                self.sql.push_str(&target);
                let columns: Vec<String> = match self.request.model {
                    DataModel::Table => self
                        .request
                        .columns
                        .iter()
                        .map(|c| quote_identifier(c))
                        .collect(),
                    DataModel::Document => vec![quote_identifier(DOC_COLUMN)],
                };
                if !columns.is_empty() {
                    self.sql.push_str(&format!(" ({})", columns.join(", ")));
                }
                self.sql.push_str(" VALUES ");
                let request = self.request;
                for (index, row) in request.rows.iter().enumerate() {
                    if index > 0 {
                        self.sql.push_str(", ");
                    }
                    self.sql.push('(');
                    for (position, value) in row.iter().enumerate() {
                        if position > 0 {
                            self.sql.push_str(", ");
                        }
                        self.operand(value);
                    }
                    self.sql.push(')');
                }
            }
            CrudKind::Update => {
                self.sql.push_str("UPDATE ");
                self.sql.push_str(&target);
                self.sql.push_str(" SET ");
                match self.request.model {
                    DataModel::Table => self.table_assignments()?,
                    DataModel::Document => self.document_assignments(),
                }
                self.criteria()?;
                self.order()?;
                self.limit();
            }
            CrudKind::Delete => {
                self.sql.push_str("DELETE FROM ");
                self.sql.push_str(&target);
                self.criteria()?;
                self.order()?;
                self.limit();
            }
        }

        Ok(Statement {
            sql: self.sql,
            args: self.args,
            model: self.request.model,
        })
    }

    fn table_assignments(&mut self) -> Result<()> {
        let request = self.request;
        for (index, assignment) in request.assignments.iter().enumerate() {
            let Assignment::Set { target, value } = assignment else {
                return Err(XError::argument(format!(
                    "update: unset of '{}' only applies to documents",
                    assignment.target()
                )));
            };
            if index > 0 {
                self.sql.push_str(", ");
            }
            self.sql.push_str(&quote_identifier(target));
            self.sql.push_str(" = ");
            self.operand(value);
        }
        Ok(())
    }

    /// Assignments nest so that they apply in order
    fn document_assignments(&mut self) {
        let request = self.request;
        let mut expr = DOC_COLUMN.to_string();
        let mut args = Vec::new();
        for assignment in &request.assignments {
            let path = quote_string(&document_path(assignment.target()));
            expr = match assignment {
                Assignment::Set { value, .. } => {
                    let operand = match value {
                        WireValue::Expression(e) => e.as_str().to_string(),
                        other => {
                            args.push(other.clone());
                            "?".to_string()
                        }
                    };
                    format!("JSON_SET({}, {}, {})", expr, path, operand)
                }
                Assignment::Unset { .. } => format!("JSON_REMOVE({}, {})", expr, path),
            };
        }
        self.sql.push_str(&format!("{} = {}", DOC_COLUMN, expr));
        self.args.extend(args);
    }
}

fn split_alias(field: &str) -> (&str, String) {
    let tokens: Vec<&str> = field.split_whitespace().collect();
    if tokens.len() == 3 && tokens[1].eq_ignore_ascii_case("as") {
        return (tokens[0], tokens[2].to_string());
    }
    let key = field
        .trim_start_matches('$')
        .rsplit('.')
        .find(|segment| !segment.is_empty())
        .unwrap_or(field)
        .to_string();
    (field, key)
}

fn document_sort_item(item: &str) -> Result<String> {
    let (head, tail) = match item.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, Some(tail.trim())),
        None => (item, None),
    };
    if !head.chars().all(is_path_char) {
        return rewrite(item, DataModel::Document, |name, _| {
            Err(XError::argument(format!(
                "sort: placeholder :{} is not allowed in sort criteria",
                name
            )))
        });
    }
    let mut rendered = document_field(&document_path(head));
    if let Some(direction) = tail {
        rendered.push(' ');
        rendered.push_str(direction);
    }
    Ok(rendered)
}

pub(crate) fn render(request: &CrudRequest) -> Result<Statement> {
    Renderer::new(request).render()
}
