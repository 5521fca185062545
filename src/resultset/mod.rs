//! Resultset Module
//!
//! Cursor over the (possibly multi-part) response to one statement.
//!
//! ## Part States
//! ```text
//! MetadataPending → RowsStreaming → PartExhausted
//! ```
//! `advance_to_next_result` either loads the next part or marks the whole
//! result `Done`, after which every operation is a protocol state error.
//!
//! ## Message Order
//! ```text
//! ( Notice* ColumnMetaData* Row* FetchDone[MoreResultsets] )*  Notice* StmtExecuteOk
//! ```
//! A statement without columns sends only notices and `StmtExecuteOk`.

mod column;
mod decode;

pub use column::{
    charset_name, ColumnMetadata, FieldType, CONTENT_TYPE_GEOMETRY, CONTENT_TYPE_JSON,
    CONTENT_TYPE_XML, METADATA_FIELDS,
};
pub use decode::decode_field;

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::crud::{DataModel, DOC_COLUMN};
use crate::error::{Result, XError};
use crate::protocol::{Notice, ServerMessage, StateChange, Warning};
use crate::session::{scalar_text, server_error, StatementStream};
use crate::value::DynamicValue;

// =============================================================================
// Row Values
// =============================================================================

/// Column name to value mapping in column order
///
/// Equality ignores order: two documents are equal when they hold the same
/// keys with the same values.
#[derive(Debug, Clone, Default)]
pub struct Document {
    fields: Vec<(String, DynamicValue)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field, keeping the first position
    pub fn insert(&mut self, name: impl Into<String>, value: DynamicValue) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DynamicValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DynamicValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Values in column order
    pub fn into_values(self) -> Vec<DynamicValue> {
        self.fields.into_iter().map(|(_, v)| v).collect()
    }

    pub fn into_value(self) -> DynamicValue {
        DynamicValue::Map(self.fields.into_iter().collect::<BTreeMap<_, _>>())
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .fields
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, (name, value)) in self.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", DynamicValue::from(name).descr(), value.descr())?;
        }
        f.write_str("}")
    }
}

impl FromIterator<(String, DynamicValue)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, DynamicValue)>>(iter: I) -> Self {
        let mut document = Document::new();
        for (name, value) in iter {
            document.insert(name, value);
        }
        document
    }
}

/// One fetched row
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Document(Document),
    Raw(Vec<DynamicValue>),
}

impl Row {
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Row::Document(document) => Some(document),
            Row::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&[DynamicValue]> {
        match self {
            Row::Raw(values) => Some(values),
            Row::Document(_) => None,
        }
    }

    pub fn into_document(self) -> Option<Document> {
        match self {
            Row::Document(document) => Some(document),
            Row::Raw(_) => None,
        }
    }

    pub fn into_value(self) -> DynamicValue {
        match self {
            Row::Document(document) => document.into_value(),
            Row::Raw(values) => DynamicValue::Array(values),
        }
    }
}

/// Documents print in column order
impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Row::Document(document) => fmt::Display::fmt(document, f),
            Row::Raw(values) => {
                f.write_str("[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(&value.descr())?;
                }
                f.write_str("]")
            }
        }
    }
}

// =============================================================================
// Resultset
// =============================================================================

/// State of the current result part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartState {
    MetadataPending,
    RowsStreaming,
    PartExhausted,
}

/// Response to one executed statement
pub struct Resultset {
    stream: StatementStream,
    model: DataModel,

    columns: Vec<ColumnMetadata>,
    part: PartState,
    part_index: usize,
    /// Message read past the metadata, not consumed yet
    lookahead: Option<ServerMessage>,
    /// The server announced another part after this one
    more_parts: bool,
    /// `StmtExecuteOk` was consumed
    statement_done: bool,
    done: bool,

    fetched_row_count: u64,
    affected_rows: u64,
    warnings: Vec<Warning>,
    auto_increment_value: Option<u64>,
    info: Option<String>,

    started: Instant,
    execution_time: Option<Duration>,
}

impl Resultset {
    /// Bind to a dispatched statement and load its first part
    pub(crate) fn start(stream: StatementStream, model: DataModel) -> Result<Self> {
        let mut result = Self {
            stream,
            model,
            columns: Vec::new(),
            part: PartState::MetadataPending,
            part_index: 0,
            lookahead: None,
            more_parts: false,
            statement_done: false,
            done: false,
            fetched_row_count: 0,
            affected_rows: 0,
            warnings: Vec::new(),
            auto_increment_value: None,
            info: None,
            started: Instant::now(),
            execution_time: None,
        };
        result.load_part()?;
        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn statement_id(&self) -> u64 {
        self.stream.statement_id()
    }

    /// Column metadata of the current part
    pub fn column_metadata(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Whether the current part carries rows
    pub fn has_data(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn part_state(&self) -> PartState {
        self.part
    }

    /// Zero-based index of the current part
    pub fn part_index(&self) -> usize {
        self.part_index
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Rows fetched from the current part
    pub fn fetched_row_count(&self) -> u64 {
        self.fetched_row_count
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn warning_count(&self) -> u64 {
        self.warnings.len() as u64
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Value generated for an auto-increment column
    pub fn auto_increment_value(&self) -> Option<u64> {
        self.auto_increment_value
    }

    /// Informational message from the server
    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    /// Time from dispatch until the statement finished
    pub fn execution_time(&self) -> Option<Duration> {
        self.execution_time
    }

    // -------------------------------------------------------------------------
    // Fetching
    // -------------------------------------------------------------------------

    /// Next row of the current part, `None` once the part is exhausted
    pub fn next(&mut self, raw: bool) -> Result<Option<Row>> {
        self.ensure_active()?;
        let fields = match self.read_row()? {
            Some(fields) => fields,
            None => return Ok(None),
        };

        let row = match self.decode_row(&fields, raw) {
            Ok(row) => row,
            Err(e) => return Err(self.fatal(e)),
        };
        self.fetched_row_count += 1;
        Ok(Some(row))
    }

    /// Every remaining row of the current part
    pub fn all(&mut self, raw: bool) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next(raw)? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// First remaining row as a document; the rest of the statement is drained
    pub fn fetch_one(&mut self) -> Result<Option<Document>> {
        let row = self.next(false)?;
        self.drain()?;
        Ok(row.and_then(Row::into_document))
    }

    /// Move to the next result part
    ///
    /// Unread rows of the current part are discarded. Returns false, and
    /// the result becomes `Done`, when no further part exists.
    pub fn advance_to_next_result(&mut self) -> Result<bool> {
        self.ensure_active()?;
        while self.read_row()?.is_some() {}

        if !self.more_parts {
            self.finish_done();
            return Ok(false);
        }

        self.more_parts = false;
        self.columns.clear();
        self.fetched_row_count = 0;
        self.affected_rows = 0;
        self.warnings.clear();
        self.part = PartState::MetadataPending;
        self.part_index += 1;
        self.load_part()?;

        // The statement ended without another row-bearing part
        if self.columns.is_empty() && self.statement_done {
            self.finish_done();
            return Ok(false);
        }

        tracing::trace!(part = self.part_index, columns = self.columns.len(), "next result part");
        Ok(true)
    }

    /// Consume everything left of the statement
    pub fn drain(&mut self) -> Result<()> {
        while !self.done {
            self.advance_to_next_result()?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Stream Handling
    // -------------------------------------------------------------------------

    fn ensure_active(&self) -> Result<()> {
        if self.done {
            return Err(XError::ProtocolState(format!(
                "Result of statement {} is already done",
                self.stream.statement_id()
            )));
        }
        Ok(())
    }

    fn finish_done(&mut self) {
        self.done = true;
        self.part = PartState::PartExhausted;
    }

    fn next_message(&mut self) -> Result<ServerMessage> {
        match self.lookahead.take() {
            Some(message) => Ok(message),
            None => self.stream.read(),
        }
    }

    /// Errors reported by the stream already updated the session
    fn stream_error(&mut self, error: XError) -> XError {
        if error.is_fatal_to_session() || error.is_protocol_state_error() {
            self.statement_done = true;
            self.finish_done();
        }
        error
    }

    /// Error found while interpreting messages: the stream is unusable
    fn fatal(&mut self, error: XError) -> XError {
        self.stream.fail(&error);
        self.statement_done = true;
        self.finish_done();
        error
    }

    fn server_failure(&mut self, frame: crate::protocol::ErrorFrame) -> XError {
        let error = server_error(frame);
        tracing::debug!(parent: &self.stream.span(), statement = self.stream.statement_id(), "statement failed: {}", error);
        self.statement_done = true;
        self.finish_statement();
        self.finish_done();
        error
    }

    fn finish_statement(&mut self) {
        self.execution_time = Some(self.started.elapsed());
        self.stream.finish();
    }

    fn read(&mut self) -> Result<ServerMessage> {
        match self.next_message() {
            Ok(message) => Ok(message),
            Err(e) => Err(self.stream_error(e)),
        }
    }

    /// Collect metadata until the first non-metadata message
    fn load_part(&mut self) -> Result<()> {
        loop {
            match self.read()? {
                ServerMessage::Notice { notice, .. } => self.observe(notice),
                ServerMessage::ColumnMetaData(frame) => self.columns.push(frame.into()),
                ServerMessage::Error(frame) => return Err(self.server_failure(frame)),
                other => {
                    self.lookahead = Some(other);
                    break;
                }
            }
        }
        self.part = PartState::RowsStreaming;

        // Nothing to stream: consume the end of the part right away
        if self.columns.is_empty() {
            while self.read_row()?.is_some() {}
        }
        Ok(())
    }

    /// Encoded fields of the next row, `None` at the end of the part
    fn read_row(&mut self) -> Result<Option<Vec<Bytes>>> {
        if self.part == PartState::PartExhausted {
            return Ok(None);
        }

        loop {
            match self.read()? {
                ServerMessage::Row(fields) => {
                    if fields.len() != self.columns.len() {
                        return Err(self.fatal(XError::decode(format!(
                            "Row has {} fields but the result has {} columns",
                            fields.len(),
                            self.columns.len()
                        ))));
                    }
                    return Ok(Some(fields));
                }
                ServerMessage::Notice { notice, .. } => self.observe(notice),
                ServerMessage::FetchDone | ServerMessage::FetchSuspended => {
                    self.part = PartState::PartExhausted;
                    self.read_trailer()?;
                    return Ok(None);
                }
                ServerMessage::FetchDoneMoreResultsets | ServerMessage::FetchDoneMoreOutParams => {
                    self.part = PartState::PartExhausted;
                    self.more_parts = true;
                    return Ok(None);
                }
                ServerMessage::StmtExecuteOk => {
                    self.part = PartState::PartExhausted;
                    self.statement_done = true;
                    self.finish_statement();
                    return Ok(None);
                }
                ServerMessage::Error(frame) => return Err(self.server_failure(frame)),
                other => {
                    return Err(self.fatal(XError::decode(format!(
                        "Unexpected {:?} while reading rows",
                        other.message_type()
                    ))))
                }
            }
        }
    }

    /// Notices and `StmtExecuteOk` after the last part
    fn read_trailer(&mut self) -> Result<()> {
        loop {
            match self.read()? {
                ServerMessage::Notice { notice, .. } => self.observe(notice),
                ServerMessage::StmtExecuteOk => {
                    self.statement_done = true;
                    self.finish_statement();
                    return Ok(());
                }
                ServerMessage::Error(frame) => return Err(self.server_failure(frame)),
                other => {
                    return Err(self.fatal(XError::decode(format!(
                        "Unexpected {:?} after the last result",
                        other.message_type()
                    ))))
                }
            }
        }
    }

    /// Statement-level effects of a notice
    fn observe(&mut self, notice: Notice) {
        match notice {
            Notice::Warning(warning) => {
                tracing::debug!(code = warning.code, level = warning.level.as_str(), "{}", warning.message);
                self.warnings.push(warning);
            }
            Notice::SessionStateChanged(change) => match change {
                StateChange::RowsAffected(rows) => self.affected_rows = rows,
                StateChange::GeneratedInsertId(id) => self.auto_increment_value = Some(id),
                StateChange::ProducedMessage(message) => self.info = Some(message),
                _ => {}
            },
            Notice::SessionVariableChanged { param, value } => {
                let value = value.as_ref().map(scalar_text).unwrap_or_default();
                tracing::trace!(%param, %value, "session variable changed");
            }
            Notice::Unknown { notice_type, .. } => {
                tracing::trace!(notice_type, "ignoring unknown notice");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Row Decoding
    // -------------------------------------------------------------------------

    fn decode_row(&self, fields: &[Bytes], raw: bool) -> Result<Row> {
        let mut values = Vec::with_capacity(fields.len());
        for (column, field) in self.columns.iter().zip(fields) {
            values.push(decode_field(column, field)?);
        }

        if self.model == DataModel::Document {
            if let Some(index) = self.columns.iter().position(|c| c.name == DOC_COLUMN) {
                let document = document_value(values.swap_remove(index))?;
                return Ok(if raw {
                    Row::Raw(vec![document.into_value()])
                } else {
                    Row::Document(document)
                });
            }
        }

        if raw {
            return Ok(Row::Raw(values));
        }
        Ok(Row::Document(
            self.columns
                .iter()
                .map(|c| c.name.clone())
                .zip(values)
                .collect(),
        ))
    }
}

/// A `doc` column value as a document
fn document_value(value: DynamicValue) -> Result<Document> {
    let value = match value {
        DynamicValue::String(text) => serde_json::from_str::<serde_json::Value>(&text)
            .map(DynamicValue::from)
            .map_err(|e| XError::decode(format!("Invalid JSON document: {}", e)))?,
        other => other,
    };
    match value {
        DynamicValue::Map(map) => Ok(map.into_iter().collect()),
        DynamicValue::Null => Ok(Document::new()),
        other => Err(XError::decode(format!(
            "Document column holds {} instead of an object",
            other.type_name()
        ))),
    }
}

impl Drop for Resultset {
    /// An abandoned result drains the rest of its statement
    fn drop(&mut self) {
        if self.statement_done || !self.stream.is_active() {
            return;
        }
        let statement = self.stream.statement_id();
        if let Err(e) = self.drain() {
            tracing::debug!(statement, "drain of abandoned result failed: {}", e);
            if !e.is_server_error() && self.stream.is_active() {
                self.stream.fail(&e);
            }
        }
    }
}

impl fmt::Debug for Resultset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resultset")
            .field("statement_id", &self.stream.statement_id())
            .field("part", &self.part_index)
            .field("columns", &self.column_names())
            .field("fetched_row_count", &self.fetched_row_count)
            .field("affected_rows", &self.affected_rows)
            .field("warning_count", &self.warnings.len())
            .field("done", &self.done)
            .finish()
    }
}
