//! Streaming CSV parser with schema inference
//!
//! Text arrives in arbitrary chunks. The parser buffers until it holds whole
//! records, so quoted fields may span chunk boundaries. The first chunk that
//! contains the header freezes the schema: column names come from the header,
//! column types are inferred from the data rows of that same chunk, and the
//! override table is applied last. A later cell that does not fit an inferred
//! type is kept as a string; only overridden columns reject such cells.

use crate::error::{Result, SyncError};
use csv::StringRecord;
use serde_json::{Map, Number, Value};
use std::fmt;

/// A decoded row: column name to typed cell value.
pub type TypedRow = Map<String, Value>;

/// Primitive type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Number,
    Boolean,
    /// JSON arrays or objects, e.g. `[12,47,301]`
    Json,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Json => "json",
        };
        f.write_str(name)
    }
}

/// Column types forced regardless of what inference says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeOverrides(Vec<(String, ColumnType)>);

impl TypeOverrides {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn with(mut self, column: impl Into<String>, ty: ColumnType) -> Self {
        self.0.push((column.into(), ty));
        self
    }

    fn get(&self, column: &str) -> Option<ColumnType> {
        self.0
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, ty)| *ty)
    }
}

impl Default for TypeOverrides {
    /// `code` is always a string: values like "008" must keep their zeros.
    fn default() -> Self {
        Self::none().with("code", ColumnType::String)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    /// Type comes from the override table
    pub forced: bool,
}

/// Frozen column layout of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Infer column types from `sample`, then apply `overrides`.
    pub fn infer(header: &StringRecord, sample: &[StringRecord], overrides: &TypeOverrides) -> Self {
        let columns = header
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let name = name.trim().to_string();
                match overrides.get(&name) {
                    Some(ty) => Column { name, ty, forced: true },
                    None => {
                        let ty = infer_type(sample.iter().filter_map(|record| record.get(idx)));
                        Column { name, ty, forced: false }
                    },
                }
            })
            .collect();

        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    fn coerce(&self, record: &StringRecord, line: u64) -> Result<TypedRow> {
        self.columns
            .iter()
            .zip(record.iter())
            .map(|(column, raw)| {
                coerce_cell(column.ty, raw)
                    .or_else(|| (!column.forced).then(|| Value::String(raw.to_string())))
                    .map(|value| (column.name.clone(), value))
                    .ok_or_else(|| {
                        SyncError::parse(
                            format!("CSV line {}", line),
                            format!("'{}' is not a valid {} for column '{}'", raw, column.ty, column.name),
                        )
                    })
            })
            .collect()
    }
}

fn infer_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut seen = false;
    let mut number = true;
    let mut boolean = true;
    let mut json = true;

    for value in values.filter(|v| !v.is_empty()) {
        seen = true;
        number &= parse_number(value).is_some();
        boolean &= parse_bool(value).is_some();
        json &= parse_json(value).is_some();
    }

    match (seen, number, boolean, json) {
        (false, ..) => ColumnType::String,
        (true, true, _, _) => ColumnType::Number,
        (true, _, true, _) => ColumnType::Boolean,
        (true, _, _, true) => ColumnType::Json,
        _ => ColumnType::String,
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::from(int));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn parse_bool(raw: &str) -> Option<Value> {
    match raw {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        _ => None,
    }
}

fn parse_json(raw: &str) -> Option<Value> {
    if !(raw.starts_with('[') || raw.starts_with('{')) {
        return None;
    }
    serde_json::from_str(raw).ok()
}

fn coerce_cell(ty: ColumnType, raw: &str) -> Option<Value> {
    if ty == ColumnType::String {
        return Some(Value::String(raw.to_string()));
    }
    if raw.is_empty() {
        return Some(Value::Null);
    }
    match ty {
        ColumnType::Number => parse_number(raw),
        ColumnType::Boolean => parse_bool(raw),
        ColumnType::Json => parse_json(raw),
        ColumnType::String => None,
    }
}

/// How far each row is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseDepth {
    /// Cells kept as strings; enough for counting
    Shallow,
    /// Cells coerced to their column types
    Deep,
}

/// Rows produced by one [`CsvStreamParser::push`] or [`CsvStreamParser::finish`].
#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
    Raw(Vec<Vec<String>>),
    Typed(Vec<TypedRow>),
}

impl Rows {
    fn empty(depth: ParseDepth) -> Self {
        match depth {
            ParseDepth::Shallow => Rows::Raw(Vec::new()),
            ParseDepth::Deep => Rows::Typed(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Rows::Raw(rows) => rows.len(),
            Rows::Typed(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Typed rows; `None` for a shallow batch.
    pub fn into_typed(self) -> Option<Vec<TypedRow>> {
        match self {
            Rows::Typed(rows) => Some(rows),
            Rows::Raw(_) => None,
        }
    }
}

/// Incremental CSV decoder for one stream.
#[derive(Debug)]
pub struct CsvStreamParser {
    depth: ParseDepth,
    overrides: TypeOverrides,
    schema: Option<Schema>,
    buffer: String,
    /// Records consumed so far, header included
    records_read: u64,
}

impl CsvStreamParser {
    pub fn new(depth: ParseDepth) -> Self {
        Self::with_overrides(depth, TypeOverrides::default())
    }

    pub fn with_overrides(depth: ParseDepth, overrides: TypeOverrides) -> Self {
        Self {
            depth,
            overrides,
            schema: None,
            buffer: String::new(),
            records_read: 0,
        }
    }

    /// Schema once the header has been seen.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Feed one text chunk; returns every row it completed, in order.
    pub fn push(&mut self, chunk: &str) -> Result<Rows> {
        self.buffer.push_str(chunk);

        let complete = complete_records_len(&self.buffer);
        if complete == 0 {
            return Ok(Rows::empty(self.depth));
        }

        let text: String = self.buffer.drain(..complete).collect();
        let records = read_records(&text)?;
        self.consume(records)
    }

    /// End of stream: decode a trailing record that had no line terminator.
    pub fn finish(&mut self) -> Result<Rows> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            return Ok(Rows::empty(self.depth));
        }

        let records = read_records(&rest)?;
        self.consume(records)
    }

    fn consume(&mut self, records: Vec<StringRecord>) -> Result<Rows> {
        let mut records = records.into_iter();

        let schema = match self.schema.take() {
            Some(schema) => schema,
            None => {
                let Some(header) = records.next() else {
                    return Ok(Rows::empty(self.depth));
                };
                self.records_read += 1;

                let sample: Vec<StringRecord> = records.collect();
                let schema = Schema::infer(&header, &sample, &self.overrides);
                records = sample.into_iter();
                schema
            },
        };

        let rows = self.decode(&schema, records);
        self.schema = Some(schema);
        rows
    }

    fn decode(
        &mut self,
        schema: &Schema,
        records: impl Iterator<Item = StringRecord>,
    ) -> Result<Rows> {
        let mut raw = Vec::new();
        let mut typed = Vec::new();

        for record in records {
            self.records_read += 1;
            let line = self.records_read;

            if record.len() != schema.len() {
                return Err(SyncError::parse(
                    format!("CSV line {}", line),
                    format!("expected {} fields, found {}", schema.len(), record.len()),
                ));
            }

            match self.depth {
                ParseDepth::Shallow => raw.push(record.iter().map(str::to_string).collect()),
                ParseDepth::Deep => typed.push(schema.coerce(&record, line)?),
            }
        }

        Ok(match self.depth {
            ParseDepth::Shallow => Rows::Raw(raw),
            ParseDepth::Deep => Rows::Typed(typed),
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Byte length of the prefix of `text` made of complete records.
///
/// A record ends at a newline outside quotes. Quotes only open a quoted field
/// at the start of a field, like the csv crate reads them.
fn complete_records_len(text: &str) -> usize {
    let mut state = ScanState::FieldStart;
    let mut complete = 0;

    for (idx, byte) in text.bytes().enumerate() {
        state = match (state, byte) {
            (ScanState::Quoted, b'"') => ScanState::QuoteInQuoted,
            (ScanState::Quoted, _) => ScanState::Quoted,
            (ScanState::QuoteInQuoted, b'"') => ScanState::Quoted,
            (ScanState::FieldStart, b'"') => ScanState::Quoted,
            (_, b',') => ScanState::FieldStart,
            (_, b'\n') => {
                complete = idx + 1;
                ScanState::FieldStart
            },
            _ => ScanState::Unquoted,
        };
    }

    complete
}

fn read_records(text: &str) -> Result<Vec<StringRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SyncError::parse("CSV record", e))?;
        if record.len() == 1 && record.get(0).is_some_and(|cell| cell.trim().is_empty()) {
            continue;
        }
        records.push(record);
    }

    Ok(records)
}
