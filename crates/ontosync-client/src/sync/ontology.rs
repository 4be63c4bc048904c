//! Typed rows to codes, codes to ontologies

use crate::error::{Result, SyncError};
use crate::sync::csv_stream::TypedRow;
use ontosync_common::{Code, CodeId, Ontology};
use serde_json::Value;

/// Separator of the dotted path form (`"12.47.301"`).
const PATH_SEPARATOR: char = '.';

/// Convert one decoded shard row into a [`Code`].
pub fn code_from_row(row: &TypedRow) -> Result<Code> {
    let id = row
        .get("id")
        .and_then(as_code_id)
        .ok_or_else(|| invalid(row, "id", "expected an integer identifier"))?;

    let ontology_id = row
        .get("ontology_id")
        .and_then(as_text)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| invalid(row, "ontology_id", "missing ontology"))?;

    let path = row
        .get("path")
        .and_then(as_path)
        .filter(|path| !path.is_empty())
        .ok_or_else(|| invalid(row, "path", "expected a list of ancestor identifiers"))?;

    let code = row
        .get("code")
        .and_then(as_text)
        .ok_or_else(|| invalid(row, "code", "missing code"))?;

    let description = row.get("description").and_then(as_text);

    Ok(Code {
        id,
        ontology_id,
        path,
        code,
        description,
    })
}

/// Convert a batch of rows, failing on the first bad one.
pub fn codes_from_rows(rows: &[TypedRow]) -> Result<Vec<Code>> {
    rows.iter().map(code_from_row).collect()
}

fn invalid(row: &TypedRow, column: &str, message: &str) -> SyncError {
    let id = row.get("id").map(Value::to_string).unwrap_or_default();
    SyncError::parse(format!("code row {}", id), format!("column '{}': {}", column, message))
}

fn as_code_id(value: &Value) -> Option<CodeId> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn as_path(value: &Value) -> Option<Vec<CodeId>> {
    match value {
        Value::Array(items) => items.iter().map(as_code_id).collect(),
        Value::Number(_) => as_code_id(value).map(|id| vec![id]),
        Value::String(text) if text.trim_start().starts_with('[') => {
            serde_json::from_str::<Value>(text).ok().as_ref().and_then(as_path)
        },
        Value::String(text) => text
            .split(PATH_SEPARATOR)
            .map(|part| part.trim().parse().ok())
            .collect(),
        _ => None,
    }
}

/// Accumulates the [`Ontology`] aggregate of one shard.
#[derive(Debug, Default)]
pub struct OntologyBuilder {
    name: Option<String>,
    root_code_ids: Vec<CodeId>,
}

impl OntologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch of codes, in stream order.
    pub fn observe(&mut self, codes: &[Code]) {
        for code in codes {
            if self.name.is_none() {
                self.name = Some(code.ontology_id.clone());
            }
            if code.is_root() {
                self.root_code_ids.push(code.id);
            }
        }
    }

    /// The aggregate; `fallback_name` names it when no row was seen.
    pub fn finish(self, fallback_name: &str) -> Ontology {
        Ontology {
            name: self.name.unwrap_or_else(|| fallback_name.to_string()),
            root_code_ids: self.root_code_ids,
        }
    }
}
