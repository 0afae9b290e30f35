//! Recipe source records and the documents derived from them.
//!
//! Source rows come from a CSV export whose list columns (`directions`,
//! `ingredients`) hold a serialized list, either as a Python literal
//! (`['Preheat oven.', "Boil water."]`) or as a JSON array.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::IndexError;
use crate::store::Payload;

/// One row of the recipe CSV, as read.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeRecord {
    pub recipe_id: u64,
    pub recipe_name: String,
    #[serde(default)]
    pub recipe_link: String,
    #[serde(default)]
    pub recipe_description: String,
    #[serde(default)]
    pub ratings: String,
    #[serde(rename = "ready-in", default)]
    pub ready_in: String,
    pub directions: String,
    pub ingredients: String,
}

/// A normalized recipe with its flattened `text`.
///
/// Serializes to the payload stored next to each indexed point, so field
/// names follow the source columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDocument {
    #[serde(rename = "recipe_id")]
    pub id: u64,
    #[serde(rename = "recipe_name")]
    pub name: String,
    #[serde(rename = "recipe_link")]
    pub link: String,
    #[serde(rename = "recipe_description")]
    pub description: String,
    pub ratings: String,
    #[serde(rename = "ready-in")]
    pub ready_in: String,
    pub directions: Vec<String>,
    pub ingredients: Vec<String>,
    pub text: String,
}

impl RecipeDocument {
    /// Normalize a source record. Fails if a list field cannot be parsed.
    pub fn from_record(record: RecipeRecord) -> Result<Self, IndexError> {
        let directions = parse_list_field(&record.directions).map_err(|reason| {
            IndexError::MalformedRecord {
                record: record.recipe_id.to_string(),
                reason: format!("directions: {}", reason),
            }
        })?;
        let ingredients = parse_list_field(&record.ingredients).map_err(|reason| {
            IndexError::MalformedRecord {
                record: record.recipe_id.to_string(),
                reason: format!("ingredients: {}", reason),
            }
        })?;

        let mut doc = Self {
            id: record.recipe_id,
            name: record.recipe_name.trim().to_string(),
            link: record.recipe_link.trim().to_string(),
            description: record.recipe_description.trim().to_string(),
            ratings: record.ratings.trim().to_string(),
            ready_in: record.ready_in.trim().to_string(),
            directions,
            ingredients,
            text: String::new(),
        };
        doc.text = build_text(&doc);
        Ok(doc)
    }

    pub fn to_payload(&self) -> Payload {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Payload::new(),
        }
    }

    pub fn from_payload(payload: Payload) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(payload))
    }
}

/// Flatten a document into its canonical indexed text.
pub fn build_text(doc: &RecipeDocument) -> String {
    format!(
        "Recipe: {} | Description: {} | Ratings: {} | Ready in: {} | Directions: {} | Ingredients: {}",
        doc.name,
        doc.description,
        doc.ratings,
        doc.ready_in,
        doc.directions.join(" ").trim(),
        doc.ingredients.join("; ").trim(),
    )
}

/// Parse a serialized list of strings.
///
/// Accepts a JSON array, or a Python list literal with single- or
/// double-quoted items.
pub fn parse_list_field(raw: &str) -> Result<Vec<String>, String> {
    let raw = raw.trim();
    if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
        return Ok(items);
    }

    let inner = raw
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| "not a bracketed list".to_string())?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(quote) = chars.next() else {
            break;
        };
        if quote != '\'' && quote != '"' {
            return Err(format!("unexpected character '{}'", quote));
        }

        let mut item = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some('n') => item.push('\n'),
                    Some('t') => item.push('\t'),
                    Some(other) => item.push(other),
                    None => return Err("dangling escape".to_string()),
                },
                c if c == quote => {
                    closed = true;
                    break;
                }
                c => item.push(c),
            }
        }
        if !closed {
            return Err("unterminated string".to_string());
        }
        items.push(item);

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            Some(',') | None => {}
            Some(other) => return Err(format!("expected ',' but found '{}'", other)),
        }
    }
    Ok(items)
}

/// Documents read from a source, plus the records that were skipped.
#[derive(Debug, Default)]
pub struct PreparedDocuments {
    pub documents: Vec<RecipeDocument>,
    pub skipped: Vec<IndexError>,
}

/// Read a recipe CSV and normalize every row.
///
/// A malformed row is skipped with a warning and reported in `skipped`;
/// an unreadable source is an error.
pub fn prepare_documents(path: &Path) -> Result<PreparedDocuments, IndexError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| IndexError::Source {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let prepared = prepare_from_reader(&mut reader);
    info!(
        path = %path.display(),
        documents = prepared.documents.len(),
        skipped = prepared.skipped.len(),
        "Prepared recipe documents"
    );
    Ok(prepared)
}

/// Normalize rows from any CSV reader.
pub fn prepare_from_reader<R: std::io::Read>(reader: &mut csv::Reader<R>) -> PreparedDocuments {
    let mut prepared = PreparedDocuments::default();
    for (row, result) in reader.deserialize::<RecipeRecord>().enumerate() {
        let outcome = result
            .map_err(|e| IndexError::MalformedRecord {
                record: format!("row {}", row + 1),
                reason: e.to_string(),
            })
            .and_then(RecipeDocument::from_record);
        match outcome {
            Ok(doc) => {
                debug!(id = doc.id, name = %doc.name, "Prepared recipe");
                prepared.documents.push(doc);
            }
            Err(e) => {
                warn!(error = %e, "Skipping recipe record");
                prepared.skipped.push(e);
            }
        }
    }
    prepared
}
