//! Catalog built from operations captured off the live application.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::traits::catalog::QueryCatalog;
use crate::types::query::QueryOperation;

#[derive(Debug, Deserialize)]
struct RecordedEntry {
    document: String,
    #[serde(default)]
    variables: Vec<String>,
}

/// Operations captured from the application's own traffic, keyed by name.
///
/// The capture format is a JSON object mapping operation name to
/// `{ "document": "...", "variables": [...] }`. How the capture file gets
/// produced and loaded from disk is the application's concern; this type
/// only takes the parsed JSON.
pub struct RecordedCatalog {
    operations: HashMap<String, QueryOperation>,
}

impl RecordedCatalog {
    /// Build a catalog from captured-operation JSON.
    pub fn from_json(value: &Value) -> Result<Self> {
        let entries: HashMap<String, RecordedEntry> =
            serde_json::from_value(value.clone())?;
        let operations = entries
            .into_iter()
            .map(|(name, entry)| {
                let op = QueryOperation::new(name.clone(), entry.document)
                    .with_variables(entry.variables);
                (name, op)
            })
            .collect();
        Ok(Self { operations })
    }

    /// Number of captured operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl QueryCatalog for RecordedCatalog {
    fn resolve(&self, name: &str) -> Option<QueryOperation> {
        self.operations.get(name).cloned()
    }
}
