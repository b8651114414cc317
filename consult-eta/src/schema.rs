use crate::features::FeatureBag;
use serde::Deserialize;
use std::collections::HashMap;

/// The ordered input columns an estimator was trained on.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    columns: Vec<String>,
    index: HashMap<String, usize>,
}

// Older exports wrote the bare array, newer ones wrap it.
#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaFile {
    Wrapped { columns: Vec<String> },
    Bare(Vec<String>),
}

impl ModelSchema {
    pub fn new(columns: Vec<String>) -> Result<Self, String> {
        let mut index = HashMap::with_capacity(columns.len());
        for (position, column) in columns.iter().enumerate() {
            if index.insert(column.clone(), position).is_some() {
                return Err(format!("column {} is listed twice", column));
            }
        }
        Ok(Self { columns, index })
    }

    pub fn from_json(raw: &str) -> Result<Self, String> {
        let file: SchemaFile = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let columns = match file {
            SchemaFile::Wrapped { columns } => columns,
            SchemaFile::Bare(columns) => columns,
        };
        Self::new(columns)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    /// Places every expanded feature at its schema position by name. Schema
    /// columns the bag does not produce stay 0; features the schema does not
    /// list are dropped.
    pub fn align(&self, bag: &FeatureBag) -> Vec<f64> {
        let mut vector = vec![0.0; self.columns.len()];
        for (column, value) in bag.expand() {
            if let Some(position) = self.position(&column) {
                vector[position] = value;
            }
        }
        vector
    }
}
