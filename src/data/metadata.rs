//! Sample metadata: categorical attributes keyed by sample identifier

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{EdgerError, Result};

/// Sample table holding categorical columns, one value per sample.
/// Column order is the order columns were added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTable {
    sample_ids: Vec<String>,
    columns: Vec<(String, Vec<String>)>,
}

impl SampleTable {
    /// Create an empty table for the given samples
    pub fn new(sample_ids: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        if let Some(dup) = sample_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(EdgerError::InvalidMetadata {
                reason: format!("duplicate sample identifier '{}'", dup),
            });
        }
        Ok(Self {
            sample_ids,
            columns: Vec::new(),
        })
    }

    /// Add a categorical column
    pub fn add_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(EdgerError::DimensionMismatch {
                expected: format!("{} values for column '{}'", self.sample_ids.len(), name),
                got: format!("{} values", values.len()),
            });
        }
        if self.has_column(name) {
            return Err(EdgerError::InvalidMetadata {
                reason: format!("column '{}' already present", name),
            });
        }
        self.columns.push((name.to_string(), values));
        Ok(())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    /// Values of a column in sample order
    pub fn column(&self, name: &str) -> Result<&[String]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| EdgerError::InvalidMetadata {
                reason: format!("column '{}' not found", name),
            })
    }

    /// Unique levels of a column, sorted
    pub fn levels(&self, name: &str) -> Result<Vec<String>> {
        let mut unique: Vec<String> = self.column(name)?.to_vec();
        unique.sort();
        unique.dedup();
        Ok(unique)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }
}
