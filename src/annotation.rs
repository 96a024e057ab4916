//! Gene annotation lookup

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EdgerError, Result};

/// Symbol and free-text description for a gene
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Annotation {
    pub symbol: String,
    pub description: String,
}

/// Anything that can map a gene identifier to an annotation
pub trait AnnotationSource {
    fn lookup(&self, gene_id: &str) -> Option<Annotation>;
}

/// In-memory annotation table keyed by gene identifier
#[derive(Debug, Clone, Default)]
pub struct TableAnnotations {
    entries: HashMap<String, Annotation>,
}

impl TableAnnotations {
    pub fn insert(&mut self, gene_id: &str, annotation: Annotation) {
        self.entries.insert(gene_id.to_string(), annotation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a delimited table: gene id, symbol, optional description.
    /// The first row is a header. Later duplicates replace earlier rows.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = crate::io::delimited_reader(path)?;
        let mut table = Self::default();

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let gene_id = record.get(0).map(str::trim).unwrap_or_default();
            if gene_id.is_empty() {
                return Err(EdgerError::InvalidMetadata {
                    reason: format!(
                        "{}: row {} has no gene identifier",
                        path.display(),
                        line + 2
                    ),
                });
            }
            table.insert(
                gene_id,
                Annotation {
                    symbol: record.get(1).unwrap_or_default().trim().to_string(),
                    description: record.get(2).unwrap_or_default().trim().to_string(),
                },
            );
        }

        log::info!("Loaded {} gene annotations from {}", table.len(), path.display());
        Ok(table)
    }
}

impl AnnotationSource for TableAnnotations {
    fn lookup(&self, gene_id: &str) -> Option<Annotation> {
        self.entries.get(gene_id).cloned()
    }
}

impl<F> AnnotationSource for F
where
    F: Fn(&str) -> Option<Annotation>,
{
    fn lookup(&self, gene_id: &str) -> Option<Annotation> {
        self(gene_id)
    }
}
