//! Column definitions and table schemas.

use serde_derive::{Deserialize, Serialize};

use crate::error::{CResult, Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Text,
    /// Fixed-width vector column; `dim` is the embedding width.
    Embedding { dim: usize },
}

impl ColumnType {
    pub fn embedding_dim(&self) -> Option<usize> {
        match self {
            ColumnType::Embedding { dim } => Some(*dim),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, col_type: ColumnType) -> Self {
        ColumnDef { name: name.into(), col_type }
    }
}

/// Ordered list of column definitions for a table.
///
/// Invariant: no two embedding columns may share the same
/// dimension, since the HNSW index keys itself by dimension and would
/// otherwise be unable to tell two embedding columns' vectors apart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> CResult<Self> {
        let schema = Schema { columns };
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> CResult<()> {
        let mut seen_dims = std::collections::HashSet::new();
        for col in &self.columns {
            if let ColumnType::Embedding { dim } = col.col_type {
                if !seen_dims.insert(dim) {
                    return Err(Error::DuplicateEmbeddingDimension(dim));
                }
            }
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn embedding_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| matches!(c.col_type, ColumnType::Embedding { .. }))
    }

    pub fn add_column(&mut self, col: ColumnDef) -> CResult<()> {
        if self.column(&col.name).is_some() {
            return Err(Error::InvalidColumnType(format!(
                "column already exists: {}",
                col.name
            )));
        }
        if let ColumnType::Embedding { dim } = col.col_type {
            if self.embedding_columns().any(|c| c.col_type.embedding_dim() == Some(dim)) {
                return Err(Error::DuplicateEmbeddingDimension(dim));
            }
        }
        self.columns.push(col);
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> CResult<()> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
        self.columns.remove(idx);
        Ok(())
    }

    pub fn rename_column(&mut self, old: &str, new: &str) -> CResult<()> {
        let idx = self
            .column_index(old)
            .ok_or_else(|| Error::ColumnNotFound(old.to_string()))?;
        self.columns[idx].name = new.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod schema_test {
    use super::*;

    #[test]
    fn rejects_duplicate_embedding_dimension() {
        let err = Schema::new(vec![
            ColumnDef::new("a", ColumnType::Embedding { dim: 128 }),
            ColumnDef::new("b", ColumnType::Embedding { dim: 128 }),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateEmbeddingDimension(128)));
    }

    #[test]
    fn allows_distinct_embedding_dimensions() {
        let schema = Schema::new(vec![
            ColumnDef::new("a", ColumnType::Embedding { dim: 128 }),
            ColumnDef::new("b", ColumnType::Embedding { dim: 64 }),
        ])
        .unwrap();
        assert_eq!(schema.embedding_columns().count(), 2);
    }

    #[test]
    fn add_column_rejects_dimension_collision() {
        let mut schema =
            Schema::new(vec![ColumnDef::new("a", ColumnType::Embedding { dim: 128 })]).unwrap();
        let err = schema
            .add_column(ColumnDef::new("b", ColumnType::Embedding { dim: 128 }))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEmbeddingDimension(128)));
    }
}
