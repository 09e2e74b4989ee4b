//! Index manager: the registry of named B+ tree secondary indexes, mapping
//! `name -> (table, column, tree)`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::btree::BTree;
use crate::error::{CResult, Error};
use crate::value::Value;

struct IndexEntry {
    table: String,
    column: String,
    tree: BTree,
}

#[derive(Default)]
pub struct IndexManager {
    indexes: Mutex<HashMap<String, IndexEntry>>,
}

impl IndexManager {
    pub fn new() -> Self {
        IndexManager { indexes: Mutex::new(HashMap::new()) }
    }

    pub fn create_index(&self, name: &str, table: &str, column: &str) -> CResult<()> {
        let mut indexes = self.indexes.lock().expect("index manager mutex poisoned");
        if indexes.contains_key(name) {
            return Err(Error::IndexAlreadyExists(name.to_string()));
        }
        indexes.insert(
            name.to_string(),
            IndexEntry { table: table.to_string(), column: column.to_string(), tree: BTree::new() },
        );
        Ok(())
    }

    pub fn drop_index(&self, name: &str) -> CResult<()> {
        let mut indexes = self.indexes.lock().expect("index manager mutex poisoned");
        indexes.remove(name).map(|_| ()).ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.indexes.lock().expect("index manager mutex poisoned").contains_key(name)
    }

    /// Names of every index registered on `(table, column)`.
    pub fn names_for(&self, table: &str, column: &str) -> Vec<String> {
        self.indexes
            .lock()
            .expect("index manager mutex poisoned")
            .iter()
            .filter(|(_, entry)| entry.table == table && entry.column == column)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The index name usable for equality-predicate lookups on
    /// `(table, column)`, if one exists.
    pub fn index_for(&self, table: &str, column: &str) -> Option<String> {
        self.names_for(table, column).into_iter().next()
    }

    pub fn insert_entry(&self, name: &str, key: Value, row_id: u64) -> CResult<()> {
        let mut indexes = self.indexes.lock().expect("index manager mutex poisoned");
        let entry = indexes.get_mut(name).ok_or_else(|| Error::IndexNotFound(name.to_string()))?;
        entry.tree.insert(key, row_id);
        Ok(())
    }

    pub fn remove_entry(&self, name: &str, key: &Value, row_id: u64) -> CResult<bool> {
        let mut indexes = self.indexes.lock().expect("index manager mutex poisoned");
        let entry = indexes.get_mut(name).ok_or_else(|| Error::IndexNotFound(name.to_string()))?;
        Ok(entry.tree.delete(key, row_id))
    }

    pub fn search(&self, name: &str, key: &Value) -> CResult<Vec<u64>> {
        let indexes = self.indexes.lock().expect("index manager mutex poisoned");
        let entry = indexes.get(name).ok_or_else(|| Error::IndexNotFound(name.to_string()))?;
        Ok(entry.tree.search(key))
    }

    /// Updates every index registered on `(table, column)` when a row's
    /// value for that column changes.
    pub fn on_column_changed(&self, table: &str, column: &str, row_id: u64, old: Option<&Value>, new: Option<&Value>) {
        for name in self.names_for(table, column) {
            if let Some(old_value) = old {
                let _ = self.remove_entry(&name, old_value, row_id);
            }
            if let Some(new_value) = new {
                let _ = self.insert_entry(&name, new_value.clone(), row_id);
            }
        }
    }
}

#[cfg(test)]
mod index_manager_test {
    use super::*;

    #[test]
    fn create_search_and_drop_round_trip() {
        let im = IndexManager::new();
        im.create_index("idx_name", "widgets", "name").unwrap();
        im.insert_entry("idx_name", Value::Text("a".to_string()), 1).unwrap();
        im.insert_entry("idx_name", Value::Text("a".to_string()), 2).unwrap();

        let mut got = im.search("idx_name", &Value::Text("a".to_string())).unwrap();
        got.sort();
        assert_eq!(got, vec![1, 2]);

        assert_eq!(im.index_for("widgets", "name"), Some("idx_name".to_string()));
        im.drop_index("idx_name").unwrap();
        assert!(!im.exists("idx_name"));
    }

    #[test]
    fn create_index_rejects_duplicate_name() {
        let im = IndexManager::new();
        im.create_index("idx", "t", "c").unwrap();
        let err = im.create_index("idx", "t", "c").unwrap_err();
        assert!(matches!(err, Error::IndexAlreadyExists(_)));
    }

    #[test]
    fn on_column_changed_moves_entry_between_values() {
        let im = IndexManager::new();
        im.create_index("idx", "t", "c").unwrap();
        im.insert_entry("idx", Value::Int(1), 10).unwrap();
        im.on_column_changed("t", "c", 10, Some(&Value::Int(1)), Some(&Value::Int(2)));

        assert!(im.search("idx", &Value::Int(1)).unwrap().is_empty());
        assert_eq!(im.search("idx", &Value::Int(2)).unwrap(), vec![10]);
    }
}
