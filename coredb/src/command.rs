//! The value-typed command union a front end feeds into `Database::execute`.
//! Parsing SQL text into these values is out of scope for the core;
//! `coredb-cli` builds them directly.

use crate::row::Row;
use crate::schema::ColumnDef;
use crate::value::Value;

#[derive(Clone, Debug)]
pub enum AlterAction {
    AddColumn(ColumnDef),
    DropColumn(String),
    RenameColumn { old: String, new: String },
}

/// A WHERE-clause predicate, reduced far enough for the executor to either
/// use an index (equality on one column) or fall back to a full scan.
#[derive(Clone, Debug)]
pub enum Predicate {
    Equals { column: String, value: Value },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn equals(column: impl Into<String>, value: Value) -> Self {
        Predicate::Equals { column: column.into(), value }
    }

    /// If this predicate is a single `col = literal`, returns it so the
    /// executor can probe an index. Anything else falls back to a full scan.
    pub fn as_equality(&self) -> Option<(&str, &Value)> {
        match self {
            Predicate::Equals { column, value } => Some((column.as_str(), value)),
            _ => None,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::Equals { column, value } => {
                row.get(column).map(|v| v.values_equal(value)).unwrap_or(false)
            }
            Predicate::And(lhs, rhs) => lhs.matches(row) && rhs.matches(row),
            Predicate::Or(lhs, rhs) => lhs.matches(row) || rhs.matches(row),
            Predicate::Not(inner) => !inner.matches(row),
        }
    }
}

/// ORDER BY beyond plain column ordering; aggregate/GROUP BY/JOIN execution
/// and ranking by arbitrary expressions stay a caller concern.
#[derive(Clone, Debug)]
pub enum OrderBy {
    /// `ORDER BY SIMILARITY TO <query>`: ranks by nearest neighbor in the
    /// embedding column's HNSW index.
    Similarity { column: String, query: Vec<f32>, k: usize },
    /// `ORDER BY VIBES`: intentionally nondeterministic); callers must only assert multiset equality.
    Vibes,
}

#[derive(Clone, Debug)]
pub struct Assignment {
    pub column: String,
    pub value: Value,
}

#[derive(Clone, Debug)]
pub enum Command {
    CreateTable { name: String, columns: Vec<ColumnDef> },
    DropTable { name: String, if_exists: bool },
    AlterTable { name: String, action: AlterAction },
    CreateIndex { name: String, table: String, column: String },
    DropIndex { name: String },
    Insert { table: String, values: Row },
    Select { table: String, predicate: Option<Predicate>, order_by: Option<OrderBy>, limit: Option<usize> },
    Update { table: String, assignments: Vec<Assignment>, predicate: Option<Predicate> },
    Delete { table: String, predicate: Option<Predicate> },
    Begin,
    Commit,
    Rollback,
    Vacuum { table: Option<String> },
}

/// The result of `Database::execute`, shaped per-variant so a front end
/// doesn't have to downcast.
#[derive(Clone, Debug)]
pub enum QueryResult {
    Unit,
    TxId(u64),
    RowId(u64),
    Rows(Vec<(u64, Row)>),
    Count(usize),
}

#[cfg(test)]
mod command_test {
    use super::*;

    #[test]
    fn equals_predicate_extracts_as_equality() {
        let predicate = Predicate::equals("name", Value::Text("a".to_string()));
        assert_eq!(predicate.as_equality(), Some(("name", &Value::Text("a".to_string()))));
    }

    #[test]
    fn conjunction_does_not_reduce_to_equality() {
        let predicate = Predicate::And(
            Box::new(Predicate::equals("a", Value::Int(1))),
            Box::new(Predicate::equals("b", Value::Int(2))),
        );
        assert!(predicate.as_equality().is_none());
    }

    #[test]
    fn matches_evaluates_boolean_structure() {
        let mut row = Row::new();
        row.set("a", Value::Int(1));
        row.set("b", Value::Int(2));

        let predicate = Predicate::And(
            Box::new(Predicate::equals("a", Value::Int(1))),
            Box::new(Predicate::Not(Box::new(Predicate::equals("b", Value::Int(3))))),
        );
        assert!(predicate.matches(&row));
    }
}
