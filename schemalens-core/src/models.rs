//! Engine-agnostic schema model.
//!
//! These are the structures every connector produces and every analysis
//! consumes. Field names on the wire are fixed: downstream consumers read
//! `tableName`, `columnName`, `Conname` and friends exactly as spelled here.

use crate::error::SchemaLensError;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Database engines SchemaLens can inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Postgres,
    MySql,
    Sqlite,
    SqlServer,
}

impl EngineKind {
    /// All engine kinds, in the order they are listed to users.
    pub const ALL: [EngineKind; 4] = [
        EngineKind::Postgres,
        EngineKind::MySql,
        EngineKind::Sqlite,
        EngineKind::SqlServer,
    ];

    /// Canonical tag accepted by [`EngineKind::from_str`].
    pub fn tag(self) -> &'static str {
        match self {
            EngineKind::Postgres => "postgres",
            EngineKind::MySql => "mysql",
            EngineKind::Sqlite => "sqlite",
            EngineKind::SqlServer => "sqlserver",
        }
    }

    /// Human-readable engine name.
    pub fn display_name(self) -> &'static str {
        match self {
            EngineKind::Postgres => "PostgreSQL",
            EngineKind::MySql => "MySQL",
            EngineKind::Sqlite => "SQLite",
            EngineKind::SqlServer => "SQL Server",
        }
    }

    /// Port used when connection parameters leave it unset.
    /// SQLite is file based and has none.
    pub fn default_port(self) -> Option<u16> {
        match self {
            EngineKind::Postgres => Some(5432),
            EngineKind::MySql => Some(3306),
            EngineKind::Sqlite => None,
            EngineKind::SqlServer => Some(1433),
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for EngineKind {
    type Err = SchemaLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(EngineKind::Postgres),
            "mysql" => Ok(EngineKind::MySql),
            "sqlite" => Ok(EngineKind::Sqlite),
            "sqlserver" | "mssql" => Ok(EngineKind::SqlServer),
            _ => Err(SchemaLensError::unsupported_engine(
                s,
                "expected one of postgres, mysql, sqlite, sqlserver",
            )),
        }
    }
}

/// A table column as reported by the engine.
///
/// `data_type` is the engine's own spelling (`character varying`, `int`,
/// `INTEGER`, ...); no attempt is made to map it onto a common type system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    #[serde(rename = "columnName")]
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub unique: bool,
}

impl Column {
    /// Creates a nullable, non-unique column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            not_null: false,
            unique: false,
        }
    }

    pub fn with_not_null(mut self, not_null: bool) -> Self {
        self.not_null = not_null;
        self
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// A physical index. Column order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub columns: Vec<String>,
}

impl Index {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the index covers `column` at any position.
    pub fn covers(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// An outgoing foreign key.
///
/// `conname` is the constraint name. For engines without named foreign keys
/// (SQLite) it holds the referencing column instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "Conname")]
    pub conname: String,
    #[serde(rename = "SourceTableName")]
    pub source_table: String,
    #[serde(rename = "RelatedTableName")]
    pub related_table: String,
}

impl Relationship {
    pub fn new(
        conname: impl Into<String>,
        source_table: impl Into<String>,
        related_table: impl Into<String>,
    ) -> Self {
        Self {
            conname: conname.into(),
            source_table: source_table.into(),
            related_table: related_table.into(),
        }
    }

    /// Whether the key references its own table.
    pub fn is_self_reference(&self) -> bool {
        self.source_table == self.related_table
    }
}

/// Everything SchemaLens knows about one base table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(rename = "tableName")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub columns: Vec<Column>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub primary_key: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub indexes: Vec<Index>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub relationships: Vec<Relationship>,
}

impl TableMetadata {
    /// Creates an empty table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a foreign key from this table to `related_table`.
    pub fn with_relationship(
        mut self,
        conname: impl Into<String>,
        related_table: impl Into<String>,
    ) -> Self {
        let relationship = Relationship::new(conname, self.name.clone(), related_table);
        self.relationships.push(relationship);
        self
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Whether any index on this table covers `column`.
    pub fn column_has_index(&self, column: &str) -> bool {
        self.indexes.iter().any(|index| index.covers(column))
    }

    /// Looks up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Accepts `null` wherever a list is expected; older emitters wrote empty
/// lists that way.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
