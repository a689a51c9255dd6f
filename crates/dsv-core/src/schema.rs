//! Schema model shared by source and target parsers.
//!
//! A [`Schema`] is an ordered list of named, typed [`Column`]s. Column order
//! is significant: position `i` of a record is described by column `i`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar kinds a column can declare.
///
/// Delimited text has no type information of its own, so every column
/// produced by inference is [`DataType::String`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A single named column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,

    /// Declared type of the column, `string` when omitted.
    #[serde(default, rename = "type")]
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    /// Shorthand for a [`DataType::String`] column.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, DataType::String)
    }
}

/// Ordered sequence of columns.
///
/// Serialized as a plain list, e.g. in YAML:
///
/// ```yaml
/// - name: id
///   type: integer
/// - name: email
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Builds an all-string schema from column names, keeping their order.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().map(Column::string).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Returns a copy of this schema with every column retyped.
    ///
    /// Length, order and names are preserved.
    pub fn with_uniform_type(&self, data_type: DataType) -> Schema {
        self.columns
            .iter()
            .map(|c| Column::new(c.name.clone(), data_type))
            .collect()
    }
}

impl FromIterator<Column> for Schema {
    fn from_iter<T: IntoIterator<Item = Column>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
