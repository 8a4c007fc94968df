//! Driver boundary.
//!
//! The core never talks to a database itself. A driver implements
//! [`Connection`] and [`Command`]; failures come back as
//! [`DriverError`](crate::error::DriverError) values, unmodified.

use crate::error::{Error, Result};
use crate::value::{FromValue, Value};

/// A parameter resolved to its value, ready for the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    /// Parameter name, `@p{index}`.
    pub name: String,
    /// Bound value.
    pub value: Value,
}

/// One result row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(pub Vec<Value>);

impl Row {
    /// Value at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Text at `index`, if present and textual.
    #[must_use]
    pub fn text(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_text)
    }

    /// Value at `index`, read as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RowMapping`] when the column is missing or holds
    /// another shape.
    pub fn try_get<T: FromValue>(&self, index: usize) -> Result<T> {
        let Some(value) = self.get(index) else {
            return Err(Error::RowMapping {
                index,
                expected: T::EXPECTED,
                found: "no column",
            });
        };
        T::from_value(value).ok_or(Error::RowMapping {
            index,
            expected: T::EXPECTED,
            found: value.kind_name(),
        })
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the row has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the row.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

/// Types built from one result row, reading columns by position in the
/// select list (`c0`, `c1`, ...).
pub trait FromRow: Sized {
    /// Reads a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RowMapping`] when a column does not convert.
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

macro_rules! tuple_from_row {
    ($(($($t:ident $i:tt),+)),* $(,)?) => {
        $(impl<$($t: FromValue),+> FromRow for ($($t,)+) {
            fn from_row(row: &Row) -> Result<Self> {
                Ok(($(row.try_get::<$t>($i)?,)+))
            }
        })*
    };
}

tuple_from_row!(
    (A 0),
    (A 0, B 1),
    (A 0, B 1, C 2),
    (A 0, B 1, C 2, D 3),
);

/// Rows produced by a reader.
pub type RowStream<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

/// A command object created by a connection.
pub trait Command {
    /// Executes a statement and returns the affected row count.
    fn execute_non_query(&mut self, text: &str, parameters: &[BoundParameter]) -> Result<u64>;

    /// Executes a query and streams its rows.
    fn execute_reader(&mut self, text: &str, parameters: &[BoundParameter]) -> Result<RowStream<'_>>;
}

/// An open database connection.
pub trait Connection {
    /// Command type borrowed from the connection.
    type Command<'c>: Command
    where
        Self: 'c;

    /// Creates a command.
    fn create_command(&mut self) -> Result<Self::Command<'_>>;
}

/// Opens connections.
pub trait ConnectionFactory {
    /// Connection type.
    type Connection: Connection;

    /// Opens a new connection.
    fn open_connection(&self) -> Result<Self::Connection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access() {
        let row = Row(vec![Value::Int(3), Value::Text("ada".into()), Value::Null]);
        assert_eq!(row.try_get::<i64>(0).unwrap(), 3);
        assert_eq!(row.try_get::<Option<String>>(2).unwrap(), None);
        let (id, name): (i32, String) = FromRow::from_row(&row).unwrap();
        assert_eq!((id, name.as_str()), (3, "ada"));
    }

    #[test]
    fn mismatches_name_the_column() {
        let row = Row(vec![Value::Text("x".into())]);
        assert_eq!(
            row.try_get::<i64>(0).unwrap_err(),
            Error::RowMapping {
                index: 0,
                expected: "i64",
                found: "text"
            }
        );
        assert!(matches!(
            row.try_get::<String>(1).unwrap_err(),
            Error::RowMapping { index: 1, found: "no column", .. }
        ));
    }
}
