//! Error types shared by every codedb component.
//!
//! Three families exist: construction errors raised while a schema or a
//! query is being put together, diff conflicts raised when two schemas
//! cannot be matched without guessing, and driver errors passed through
//! from the database collaborator.

use std::fmt;

/// Errors raised while declaring a schema, building a query tree or
/// compiling an expression. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructionError {
    /// A member was used as a column but was never bound to one.
    #[error("member '{member}' of table '{table}' is not bound to a column")]
    MissingColumnBinding {
        /// Table being declared or queried.
        table: String,
        /// The unrouted member name.
        member: String,
    },

    /// The same member or column name was bound twice in one table.
    #[error("column '{name}' is declared twice in table '{table}'")]
    DuplicateColumn {
        /// Table being declared.
        table: String,
        /// Duplicated member or column name.
        name: String,
    },

    /// A table name was declared twice in one schema.
    #[error("table '{0}' is declared twice")]
    DuplicateTable(String),

    /// A logical column name was registered with two different types.
    #[error("column '{name}' is already registered as {existing}, cannot register as {requested}")]
    ConflictingColumnDef {
        /// Logical column name.
        name: String,
        /// Type already registered.
        existing: String,
        /// Type requested by the new registration.
        requested: String,
    },

    /// `SERIAL` was requested on a type that has no serial variant.
    #[error("column '{column}' of type {sql_type} cannot be serial")]
    SerialTypeMismatch {
        /// Column name.
        column: String,
        /// Offending type.
        sql_type: String,
    },

    /// Index or unique tiers run from 1 to 4.
    #[error("tier {0} is out of range (1..=4)")]
    InvalidTier(u8),

    /// A singleton clause (WHERE, GROUP BY, ORDER BY, LIMIT, SELECT) was
    /// attached twice to the same node.
    #[error("{clause} is already attached to this {parent}")]
    DuplicateClause {
        /// Clause kind being attached.
        clause: &'static str,
        /// Kind of the receiving node.
        parent: &'static str,
    },

    /// A node kind cannot be attached under the given parent kind.
    #[error("{child} cannot be attached to {parent}")]
    InvalidChild {
        /// Child kind.
        child: &'static str,
        /// Parent kind.
        parent: &'static str,
    },

    /// An insert source yields a different number of values than the
    /// insert names columns.
    #[error("insert into '{table}' names {columns} columns but its source yields {values} values")]
    ValueCountMismatch {
        /// Target table.
        table: String,
        /// Number of insert columns.
        columns: usize,
        /// Number of source values.
        values: usize,
    },

    /// A node is not reachable from the owner of its tree.
    #[error("query node {0} is detached from its owner")]
    DetachedNode(usize),

    /// A column refers to a table that was never registered with the
    /// query owner through FROM, JOIN or INSERT INTO.
    #[error("table '{0}' is not registered in this query")]
    UnregisteredTable(String),

    /// The expression shape has no SQL lowering.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// A call outside the allow-list.
    #[error("unsupported call '{0}'")]
    UnsupportedCall(String),

    /// The argument is not referenced by this command.
    #[error("argument '{0}' is not part of this command")]
    UnknownArgument(String),

    /// The command references an argument that was given no value.
    #[error("argument '{0}' has no bound value")]
    UnboundArgument(String),
}

/// Which side of a diff a conflict was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffSide {
    /// The schema read from the live catalog.
    Current,
    /// The declared schema.
    Target,
}

impl fmt::Display for DiffSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => f.write_str("current"),
            Self::Target => f.write_str("target"),
        }
    }
}

/// Classification of native driver failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// An object (role, index, constraint) already exists.
    DuplicateObject,
    /// The database already exists.
    DuplicateDatabase,
    /// A unique key was violated.
    DuplicateKey,
    /// Anything else.
    Unknown,
}

/// A native error from the database driver, carried unmodified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("driver error ({kind:?}{}): {message}", .code.as_deref().map(|c| format!(", {c}")).unwrap_or_default())]
pub struct DriverError {
    /// Taxonomy value derived from the native code.
    pub kind: DriverErrorKind,
    /// Native error code, e.g. a SQLSTATE.
    pub code: Option<String>,
    /// Native error message.
    pub message: String,
}

impl DriverError {
    /// Creates a driver error.
    #[must_use]
    pub fn new(kind: DriverErrorKind, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    /// Creates an error of kind `Unknown` without a native code.
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Unknown, None, message)
    }
}

/// Top-level error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Build-time failure.
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    /// The current and target schemas cannot be matched unambiguously.
    #[error("diff conflict in {side} schema, table '{table}': {reason}")]
    DiffConflict {
        /// Side the ambiguity was found on.
        side: DiffSide,
        /// Table involved.
        table: String,
        /// What made the match ambiguous.
        reason: String,
    },

    /// Failure reported by the database driver.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A result value could not be read as the requested type.
    #[error("result column {index}: expected {expected}, found {found}")]
    RowMapping {
        /// Position in the select list.
        index: usize,
        /// Requested type.
        expected: &'static str,
        /// Shape of the value actually read.
        found: &'static str,
    },
}

impl Error {
    /// Returns the driver error kind, if this is a driver error.
    #[must_use]
    pub const fn driver_kind(&self) -> Option<DriverErrorKind> {
        match self {
            Self::Driver(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Result type for codedb operations.
pub type Result<T> = std::result::Result<T, Error>;
