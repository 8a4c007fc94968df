//! Schema introspection trait.
//!
//! Driver crates implement [`Introspect`] to read the current schema of
//! a live database. The core only defines the output contract, a
//! [`DatabaseDef`], so it stays driver-agnostic.

use crate::schema::DatabaseDef;

/// Reads the current schema through a connection of type `C`.
pub trait Introspect<C: ?Sized> {
    /// Error type for introspection failures.
    type Error: std::error::Error;

    /// Reads the current database schema.
    fn read_current_schema(&self, connection: &mut C) -> Result<DatabaseDef, Self::Error>;
}
