//! Logical column types and the mapping from Rust types.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::flags::ColumnFlags;

/// Scalar logical types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    /// Boolean.
    Bool,
    /// Single character.
    Char,
    /// 16-bit integer.
    Int16,
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// Unbounded text.
    Text,
    /// UUID.
    Uuid,
    /// Timestamp without time zone.
    Timestamp,
}

impl ScalarType {
    /// Returns the lowercase logical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Char => "char",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Text => "text",
            Self::Uuid => "uuid",
            Self::Timestamp => "timestamp",
        }
    }

    /// Returns `true` if an auto-incrementing variant exists.
    #[must_use]
    pub const fn supports_serial(&self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }
}

/// Logical type of a column: a scalar or a one-dimensional array of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    /// A single value.
    Scalar(ScalarType),
    /// An array of values.
    Array(ScalarType),
}

impl SqlType {
    /// Returns the element type.
    #[must_use]
    pub const fn scalar(&self) -> ScalarType {
        match self {
            Self::Scalar(s) | Self::Array(s) => *s,
        }
    }

    /// Returns `true` for array types.
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Returns the array type with this element type.
    #[must_use]
    pub const fn to_array(self) -> Self {
        Self::Array(self.scalar())
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => f.write_str(s.as_str()),
            Self::Array(s) => write!(f, "{}[]", s.as_str()),
        }
    }
}

impl From<ScalarType> for SqlType {
    fn from(s: ScalarType) -> Self {
        Self::Scalar(s)
    }
}

/// Rust types that map onto a logical column type.
///
/// `Option<T>` maps to the type of `T` and implies [`ColumnFlags::NULLABLE`];
/// `Vec<T>` maps to the array of `T`.
pub trait SqlTyped {
    /// The logical type.
    const SQL_TYPE: SqlType;

    /// Flags implied by the Rust type itself.
    #[must_use]
    fn implied_flags() -> ColumnFlags {
        ColumnFlags::empty()
    }
}

macro_rules! impl_sql_typed {
    ($($ty:ty => $scalar:ident),* $(,)?) => {
        $(
            impl SqlTyped for $ty {
                const SQL_TYPE: SqlType = SqlType::Scalar(ScalarType::$scalar);
            }
        )*
    };
}

impl_sql_typed! {
    bool => Bool,
    char => Char,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => Text,
    chrono::NaiveDateTime => Timestamp,
}

impl<T: SqlTyped> SqlTyped for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;

    fn implied_flags() -> ColumnFlags {
        T::implied_flags() | ColumnFlags::NULLABLE
    }
}

impl<T: SqlTyped> SqlTyped for Vec<T> {
    const SQL_TYPE: SqlType = SqlType::Array(T::SQL_TYPE.scalar());
}
