//! Restricted expression language.
//!
//! An [`Expr`] is a small tagged union built directly by callers, using
//! the constructor functions of this module and the operator overloads
//! on `Expr`:
//!
//! ```
//! use codedb_core::expr::{null, val};
//!
//! let e = (val(1) + val(2)).equals(null());
//! ```
//!
//! Lowering to SQL text lives in [`compile`]. Anything outside the closed
//! set of node kinds and call names is rejected there.

mod compile;

use std::ops;
use std::sync::Arc;

use crate::command::{Argument, Commandable, DelayedCode};
use crate::query::NodeId;
use crate::schema::Column;
use crate::value::{ToValue, Value};

pub use compile::{compile_expr, ExprContext};

/// Precedence of atoms: literals, columns, calls, arrays.
pub const ATOM_PRECEDENCE: u8 = 15;

/// Precedence of prefix operators.
pub const UNARY_PRECEDENCE: u8 = 12;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Logical
    OrElse,
    AndAlso,

    // Bitwise
    BitOr,
    BitXor,
    BitAnd,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Shifts
    LeftShift,
    RightShift,

    // Arithmetic
    Add,
    Subtract,
    Concat,
    Multiply,
    Divide,
    Modulo,
    Power,
}

impl BinaryOp {
    /// Returns the SQL representation of the operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrElse => "OR",
            Self::AndAlso => "AND",
            Self::BitOr => "|",
            Self::BitXor => "#",
            Self::BitAnd => "&",
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LeftShift => "<<",
            Self::RightShift => ">>",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Concat => "||",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Power => "^",
        }
    }

    /// Returns the precedence of the operator (higher = binds tighter).
    #[must_use]
    pub const fn precedence(&self) -> u8 {
        match self {
            Self::OrElse => 2,
            Self::AndAlso => 3,
            Self::BitOr => 4,
            Self::BitXor => 5,
            Self::BitAnd => 6,
            Self::Equal | Self::NotEqual => 7,
            Self::LessThan
            | Self::LessThanOrEqual
            | Self::GreaterThan
            | Self::GreaterThanOrEqual => 8,
            Self::LeftShift | Self::RightShift => 9,
            Self::Add | Self::Subtract | Self::Concat => 10,
            Self::Multiply | Self::Divide | Self::Modulo => 11,
            Self::Power => 13,
        }
    }

    /// Returns `true` if `a op (b op c)` equals `(a op b) op c`.
    #[must_use]
    pub const fn is_associative(&self) -> bool {
        matches!(
            self,
            Self::OrElse
                | Self::AndAlso
                | Self::BitOr
                | Self::BitXor
                | Self::BitAnd
                | Self::Add
                | Self::Concat
                | Self::Multiply
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical NOT
    Not,
    /// Negation (-)
    Negate,
    /// Optional value present (IS NOT NULL)
    HasValue,
}

/// A literal operand.
#[derive(Debug, Clone)]
pub enum Literal {
    /// SQL NULL.
    Null,
    /// A value, registered as a parameter by reference.
    Value(Arc<Value>),
    /// A placeholder bound at execution time.
    Argument(Arc<Argument>),
}

/// An expression tree.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal.
    Literal(Literal),
    /// A column of a registered table.
    Column(Arc<Column>),
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// A call from the allow-list.
    Call {
        /// Call name.
        name: String,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// An array literal.
    Array(Vec<Expr>),
    /// A `From` node of the same query, used as a subquery.
    Subquery(NodeId),
    /// A previously built command, used as a subquery.
    Embedded(Arc<Commandable>),
    /// Code produced when the command text is requested.
    Delayed(Arc<dyn DelayedCode>),
}

// ================================================================
// Constructors
// ================================================================

/// References a column.
#[must_use]
pub fn col(column: &Arc<Column>) -> Expr {
    Expr::Column(Arc::clone(column))
}

/// A fresh value. Two calls never share a parameter.
pub fn val<T: ToValue>(value: T) -> Expr {
    Expr::Literal(Literal::Value(Arc::new(value.to_value())))
}

/// A shared value. Every use of the same `Arc` shares one parameter.
#[must_use]
pub fn shared(value: &Arc<Value>) -> Expr {
    Expr::Literal(Literal::Value(Arc::clone(value)))
}

/// An execution-time argument.
#[must_use]
pub fn arg(argument: &Arc<Argument>) -> Expr {
    Expr::Literal(Literal::Argument(Arc::clone(argument)))
}

/// SQL NULL.
#[must_use]
pub const fn null() -> Expr {
    Expr::Literal(Literal::Null)
}

/// `ARRAY[...]`.
pub fn array<I, E>(items: I) -> Expr
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    Expr::Array(items.into_iter().map(Into::into).collect())
}

/// A call by name. Names outside the allow-list fail at compile time.
pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::Call {
        name: name.into(),
        args,
    }
}

/// `value LIKE pattern`.
pub fn like(value: impl Into<Expr>, pattern: impl Into<Expr>) -> Expr {
    call("Like", vec![value.into(), pattern.into()])
}

/// `EXISTS(subquery)`.
pub fn exists(subquery: impl Into<Expr>) -> Expr {
    call("Exists", vec![subquery.into()])
}

/// `NOT EXISTS(subquery)`.
pub fn not_exists(subquery: impl Into<Expr>) -> Expr {
    call("NotExists", vec![subquery.into()])
}

/// `COUNT(*)`.
#[must_use]
pub fn count() -> Expr {
    call("Count", Vec::new())
}

/// `COUNT(value)`.
pub fn count_of(value: impl Into<Expr>) -> Expr {
    call("Count", vec![value.into()])
}

/// `COALESCE(a, ...)`.
pub fn coalesce<I, E>(items: I) -> Expr
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    call("Coalesce", items.into_iter().map(Into::into).collect())
}

/// `ANY(array)`.
pub fn any(array: impl Into<Expr>) -> Expr {
    call("Any", vec![array.into()])
}

/// A built command used as a subquery.
#[must_use]
pub fn embed(command: &Arc<Commandable>) -> Expr {
    Expr::Embedded(Arc::clone(command))
}

/// Code produced on every compilation. Commands containing it are
/// delayed.
#[must_use]
pub fn delayed(code: Arc<dyn DelayedCode>) -> Expr {
    Expr::Delayed(code)
}

// ================================================================
// Combinators
// ================================================================

impl Expr {
    fn binary(self, op: BinaryOp, right: impl Into<Self>) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right.into()),
        }
    }

    fn unary(self, op: UnaryOp) -> Self {
        Self::Unary {
            op,
            operand: Box::new(self),
        }
    }

    /// `self = other`; against NULL renders `IS NULL`.
    #[must_use]
    pub fn equals(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Equal, other)
    }

    /// `self <> other`; against NULL renders `IS NOT NULL`.
    #[must_use]
    pub fn not_equals(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::NotEqual, other)
    }

    /// `self < other`.
    #[must_use]
    pub fn lt(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::LessThan, other)
    }

    /// `self <= other`.
    #[must_use]
    pub fn le(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::LessThanOrEqual, other)
    }

    /// `self > other`.
    #[must_use]
    pub fn gt(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::GreaterThan, other)
    }

    /// `self >= other`.
    #[must_use]
    pub fn ge(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::GreaterThanOrEqual, other)
    }

    /// `self AND other`.
    #[must_use]
    pub fn and(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::AndAlso, other)
    }

    /// `self OR other`.
    #[must_use]
    pub fn or(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::OrElse, other)
    }

    /// `self || other`.
    #[must_use]
    pub fn concat(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Concat, other)
    }

    /// `self ^ other`.
    #[must_use]
    pub fn pow(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Power, other)
    }

    /// `self LIKE pattern`.
    #[must_use]
    pub fn like(self, pattern: impl Into<Self>) -> Self {
        like(self, pattern)
    }

    /// `self IS NULL`.
    #[must_use]
    pub fn is_null(self) -> Self {
        self.equals(null())
    }

    /// `self IS NOT NULL`.
    #[must_use]
    pub fn is_not_null(self) -> Self {
        self.not_equals(null())
    }

    /// `self IS NOT NULL`, for optional values.
    #[must_use]
    pub fn has_value(self) -> Self {
        self.unary(UnaryOp::HasValue)
    }
}

macro_rules! binary_operator {
    ($($trait:ident $method:ident $op:ident),* $(,)?) => {
        $(impl<R: Into<Expr>> ops::$trait<R> for Expr {
            type Output = Self;

            fn $method(self, rhs: R) -> Self {
                self.binary(BinaryOp::$op, rhs)
            }
        })*
    };
}

binary_operator!(
    Add add Add,
    Sub sub Subtract,
    Mul mul Multiply,
    Div div Divide,
    Rem rem Modulo,
    BitAnd bitand BitAnd,
    BitOr bitor BitOr,
    BitXor bitxor BitXor,
    Shl shl LeftShift,
    Shr shr RightShift,
);

impl ops::Not for Expr {
    type Output = Self;

    fn not(self) -> Self {
        self.unary(UnaryOp::Not)
    }
}

impl ops::Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self {
        self.unary(UnaryOp::Negate)
    }
}

// ================================================================
// Conversions
// ================================================================

impl From<&Arc<Column>> for Expr {
    fn from(column: &Arc<Column>) -> Self {
        col(column)
    }
}

impl From<&Arc<Argument>> for Expr {
    fn from(argument: &Arc<Argument>) -> Self {
        arg(argument)
    }
}

impl From<&Arc<Value>> for Expr {
    fn from(value: &Arc<Value>) -> Self {
        shared(value)
    }
}

impl From<NodeId> for Expr {
    fn from(node: NodeId) -> Self {
        Self::Subquery(node)
    }
}

impl From<&Arc<Commandable>> for Expr {
    fn from(command: &Arc<Commandable>) -> Self {
        embed(command)
    }
}

macro_rules! value_into_expr {
    ($($t:ty),*) => {
        $(impl From<$t> for Expr {
            fn from(value: $t) -> Self {
                val(value)
            }
        })*
    };
}

value_into_expr!(Value, bool, i16, i32, i64, f32, f64, char, String, &str);
