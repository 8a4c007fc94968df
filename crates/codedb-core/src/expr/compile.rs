//! Lowering of [`Expr`] trees into SQL text and parameters.
//!
//! An operand is wrapped in parentheses when its precedence is lower
//! than its parent's, or equal to it on the right-hand side unless both
//! are the same associative operator (`a - (b - c)`, `a * (b / c)`).
//!
//! The same test is repeated against PostgreSQL's grammar, which parses
//! generic operators (`|`, `#`, `&`, `<<`, `>>`, `||`) at one level
//! between arithmetic and comparison, treats comparisons as
//! non-associative and binds unary minus tighter than `^`. An operand is
//! grouped when either ordering asks for it.

use std::sync::Arc;

use crate::command::{CodeBuffer, Commandable, DelayedCode};
use crate::error::{ConstructionError, Result};
use crate::query::NodeId;
use crate::schema::Column;

use super::{BinaryOp, Expr, Literal, UnaryOp, ATOM_PRECEDENCE, UNARY_PRECEDENCE};

/// Precedence of `IS NULL` / `IS NOT NULL`.
const IS_NULL_PRECEDENCE: u8 = 7;

/// Precedence of `LIKE`.
const LIKE_PRECEDENCE: u8 = 8;

// Binding levels in PostgreSQL's grammar (higher binds tighter).
const SQL_OR: u8 = 1;
const SQL_AND: u8 = 2;
const SQL_NOT: u8 = 3;
const SQL_IS: u8 = 4;
const SQL_COMPARISON: u8 = 5;
const SQL_LIKE: u8 = 6;
const SQL_GENERIC: u8 = 7;
const SQL_ADDITIVE: u8 = 8;
const SQL_MULTIPLICATIVE: u8 = 9;
const SQL_POWER: u8 = 10;
const SQL_NEGATE: u8 = 11;
const SQL_ATOM: u8 = 12;

const fn sql_level_of(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::OrElse => SQL_OR,
        BinaryOp::AndAlso => SQL_AND,
        BinaryOp::Equal
        | BinaryOp::NotEqual
        | BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual => SQL_COMPARISON,
        BinaryOp::BitOr
        | BinaryOp::BitXor
        | BinaryOp::BitAnd
        | BinaryOp::LeftShift
        | BinaryOp::RightShift
        | BinaryOp::Concat => SQL_GENERIC,
        BinaryOp::Add | BinaryOp::Subtract => SQL_ADDITIVE,
        BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => SQL_MULTIPLICATIVE,
        BinaryOp::Power => SQL_POWER,
    }
}

/// Levels whose operators cannot be chained without parentheses.
const fn is_non_associative_level(level: u8) -> bool {
    matches!(level, SQL_IS | SQL_COMPARISON | SQL_LIKE)
}

/// What the compiler needs from the surrounding query.
pub trait ExprContext {
    /// Qualified reference to a column, e.g. `t0.user_id`. Fails for a
    /// column whose table is not registered.
    fn column_reference(&self, column: &Column) -> Result<String>;

    /// Writes the `SELECT ...` text of a subquery node.
    fn write_subquery(&self, node: NodeId, buffer: &mut CodeBuffer) -> Result<()>;
}

const fn is_null_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(Literal::Null))
}

/// Operand compared against NULL by `=` / `<>`, if any.
fn null_comparison<'e>(op: BinaryOp, left: &'e Expr, right: &'e Expr) -> Option<(&'e Expr, bool)> {
    if !matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
        return None;
    }
    let negated = op == BinaryOp::NotEqual;
    if is_null_literal(right) {
        Some((left, negated))
    } else if is_null_literal(left) {
        Some((right, negated))
    } else {
        None
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary { op, left, right } => {
            if null_comparison(*op, left, right).is_some() {
                IS_NULL_PRECEDENCE
            } else {
                op.precedence()
            }
        }
        Expr::Unary { op: UnaryOp::HasValue, .. } => IS_NULL_PRECEDENCE,
        Expr::Unary { .. } => UNARY_PRECEDENCE,
        Expr::Call { name, .. } => match name.as_str() {
            "Like" => LIKE_PRECEDENCE,
            "NotExists" => UNARY_PRECEDENCE,
            _ => ATOM_PRECEDENCE,
        },
        _ => ATOM_PRECEDENCE,
    }
}

fn sql_level(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary { op, left, right } => {
            if null_comparison(*op, left, right).is_some() {
                SQL_IS
            } else {
                sql_level_of(*op)
            }
        }
        Expr::Unary { op: UnaryOp::Not, .. } => SQL_NOT,
        Expr::Unary { op: UnaryOp::Negate, .. } => SQL_NEGATE,
        Expr::Unary { op: UnaryOp::HasValue, .. } => SQL_IS,
        Expr::Call { name, .. } => match name.as_str() {
            "Like" => SQL_LIKE,
            "NotExists" => SQL_NOT,
            _ => SQL_ATOM,
        },
        _ => SQL_ATOM,
    }
}

/// The position an operand is rendered in.
#[derive(Debug, Clone, Copy)]
struct Slot {
    precedence: u8,
    level: u8,
    /// Group an operand of equal precedence.
    closed_precedence: bool,
    /// Group an operand of equal SQL level.
    closed_level: bool,
}

impl Slot {
    const fn new(precedence: u8, level: u8) -> Self {
        Self {
            precedence,
            level,
            closed_precedence: false,
            closed_level: is_non_associative_level(level),
        }
    }

    const fn closed(mut self) -> Self {
        self.closed_precedence = true;
        self.closed_level = true;
        self
    }

    fn left_of(op: BinaryOp) -> Self {
        Self::new(op.precedence(), sql_level_of(op))
    }

    fn right_of(op: BinaryOp, right: &Expr) -> Self {
        let slot = Self::left_of(op);
        let same_associative = op.is_associative()
            && matches!(right, Expr::Binary { op: child, left, right: r }
                if *child == op && null_comparison(*child, left, r).is_none());
        if same_associative {
            slot
        } else {
            slot.closed()
        }
    }

    fn groups(self, expr: &Expr) -> bool {
        let precedence = precedence(expr);
        let level = sql_level(expr);
        precedence < self.precedence
            || level < self.level
            || (self.closed_precedence && precedence == self.precedence)
            || (self.closed_level && level == self.level)
    }
}

struct Compiler<'a> {
    context: &'a dyn ExprContext,
    buffer: &'a mut CodeBuffer,
}

impl Compiler<'_> {
    fn operand(&mut self, expr: &Expr, slot: Slot) -> Result<()> {
        if slot.groups(expr) {
            self.buffer.append("(");
            self.expr(expr)?;
            self.buffer.append(")");
            Ok(())
        } else {
            self.expr(expr)
        }
    }

    fn list(&mut self, items: &[Expr]) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.buffer.append(",");
            }
            self.expr(item)?;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Literal(Literal::Null) => self.buffer.append("NULL"),
            Expr::Literal(Literal::Value(value)) => self.buffer.append_value(value),
            Expr::Literal(Literal::Argument(argument)) => self.buffer.append_argument(argument),
            Expr::Column(column) => {
                let reference = self.context.column_reference(column)?;
                self.buffer.append(&reference);
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right)?,
            Expr::Unary { op, operand } => self.unary(*op, operand)?,
            Expr::Call { name, args } => self.call(name, args)?,
            Expr::Array(items) => {
                self.buffer.append("ARRAY[");
                self.list(items)?;
                self.buffer.append("]");
            }
            Expr::Subquery(_) => {
                return Err(ConstructionError::UnsupportedExpression(
                    "subquery outside EXISTS / NOT EXISTS".into(),
                )
                .into());
            }
            Expr::Embedded(command) => {
                self.buffer.append("(");
                self.embedded(command)?;
                self.buffer.append(")");
            }
            Expr::Delayed(code) => self.buffer.append_delayed(Arc::clone(code)),
        }
        Ok(())
    }

    fn embedded(&mut self, command: &Arc<Commandable>) -> Result<()> {
        if command.is_delayed() {
            self.buffer.append_delayed(Arc::clone(command) as Arc<dyn DelayedCode>);
            Ok(())
        } else {
            command.write_to(self.buffer)
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<()> {
        if let Some((operand, negated)) = null_comparison(op, left, right) {
            self.operand(operand, Slot::new(IS_NULL_PRECEDENCE, SQL_IS))?;
            self.buffer
                .append(if negated { "IS NOT NULL" } else { "IS NULL" });
            return Ok(());
        }
        self.operand(left, Slot::left_of(op))?;
        self.buffer.append(op.as_str());
        self.operand(right, Slot::right_of(op, right))
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<()> {
        match op {
            UnaryOp::Not => {
                self.buffer.append("NOT");
                self.operand(operand, Slot::new(UNARY_PRECEDENCE, SQL_NOT))
            }
            UnaryOp::Negate => {
                self.buffer.append("-");
                self.operand(operand, Slot::new(UNARY_PRECEDENCE, SQL_NEGATE))
            }
            UnaryOp::HasValue => {
                self.operand(operand, Slot::new(IS_NULL_PRECEDENCE, SQL_IS))?;
                self.buffer.append("IS NOT NULL");
                Ok(())
            }
        }
    }

    fn subquery(&mut self, keyword: &str, args: &[Expr]) -> Result<()> {
        let [inner] = args else {
            return Err(ConstructionError::UnsupportedCall(format!(
                "{keyword} takes one subquery"
            ))
            .into());
        };
        self.buffer.append(keyword);
        self.buffer.append("(");
        match inner {
            Expr::Subquery(node) => self.context.write_subquery(*node, self.buffer)?,
            Expr::Embedded(command) => self.embedded(command)?,
            other => {
                return Err(ConstructionError::UnsupportedExpression(format!(
                    "{keyword} over {}",
                    kind(other)
                ))
                .into());
            }
        }
        self.buffer.append(")");
        Ok(())
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> Result<()> {
        match (name, args) {
            ("Like", [value, pattern]) => {
                let slot = Slot::new(LIKE_PRECEDENCE, SQL_LIKE);
                self.operand(value, slot)?;
                self.buffer.append("LIKE");
                self.operand(pattern, slot.closed())
            }
            ("Exists", _) => self.subquery("EXISTS", args),
            ("NotExists", _) => self.subquery("NOT EXISTS", args),
            ("Count", []) => {
                self.buffer.append("COUNT(*)");
                Ok(())
            }
            ("Count", [value]) => {
                self.buffer.append("COUNT(");
                self.expr(value)?;
                self.buffer.append(")");
                Ok(())
            }
            ("Coalesce", [_, ..]) => {
                self.buffer.append("COALESCE(");
                self.list(args)?;
                self.buffer.append(")");
                Ok(())
            }
            ("Any", [array]) => {
                self.buffer.append("ANY(");
                self.expr(array)?;
                self.buffer.append(")");
                Ok(())
            }
            _ => Err(ConstructionError::UnsupportedCall(format!("{name}/{}", args.len())).into()),
        }
    }
}

const fn kind(expr: &Expr) -> &'static str {
    match expr {
        Expr::Literal(_) => "literal",
        Expr::Column(_) => "column",
        Expr::Binary { .. } => "binary operation",
        Expr::Unary { .. } => "unary operation",
        Expr::Call { .. } => "call",
        Expr::Array(_) => "array",
        Expr::Subquery(_) => "subquery",
        Expr::Embedded(_) => "command",
        Expr::Delayed(_) => "delayed code",
    }
}

/// Compiles `expr` into `buffer`.
pub fn compile_expr(expr: &Expr, context: &dyn ExprContext, buffer: &mut CodeBuffer) -> Result<()> {
    Compiler { context, buffer }.expr(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Argument;
    use crate::expr::{any, array, arg, call, coalesce, count, count_of, like, null, shared, val};
    use crate::value::Value;

    /// Context without tables or subqueries.
    struct Bare;

    impl ExprContext for Bare {
        fn column_reference(&self, column: &Column) -> Result<String> {
            Err(ConstructionError::UnregisteredTable(column.table_name().to_string()).into())
        }

        fn write_subquery(&self, _: NodeId, _: &mut CodeBuffer) -> Result<()> {
            Err(ConstructionError::UnsupportedExpression("no subqueries".into()).into())
        }
    }

    fn render(expr: &Expr) -> Result<String> {
        let mut buffer = CodeBuffer::new();
        compile_expr(expr, &Bare, &mut buffer)?;
        Ok(Commandable::from_buffer(buffer).command_text()?)
    }

    // ================================================================
    // Parentheses
    // ================================================================

    #[test]
    fn left_associative_chain_has_no_parentheses() {
        assert_eq!(render(&(val(1) + val(2) + val(3))).unwrap(), "@p0+@p1+@p2");
    }

    #[test]
    fn only_required_grouping_is_parenthesized() {
        assert_eq!(render(&(val(1) + val(2) * val(3))).unwrap(), "@p0+@p1*@p2");
        assert_eq!(render(&((val(1) + val(2)) * val(3))).unwrap(), "(@p0+@p1)*@p2");
    }

    #[test]
    fn right_operand_of_subtraction() {
        assert_eq!(render(&(val(1) - (val(2) - val(3)))).unwrap(), "@p0-(@p1-@p2)");
        assert_eq!(render(&(val(1) - val(2) - val(3))).unwrap(), "@p0-@p1-@p2");
        assert_eq!(render(&(val(1) + (val(2) + val(3)))).unwrap(), "@p0+@p1+@p2");
    }

    #[test]
    fn right_operand_of_mixed_operators_at_equal_precedence() {
        assert_eq!(render(&(val(3) * (val(2) / val(4)))).unwrap(), "@p0*(@p1/@p2)");
        assert_eq!(render(&(val(3) * (val(2) % val(4)))).unwrap(), "@p0*(@p1%@p2)");
        assert_eq!(render(&(val(1) + (val(2) - val(3)))).unwrap(), "@p0+(@p1-@p2)");
        assert_eq!(render(&(val(1) * val(2) / val(3))).unwrap(), "@p0*@p1/@p2");
        assert_eq!(render(&(val(1) * (val(2) * val(3)))).unwrap(), "@p0*@p1*@p2");
    }

    #[test]
    fn negated_power_is_grouped() {
        assert_eq!(render(&-(val(2).pow(val(2)))).unwrap(), "-(@p0^@p1)");
        assert_eq!(render(&(-val(2)).pow(val(2))).unwrap(), "(-@p0)^@p1");
    }

    #[test]
    fn generic_operators_follow_postgres_grouping() {
        assert_eq!(render(&(val(1).equals(val(2)) | val(3))).unwrap(), "(@p0=@p1)|@p2");
        assert_eq!(render(&(val("a").concat(val("b")) + val("c"))).unwrap(), "(@p0||@p1)+@p2");
        assert_eq!(render(&(val(1) | (val(2) & val(3)))).unwrap(), "@p0|(@p1&@p2)");
        assert_eq!(render(&(val(1) & val(2) | val(3))).unwrap(), "@p0&@p1|@p2");
        assert_eq!(render(&(val(1) | val(2) * val(3))).unwrap(), "@p0|@p1*@p2");
    }

    #[test]
    fn comparisons_do_not_chain() {
        assert_eq!(render(&val(1).lt(val(2)).equals(val(3))).unwrap(), "(@p0<@p1)=@p2");
        assert_eq!(render(&val(true).equals(val(1).equals(val(2)))).unwrap(), "@p0=(@p1=@p2)");
        assert_eq!(render(&(!val(true)).is_null()).unwrap(), "(NOT @p0) IS NULL");
    }

    #[test]
    fn logical_operators() {
        let e = val(true).or(val(false)).and(val(true));
        assert_eq!(render(&e).unwrap(), "(@p0 OR @p1) AND @p2");
        let e = val(true).and(val(false)).or(val(true));
        assert_eq!(render(&e).unwrap(), "@p0 AND @p1 OR @p2");
    }

    #[test]
    fn unary_operators() {
        assert_eq!(render(&!val(1).equals(val(2))).unwrap(), "NOT(@p0=@p1)");
        assert_eq!(render(&-(val(1) + val(2))).unwrap(), "-(@p0+@p1)");
        assert_eq!(render(&(val(1) - -val(2))).unwrap(), "@p0- -@p1");
        assert_eq!(render(&(val(1) + val(2)).has_value()).unwrap(), "@p0+@p1 IS NOT NULL");
    }

    #[test]
    fn operator_spelling() {
        assert_eq!(render(&val(1).not_equals(val(2))).unwrap(), "@p0<>@p1");
        assert_eq!(render(&(val(1) ^ val(2))).unwrap(), "@p0#@p1");
        assert_eq!(render(&val(1).pow(val(2))).unwrap(), "@p0^@p1");
        assert_eq!(render(&val("a").concat(val("b"))).unwrap(), "@p0||@p1");
        assert_eq!(render(&(val(1) << val(2))).unwrap(), "@p0<<@p1");
    }

    // ================================================================
    // NULL handling
    // ================================================================

    #[test]
    fn null_comparisons_collapse() {
        assert_eq!(render(&val(1).equals(null())).unwrap(), "@p0 IS NULL");
        assert_eq!(render(&val(1).not_equals(null())).unwrap(), "@p0 IS NOT NULL");
        assert_eq!(render(&null().equals(val(1))).unwrap(), "@p0 IS NULL");
        assert_eq!(render(&(val(1) + val(2)).is_null()).unwrap(), "@p0+@p1 IS NULL");
        assert_eq!(
            render(&val(1).or(val(2)).is_null()).unwrap(),
            "(@p0 OR @p1) IS NULL"
        );
    }

    // ================================================================
    // Calls and literals
    // ================================================================

    #[test]
    fn allowed_calls() {
        assert_eq!(render(&like(val("a"), val("%b"))).unwrap(), "@p0 LIKE @p1");
        assert_eq!(render(&count()).unwrap(), "COUNT(*)");
        assert_eq!(render(&count_of(val(1))).unwrap(), "COUNT(@p0)");
        assert_eq!(render(&coalesce([val(1), null()])).unwrap(), "COALESCE(@p0,NULL)");
        assert_eq!(
            render(&val(1).equals(any(array([1, 2])))).unwrap(),
            "@p0=ANY(ARRAY[@p1,@p2])"
        );
    }

    #[test]
    fn unknown_call_rejected() {
        let err = render(&call("Substring", vec![val("a")])).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Construction(ConstructionError::UnsupportedCall(_))
        ));
        assert!(render(&call("Like", vec![val("a")])).is_err());
        assert!(render(&call("Coalesce", vec![])).is_err());
    }

    #[test]
    fn bare_subquery_rejected() {
        let err = render(&Expr::Subquery(NodeId::from_index(1))).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Construction(ConstructionError::UnsupportedExpression(_))
        ));
    }

    #[test]
    fn shared_values_share_a_parameter() {
        let v = Arc::new(Value::Int(5));
        assert_eq!(render(&shared(&v).equals(shared(&v))).unwrap(), "@p0=@p0");
        assert_eq!(render(&val(5).equals(val(5))).unwrap(), "@p0=@p1");
        let a = Argument::new("a");
        assert_eq!(render(&arg(&a).lt(arg(&a))).unwrap(), "@p0<@p0");
    }

    #[test]
    fn embedded_command_is_a_subquery() {
        let mut inner = CodeBuffer::new();
        inner.append("SELECT");
        inner.append_value(&Arc::new(Value::Int(9)));
        let inner = Arc::new(Commandable::from_buffer(inner));
        let e = val(1).equals(crate::expr::embed(&inner));
        assert_eq!(render(&e).unwrap(), "@p0=(SELECT @p1)");
    }
}
