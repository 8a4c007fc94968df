//! Rendering of query trees into commands.

use tracing::debug;

use crate::command::{CodeBuffer, Commandable};
use crate::error::{ConstructionError, Result};
use crate::expr::{compile_expr, Expr, ExprContext};
use crate::schema::{Column, TableDef};

use super::{check_value_count, JoinKind, NodeId, NodeKind, OrderItem, Sql};

/// Clauses of one `From`, gathered from its children.
#[derive(Default)]
struct Clauses<'a> {
    joins: Vec<(JoinKind, &'a TableDef, &'a Expr)>,
    filter: Option<&'a Expr>,
    group_by: Option<&'a [Expr]>,
    order_by: Option<&'a [OrderItem]>,
    limit: Option<&'a Expr>,
    select: Option<&'a [Expr]>,
}

impl ExprContext for Sql {
    fn column_reference(&self, column: &Column) -> Result<String> {
        self.tables()
            .iter()
            .position(|t| t.id() == column.table_id())
            .map(|i| format!("t{i}.{}", column.name()))
            .ok_or_else(|| ConstructionError::UnregisteredTable(column.table_name().to_string()).into())
    }

    fn write_subquery(&self, node: NodeId, buffer: &mut CodeBuffer) -> Result<()> {
        self.owner_of(node)?;
        self.write_select(node, buffer)
    }
}

impl Sql {
    fn alias(&self, table: &TableDef) -> Result<String> {
        self.alias_of(table)
            .ok_or_else(|| ConstructionError::UnregisteredTable(table.name().to_string()).into())
    }

    fn expr(&self, expr: &Expr, buffer: &mut CodeBuffer) -> Result<()> {
        compile_expr(expr, self, buffer)
    }

    fn list(&self, items: &[Expr], buffer: &mut CodeBuffer) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                buffer.append(",");
            }
            self.expr(item, buffer)?;
        }
        Ok(())
    }

    fn clauses(&self, from: NodeId) -> Result<Clauses<'_>> {
        let mut clauses = Clauses::default();
        for child in self.children(from)? {
            match self.kind(*child)? {
                NodeKind::Join { kind, table, on } => clauses.joins.push((*kind, &**table, on)),
                NodeKind::Where(e) => clauses.filter = Some(e),
                NodeKind::GroupBy(items) => clauses.group_by = Some(items.as_slice()),
                NodeKind::OrderBy(items) => clauses.order_by = Some(items.as_slice()),
                NodeKind::Limit(e) => clauses.limit = Some(e),
                NodeKind::Select(items) => clauses.select = Some(items.as_slice()),
                other => {
                    return Err(ConstructionError::InvalidChild {
                        child: other.name(),
                        parent: "From",
                    }
                    .into());
                }
            }
        }
        Ok(clauses)
    }

    /// `SELECT ... FROM ... [JOIN]* [WHERE] [GROUP BY] [ORDER BY] [LIMIT]`.
    fn write_select(&self, from: NodeId, buffer: &mut CodeBuffer) -> Result<()> {
        let NodeKind::From { table } = self.kind(from)? else {
            return Err(ConstructionError::UnsupportedExpression(format!(
                "{} is not a query",
                self.kind(from)?.name()
            ))
            .into());
        };
        let clauses = self.clauses(from)?;

        match clauses.select {
            Some(items) if !items.is_empty() => {
                buffer.append("SELECT");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        buffer.append(",");
                    }
                    self.expr(item, buffer)?;
                    buffer.append("AS");
                    buffer.append(&format!("c{i}"));
                }
                buffer.append("FROM");
            }
            _ => buffer.append("SELECT * FROM"),
        }
        buffer.append(table.name());
        buffer.append(&self.alias(table)?);

        for (kind, joined, on) in clauses.joins {
            buffer.append(match kind {
                JoinKind::Inner => "JOIN",
                JoinKind::Left => "LEFT JOIN",
            });
            buffer.append(joined.name());
            buffer.append(&self.alias(joined)?);
            buffer.append("ON");
            self.expr(on, buffer)?;
        }
        if let Some(filter) = clauses.filter {
            buffer.append("WHERE");
            self.expr(filter, buffer)?;
        }
        if let Some(keys) = clauses.group_by {
            buffer.append("GROUP BY");
            self.list(keys, buffer)?;
        }
        if let Some(items) = clauses.order_by {
            buffer.append("ORDER BY");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buffer.append(",");
                }
                self.expr(&item.expr, buffer)?;
                buffer.append(if item.descending { "DESC" } else { "ASC" });
            }
        }
        if let Some(limit) = clauses.limit {
            buffer.append("LIMIT");
            self.expr(limit, buffer)?;
        }
        Ok(())
    }

    /// `INSERT INTO t(a,b) <source>`.
    fn write_insert(&self, insert: NodeId, buffer: &mut CodeBuffer) -> Result<()> {
        let NodeKind::InsertInto {
            table,
            columns,
            unless_exists,
        } = self.kind(insert)?
        else {
            return Err(ConstructionError::UnsupportedExpression("not an insert".into()).into());
        };

        buffer.append("INSERT INTO");
        buffer.append(table.name());
        buffer.append("(");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                buffer.append(",");
            }
            buffer.append(column.name());
        }
        buffer.append(")");

        let source = self
            .children(insert)?
            .first()
            .copied()
            .ok_or_else(|| ConstructionError::UnsupportedExpression("insert without a value source".into()))?;

        match (self.kind(source)?, unless_exists) {
            (NodeKind::Values(values), guard) => {
                buffer.append("SELECT");
                self.list(values, buffer)?;
                if let Some(condition) = guard {
                    buffer.append("WHERE NOT EXISTS(SELECT * FROM");
                    buffer.append(table.name());
                    buffer.append(&self.alias(table)?);
                    buffer.append("WHERE");
                    self.expr(condition, buffer)?;
                    buffer.append(")");
                }
                Ok(())
            }
            (NodeKind::From { .. }, None) => {
                for child in self.children(source)? {
                    if let NodeKind::Select(items) = self.kind(*child)? {
                        check_value_count(table, columns.len(), items.len())?;
                    }
                }
                self.write_select(source, buffer)
            }
            (NodeKind::From { .. }, Some(_)) => Err(ConstructionError::UnsupportedExpression(
                "insert guard requires a value list".into(),
            )
            .into()),
            (other, _) => Err(ConstructionError::InvalidChild {
                child: other.name(),
                parent: "InsertInto",
            }
            .into()),
        }
    }

    /// Compiles the statement rooted at `node` into a command terminated
    /// by `;`. The node must be reachable from the owner.
    pub fn build(&self, node: NodeId) -> Result<Commandable> {
        self.owner_of(node)?;
        let mut buffer = CodeBuffer::new();
        match self.kind(node)? {
            NodeKind::From { .. } => self.write_select(node, &mut buffer)?,
            NodeKind::InsertInto { .. } => self.write_insert(node, &mut buffer)?,
            other => {
                return Err(ConstructionError::UnsupportedExpression(format!(
                    "{} is not a statement",
                    other.name()
                ))
                .into());
            }
        }
        buffer.append(";");
        let command = Commandable::from_buffer(buffer);
        debug!(node = %node, delayed = command.is_delayed(), "Built command");
        Ok(command)
    }
}
