//! Query AST.
//!
//! Nodes live in an arena owned by [`Sql`] and are addressed by
//! [`NodeId`]. Node 0 is the owner: it holds the tables registered by
//! `FROM`, `JOIN` and `INSERT INTO`, in registration order, and every
//! statement hangs below it. Aliases `t0, t1, ...` are positions in that
//! list.
//!
//! Fragments may be created detached and attached later in any order;
//! attaching first detaches a node from its previous parent. A `From`
//! used in `EXISTS` is moved below the node whose expression mentions
//! it.

mod render;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ConstructionError, Result};
use crate::expr::Expr;
use crate::schema::{Column, TableDef};

/// Handle to a node of a [`Sql`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// The owner node.
    pub const OWNER: Self = Self(0);

    /// Position in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }

    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    /// `JOIN`
    #[default]
    Inner,
    /// `LEFT JOIN`
    Left,
}

/// One `ORDER BY` item.
#[derive(Debug, Clone)]
pub struct OrderItem {
    /// Sort key.
    pub expr: Expr,
    /// Descending order.
    pub descending: bool,
}

impl OrderItem {
    /// Ascending on `expr`.
    pub fn asc(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            descending: false,
        }
    }

    /// Descending on `expr`.
    pub fn desc(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            descending: true,
        }
    }
}

/// What a node is.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Root of the arena, holding the registered tables.
    Owner {
        /// Tables in registration order.
        tables: Vec<Arc<TableDef>>,
    },
    /// `SELECT ... FROM table`.
    From {
        /// Source table.
        table: Arc<TableDef>,
    },
    /// `JOIN table ON expr`.
    Join {
        /// Flavor.
        kind: JoinKind,
        /// Joined table.
        table: Arc<TableDef>,
        /// Join condition.
        on: Expr,
    },
    /// `WHERE expr`.
    Where(Expr),
    /// `GROUP BY exprs`.
    GroupBy(Vec<Expr>),
    /// `ORDER BY items`.
    OrderBy(Vec<OrderItem>),
    /// `LIMIT expr`.
    Limit(Expr),
    /// Select list, rendered `expr AS c0, ...`.
    Select(Vec<Expr>),
    /// Literal value source of an insert.
    Values(Vec<Expr>),
    /// `INSERT INTO table(columns) <source>`.
    InsertInto {
        /// Target table.
        table: Arc<TableDef>,
        /// Target columns, all owned by `table`.
        columns: Vec<Arc<Column>>,
        /// Insert only when no row satisfies this condition.
        unless_exists: Option<Expr>,
    },
}

impl NodeKind {
    /// Kind name for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Owner { .. } => "Owner",
            Self::From { .. } => "From",
            Self::Join { .. } => "Join",
            Self::Where(_) => "Where",
            Self::GroupBy(_) => "GroupBy",
            Self::OrderBy(_) => "OrderBy",
            Self::Limit(_) => "Limit",
            Self::Select(_) => "Select",
            Self::Values(_) => "Values",
            Self::InsertInto { .. } => "InsertInto",
        }
    }

    fn table(&self) -> Option<&Arc<TableDef>> {
        match self {
            Self::From { table } | Self::Join { table, .. } | Self::InsertInto { table, .. } => {
                Some(table)
            }
            _ => None,
        }
    }

    fn expressions(&self) -> Vec<&Expr> {
        match self {
            Self::Join { on, .. } => vec![on],
            Self::Where(e) | Self::Limit(e) => vec![e],
            Self::GroupBy(items) | Self::Select(items) | Self::Values(items) => {
                items.iter().collect()
            }
            Self::OrderBy(items) => items.iter().map(|i| &i.expr).collect(),
            Self::InsertInto { unless_exists, .. } => unless_exists.iter().collect(),
            Self::Owner { .. } | Self::From { .. } => Vec::new(),
        }
    }

    /// Slot name if at most one child of `child` kind fits under `self`.
    const fn singleton_slot(&self, child: &Self) -> Option<&'static str> {
        match (self, child) {
            (
                Self::From { .. },
                Self::Where(_)
                | Self::GroupBy(_)
                | Self::OrderBy(_)
                | Self::Limit(_)
                | Self::Select(_),
            ) => Some(child.name()),
            (Self::InsertInto { .. }, Self::From { .. } | Self::Values(_)) => Some("value source"),
            _ => None,
        }
    }

    const fn accepts(&self, child: &Self) -> bool {
        match (self, child) {
            (Self::Owner { .. }, Self::From { .. } | Self::InsertInto { .. })
            | (
                Self::From { .. },
                Self::Join { .. }
                | Self::Where(_)
                | Self::GroupBy(_)
                | Self::OrderBy(_)
                | Self::Limit(_)
                | Self::Select(_),
            )
            | (Self::InsertInto { .. }, Self::From { .. } | Self::Values(_))
            | (
                Self::Join { .. }
                | Self::Where(_)
                | Self::GroupBy(_)
                | Self::OrderBy(_)
                | Self::Limit(_)
                | Self::Select(_)
                | Self::Values(_),
                Self::From { .. },
            ) => true,
            _ => false,
        }
    }
}

/// Fails unless an insert source yields one value per column.
pub(crate) fn check_value_count(table: &TableDef, columns: usize, values: usize) -> Result<()> {
    if columns == values {
        return Ok(());
    }
    Err(ConstructionError::ValueCountMismatch {
        table: table.name().to_string(),
        columns,
        values,
    }
    .into())
}

fn collect_subqueries(expr: &Expr, out: &mut Vec<NodeId>) {
    match expr {
        Expr::Subquery(node) => out.push(*node),
        Expr::Binary { left, right, .. } => {
            collect_subqueries(left, out);
            collect_subqueries(right, out);
        }
        Expr::Unary { operand, .. } => collect_subqueries(operand, out),
        Expr::Call { args: items, .. } | Expr::Array(items) => {
            for item in items {
                collect_subqueries(item, out);
            }
        }
        Expr::Literal(_) | Expr::Column(_) | Expr::Embedded(_) | Expr::Delayed(_) => {}
    }
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    owner: NodeId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An arena of query nodes below one owner.
///
/// ```
/// use std::sync::Arc;
/// use codedb_core::expr::{col, val};
/// use codedb_core::schema::{ColumnFlags, SchemaBuilder};
/// use codedb_core::query::Sql;
///
/// let db = SchemaBuilder::new("app")
///     .declare("tb_user", |ctx| {
///         ctx.column::<i64>("Id", "user_id", ColumnFlags::PRIMARY_KEY)?;
///         Ok(())
///     })?
///     .build()?;
/// let users = Arc::clone(&db.tables()[0]);
/// let id = Arc::clone(users.column("Id")?);
///
/// let mut sql = Sql::new();
/// let from = sql.from(&users);
/// sql.where_clause(from, col(&id).equals(val(7)))?;
/// let command = sql.build(from)?;
/// assert_eq!(
///     command.command_text()?,
///     "SELECT * FROM tb_user t0 WHERE t0.user_id=@p0;"
/// );
/// # Ok::<(), codedb_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Sql {
    nodes: Vec<Node>,
}

impl Default for Sql {
    fn default() -> Self {
        Self::new()
    }
}

impl Sql {
    /// Creates an arena holding only the owner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Owner { tables: Vec::new() },
                owner: NodeId::OWNER,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| ConstructionError::DetachedNode(id.0).into())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| ConstructionError::DetachedNode(id.0).into())
    }

    /// Kind of `id`.
    pub fn kind(&self, id: NodeId) -> Result<&NodeKind> {
        Ok(&self.node(id)?.kind)
    }

    /// Current parent of `id`.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    /// Children of `id` in attachment order.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    /// Tables registered with the owner, in alias order.
    #[must_use]
    pub fn tables(&self) -> &[Arc<TableDef>] {
        match &self.nodes[0].kind {
            NodeKind::Owner { tables } => tables,
            _ => &[],
        }
    }

    /// Alias of a registered table, `t{index}`.
    #[must_use]
    pub fn alias_of(&self, table: &TableDef) -> Option<String> {
        self.tables()
            .iter()
            .position(|t| t.id() == table.id())
            .map(|i| format!("t{i}"))
    }

    fn register_table(&mut self, table: &Arc<TableDef>) {
        if self.alias_of(table).is_some() {
            return;
        }
        if let NodeKind::Owner { tables } = &mut self.nodes[0].kind {
            debug!(table = table.name(), alias = tables.len(), "Registered table");
            tables.push(Arc::clone(table));
        }
    }

    /// Walks parent links up to the node that owns itself.
    pub fn owner_of(&self, id: NodeId) -> Result<NodeId> {
        let mut current = id;
        loop {
            let node = self.node(current)?;
            if node.owner == current {
                return Ok(current);
            }
            current = node
                .parent
                .ok_or(ConstructionError::DetachedNode(id.0))?;
        }
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut id: NodeId) -> Result<bool> {
        loop {
            if id == ancestor {
                return Ok(true);
            }
            match self.node(id)?.parent {
                Some(parent) => id = parent,
                None => return Ok(false),
            }
        }
    }

    fn check_attach(&self, parent: NodeId, child: &NodeKind, child_id: Option<NodeId>) -> Result<()> {
        let parent_node = self.node(parent)?;
        if !parent_node.kind.accepts(child) {
            return Err(ConstructionError::InvalidChild {
                child: child.name(),
                parent: parent_node.kind.name(),
            }
            .into());
        }
        if let (NodeKind::InsertInto { table, columns, .. }, NodeKind::Values(values)) =
            (&parent_node.kind, child)
        {
            check_value_count(table, columns.len(), values.len())?;
        }
        if let Some(slot) = parent_node.kind.singleton_slot(child) {
            for sibling in &parent_node.children {
                if Some(*sibling) == child_id {
                    continue;
                }
                if parent_node.kind.singleton_slot(&self.node(*sibling)?.kind) == Some(slot) {
                    return Err(ConstructionError::DuplicateClause {
                        clause: slot,
                        parent: parent_node.kind.name(),
                    }
                    .into());
                }
            }
        }
        if let Some(child_id) = child_id {
            if self.is_ancestor_or_self(child_id, parent)? {
                return Err(ConstructionError::InvalidChild {
                    child: child.name(),
                    parent: parent_node.kind.name(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Detaches `id` from its parent, if any.
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        self.node_mut(parent)?.children.retain(|c| *c != id);
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Attaches `child` below `parent`, detaching it from its previous
    /// parent first.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let kind = self.node(child)?.kind.clone();
        self.check_attach(parent, &kind, Some(child))?;
        self.detach(child)?;
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        debug!(parent = %parent, child = %child, kind = kind.name(), "Attached node");
        Ok(())
    }

    /// Creates a detached node. Its table, if any, is registered with the
    /// owner, and the `From` nodes its expressions use as subqueries are
    /// moved below it.
    pub fn create(&mut self, kind: NodeKind) -> Result<NodeId> {
        if matches!(kind, NodeKind::Owner { .. }) {
            return Err(ConstructionError::InvalidChild {
                child: "Owner",
                parent: "Owner",
            }
            .into());
        }

        let mut subqueries = Vec::new();
        for expr in kind.expressions() {
            collect_subqueries(expr, &mut subqueries);
        }
        if matches!(kind, NodeKind::InsertInto { .. }) && !subqueries.is_empty() {
            return Err(ConstructionError::UnsupportedExpression(
                "subquery in an insert guard".into(),
            )
            .into());
        }
        for sub in &subqueries {
            let sub_kind = &self.node(*sub)?.kind;
            if !matches!(sub_kind, NodeKind::From { .. }) {
                return Err(ConstructionError::InvalidChild {
                    child: sub_kind.name(),
                    parent: kind.name(),
                }
                .into());
            }
        }
        if let NodeKind::InsertInto { table, columns, .. } = &kind {
            if let Some(stranger) = columns.iter().find(|c| !table.owns(c)) {
                return Err(ConstructionError::MissingColumnBinding {
                    table: table.name().to_string(),
                    member: stranger.member().to_string(),
                }
                .into());
            }
        }

        if let Some(table) = kind.table() {
            let table = Arc::clone(table);
            self.register_table(&table);
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            owner: NodeId::OWNER,
            parent: None,
            children: Vec::new(),
        });
        for sub in subqueries {
            self.attach(id, sub)?;
        }
        Ok(id)
    }

    fn create_below(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId> {
        self.check_attach(parent, &kind, None)?;
        let id = self.create(kind)?;
        self.attach(parent, id)?;
        Ok(id)
    }

    // ================================================================
    // Fluent entry points
    // ================================================================

    /// `SELECT * FROM table`, attached to the owner.
    pub fn from(&mut self, table: &Arc<TableDef>) -> NodeId {
        self.register_table(table);
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::From {
                table: Arc::clone(table),
            },
            owner: NodeId::OWNER,
            parent: Some(NodeId::OWNER),
            children: Vec::new(),
        });
        self.nodes[0].children.push(id);
        id
    }

    /// Inner join below `from`.
    pub fn join(&mut self, from: NodeId, table: &Arc<TableDef>, on: impl Into<Expr>) -> Result<NodeId> {
        self.create_below(
            from,
            NodeKind::Join {
                kind: JoinKind::Inner,
                table: Arc::clone(table),
                on: on.into(),
            },
        )
    }

    /// Left join below `from`.
    pub fn left_join(
        &mut self,
        from: NodeId,
        table: &Arc<TableDef>,
        on: impl Into<Expr>,
    ) -> Result<NodeId> {
        self.create_below(
            from,
            NodeKind::Join {
                kind: JoinKind::Left,
                table: Arc::clone(table),
                on: on.into(),
            },
        )
    }

    /// `WHERE condition` below `from`.
    pub fn where_clause(&mut self, from: NodeId, condition: impl Into<Expr>) -> Result<NodeId> {
        self.create_below(from, NodeKind::Where(condition.into()))
    }

    /// `GROUP BY keys` below `from`.
    pub fn group_by(&mut self, from: NodeId, keys: Vec<Expr>) -> Result<NodeId> {
        self.create_below(from, NodeKind::GroupBy(keys))
    }

    /// `ORDER BY items` below `from`.
    pub fn order_by(&mut self, from: NodeId, items: Vec<OrderItem>) -> Result<NodeId> {
        self.create_below(from, NodeKind::OrderBy(items))
    }

    /// `LIMIT count` below `from`.
    pub fn limit(&mut self, from: NodeId, count: impl Into<Expr>) -> Result<NodeId> {
        self.create_below(from, NodeKind::Limit(count.into()))
    }

    /// Select list below `from`.
    pub fn select(&mut self, from: NodeId, items: Vec<Expr>) -> Result<NodeId> {
        self.create_below(from, NodeKind::Select(items))
    }

    /// `INSERT INTO table(columns)`, attached to the owner. Give it a
    /// source with [`values`](Self::values) or by attaching a `From`.
    pub fn insert_into(&mut self, table: &Arc<TableDef>, columns: &[&Arc<Column>]) -> Result<NodeId> {
        self.insert(table, columns, None)
    }

    /// Like [`insert_into`](Self::insert_into), inserting only when no
    /// row of `table` satisfies `condition`.
    pub fn insert_into_unless_exists(
        &mut self,
        table: &Arc<TableDef>,
        columns: &[&Arc<Column>],
        condition: impl Into<Expr>,
    ) -> Result<NodeId> {
        self.insert(table, columns, Some(condition.into()))
    }

    fn insert(
        &mut self,
        table: &Arc<TableDef>,
        columns: &[&Arc<Column>],
        unless_exists: Option<Expr>,
    ) -> Result<NodeId> {
        self.create_below(
            NodeId::OWNER,
            NodeKind::InsertInto {
                table: Arc::clone(table),
                columns: columns.iter().map(|c| Arc::clone(c)).collect(),
                unless_exists,
            },
        )
    }

    /// Literal values as the source of `insert`.
    pub fn values(&mut self, insert: NodeId, values: Vec<Expr>) -> Result<NodeId> {
        self.create_below(insert, NodeKind::Values(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, exists, val};
    use crate::schema::{ColumnFlags, SchemaBuilder};

    fn users() -> Arc<TableDef> {
        let db = SchemaBuilder::new("app")
            .declare("tb_user", |ctx| {
                ctx.column::<i64>("Id", "user_id", ColumnFlags::PRIMARY_KEY)?;
                ctx.column::<String>("Name", "user_name", ColumnFlags::empty())?;
                Ok(())
            })
            .unwrap()
            .build()
            .unwrap();
        Arc::clone(&db.tables()[0])
    }

    // ================================================================
    // Attachment rules
    // ================================================================

    #[test]
    fn second_where_rejected() {
        let users = users();
        let id = Arc::clone(users.column("Id").unwrap());
        let mut sql = Sql::new();
        let from = sql.from(&users);
        sql.where_clause(from, col(&id).equals(val(1))).unwrap();
        let err = sql.where_clause(from, col(&id).equals(val(2))).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Construction(ConstructionError::DuplicateClause { clause: "Where", parent: "From" })
        ));
    }

    #[test]
    fn second_limit_via_attach_rejected() {
        let users = users();
        let mut sql = Sql::new();
        let from = sql.from(&users);
        let first = sql.create(NodeKind::Limit(val(1))).unwrap();
        let second = sql.create(NodeKind::Limit(val(2))).unwrap();
        sql.attach(from, first).unwrap();
        assert!(sql.attach(from, second).is_err());
        // Re-attaching the same node is a move, not a duplicate.
        sql.attach(from, first).unwrap();
        assert_eq!(sql.children(from).unwrap(), &[first]);
    }

    #[test]
    fn invalid_child_rejected() {
        let users = users();
        let mut sql = Sql::new();
        let from = sql.from(&users);
        let values = sql.create(NodeKind::Values(vec![val(1)])).unwrap();
        let err = sql.attach(from, values).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Construction(ConstructionError::InvalidChild { child: "Values", parent: "From" })
        ));
    }

    #[test]
    fn cycles_rejected() {
        let users = users();
        let mut sql = Sql::new();
        let outer = sql.from(&users);
        let inner = sql.from(&users);
        let w = sql.where_clause(outer, exists(inner)).unwrap();
        assert_eq!(sql.parent(inner).unwrap(), Some(w));
        let w2 = sql.create(NodeKind::Where(val(true))).unwrap();
        sql.attach(inner, w2).unwrap();
        assert!(sql.attach(w2, outer).is_err());
    }

    // ================================================================
    // Ownership
    // ================================================================

    #[test]
    fn reparenting_detaches_first() {
        let users = users();
        let mut sql = Sql::new();
        let a = sql.from(&users);
        let b = sql.from(&users);
        let w = sql.create(NodeKind::Where(val(true))).unwrap();
        sql.attach(a, w).unwrap();
        sql.attach(b, w).unwrap();
        assert!(sql.children(a).unwrap().is_empty());
        assert_eq!(sql.children(b).unwrap(), &[w]);
        assert_eq!(sql.parent(w).unwrap(), Some(b));
    }

    #[test]
    fn owner_found_by_walking_parents() {
        let users = users();
        let mut sql = Sql::new();
        let from = sql.from(&users);
        let w = sql.where_clause(from, val(true)).unwrap();
        assert_eq!(sql.owner_of(w).unwrap(), NodeId::OWNER);

        let loose = sql.create(NodeKind::Limit(val(1))).unwrap();
        assert!(matches!(
            sql.owner_of(loose).unwrap_err(),
            crate::Error::Construction(ConstructionError::DetachedNode(_))
        ));
        sql.detach(from).unwrap();
        assert!(sql.owner_of(w).is_err());
    }

    #[test]
    fn tables_registered_once_in_order() {
        let users = users();
        let other = Arc::new(users.aliased_clone());
        let mut sql = Sql::new();
        sql.from(&users);
        sql.from(&other);
        sql.from(&users);
        assert_eq!(sql.tables().len(), 2);
        assert_eq!(sql.alias_of(&users).as_deref(), Some("t0"));
        assert_eq!(sql.alias_of(&other).as_deref(), Some("t1"));
    }

    #[test]
    fn insert_columns_must_belong_to_table() {
        let users = users();
        let other = Arc::new(users.aliased_clone());
        let foreign = Arc::clone(other.column("Name").unwrap());
        let mut sql = Sql::new();
        assert!(sql.insert_into(&users, &[&foreign]).is_err());
    }
}
