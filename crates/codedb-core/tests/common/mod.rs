//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use codedb_core::connection::{
    BoundParameter, Command, Connection, ConnectionFactory, Row, RowStream,
};
use codedb_core::schema::{ColumnFlags, DatabaseDef, SchemaBuilder, TableDef};
use codedb_core::value::Value;
use codedb_core::Result;

/// A blog schema with users and posts.
pub fn blog() -> DatabaseDef {
    SchemaBuilder::new("blog")
        .declare("tb_user", |ctx| {
            ctx.column::<i64>("Id", "user_id", ColumnFlags::PRIMARY_KEY | ColumnFlags::SERIAL)?;
            ctx.column::<String>("Name", "user_name", ColumnFlags::UNIQUE_1)?;
            ctx.column::<i32>("Age", "age", ColumnFlags::empty())?;
            Ok(())
        })
        .unwrap()
        .declare("tb_post", |ctx| {
            ctx.column::<i64>("Id", "post_id", ColumnFlags::PRIMARY_KEY | ColumnFlags::SERIAL)?;
            ctx.column::<i64>("Author", "author_id", ColumnFlags::INDEX_1)?;
            ctx.column::<Vec<String>>("Tags", "tags", ColumnFlags::INDEX_2 | ColumnFlags::GIN)?;
            ctx.column::<Option<String>>("Title", "title", ColumnFlags::empty())?;
            Ok(())
        })
        .unwrap()
        .build()
        .unwrap()
}

/// Looks up a table of `db`.
pub fn table(db: &DatabaseDef, name: &str) -> Arc<TableDef> {
    Arc::clone(db.table(name).unwrap())
}

/// An in-memory connection that records every command. Readers return
/// `rows` when set, otherwise an answer picked by the first bound
/// parameter.
#[derive(Debug, Default)]
pub struct FakeConnection {
    pub executed: Vec<(String, Vec<BoundParameter>)>,
    pub rows: Vec<Row>,
}

impl FakeConnection {
    /// A connection whose readers return `rows`.
    pub fn answering(rows: Vec<Row>) -> Self {
        Self {
            executed: Vec::new(),
            rows,
        }
    }
}

pub struct FakeCommand<'c> {
    connection: &'c mut FakeConnection,
}

fn answer(parameters: &[BoundParameter]) -> Vec<Row> {
    match parameters.first().map(|p| &p.value) {
        Some(Value::Int(16)) => vec![Row(vec![Value::Text("sixteen".into())])],
        Some(Value::Int(32)) => vec![
            Row(vec![Value::Text("thirty-two".into())]),
            Row(vec![Value::Text("thirty-two again".into())]),
        ],
        _ => Vec::new(),
    }
}

impl Command for FakeCommand<'_> {
    fn execute_non_query(&mut self, text: &str, parameters: &[BoundParameter]) -> Result<u64> {
        self.connection
            .executed
            .push((text.to_string(), parameters.to_vec()));
        Ok(1)
    }

    fn execute_reader(&mut self, text: &str, parameters: &[BoundParameter]) -> Result<RowStream<'_>> {
        self.connection
            .executed
            .push((text.to_string(), parameters.to_vec()));
        let rows = if self.connection.rows.is_empty() {
            answer(parameters)
        } else {
            self.connection.rows.clone()
        };
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}

impl Connection for FakeConnection {
    type Command<'c> = FakeCommand<'c>;

    fn create_command(&mut self) -> Result<Self::Command<'_>> {
        Ok(FakeCommand { connection: self })
    }
}

/// Opens fresh fake connections.
#[derive(Debug, Default)]
pub struct FakeFactory;

impl ConnectionFactory for FakeFactory {
    type Connection = FakeConnection;

    fn open_connection(&self) -> Result<FakeConnection> {
        Ok(FakeConnection::default())
    }
}
