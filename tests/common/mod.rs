//! Shared fixtures for integration tests: an in-memory SQLite graph with a
//! small schema, entity types for the typed layer, and a recording driver.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use async_trait::async_trait;
use graphsql::driver::{Driver, ExecQuerier, ExecResult, Rows, SqliteDriver, Tx};
use graphsql::orm::{Entity, Record};
use graphsql::spec::{EdgeSpec, FieldSpec, FieldType, IdStrategy, NodeSpec, QuerySpec, Value};
use graphsql::sql::{Dialect, Statement};
use graphsql::{Config, Ctx, Graph};

// ============================================================================
// Schema
// ============================================================================

const SCHEMA: &[&str] = &[
    "CREATE TABLE accounts (id INTEGER PRIMARY KEY AUTOINCREMENT, email TEXT NOT NULL UNIQUE, name TEXT)",
    "CREATE TABLE tokens (id INTEGER PRIMARY KEY AUTOINCREMENT, body TEXT NOT NULL, account_id INTEGER REFERENCES accounts (id))",
    "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, age INTEGER, parent_id INTEGER REFERENCES users (id), spouse_id INTEGER REFERENCES users (id))",
    "CREATE TABLE friends (user_id INTEGER NOT NULL REFERENCES users (id), friend_id INTEGER NOT NULL REFERENCES users (id), PRIMARY KEY (user_id, friend_id))",
    "CREATE TABLE teams (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)",
    "CREATE TABLE team_users (team_id INTEGER NOT NULL REFERENCES teams (id), user_id INTEGER NOT NULL REFERENCES users (id), role TEXT, PRIMARY KEY (team_id, user_id))",
    "CREATE TABLE cards (id INTEGER PRIMARY KEY AUTOINCREMENT, number TEXT NOT NULL, owner_id INTEGER REFERENCES users (id))",
    "CREATE TABLE docs (id TEXT PRIMARY KEY, title TEXT NOT NULL)",
];

fn ddl(sql: &str) -> Statement {
    Statement {
        sql: sql.to_string(),
        args: Vec::new(),
    }
}

pub async fn migrate(driver: &SqliteDriver) {
    for sql in SCHEMA {
        driver.exec(&ddl(sql)).await.unwrap();
    }
}

/// A graph over a private in-memory database.
pub async fn memory_graph() -> Graph {
    let mut config = Config::new("sqlite::memory:");
    config.max_connections = 1;
    file_graph(&config).await
}

pub async fn file_graph(config: &Config) -> Graph {
    graphsql::logging::init("graphsql=debug");
    let driver = SqliteDriver::connect(config).await.unwrap();
    migrate(&driver).await;
    Graph::with_config(driver, config)
}

pub fn ctx() -> Ctx {
    Ctx::background()
}

// ============================================================================
// Node and edge specs
// ============================================================================

fn int_id(table: &str) -> NodeSpec {
    NodeSpec::new(table, FieldSpec::column("id", FieldType::Int))
}

pub fn accounts() -> NodeSpec {
    int_id("accounts").columns(["email", "name"]).with_label("account")
}

pub fn tokens() -> NodeSpec {
    int_id("tokens").columns(["body", "account_id"]).with_label("token")
}

pub fn users() -> NodeSpec {
    int_id("users")
        .columns(["name", "age", "parent_id", "spouse_id"])
        .with_label("user")
}

pub fn teams() -> NodeSpec {
    int_id("teams").columns(["name"]).with_label("team")
}

pub fn cards() -> NodeSpec {
    int_id("cards").columns(["number", "owner_id"]).with_label("card")
}

fn new_doc_id() -> Value {
    Value::Uuid(uuid::Uuid::new_v4())
}

pub fn docs() -> NodeSpec {
    NodeSpec::new("docs", FieldSpec::column("id", FieldType::Uuid))
        .columns(["title"])
        .id_strategy(IdStrategy::Generator(new_doc_id))
}

pub fn name(value: &str) -> FieldSpec {
    FieldSpec::new("name", FieldType::String, value)
}

pub fn email(value: &str) -> FieldSpec {
    FieldSpec::new("email", FieldType::String, value)
}

/// account -> tokens, stored in `tokens.account_id`.
pub fn account_tokens() -> EdgeSpec {
    EdgeSpec::o2m("tokens", "account_id")
}

/// token -> account, the inverse of [`account_tokens`].
pub fn token_owner() -> EdgeSpec {
    EdgeSpec::m2o("tokens", "account_id")
}

pub fn friends() -> EdgeSpec {
    EdgeSpec::m2m("friends", "user_id", "friend_id").bidi()
}

pub fn parent() -> EdgeSpec {
    EdgeSpec::m2o("users", "parent_id")
}

pub fn spouse() -> EdgeSpec {
    EdgeSpec::o2o("users", "spouse_id").bidi()
}

/// user -> card, stored in `cards.owner_id`.
pub fn card() -> EdgeSpec {
    EdgeSpec::o2o("cards", "owner_id")
}

pub fn team_users() -> EdgeSpec {
    EdgeSpec::m2m("team_users", "team_id", "user_id")
}

pub fn user_teams() -> EdgeSpec {
    team_users().inverse()
}

// ============================================================================
// Raw selections
// ============================================================================

/// Run `spec` and collect its rows as raw values.
pub async fn select(graph: &Graph, spec: QuerySpec<'_>) -> Vec<Vec<Value>> {
    let rows = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rows);
    let mut spec = spec.scan(
        Box::new(|columns| Ok(vec![FieldType::Other; columns.len()])),
        Box::new(move |_, row| {
            sink.lock().push(row);
            Ok(())
        }),
    );
    graph.query_nodes(&ctx(), &mut spec).await.unwrap();
    let rows = rows.lock().clone();
    rows
}

/// The value of `column` on the row `id` of `node`.
pub async fn column(graph: &Graph, node: NodeSpec, id: &Value, column: &str) -> Value {
    let spec = QuerySpec::new(node)
        .select([column])
        .filter(graphsql::sql::Predicate::eq("id", id.clone()));
    let mut rows = select(graph, spec).await;
    assert_eq!(rows.len(), 1, "expected a single row for id {id}");
    rows.remove(0).remove(0)
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub tokens: Vec<Token>,
}

impl Entity for Account {
    const TABLE: &'static str = "accounts";
    const LABEL: &'static str = "account";

    fn columns() -> &'static [&'static str] {
        &["email", "name"]
    }

    fn column_type(_column: &str) -> FieldType {
        FieldType::String
    }

    fn from_values(columns: &[String], values: Vec<Value>) -> graphsql::Result<Self> {
        let mut record = Record::new(columns, values);
        Ok(Self {
            id: record.get("id")?,
            email: record.get("email")?,
            name: record.get("name")?,
            tokens: Vec::new(),
        })
    }

    fn value(&self, column: &str) -> Value {
        match column {
            "id" => self.id.into(),
            "email" => self.email.clone().into(),
            "name" => self.name.clone().into(),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub id: i64,
    pub body: String,
    pub account_id: Option<i64>,
    pub owner: Option<Box<Account>>,
}

impl Entity for Token {
    const TABLE: &'static str = "tokens";
    const LABEL: &'static str = "token";

    fn columns() -> &'static [&'static str] {
        &["body", "account_id"]
    }

    fn column_type(column: &str) -> FieldType {
        match column {
            "account_id" => FieldType::Int,
            _ => FieldType::String,
        }
    }

    fn from_values(columns: &[String], values: Vec<Value>) -> graphsql::Result<Self> {
        let mut record = Record::new(columns, values);
        Ok(Self {
            id: record.get("id")?,
            body: record.get("body")?,
            account_id: record.get("account_id")?,
            owner: None,
        })
    }

    fn value(&self, column: &str) -> Value {
        match column {
            "id" => self.id.into(),
            "body" => self.body.clone().into(),
            "account_id" => self.account_id.into(),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub age: Option<i64>,
    pub teams: Vec<Team>,
}

impl Entity for User {
    const TABLE: &'static str = "users";
    const LABEL: &'static str = "user";

    fn columns() -> &'static [&'static str] {
        &["name", "age", "parent_id", "spouse_id"]
    }

    fn column_type(column: &str) -> FieldType {
        match column {
            "name" => FieldType::String,
            _ => FieldType::Int,
        }
    }

    fn from_values(columns: &[String], values: Vec<Value>) -> graphsql::Result<Self> {
        let mut record = Record::new(columns, values);
        Ok(Self {
            id: record.get("id")?,
            name: record.get("name")?,
            age: record.get("age")?,
            teams: Vec::new(),
        })
    }

    fn value(&self, column: &str) -> Value {
        match column {
            "id" => self.id.into(),
            "name" => self.name.clone().into(),
            "age" => self.age.into(),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub id: i64,
    pub name: String,
}

impl Entity for Team {
    const TABLE: &'static str = "teams";
    const LABEL: &'static str = "team";

    fn columns() -> &'static [&'static str] {
        &["name"]
    }

    fn column_type(_column: &str) -> FieldType {
        FieldType::String
    }

    fn from_values(columns: &[String], values: Vec<Value>) -> graphsql::Result<Self> {
        let mut record = Record::new(columns, values);
        Ok(Self {
            id: record.get("id")?,
            name: record.get("name")?,
        })
    }

    fn value(&self, column: &str) -> Value {
        match column {
            "id" => self.id.into(),
            "name" => self.name.clone().into(),
            _ => Value::Null,
        }
    }
}

// ============================================================================
// Recording driver
// ============================================================================

/// Scripted response for the next statement.
#[derive(Debug, Clone)]
pub enum Reply {
    Exec(ExecResult),
    Rows(Vec<Vec<Value>>),
    Fail(String),
    /// Never completes.
    Hang,
}

#[derive(Debug, Default)]
struct State {
    log: Vec<String>,
    replies: VecDeque<Reply>,
    fail_rollback: bool,
}

/// Records every statement and transaction step, answering from a script.
/// Unscripted statements affect one row and return no rows.
#[derive(Clone)]
pub struct RecordingDriver {
    dialect: Dialect,
    state: Arc<Mutex<State>>,
}

impl RecordingDriver {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: Arc::default(),
        }
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.state.lock().replies.push_back(reply);
        self
    }

    pub fn fail_rollback(&self) {
        self.state.lock().fail_rollback = true;
    }

    /// SQL of every statement plus BEGIN / COMMIT / ROLLBACK markers.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Leading keyword of every logged entry.
    pub fn kinds(&self) -> Vec<String> {
        self.log()
            .iter()
            .map(|sql| sql.split_whitespace().next().unwrap_or("").to_string())
            .collect()
    }

    fn next(&self, stmt: &Statement) -> Option<Reply> {
        let mut state = self.state.lock();
        state.log.push(stmt.sql.clone());
        state.replies.pop_front()
    }

    async fn exec_reply(&self, stmt: &Statement) -> Result<ExecResult, sqlx::Error> {
        match self.next(stmt) {
            None => Ok(ExecResult {
                rows_affected: 1,
                last_insert_id: None,
            }),
            Some(Reply::Exec(res)) => Ok(res),
            Some(Reply::Rows(_)) => Ok(ExecResult::default()),
            Some(Reply::Fail(message)) => Err(sqlx::Error::Protocol(message)),
            Some(Reply::Hang) => std::future::pending().await,
        }
    }

    async fn query_reply(&self, stmt: &Statement) -> Result<Rows, sqlx::Error> {
        match self.next(stmt) {
            None | Some(Reply::Exec(_)) => Ok(Rows::default()),
            Some(Reply::Rows(rows)) => Ok(Rows {
                columns: Vec::new(),
                rows,
            }),
            Some(Reply::Fail(message)) => Err(sqlx::Error::Protocol(message)),
            Some(Reply::Hang) => std::future::pending().await,
        }
    }

    fn mark(&self, entry: &str) {
        self.state.lock().log.push(entry.to_string());
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn exec(&self, stmt: &Statement) -> Result<ExecResult, sqlx::Error> {
        self.exec_reply(stmt).await
    }

    async fn query(&self, stmt: &Statement) -> Result<Rows, sqlx::Error> {
        self.query_reply(stmt).await
    }

    async fn begin(&self) -> Result<Box<dyn Tx>, sqlx::Error> {
        self.mark("BEGIN");
        Ok(Box::new(RecordingTx {
            driver: self.clone(),
        }))
    }
}

struct RecordingTx {
    driver: RecordingDriver,
}

#[async_trait]
impl ExecQuerier for RecordingTx {
    async fn exec(&mut self, stmt: &Statement) -> Result<ExecResult, sqlx::Error> {
        self.driver.exec_reply(stmt).await
    }

    async fn query(&mut self, stmt: &Statement) -> Result<Rows, sqlx::Error> {
        self.driver.query_reply(stmt).await
    }
}

#[async_trait]
impl Tx for RecordingTx {
    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.driver.mark("COMMIT");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.driver.mark("ROLLBACK");
        if self.driver.state.lock().fail_rollback {
            return Err(sqlx::Error::PoolClosed);
        }
        Ok(())
    }
}
