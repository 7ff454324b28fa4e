//! Dialect-agnostic graph-to-SQL compiler.
//!
//! Callers describe an operation on an entity graph (create one or many
//! nodes, update or delete nodes, query nodes and their edges) as a spec
//! value, and a [`Graph`] compiles it into statements for MySQL, Postgres or
//! SQLite, runs them through a [`driver::Driver`] and reports results back
//! through the spec's callbacks. Relational invariants such as FK ownership,
//! join-table bookkeeping and O2O uniqueness are maintained by the compiler,
//! and driver errors are classified into [`Error`].
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use graphsql::driver::SqliteDriver;
//! use graphsql::spec::{CreateSpec, FieldSpec, FieldType, NodeSpec};
//! use graphsql::{Config, Graph};
//!
//! let config = Config::from_env()?;
//! let graph = Graph::with_config(SqliteDriver::connect(&config).await?, &config);
//!
//! let accounts = NodeSpec::new("accounts", FieldSpec::column("id", FieldType::Int));
//! let mut create = CreateSpec::new(accounts).set(FieldSpec::new("email", FieldType::String, "a@x.com"));
//! let id = graph.create_node(&graph.context(), &mut create).await?;
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod graph;
pub mod logging;
pub mod must;
pub mod orm;
pub mod spec;
pub mod sql;

pub use config::Config;
pub use context::Ctx;
pub use error::{Error, Result};
pub use graph::Graph;
pub use must::Must;
