//! Database module: the worker that owns storage, and what is stored.
//!
//! Layout:
//! - `worker.rs`: actor owning the SQLite pool, plus the `ConnectionHandle` talking to it
//! - `factory.rs`: how a context builds its connection
//! - `value.rs`: JSON <-> SQLite bridge for shape-agnostic queries
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `records.rs`: parameterized patient queries

pub mod factory;
pub mod models;
pub mod records;
pub mod schema;
pub mod value;
pub mod worker;

pub use factory::{ConnectionFactory, WorkerFactory};
pub use models::{DbPatient, PatientCreate};
pub use records::PatientStore;
pub use schema::SQLITE_INIT;
pub use value::Row;
pub use worker::{ConnectionHandle, ExecOutcome, spawn};
