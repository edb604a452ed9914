//! SQLite persistence for TaskFlow.
//!
//! All mutating store functions take `&mut SqliteConnection` so the caller
//! owns the transaction; a domain change and its audit entry commit together
//! or not at all. Reads may run on any pooled connection.

pub mod audit;
pub mod common;
pub mod projects;
pub mod sqlite;
pub mod tasks;
pub mod workers;

pub use sqlite::Database;
