//! bboard core - connection abstractions shared by the pool and the drivers
//!
//! This crate defines the pieces every other bboard crate depends on:
//!
//! - `Connection` - one exclusively-owned database session
//! - `DatabaseConfig` - where and how to open a session
//! - `Value`, `Row`, `QueryResult`, `StatementResult` - query data
//! - `BoardError` / `Result` - the error type drivers report

mod config;
mod connection;
mod error;
mod types;

pub use config::*;
pub use connection::*;
pub use error::*;
pub use types::*;
