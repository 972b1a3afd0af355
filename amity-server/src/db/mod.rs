//! Database layer - connection pool, migrations and repositories
//!
//! # Design Principles
//!
//! - Connection pool with explicit limits
//! - List operations use JOINs and `COUNT(*) OVER()` - no N+1 queries
//! - Rely on DB constraints, handle conflicts - no check-then-insert
//! - Transactions for multi-step operations

pub mod migrations;
pub mod pool;
pub mod repos;

pub use pool::{create_pool, create_pool_with_options};
pub use repos::*;
