//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the billing domain using SQLx.
//!
//! # Architecture
//!
//! [`PgBillingRepository`] implements the domain's `BillingRepository` port.
//! Each unit of work is one database transaction, so a billing run or a
//! payment import either lands completely or not at all.
//!
//! Queries are built at runtime with `sqlx::query_as` and mapped through the
//! row types in [`rows`]; no database is needed to compile the crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgBillingRepository};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/billing")).await?;
//! run_migrations(&pool).await?;
//! let repository = PgBillingRepository::new(pool);
//! ```

pub mod error;
pub mod pool;
pub mod repository;
pub mod rows;

pub use error::DatabaseError;
pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool, MIGRATOR};
pub use repository::{PgBillingRepository, PgUnitOfWork};
