//! Versioned SQL migrations with a ledger table inside the target database.
//!
//! The engine lives in [`core`]; [`core::service::Migrator`] is the entry point.

pub mod config;
pub mod core;
pub mod subsystem;

pub use crate::{
    config::Config,
    core::{
        error::{MigrateError, MigrateResult},
        logger::{ConsoleLogger, Logger},
        migration::{Direction, Migration, Steps},
        service::{Confirm, MigrationStatus, Migrator, SyncReport},
    },
};
