//! Database-specific tooling that lives outside the generic engine.

pub mod postgres;
