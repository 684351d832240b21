pub mod controller;
pub mod diff;
pub mod error;
pub mod logger;
pub mod migration;
pub mod service;
pub mod set;
pub mod source;
pub mod squash;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
