//! Gastown - convoy dispatch and restart-based work hand-off

pub mod commands;
pub mod config;
pub mod convoy;
pub mod dispatch;
pub mod error;
pub mod handoff;
pub mod hook;
pub mod identity;
pub mod ledger;
pub mod notify;
pub mod session;
pub mod store;
pub mod subprocess;
pub mod telemetry;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;
