//! CLI subcommands

pub mod action;
pub mod deploy;
pub mod loadbalance;
pub mod query;
pub mod watch;
pub mod zone;
