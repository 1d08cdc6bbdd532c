//! Switchboard core: inbox alerts, cron triggers, subscription fan-out and
//! compaction alerts for a tmux session of cooperating agent roles.
//!
//! Everything here is synchronous. Long-running behavior (the `sb watch`
//! loop) lives in the CLI and drives these components by polling.

pub mod bus;
pub mod compact;
pub mod config;
pub mod cron;
pub mod infrastructure;
pub mod layout;
pub mod lock;
pub mod notify;
pub mod session;
pub mod store;
pub mod subscribe;
