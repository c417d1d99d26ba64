//! Team relay: forwards work-tracking updates to a group chat.
//!
//! The relay polls a record store for task, availability and daily check-in
//! rows, turns recent mutations into human-readable notifications and sends
//! them over a single authenticated messaging session.
//!
//! # Architecture
//!
//! - **Store** ([`store`]): time-filtered REST reads of the monitored tables
//! - **Poller** ([`poller`]): per-table watermarks, recency window, dedupe
//! - **Formatter** ([`formatter`]): event to message text
//! - **Dispatch** ([`dispatch`]): serialized, rate-limited sends
//! - **Session** ([`session`]): pairing, reconnects and the connection state machine
//! - **Health** ([`health`]): read-only HTTP status

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod formatter;
pub mod health;
pub mod poller;
pub mod recency;
pub mod records;
pub mod relay_dirs;
pub mod runtime;
pub mod session;
pub mod store;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use runtime::{Relay, RelayHandle, RelayParts};
