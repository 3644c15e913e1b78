//! Parley core library — webhook intake, event dispatch, outbound Send API,
//! and the profile cache used by the CLI and by embedding hosts.

pub mod compose;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod profile;
pub mod send;
pub mod server;
pub mod signature;
