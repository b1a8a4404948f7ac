//! Minimal IRC-style chat relay server.
//!
//! Connections are bridged to a single handler task through an event
//! mailbox; the handler owns all session state and decides every fan-out.

pub mod atoms;
pub mod config;
pub mod connection;
pub mod handler;
pub mod message;
pub mod server;
pub mod state;
