//! Tool Protocol
//!
//! JSON-RPC 2.0 over stdio for the tool protocol.

pub mod messages;
pub mod stdio;
pub mod types;
