//! Error handling
//!
//! Defines error types for the server, the transfer layer and the client driver.

pub mod types;

pub use types::*;
