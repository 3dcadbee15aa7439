//! Server core functionality
//!
//! The accept loop, the per-connection command loop and the session state
//! each connection owns.

pub mod connection;
pub mod core;
pub mod session;

pub use connection::{handle_connection, serve};
pub use self::core::{Server, ServerContext};
pub use session::Session;
