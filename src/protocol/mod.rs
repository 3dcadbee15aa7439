//! FTP Protocol implementation
//!
//! Handles FTP command parsing, reply codes, control line I/O and command
//! dispatch.

pub mod codec;
pub mod commands;
pub mod handlers;
pub mod responses;

pub use codec::{ControlChannel, ControlLine};
pub use commands::{Command, CommandStatus, format_host_port, parse_command, parse_host_port};
pub use handlers::{CommandContext, handle_command};
pub use responses::{Outcome, Reply, code_for};
