//! Client driver
//!
//! A small FTP client that issues one command at a time and waits for its
//! reply before sending the next. Data connections use active mode.

pub mod session;

pub use session::FtpClient;
