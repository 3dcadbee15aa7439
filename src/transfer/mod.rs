//! Transfer module for FTP server
//!
//! Handles the data connection, transfer framings and the sequencing of
//! retrieve/store operations.

pub mod data_channel;
pub mod modes;
pub mod operations;

pub use data_channel::{DataChannel, DataConnection};
pub use modes::{DataType, FileStructure, Framing, TransferMode};
pub use operations::{Direction, run_transfer};
