//! File system storage
//!
//! Resolves client paths under the server root and opens files for transfers.

pub mod filesystem;
pub mod validation;

pub use filesystem::LocalStorage;
pub use validation::resolve_under_root;
