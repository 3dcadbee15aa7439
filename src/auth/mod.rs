//! Authentication system
//!
//! Credential lookup used by `USER`/`PASS`. The store is pluggable; the
//! server ships an in-memory one built from the configured user list.

pub mod credentials;

pub use credentials::{CredentialStore, MemoryCredentials};
