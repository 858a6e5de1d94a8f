//! Authentication state: where tokens live and how they are read.
//!
//! This module provides:
//! - `CredentialStore`: key-value storage (memory, JSON file, OS keychain)
//! - `Session`: typed access to the access token, refresh token and cached user
//! - `claims`: JWT expiry inspection for display

pub mod claims;
pub mod credentials;
pub mod session;

pub use credentials::{CredentialStore, FileStore, KeyringStore, MemoryStore, StoreError};
pub use session::{Credentials, Session, StorageKeys};
