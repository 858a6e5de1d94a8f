//! Carelink core library.
//!
//! Client side of the carelink appointments and records service:
//!
//! - `api`: the authenticated HTTP client with transparent token refresh
//! - `auth`: credential storage and the typed session view over it
//! - `models`: request/response payloads
//! - `messaging`: conversation polling
//! - `config`: on-disk configuration with environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod messaging;
pub mod models;

pub use api::{
    ApiError, AuthenticatedClient, BaseUrlResolver, ClientOptions, ClientProvider,
    PendingRequest,
};
pub use auth::{CredentialStore, Session, StorageKeys};
pub use config::Config;
pub use messaging::MessagePoller;
