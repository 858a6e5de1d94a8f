//! REST API client module for the carelink backend.
//!
//! This module provides the `AuthenticatedClient` for talking to the
//! Express backend, the `ClientProvider` that builds it once per process,
//! and base URL discovery.
//!
//! The API uses JWT bearer tokens issued by `/api/auth/login` and renewed
//! through `/api/auth/refresh-token`.

pub mod client;
pub mod discovery;
mod endpoints;
pub mod error;
pub mod provider;
mod refresh;
pub mod request;

pub use client::{AuthEndpoints, AuthenticatedClient, ClientOptions, DEFAULT_TIMEOUT_MS};
pub use discovery::{BaseUrlResolver, ConfiguredResolver, ProbeResolver, StaticResolver};
pub use error::ApiError;
pub use provider::ClientProvider;
pub use request::PendingRequest;
