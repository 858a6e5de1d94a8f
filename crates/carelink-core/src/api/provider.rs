use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::client::{AuthenticatedClient, ClientOptions};
use super::discovery::BaseUrlResolver;
use super::error::Result;
use crate::auth::Session;

/// Builds the shared [`AuthenticatedClient`] on first use and hands out the
/// same instance until [`reset`](Self::reset) is called.
///
/// Owned by the composition root (the CLI's `main`, a test, ...) instead of
/// living in a global.
pub struct ClientProvider<R> {
    resolver: R,
    session: Session,
    options: ClientOptions,
    client: Mutex<Option<Arc<AuthenticatedClient>>>,
}

impl<R: BaseUrlResolver> ClientProvider<R> {
    pub fn new(resolver: R, session: Session, options: ClientOptions) -> Self {
        Self {
            resolver,
            session,
            options,
            client: Mutex::new(None),
        }
    }

    /// The shared client, resolving the base URL the first time.
    ///
    /// Concurrent first callers wait for a single build.
    pub async fn client(&self) -> Result<Arc<AuthenticatedClient>> {
        let mut slot = self.client.lock().await;
        if let Some(ref client) = *slot {
            return Ok(Arc::clone(client));
        }

        let base_url = self.resolver.resolve().await?;
        let client = Arc::new(AuthenticatedClient::new(
            base_url,
            self.session.clone(),
            self.options.clone(),
        )?);
        info!(base_url = %client.base_url(), "API client ready");

        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Drop the cached client; the next [`client`](Self::client) call
    /// resolves and builds a new one.
    pub async fn reset(&self) {
        self.client.lock().await.take();
    }

    pub async fn is_built(&self) -> bool {
        self.client.lock().await.is_some()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}
