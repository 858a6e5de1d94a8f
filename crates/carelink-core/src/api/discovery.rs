//! Base URL resolution.
//!
//! The mobile app finds its backend by probing a handful of well-known
//! development hosts; the same idea is available here as [`ProbeResolver`],
//! next to a plain [`StaticResolver`] for deployed servers.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use super::error::{ApiError, Result};

/// Resolves the base URL the API client is built against.
pub trait BaseUrlResolver: Send + Sync {
    fn resolve(&self) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Clone)]
pub struct StaticResolver {
    url: String,
}

impl StaticResolver {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl BaseUrlResolver for StaticResolver {
    async fn resolve(&self) -> Result<String> {
        if self.url.is_empty() {
            return Err(ApiError::Configuration("API URL is empty".to_string()));
        }
        Ok(self.url.clone())
    }
}

/// Picks the first candidate whose health endpoint answers with 2xx.
#[derive(Debug, Clone)]
pub struct ProbeResolver {
    candidates: Vec<String>,
    health_path: String,
    client: Client,
}

impl ProbeResolver {
    pub fn new(
        candidates: Vec<String>,
        health_path: &str,
        probe_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(probe_timeout)
            .build()
            .map_err(|e| ApiError::Configuration(format!("failed to build probe client: {}", e)))?;

        Ok(Self {
            candidates: candidates
                .into_iter()
                .map(|c| c.trim_end_matches('/').to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            health_path: format!("/{}", health_path.trim_start_matches('/')),
            client,
        })
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }
}

impl BaseUrlResolver for ProbeResolver {
    async fn resolve(&self) -> Result<String> {
        if self.candidates.is_empty() {
            return Err(ApiError::Discovery("no candidate URLs configured".to_string()));
        }

        for candidate in &self.candidates {
            let url = format!("{}{}", candidate, self.health_path);
            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(base_url = %candidate, "Discovered API server");
                    return Ok(candidate.clone());
                }
                Ok(response) => {
                    debug!(url = %url, status = %response.status(), "Health probe rejected");
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Health probe failed");
                }
            }
        }

        Err(ApiError::Discovery(format!(
            "none of {} candidates answered {}",
            self.candidates.len(),
            self.health_path
        )))
    }
}

/// Resolver chosen at runtime from configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredResolver {
    Static(StaticResolver),
    Probe(ProbeResolver),
}

impl BaseUrlResolver for ConfiguredResolver {
    async fn resolve(&self) -> Result<String> {
        match self {
            ConfiguredResolver::Static(resolver) => resolver.resolve().await,
            ConfiguredResolver::Probe(resolver) => resolver.resolve().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver_trims_slash() {
        let resolver = StaticResolver::new("https://api.carelink.example/");
        assert_eq!(resolver.resolve().await.unwrap(), "https://api.carelink.example");
    }

    #[tokio::test]
    async fn test_static_resolver_rejects_empty() {
        let resolver = StaticResolver::new("");
        assert!(matches!(resolver.resolve().await, Err(ApiError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_probe_resolver_without_candidates() {
        let resolver =
            ProbeResolver::new(vec![String::new()], "api/health", Duration::from_millis(100))
                .unwrap();
        assert!(resolver.candidates().is_empty());
        assert!(matches!(resolver.resolve().await, Err(ApiError::Discovery(_))));
    }
}
