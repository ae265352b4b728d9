//! Network access for the worker
//!
//! The worker only talks to the network through the [`Network`] trait so the
//! caching strategy can be exercised without sockets. [`HttpNetwork`] is the
//! real implementation, backed by a blocking `ureq` agent run on the tokio
//! blocking pool.

use crate::config::schema::NetworkConfig;
use crate::http::{Method, Request, Response, ResponseKind};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::{Origin, Url};

/// Why a network fetch produced no response at all
///
/// An HTTP error status is still a response; these are the failures where
/// nothing came back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Network unreachable: {0}")]
    Offline(String),

    #[error("DNS lookup failed for {0}")]
    Dns(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network request failed for {url}: {reason}")]
    Failed { url: String, reason: String },
}

/// Abstract network interface
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request and return whatever the server answered
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// HTTP(S) network backed by `ureq`
pub struct HttpNetwork {
    agent: ureq::Agent,
    scope_origin: Origin,
    user_agent: String,
    max_body_bytes: u64,
}

impl HttpNetwork {
    /// Create a network client for pages served from `scope`
    pub fn new(scope: &Url, config: &NetworkConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout_secs.map(Duration::from_secs))
            .build();

        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            scope_origin: scope.origin(),
            user_agent: config.user_agent.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// Same-origin responses are basic, everything else is CORS
    fn classify(&self, url: &Url) -> ResponseKind {
        if url.origin() == self.scope_origin {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let agent = self.agent.clone();
        let url = request.url.clone();
        let method = request.method;
        let user_agent = self.user_agent.clone();
        let limit = self.max_body_bytes;
        let kind = self.classify(&url);

        debug!("Fetching {} {}", method, url);

        let task = tokio::task::spawn_blocking(move || {
            let result = match method {
                Method::Get => agent.get(url.as_str()).header("User-Agent", &user_agent).call(),
                Method::Head => agent.head(url.as_str()).header("User-Agent", &user_agent).call(),
                other => {
                    return Err(NetworkError::Failed {
                        url: url.to_string(),
                        reason: format!("{} is not fetched by the worker", other),
                    })
                }
            };

            let response = result.map_err(|e| map_ureq_error(&url, e))?;
            let status = response.status().as_u16();
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();

            let body = response
                .into_body()
                .into_with_config()
                .limit(limit)
                .read_to_vec()
                .map_err(|e| map_ureq_error(&url, e))?;

            let response = headers
                .into_iter()
                .fold(Response::new(url.as_str(), status, body), |r, (name, value)| {
                    r.with_header(name, value)
                })
                .with_kind(kind);
            Ok(response)
        });

        task.await.map_err(|e| NetworkError::Failed {
            url: request.url.to_string(),
            reason: format!("fetch task failed: {}", e),
        })?
    }
}

fn map_ureq_error(url: &Url, err: ureq::Error) -> NetworkError {
    match &err {
        ureq::Error::Timeout(_) => NetworkError::Timeout(url.to_string()),
        ureq::Error::HostNotFound => {
            NetworkError::Dns(url.host_str().unwrap_or_default().to_string())
        }
        ureq::Error::ConnectionFailed | ureq::Error::Io(_) => {
            NetworkError::Offline(format!("{}: {}", url, err))
        }
        _ => NetworkError::Failed {
            url: url.to_string(),
            reason: err.to_string(),
        },
    }
}
