//! Remote retrieval of federation statements.
//!
//! ## Endpoints
//!
//! - `GET <entity>/.well-known/openid-federation` - self-signed entity configuration
//! - `GET <federation_fetch_endpoint>?sub=<entity>` - subordinate statement
//! - `POST <federation_registration_endpoint>` - explicit registration request

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder, RequestBuilder};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

/// Path of the entity configuration relative to the entity identifier.
pub const WELL_KNOWN_PATH: &str = ".well-known/openid-federation";

/// Errors from the fetch collaborator.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The URL could not be built.
    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// Offending input.
        url: String,
        /// Parse failure.
        reason: String,
    },

    /// Transport failure.
    #[error("Request to {url} failed: {message}")]
    Request {
        /// Requested URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Status code.
        status: u16,
    },

    /// Deadline exceeded.
    #[error("Request to {url} timed out after {after:?}")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Configured deadline.
        after: Duration,
    },
}

/// Retrieves compact statements from other federation entities.
#[async_trait]
pub trait FederationFetcher: Send + Sync {
    /// Fetch the self-signed entity configuration of `entity_id`.
    async fn fetch_entity_configuration(&self, entity_id: &str) -> Result<String, FetchError>;

    /// Fetch the statement the owner of `fetch_endpoint` makes about `subject`.
    async fn fetch_subordinate_statement(
        &self,
        fetch_endpoint: &str,
        subject: &str,
    ) -> Result<String, FetchError>;

    /// Post an explicit registration request and return the response body.
    ///
    /// Fetchers that only read statements keep the default, which refuses.
    async fn post_registration(
        &self,
        registration_endpoint: &str,
        _media_type: &str,
        _body: &str,
    ) -> Result<String, FetchError> {
        Err(FetchError::Request {
            url: registration_endpoint.to_string(),
            message: "this fetcher cannot post registration requests".into(),
        })
    }
}

/// `<entity_id>/.well-known/openid-federation`.
pub fn entity_configuration_url(entity_id: &str) -> Result<Url, FetchError> {
    let base = entity_id.trim();
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };

    Url::parse(&base)
        .and_then(|url| url.join(WELL_KNOWN_PATH))
        .map_err(|e| FetchError::InvalidUrl {
            url: entity_id.to_string(),
            reason: e.to_string(),
        })
}

/// `<fetch_endpoint>?sub=<subject>`, with `subject` form-encoded.
pub fn subordinate_statement_url(fetch_endpoint: &str, subject: &str) -> Result<Url, FetchError> {
    let mut url = Url::parse(fetch_endpoint.trim()).map_err(|e| FetchError::InvalidUrl {
        url: fetch_endpoint.to_string(),
        reason: e.to_string(),
    })?;
    url.query_pairs_mut().append_pair("sub", subject);
    Ok(url)
}

/// [`FederationFetcher`] over HTTPS.
pub struct HttpFederationFetcher {
    client: Client,
}

impl HttpFederationFetcher {
    /// Create a fetcher with the given request timeout and user agent.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self { client })
    }

    /// Create a fetcher from resolver settings.
    pub fn from_config(config: &crate::config::ResolverConfig) -> Result<Self, FetchError> {
        Self::new(config.fetch_timeout, &config.user_agent)
    }

    #[instrument(skip_all, fields(url = %url))]
    async fn get_text(&self, url: Url) -> Result<String, FetchError> {
        debug!("Federation fetch");
        self.send_text(url.clone(), self.client.get(url)).await
    }

    async fn send_text(&self, url: Url, request: RequestBuilder) -> Result<String, FetchError> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "Federation fetch failed");
            FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Federation fetch: non-success status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            message: format!("Failed to read body: {e}"),
        })?;

        debug!(bytes = body.len(), "Federation fetch: statement received");
        Ok(body.trim().to_string())
    }
}

#[async_trait]
impl FederationFetcher for HttpFederationFetcher {
    async fn fetch_entity_configuration(&self, entity_id: &str) -> Result<String, FetchError> {
        self.get_text(entity_configuration_url(entity_id)?).await
    }

    async fn fetch_subordinate_statement(
        &self,
        fetch_endpoint: &str,
        subject: &str,
    ) -> Result<String, FetchError> {
        self.get_text(subordinate_statement_url(fetch_endpoint, subject)?)
            .await
    }

    #[instrument(skip(self, body))]
    async fn post_registration(
        &self,
        registration_endpoint: &str,
        media_type: &str,
        body: &str,
    ) -> Result<String, FetchError> {
        let url = Url::parse(registration_endpoint.trim()).map_err(|e| FetchError::InvalidUrl {
            url: registration_endpoint.to_string(),
            reason: e.to_string(),
        })?;
        debug!("Posting registration request");

        let request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, media_type)
            .body(body.to_string());
        self.send_text(url, request).await
    }
}
