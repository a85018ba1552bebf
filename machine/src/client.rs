use crate::config::EndpointConfig;
use crate::credentials::Credentials;
use crate::metrics_defs::{CLIENT_CONNECT_FAILED, CLIENT_FALLBACK_ENDPOINT};
use crate::types::{MachineConfig, Part};
use async_trait::async_trait;
use http::StatusCode;
use shared::counter;
use std::sync::Arc;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("credentials are missing an API key secret or hostname")]
    IncompleteCredentials,

    #[error("could not create client: primary endpoint failed ({primary}), fallback endpoint failed ({fallback})")]
    ClientCreationFailed {
        primary: Box<ClientError>,
        fallback: Box<ClientError>,
    },

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),

    #[error("service returned an access token that is not a valid header value")]
    InvalidToken,

    #[error("part not found: {0}")]
    PartNotFound(String),
}

/// Remote operations on a machine's parts.
///
/// Implementations are bound to one endpoint and one set of credentials.
#[async_trait]
pub trait AppClient: Send + Sync {
    async fn list_parts(&self, machine_id: &str) -> Result<Vec<Part>, ClientError>;

    async fn get_part(&self, part_id: &str) -> Result<Part, ClientError>;

    /// Replaces the whole stored configuration of a part.
    async fn update_part(
        &self,
        part_id: &str,
        part_name: &str,
        config: &MachineConfig,
    ) -> Result<Part, ClientError>;
}

/// Creates an authenticated [`AppClient`] addressed at a single endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        credentials: &Credentials,
        endpoint: &Url,
    ) -> Result<Arc<dyn AppClient>, ClientError>;
}

/// Creates a client for `credentials`, trying the primary endpoint first and
/// the fallback endpoint exactly once if that fails.
pub async fn connect(
    connector: &dyn Connector,
    credentials: &Credentials,
    endpoints: &EndpointConfig,
) -> Result<Arc<dyn AppClient>, ClientError> {
    if credentials.api_key_secret.is_empty() || credentials.hostname.is_empty() {
        return Err(ClientError::IncompleteCredentials);
    }

    let primary = endpoints.primary(&credentials.hostname)?;
    let primary_err = match connector.connect(credentials, &primary).await {
        Ok(client) => {
            tracing::debug!(endpoint = %primary, "Connected to primary endpoint");
            return Ok(client);
        }
        Err(e) => e,
    };

    let fallback = endpoints.fallback(&credentials.hostname)?;
    tracing::warn!(
        endpoint = %primary,
        fallback = %fallback,
        error = %primary_err,
        "Primary endpoint failed, retrying with fallback"
    );
    counter!(CLIENT_FALLBACK_ENDPOINT).increment(1);

    match connector.connect(credentials, &fallback).await {
        Ok(client) => Ok(client),
        Err(fallback_err) => {
            counter!(CLIENT_CONNECT_FAILED).increment(1);
            tracing::error!(error = %fallback_err, "Fallback endpoint failed");
            Err(ClientError::ClientCreationFailed {
                primary: Box::new(primary_err),
                fallback: Box::new(fallback_err),
            })
        }
    }
}
