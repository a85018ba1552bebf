//! JSON-over-HTTP transport for [`AppClient`].
//!
//! Authentication exchanges the API key for a bearer token once, when the
//! client is created. Every later call carries that token.

use crate::client::{AppClient, ClientError, Connector};
use crate::credentials::Credentials;
use crate::types::{MachineConfig, Part};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Serialize)]
struct AuthCredentials<'a> {
    #[serde(rename = "type")]
    r#type: &'static str,
    payload: &'a str,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    entity: &'a str,
    credentials: AuthCredentials<'a>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ListPartsResponse {
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct PartResponse {
    part: Part,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePartRequest<'a> {
    name: &'a str,
    robot_config: &'a MachineConfig,
}

#[derive(Clone, Debug)]
pub struct HttpConnector {
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Self {
        HttpConnector { timeout }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(
        &self,
        credentials: &Credentials,
        endpoint: &Url,
    ) -> Result<Arc<dyn AppClient>, ClientError> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let request = AuthRequest {
            entity: &credentials.api_key_id,
            credentials: AuthCredentials {
                r#type: "api-key",
                payload: &credentials.api_key_secret,
            },
        };
        let response = client
            .post(join(endpoint, &["auth", "token"])?)
            .json(&request)
            .send()
            .await?;
        let auth = check_status(response)
            .await?
            .json::<AuthResponse>()
            .await?;

        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", auth.access_token))
            .map_err(|_| ClientError::InvalidToken)?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Arc::new(HttpAppClient {
            client,
            base: endpoint.clone(),
        }))
    }
}

#[derive(Clone, Debug)]
pub struct HttpAppClient {
    client: reqwest::Client,
    base: Url,
}

#[async_trait]
impl AppClient for HttpAppClient {
    async fn list_parts(&self, machine_id: &str) -> Result<Vec<Part>, ClientError> {
        let url = join(&self.base, &["v1", "machines", machine_id, "parts"])?;
        let response = self.client.get(url).send().await?;
        Ok(check_status(response)
            .await?
            .json::<ListPartsResponse>()
            .await?
            .parts)
    }

    async fn get_part(&self, part_id: &str) -> Result<Part, ClientError> {
        let url = join(&self.base, &["v1", "parts", part_id])?;
        let response = self.client.get(url).send().await?;

        if response.status() == http::StatusCode::NOT_FOUND {
            return Err(ClientError::PartNotFound(part_id.to_string()));
        }

        Ok(check_status(response)
            .await?
            .json::<PartResponse>()
            .await?
            .part)
    }

    async fn update_part(
        &self,
        part_id: &str,
        part_name: &str,
        config: &MachineConfig,
    ) -> Result<Part, ClientError> {
        let url = join(&self.base, &["v1", "parts", part_id])?;
        let body = UpdatePartRequest {
            name: part_name,
            robot_config: config,
        };
        let response = self.client.put(url).json(&body).send().await?;
        Ok(check_status(response)
            .await?
            .json::<PartResponse>()
            .await?
            .part)
    }
}

/// Appends percent-encoded path segments to `base`.
fn join(base: &Url, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::HttpStatus(status, response.text().await?))
    }
}
