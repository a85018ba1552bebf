use serde::Deserialize;
use url::Url;

/// How remote service endpoints are derived from a credential hostname.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct EndpointConfig {
    pub scheme: String,
    /// Port of the secondary endpoint tried when the primary one fails.
    pub fallback_port: u16,
    /// Per-request timeout enforced by the transport.
    pub request_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            scheme: "https".into(),
            fallback_port: 8443,
            request_timeout_secs: 30,
        }
    }
}

impl EndpointConfig {
    /// Primary endpoint for `hostname`. A hostname that already carries a
    /// scheme is used as given.
    pub fn primary(&self, hostname: &str) -> Result<Url, url::ParseError> {
        if hostname.contains("://") {
            Url::parse(hostname)
        } else {
            Url::parse(&format!("{}://{}", self.scheme, hostname))
        }
    }

    /// Same host as [`EndpointConfig::primary`] on the explicit fallback port.
    pub fn fallback(&self, hostname: &str) -> Result<Url, url::ParseError> {
        let mut url = self.primary(hostname)?;
        url.set_port(Some(self.fallback_port))
            .map_err(|_| url::ParseError::InvalidPort)?;
        Ok(url)
    }
}
