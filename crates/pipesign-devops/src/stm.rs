//! Signing Manager API client.
//!
//! Looks up the keypair aliases available to an API key; synthesis needs a
//! resolved alias before it can render any signing command.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};

pub const DEFAULT_STM_URL: &str = "https://one.digicert.com/signingmanager";

/// A signing keypair as reported by the Signing Manager.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Keypair {
    pub id: String,
    pub alias: String,
    pub key_type: String,
    pub key_alg: String,
    pub key_size: u32,
}

#[derive(Deserialize)]
struct KeypairPage {
    items: Vec<Keypair>,
}

/// Client for the Signing Manager REST API.
pub struct StmClient {
    http: reqwest::Client,
    base_url: String,
}

impl StmClient {
    pub fn new(base_url: impl Into<String>, api_key: &str) -> RemoteResult<Self> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| RemoteError::Auth("API key is not a valid header value".to_string()))?;
        key.set_sensitive(true);
        headers.insert("X-API-KEY", key);

        let http = reqwest::Client::builder()
            .user_agent(concat!("pipesign/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Keypairs visible to the API key (first page; the wizard only ever
    /// needs an alias to pick).
    pub async fn keypairs(&self) -> RemoteResult<Vec<Keypair>> {
        let response = self
            .http
            .get(format!("{}/api/v1/keypairs", self.base_url))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let page: KeypairPage = response.json().await?;
                debug!(count = page.items.len(), "fetched signing keypairs");
                Ok(page.items)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(RemoteError::Auth("invalid API key".to_string()))
            }
            status => Err(RemoteError::Remote(format!(
                "keypair lookup failed: HTTP {status}"
            ))),
        }
    }

    /// Validate the API key by listing keypairs with it.
    pub async fn validate_key(&self) -> RemoteResult<bool> {
        match self.keypairs().await {
            Ok(_) => Ok(true),
            Err(RemoteError::Auth(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }
}
