//! Azure DevOps REST client.
//!
//! An explicitly constructed, passed-by-reference client. Nothing here is a
//! process-wide singleton; callers own the handle and can hand fakes to the
//! reader and publisher instead.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use async_trait::async_trait;

use crate::change::{BranchTip, ChangeSet};
use crate::error::{RemoteError, RemoteResult};
use crate::remote::GitRemote;

const GIT_API_VERSION: &str = "7.1-preview.1";
const PUSH_API_VERSION: &str = "6.0";

/// Connection settings for one organization/project.
#[derive(Debug, Clone)]
pub struct AzureDevOpsConfig {
    pub organization: String,
    pub project: String,
    /// Personal access token.
    pub pat: String,
}

/// REST client for the Git, project and distributed-task endpoints.
pub struct AzureDevOpsClient {
    http: reqwest::Client,
    org_url: String,
    project_url: String,
    project: String,
}

impl AzureDevOpsClient {
    pub fn new(config: AzureDevOpsConfig) -> RemoteResult<Self> {
        let token = BASE64.encode(format!(":{}", config.pat));
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Basic {token}"))
            .map_err(|_| RemoteError::Auth("personal access token is not a valid header value".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .user_agent(concat!("pipesign/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            org_url: format!("https://dev.azure.com/{}", config.organization),
            project_url: format!(
                "https://dev.azure.com/{}/{}",
                config.organization, config.project
            ),
            project: config.project,
        })
    }

    pub(crate) fn project_name(&self) -> &str {
        &self.project
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn org_url(&self) -> &str {
        &self.org_url
    }

    pub(crate) fn project_url(&self) -> &str {
        &self.project_url
    }

    /// Check that the token can list projects in the organization.
    pub async fn validate_pat(&self) -> RemoteResult<bool> {
        let response = self
            .http
            .get(format!("{}/_apis/projects", self.org_url))
            .query(&[("api-version", "7.1-preview.1")])
            .send()
            .await?;
        Ok(response.status() == StatusCode::OK)
    }
}

#[derive(Deserialize)]
struct RefsResponse {
    value: Vec<GitRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GitRef {
    object_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushResponse {
    ref_updates: Vec<PushedRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushedRef {
    new_object_id: String,
}

#[async_trait]
impl GitRemote for AzureDevOpsClient {
    async fn branch_tip(&self, repository_id: &str, branch: &str) -> RemoteResult<BranchTip> {
        let url = format!(
            "{}/_apis/git/repositories/{}/refs",
            self.project_url, repository_id
        );
        let response = self
            .http
            .get(url)
            .query(&[
                ("filter", format!("heads/{branch}")),
                ("api-version", GIT_API_VERSION.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(remote_failure(response).await);
        }

        let refs: RefsResponse = response.json().await?;
        let head = refs
            .value
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::BranchNotFound(branch.to_string()))?;

        debug!(branch, commit = %head.object_id, "resolved branch tip");
        Ok(BranchTip::new(head.object_id))
    }

    async fn file_content(&self, repository_id: &str, path: &str) -> RemoteResult<Option<String>> {
        let url = format!(
            "{}/_apis/git/repositories/{}/items",
            self.project_url, repository_id
        );
        // Force raw text so the API returns file content, not an item
        // descriptor. The reader still defends against the descriptor case.
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "text/plain")
            .query(&[("path", path), ("api-version", GIT_API_VERSION)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(remote_failure(response).await);
        }

        Ok(Some(response.text().await?))
    }

    async fn push(&self, change: &ChangeSet) -> RemoteResult<BranchTip> {
        let url = format!(
            "{}/_apis/git/repositories/{}/pushes",
            self.project_url,
            change.target.repository_id()
        );
        let response = self
            .http
            .post(url)
            .query(&[("api-version", PUSH_API_VERSION)])
            .json(&change.to_wire())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(remote_failure(response).await);
        }

        let pushed: PushResponse = response.json().await?;
        let new_tip = pushed
            .ref_updates
            .into_iter()
            .next()
            .map(|r| BranchTip::new(r.new_object_id))
            .ok_or_else(|| RemoteError::Remote("push response carried no ref updates".to_string()))?;

        debug!(
            branch = change.target.branch(),
            old = %change.base.commit_id,
            new = %new_tip.commit_id,
            "pushed pipeline update"
        );
        Ok(new_tip)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map a non-success response to a [`RemoteError`], passing the remote's
/// diagnostic message through when the body carries one.
pub(crate) async fn remote_failure(response: reqwest::Response) -> RemoteError {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) if !body.message.is_empty() => body.message,
        _ => format!("HTTP {status}"),
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Auth(message),
        StatusCode::NOT_FOUND => RemoteError::RepositoryNotFound(message),
        StatusCode::CONFLICT => RemoteError::Conflict(message),
        _ if is_stale_tip(&message) => RemoteError::Conflict(message),
        _ => RemoteError::Remote(message),
    }
}

/// Azure reports a stale `oldObjectId` as TF401028 on some API versions
/// rather than HTTP 409.
fn is_stale_tip(message: &str) -> bool {
    message.contains("TF401028") || message.contains("has already been updated")
}
