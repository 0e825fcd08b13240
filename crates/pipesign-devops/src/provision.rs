//! Provisioning façade: variable group and secure file.
//!
//! The publisher assumes both already exist before a generated pipeline can
//! run. Nothing here retries or reconciles; provisioning errors surface
//! directly to the operator.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::azure::{remote_failure, AzureDevOpsClient};
use crate::error::{RemoteError, RemoteResult};

/// Secrets stored in the variable group and consumed by the generated
/// steps through `$(API_KEY)`, `$(CLIENT_CERT_PASSWORD)` and `$(HOST)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningSecrets {
    pub api_key: String,
    pub cert_password: String,
    pub host: String,
}

/// Outcome of `ensure_variable_group`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    Created,
    AlreadyExists,
}

/// Project-level provisioning operations the publisher depends on.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create the variable group, or report that one with this name is
    /// already there.
    async fn ensure_variable_group(
        &self,
        name: &str,
        secrets: &SigningSecrets,
    ) -> RemoteResult<GroupOutcome>;

    /// Upload the client certificate into Secure Files under `name`.
    async fn upload_secure_file(&self, name: &str, bytes: &[u8]) -> RemoteResult<()>;
}

#[derive(Deserialize)]
struct ProjectDescriptor {
    id: String,
}

impl AzureDevOpsClient {
    /// Project id, needed for the variable group's project reference.
    async fn project_id(&self) -> RemoteResult<String> {
        let response = self
            .http()
            .get(format!(
                "{}/_apis/projects/{}",
                self.org_url(),
                self.project_name()
            ))
            .query(&[("api-version", "6.0")])
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(remote_failure(response).await);
        }
        let project: ProjectDescriptor = response.json().await?;
        Ok(project.id)
    }
}

#[async_trait]
impl Provisioner for AzureDevOpsClient {
    async fn ensure_variable_group(
        &self,
        name: &str,
        secrets: &SigningSecrets,
    ) -> RemoteResult<GroupOutcome> {
        let project_id = self.project_id().await?;
        let payload = json!({
            "name": name,
            "description": "Variable group for signing pipeline configuration",
            "type": "Vsts",
            "variables": {
                "API_KEY": { "value": secrets.api_key, "isSecret": true },
                "CLIENT_CERT_PASSWORD": { "value": secrets.cert_password, "isSecret": true },
                "HOST": { "value": secrets.host, "isSecret": false },
            },
            "variableGroupProjectReferences": [{
                "name": name,
                "projectReference": { "id": project_id, "name": self.project_name() },
            }],
        });

        let response = self
            .http()
            .post(format!(
                "{}/_apis/distributedtask/variablegroups",
                self.project_url()
            ))
            .query(&[("api-version", "6.0-preview.2")])
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                info!(group = name, "created variable group");
                Ok(GroupOutcome::Created)
            }
            StatusCode::CONFLICT => Ok(GroupOutcome::AlreadyExists),
            StatusCode::NOT_FOUND => Err(RemoteError::Remote(
                "project not found or insufficient permissions for variable groups".to_string(),
            )),
            _ => Err(remote_failure(response).await),
        }
    }

    async fn upload_secure_file(&self, name: &str, bytes: &[u8]) -> RemoteResult<()> {
        let response = self
            .http()
            .post(format!(
                "{}/_apis/distributedtask/securefiles",
                self.project_url()
            ))
            .query(&[("api-version", "7.1-preview.1"), ("name", name)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(ACCEPT, "application/json")
            .body(bytes.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(remote_failure(response).await);
        }
        info!(file = name, size = bytes.len(), "uploaded secure file");
        Ok(())
    }
}
