//! Pipesign - signing steps for Azure DevOps pipelines
//!
//! The `pipesign` command renders a declarative signing policy into
//! pipeline YAML and publishes it into a repository branch.
//!
//! ## Commands
//!
//! - `render`: synthesize the pipeline document for a policy file
//! - `publish`: synthesize and push into a repository branch
//! - `provision`: create the variable group and upload the certificate
//! - `keypairs`: list signing keypair aliases visible to an API key

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, Level};

use pipesign_core::{synthesize, SigningPolicy, SigningTool, ToolProfile};
use pipesign_devops::stm::DEFAULT_STM_URL;
use pipesign_devops::{
    init_tracing, AzureDevOpsClient, AzureDevOpsConfig, BranchReader, GroupOutcome, Provisioner,
    PublishTarget, Publisher, SigningSecrets, StmClient,
};

#[derive(Parser)]
#[command(name = "pipesign")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate and publish code-signing pipeline steps", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the pipeline document for a policy file
    Render {
        #[command(flatten)]
        render: RenderArgs,

        /// Write the document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render and push the document into a repository branch
    Publish {
        #[command(flatten)]
        render: RenderArgs,

        #[command(flatten)]
        azure: AzureArgs,

        /// Repository id or name
        #[arg(long)]
        repository: String,

        /// Target branch
        #[arg(long, default_value = "master")]
        branch: String,

        /// Repo-relative path of the pipeline file
        #[arg(long, default_value = "azure-pipelines.yml")]
        path: String,

        /// Commit message
        #[arg(long, default_value = "Updated pipeline with signing steps")]
        message: String,

        /// Print the current document and exit without pushing
        #[arg(long)]
        dry_run: bool,
    },

    /// Create the variable group and upload the client certificate
    Provision {
        #[command(flatten)]
        azure: AzureArgs,

        /// Variable group name
        #[arg(long)]
        group: String,

        /// Signing Manager API key
        #[arg(long, env = "SM_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Client certificate password
        #[arg(long, env = "SM_CLIENT_CERT_PASSWORD", hide_env_values = true)]
        cert_password: String,

        /// Signing Manager host for the generated steps
        #[arg(long, env = "SM_HOST", default_value = "https://clientauth.one.digicert.com")]
        host: String,

        /// Client certificate file to upload into Secure Files
        #[arg(long)]
        cert: PathBuf,

        /// Secure file name (default: certificate file name)
        #[arg(long)]
        secure_file_name: Option<String>,
    },

    /// List signing keypair aliases visible to an API key
    Keypairs {
        /// Signing Manager API key
        #[arg(long, env = "SM_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Signing Manager base URL
        #[arg(long, default_value = DEFAULT_STM_URL)]
        stm_url: String,
    },
}

/// Policy and template inputs shared by render and publish.
#[derive(Args)]
struct RenderArgs {
    /// Signing policy file (JSON)
    #[arg(short, long)]
    policy: PathBuf,

    /// Variable group referenced by the generated pipeline
    #[arg(long, default_value = "stm-signing")]
    variable_group: String,

    /// Name of the client certificate in Secure Files
    #[arg(long, default_value = "client-auth.p12")]
    secure_file: String,

    /// Signing tool
    #[arg(long, value_enum, default_value = "smctl")]
    tool: ToolArg,
}

#[derive(Args)]
struct AzureArgs {
    /// Azure DevOps organization
    #[arg(long, env = "AZDO_ORGANIZATION")]
    organization: String,

    /// Azure DevOps project
    #[arg(long, env = "AZDO_PROJECT")]
    project: String,

    /// Personal access token
    #[arg(long, env = "AZDO_PAT", hide_env_values = true)]
    pat: String,
}

impl AzureArgs {
    fn client(&self) -> Result<AzureDevOpsClient> {
        AzureDevOpsClient::new(AzureDevOpsConfig {
            organization: self.organization.clone(),
            project: self.project.clone(),
            pat: self.pat.clone(),
        })
        .context("Failed to construct Azure DevOps client")
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ToolArg {
    Smctl,
    Signtool,
    Jarsigner,
    Apksigner,
}

impl From<ToolArg> for SigningTool {
    fn from(tool: ToolArg) -> Self {
        match tool {
            ToolArg::Smctl => SigningTool::Smctl,
            ToolArg::Signtool => SigningTool::Signtool,
            ToolArg::Jarsigner => SigningTool::Jarsigner,
            ToolArg::Apksigner => SigningTool::Apksigner,
        }
    }
}

impl RenderArgs {
    fn render(&self) -> Result<String> {
        let raw = std::fs::read_to_string(&self.policy)
            .with_context(|| format!("Failed to read policy file {}", self.policy.display()))?;
        let policy: SigningPolicy =
            serde_json::from_str(&raw).context("Failed to parse policy file")?;
        let profile = ToolProfile::new(&self.variable_group, &self.secure_file)
            .with_tool(self.tool.into());
        synthesize(&policy, &profile).context("Policy failed validation")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Render { render, output } => cmd_render(&render, output.as_deref()),
        Commands::Publish {
            render,
            azure,
            repository,
            branch,
            path,
            message,
            dry_run,
        } => cmd_publish(&render, &azure, &repository, &branch, &path, &message, dry_run).await,
        Commands::Provision {
            azure,
            group,
            api_key,
            cert_password,
            host,
            cert,
            secure_file_name,
        } => {
            cmd_provision(
                &azure,
                &group,
                SigningSecrets {
                    api_key,
                    cert_password,
                    host,
                },
                &cert,
                secure_file_name,
            )
            .await
        }
        Commands::Keypairs { api_key, stm_url } => cmd_keypairs(&api_key, &stm_url).await,
    }
}

fn cmd_render(render: &RenderArgs, output: Option<&std::path::Path>) -> Result<()> {
    let document = render.render()?;
    match output {
        Some(path) => {
            std::fs::write(path, &document)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "wrote pipeline document");
        }
        None => print!("{document}"),
    }
    Ok(())
}

async fn cmd_publish(
    render: &RenderArgs,
    azure: &AzureArgs,
    repository: &str,
    branch: &str,
    path: &str,
    message: &str,
    dry_run: bool,
) -> Result<()> {
    let document = render.render()?;
    let client: Arc<AzureDevOpsClient> = Arc::new(azure.client()?);
    let target = PublishTarget::new(repository, branch, path);

    let reader = BranchReader::new(client.clone());
    match reader.read_document(&target).await? {
        Some(existing) => info!(
            path = target.path(),
            bytes = existing.len(),
            "replacing existing pipeline document"
        ),
        None => info!(path = target.path(), "creating new pipeline document"),
    }

    if dry_run {
        print!("{document}");
        return Ok(());
    }

    let receipt = Publisher::new(client)
        .publish(&target, &document, message)
        .await
        .context("Failed to publish pipeline document")?;

    println!(
        "Published {} to {} at {} ({} attempt{})",
        target.path(),
        target.branch(),
        receipt.tip.commit_id,
        receipt.attempts,
        if receipt.attempts == 1 { "" } else { "s" },
    );
    Ok(())
}

async fn cmd_provision(
    azure: &AzureArgs,
    group: &str,
    secrets: SigningSecrets,
    cert: &std::path::Path,
    secure_file_name: Option<String>,
) -> Result<()> {
    let client = azure.client()?;

    match client.ensure_variable_group(group, &secrets).await? {
        GroupOutcome::Created => println!("Created variable group '{group}'"),
        GroupOutcome::AlreadyExists => println!("Variable group '{group}' already exists"),
    }

    let bytes = std::fs::read(cert)
        .with_context(|| format!("Failed to read certificate {}", cert.display()))?;
    let name = match secure_file_name {
        Some(name) => name,
        None => cert
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("Certificate path has no file name")?,
    };
    client.upload_secure_file(&name, &bytes).await?;
    println!("Uploaded secure file '{name}'");
    Ok(())
}

async fn cmd_keypairs(api_key: &str, stm_url: &str) -> Result<()> {
    let client = StmClient::new(stm_url, api_key)?;
    let keypairs = client.keypairs().await?;

    if keypairs.is_empty() {
        println!("No keypairs visible to this API key");
        return Ok(());
    }
    for keypair in keypairs {
        println!(
            "{}\t{} {} {}",
            keypair.alias, keypair.key_type, keypair.key_alg, keypair.key_size
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_args(policy: PathBuf) -> RenderArgs {
        RenderArgs {
            policy,
            variable_group: "stm-signing".to_string(),
            secure_file: "client-auth.p12".to_string(),
            tool: ToolArg::Smctl,
        }
    }

    #[test]
    fn test_render_reads_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let policy_path = dir.path().join("policy.json");
        std::fs::write(
            &policy_path,
            r#"{"keypair_alias": "my-key", "sign_all": ["exe"],
                "targets": [{"file_type": "jar", "path": "lib/app.jar"}]}"#,
        )
        .unwrap();

        let document = render_args(policy_path).render().unwrap();
        assert!(document.contains("Sign all EXE files"));
        assert!(document.contains("lib\\app.jar"));
        assert!(document.contains("- group: stm-signing"));
    }

    #[test]
    fn test_render_rejects_invalid_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let policy_path = dir.path().join("policy.json");
        std::fs::write(&policy_path, r#"{"keypair_alias": ""}"#).unwrap();

        let err = render_args(policy_path).render().unwrap_err();
        assert!(err.to_string().contains("validation"));
    }

    #[test]
    fn test_cmd_render_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let policy_path = dir.path().join("policy.json");
        std::fs::write(&policy_path, r#"{"keypair_alias": "my-key"}"#).unwrap();
        let output_path = dir.path().join("azure-pipelines.yml");

        cmd_render(&render_args(policy_path), Some(&output_path)).unwrap();

        let written = std::fs::read_to_string(&output_path).unwrap();
        assert!(written.starts_with("trigger:"));
        assert!(written.contains("smctl certificate download --keypair-alias=my-key"));
    }
}
