//! Pipesign DevOps - remote publishing for synthesized pipeline documents
//!
//! Provides the Azure DevOps side of pipesign:
//! - [`AzureDevOpsClient`]: explicit, passed-by-reference REST client
//! - [`BranchReader`]: branch tip and document reads
//! - [`Publisher`]: optimistic-concurrency push with bounded retry
//! - [`Provisioner`]: variable-group and secure-file provisioning façade
//! - [`StmClient`]: Signing Manager keypair lookup
//!
//! All remote seams are `async_trait` objects so callers can substitute the
//! in-memory fakes from [`fakes`] in tests.

pub mod azure;
pub mod change;
pub mod error;
pub mod fakes;
pub mod provision;
pub mod publisher;
pub mod reader;
pub mod remote;
pub mod stm;
pub mod telemetry;

// Re-export key types
pub use azure::{AzureDevOpsClient, AzureDevOpsConfig};
pub use change::{BranchTip, ChangeSet, PublishTarget};
pub use error::{PublishError, RemoteError, RemoteResult};
pub use provision::{GroupOutcome, Provisioner, SigningSecrets};
pub use publisher::{PublishReceipt, Publisher};
pub use reader::BranchReader;
pub use remote::GitRemote;
pub use stm::{Keypair, StmClient};
pub use telemetry::init_tracing;
