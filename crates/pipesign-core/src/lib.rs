//! Pipesign Core - Signing policy and pipeline document synthesis
//!
//! Provides the declarative signing policy model and a deterministic
//! synthesizer that renders a policy into Azure Pipelines YAML:
//! - A fixed setup section (tool bootstrap, secure file, certificate download)
//! - One wildcard step per file type under a "sign all" override
//! - One single-file step per individually listed target
//!
//! Synthesis is pure: no I/O, same policy in, byte-identical text out.

pub mod error;
pub mod policy;
pub mod synth;

// Re-export key types
pub use error::{PolicyError, Result};
pub use policy::{FileType, SignTarget, SigningPolicy, SigningTool, ToolProfile};
pub use synth::synthesize;
