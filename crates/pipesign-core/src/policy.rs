//! Declarative signing policy model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{PolicyError, Result};

/// File types the synthesizer knows how to sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Exe,
    Jar,
    War,
    Apk,
}

impl FileType {
    /// Canonical rendering order. Stable so generated documents diff cleanly.
    pub const ALL: [FileType; 4] = [FileType::Exe, FileType::Jar, FileType::War, FileType::Apk];

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Exe => "exe",
            FileType::Jar => "jar",
            FileType::War => "war",
            FileType::Apk => "apk",
        }
    }

    /// Upper-case label used in step names and comments.
    pub fn label(&self) -> &'static str {
        match self {
            FileType::Exe => "EXE",
            FileType::Jar => "JAR",
            FileType::War => "WAR",
            FileType::Apk => "APK",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Signing tool selected by the operator.
///
/// `Smctl` signs every file type through the Signing Manager CLI. The other
/// three are native tools; each only applies to its own file types, so when
/// one of them is selected the synthesizer still keys the command on the
/// file type (signtool for exe, jarsigner for jar/war, apksigner for apk).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningTool {
    Smctl,
    Signtool,
    Jarsigner,
    Apksigner,
}

/// A single file to sign, identified by type and repo-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignTarget {
    pub file_type: FileType,
    pub path: String,
}

/// What to sign and with which keypair.
///
/// Invariant: a file type present in the sign-all set dominates individual
/// targets of that type; those targets are skipped at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPolicy {
    keypair_alias: String,

    #[serde(default)]
    sign_all: BTreeSet<FileType>,

    #[serde(default)]
    targets: Vec<SignTarget>,
}

impl SigningPolicy {
    /// Create a policy for the given keypair alias.
    ///
    /// The alias is interpolated verbatim into every signing command, so it
    /// is rejected here if it is empty or contains whitespace or control
    /// characters.
    pub fn new(keypair_alias: impl Into<String>) -> Result<Self> {
        let policy = Self {
            keypair_alias: keypair_alias.into(),
            sign_all: BTreeSet::new(),
            targets: Vec::new(),
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Enable the sign-all override for a file type.
    pub fn sign_all(mut self, file_type: FileType) -> Self {
        self.sign_all.insert(file_type);
        self
    }

    /// Append an individual target. Order is preserved in the output.
    pub fn target(mut self, file_type: FileType, path: impl Into<String>) -> Self {
        self.targets.push(SignTarget {
            file_type,
            path: path.into(),
        });
        self
    }

    pub fn keypair_alias(&self) -> &str {
        &self.keypair_alias
    }

    /// Whether the sign-all override is set for a file type.
    pub fn signs_all(&self, file_type: FileType) -> bool {
        self.sign_all.contains(&file_type)
    }

    pub fn targets(&self) -> &[SignTarget] {
        &self.targets
    }

    /// Individual targets of a type, in input order.
    ///
    /// Empty when the type is covered by a sign-all override.
    pub fn targets_of(&self, file_type: FileType) -> impl Iterator<Item = &SignTarget> + '_ {
        let covered = self.signs_all(file_type);
        self.targets
            .iter()
            .filter(move |t| !covered && t.file_type == file_type)
    }

    /// Re-check construction invariants.
    ///
    /// Needed for policies that arrive through deserialization and therefore
    /// bypass [`SigningPolicy::new`].
    pub fn validate(&self) -> Result<()> {
        if self.keypair_alias.is_empty() {
            return Err(PolicyError::EmptyKeypairAlias);
        }
        if self
            .keypair_alias
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(PolicyError::InvalidKeypairAlias(self.keypair_alias.clone()));
        }
        for target in &self.targets {
            if target.path.trim().is_empty() {
                return Err(PolicyError::EmptyTargetPath {
                    file_type: target.file_type,
                });
            }
        }
        Ok(())
    }
}

/// Template context the synthesizer needs besides the policy itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolProfile {
    /// Variable group referenced by the generated pipeline.
    pub variable_group: String,

    /// Name of the client certificate in Secure Files.
    pub secure_file: String,

    /// Selected signing tool.
    pub tool: SigningTool,
}

impl ToolProfile {
    pub fn new(variable_group: impl Into<String>, secure_file: impl Into<String>) -> Self {
        Self {
            variable_group: variable_group.into(),
            secure_file: secure_file.into(),
            tool: SigningTool::Smctl,
        }
    }

    pub fn with_tool(mut self, tool: SigningTool) -> Self {
        self.tool = tool;
        self
    }
}
