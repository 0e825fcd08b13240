//! Pipeline document synthesis.
//!
//! [`synthesize`] renders a [`SigningPolicy`] into Azure Pipelines YAML.
//! The output is assembled from fixed templates keyed by (file type, tool):
//! a setup section, a certificate download step, then one section per file
//! type in canonical order. Pure and deterministic; the same policy always
//! produces byte-identical text.

use crate::error::Result;
use crate::policy::{FileType, SignTarget, SigningPolicy, SigningTool, ToolProfile};

/// Environment block attached to every command-line step. The values come
/// from the variable group and the downloaded secure file.
const STEP_ENV: &str = r#"  env:
    SM_HOST: "$(HOST)"
    SM_API_KEY: "$(API_KEY)"
    SM_CLIENT_CERT_PASSWORD: "$(CLIENT_CERT_PASSWORD)"
    SM_CLIENT_CERT_FILE: "$(SM_CLIENT_CERT_FILE.secureFilePath)"
    SM_LOG_OUTPUT: "console"
    SM_LOG_LEVEL: "debug""#;

/// Render a signing policy into pipeline YAML.
///
/// Section order: setup, certificate download, then one section per file
/// type in [`FileType::ALL`] order. A sign-all override emits a wildcard
/// step and suppresses individual targets of that type; otherwise each
/// target gets a single-file step in the order it was supplied.
pub fn synthesize(policy: &SigningPolicy, profile: &ToolProfile) -> Result<String> {
    policy.validate()?;

    let alias = policy.keypair_alias();
    let mut sections = vec![setup_section(profile), cert_download_step(alias)];

    for file_type in FileType::ALL {
        if policy.signs_all(file_type) {
            sections.push(wildcard_step(file_type, profile.tool, alias));
            continue;
        }
        for target in policy.targets_of(file_type) {
            sections.push(single_file_step(target, profile.tool, alias));
        }
    }

    Ok(sections.join("\n\n") + "\n")
}

/// Fixed pipeline preamble: trigger, agent pool, build variables, variable
/// group reference, SSM tool bootstrap and the secure-file download.
fn setup_section(profile: &ToolProfile) -> String {
    format!(
        r#"trigger:
  branches:
    include:
      - master
  paths:
    include:
      - Build

pool:
  vmImage: 'windows-2022'

variables:
  - name: solution
    value: '**/*.csproj'
  - name: buildPlatform
    value: 'AnyCPU'
  - name: buildConfiguration
    value: 'Release'
  - group: {group}

steps:
# Setup Tasks
- task: SSMClientToolsSetup@1

- task: SSMSigningToolsSetup@1

# Download client certificate
- task: DownloadSecureFile@1
  name: SM_CLIENT_CERT_FILE
  inputs:
      secureFile: '{secure_file}'  # Name of your certificate in Secure Files"#,
        group = profile.variable_group,
        secure_file = profile.secure_file,
    )
}

fn cert_download_step(alias: &str) -> String {
    format!(
        r#"# Download certificate
- task: CmdLine@2
  displayName: 'Certificate download'
  inputs:
    script: 'smctl certificate download --keypair-alias={alias} --name=KeyCert.pem --out=$(Agent.TempDirectory)'
{env}"#,
        alias = alias,
        env = STEP_ENV,
    )
}

/// Wildcard step: a `for /r` loop over every file of the type under its
/// default root directory.
fn wildcard_step(file_type: FileType, tool: SigningTool, alias: &str) -> String {
    let command = signing_command(file_type, tool, alias, "\"%%f\"");
    format!(
        r#"# Sign all {label} files
- task: CmdLine@2
  displayName: 'Sign all {label} files'
  inputs:
    script: |
      for /r "{root}" %%f in (*.{ext}) do (
        {command}
      )
{env}"#,
        label = file_type.label(),
        root = default_root(file_type),
        ext = file_type.extension(),
        command = command,
        env = STEP_ENV,
    )
}

/// Single-file step for one individually listed target.
fn single_file_step(target: &SignTarget, tool: SigningTool, alias: &str) -> String {
    let path = normalize_path(&target.path, target.file_type);
    let command = signing_command(target.file_type, tool, alias, &path);
    format!(
        r#"# Sign {label} file
- task: CmdLine@2
  displayName: 'Sign {display}'
  inputs:
    script: '{command}'
{env}"#,
        label = target.file_type.label(),
        display = target.path,
        command = command,
        env = STEP_ENV,
    )
}

/// Signing command for one file (or loop variable).
///
/// Smctl covers every type; the native tools are keyed on the file type
/// regardless of which of them was selected, since none of them can sign
/// another tool's formats.
fn signing_command(file_type: FileType, tool: SigningTool, alias: &str, path: &str) -> String {
    match (tool, file_type) {
        (SigningTool::Smctl, _) => format!(
            "smctl sign --keypair-alias={alias} --config-file $(SSMClientToolsSetup.PKCS11_CONFIG) --input {path}"
        ),
        (_, FileType::Exe) => format!(
            "signtool sign /tr http://timestamp.digicert.com /td SHA256 /fd SHA256 /csp \"DigiCert Signing Manager KSP\" /kc \"{alias}\" /f $(Agent.TempDirectory)\\KeyCert.pem {path}"
        ),
        (_, FileType::Jar | FileType::War) => format!(
            "jarsigner -keystore NONE -storepass NONE -storetype PKCS11 -providerClass sun.security.pkcs11.SunPKCS11 -providerArg $(SSMClientToolsSetup.PKCS11_CONFIG) -digestalg SHA-256 -signedjar {path} {path} {alias} -tsa http://timestamp.digicert.com -tsadigestalg SHA-256"
        ),
        (_, FileType::Apk) => format!(
            "apksigner sign --provider-class sun.security.pkcs11.SunPKCS11 --provider-arg $(SSMClientToolsSetup.PKCS11_CONFIG) --ks NONE --ks-type PKCS11 --ks-key-alias {alias} --in {path} --out {path} --ks-pass pass:NONE --min-sdk-version=18"
        ),
    }
}

/// Root directory searched by wildcard steps and prefixed onto relative
/// target paths. Java archives are produced under the working directory,
/// the rest under the sources directory.
fn default_root(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Jar | FileType::War => "$(System.DefaultWorkingDirectory)",
        FileType::Exe | FileType::Apk => "$(Build.SourcesDirectory)",
    }
}

/// Normalize a target path for a Windows agent: forward slashes become
/// backslashes, embedded whitespace is stripped, and relative paths are
/// rooted at the type's default directory. Paths already rooted at a
/// `$(...)` pipeline variable pass through untouched.
fn normalize_path(path: &str, file_type: FileType) -> String {
    let normalized: String = path
        .replace('/', "\\")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if normalized.starts_with("$(") {
        return normalized;
    }
    format!("{}\\{}", default_root(file_type), normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ToolProfile {
        ToolProfile::new("stm-signing", "client-auth.p12").with_tool(SigningTool::Signtool)
    }

    #[test]
    fn test_synthesize_is_deterministic() {
        let policy = SigningPolicy::new("my-key")
            .unwrap()
            .sign_all(FileType::Exe)
            .target(FileType::Jar, "lib/app.jar");

        let first = synthesize(&policy, &profile()).unwrap();
        let second = synthesize(&policy, &profile()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sign_all_suppresses_individual_target() {
        let policy = SigningPolicy::new("my-key")
            .unwrap()
            .sign_all(FileType::Exe)
            .target(FileType::Exe, "Build/app.exe");

        let yaml = synthesize(&policy, &profile()).unwrap();
        assert!(yaml.contains("Sign all EXE files"));
        assert!(!yaml.contains("app.exe"));
    }

    #[test]
    fn test_targets_render_in_input_order() {
        let policy = SigningPolicy::new("my-key")
            .unwrap()
            .target(FileType::Jar, "lib/first.jar")
            .target(FileType::Jar, "lib/second.jar");

        let yaml = synthesize(&policy, &profile()).unwrap();
        let first = yaml.find("first.jar").unwrap();
        let second = yaml.find("second.jar").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_type_sections_render_in_canonical_order() {
        let policy = SigningPolicy::new("my-key")
            .unwrap()
            .sign_all(FileType::Apk)
            .sign_all(FileType::Exe)
            .sign_all(FileType::Jar)
            .sign_all(FileType::War);

        let yaml = synthesize(&policy, &profile()).unwrap();
        let positions: Vec<_> = ["EXE", "JAR", "WAR", "APK"]
            .iter()
            .map(|label| yaml.find(&format!("Sign all {label} files")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_path_normalized_to_backslashes_without_whitespace() {
        let policy = SigningPolicy::new("my-key")
            .unwrap()
            .target(FileType::Exe, "Build/my app.exe");

        let yaml = synthesize(&policy, &profile()).unwrap();
        assert!(yaml.contains("$(Build.SourcesDirectory)\\Build\\myapp.exe"));
        assert!(!yaml.contains("Build/my app.exe\""));
    }

    #[test]
    fn test_pipeline_variable_path_passes_through() {
        let policy = SigningPolicy::new("my-key")
            .unwrap()
            .target(FileType::Exe, "$(Build.ArtifactStagingDirectory)/app.exe");

        let yaml = synthesize(&policy, &profile()).unwrap();
        assert!(yaml.contains("$(Build.ArtifactStagingDirectory)\\app.exe"));
        assert!(!yaml.contains("$(Build.SourcesDirectory)\\$("));
    }

    #[test]
    fn test_jar_targets_root_at_working_directory() {
        let policy = SigningPolicy::new("my-key")
            .unwrap()
            .target(FileType::Jar, "lib/app.jar");

        let yaml = synthesize(&policy, &profile()).unwrap();
        assert!(yaml.contains("$(System.DefaultWorkingDirectory)\\lib\\app.jar"));
    }

    #[test]
    fn test_empty_target_path_fails_synthesis() {
        let policy = SigningPolicy::new("my-key").unwrap().target(FileType::Exe, "");
        let err = synthesize(&policy, &profile()).unwrap_err();
        assert_eq!(
            err,
            crate::error::PolicyError::EmptyTargetPath {
                file_type: FileType::Exe
            }
        );
    }

    #[test]
    fn test_smctl_signs_every_type() {
        let policy = SigningPolicy::new("my-key")
            .unwrap()
            .target(FileType::Exe, "Build/app.exe")
            .target(FileType::Apk, "out/app.apk");

        let tool_profile = ToolProfile::new("stm-signing", "client-auth.p12");
        let yaml = synthesize(&policy, &tool_profile).unwrap();
        assert_eq!(yaml.matches("smctl sign --keypair-alias=my-key").count(), 2);
        assert!(!yaml.contains("signtool sign"));
        assert!(!yaml.contains("apksigner sign"));
    }

    #[test]
    fn test_alias_interpolated_verbatim() {
        let policy = SigningPolicy::new("key_alias-01").unwrap().sign_all(FileType::Jar);
        let yaml = synthesize(&policy, &profile()).unwrap();
        assert!(yaml.contains("--keypair-alias=key_alias-01"));
        assert!(yaml.contains("-signedjar \"%%f\" \"%%f\" key_alias-01"));
    }

    // End-to-end shape check: wildcard EXE + single JAR, no single EXE step.
    #[test]
    fn test_mixed_policy_document_shape() {
        let policy = SigningPolicy::new("my-key")
            .unwrap()
            .sign_all(FileType::Exe)
            .target(FileType::Jar, "lib/app.jar");

        let yaml = synthesize(&policy, &profile()).unwrap();
        assert!(yaml.contains("Sign all EXE files"));
        assert!(yaml.contains("# Sign JAR file"));
        assert!(yaml.contains("lib\\app.jar"));
        assert!(!yaml.contains("# Sign EXE file"));
        assert!(yaml.starts_with("trigger:"));
        assert!(yaml.contains("- group: stm-signing"));
        assert!(yaml.contains("secureFile: 'client-auth.p12'"));
    }
}
