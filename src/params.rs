//! Host-facing parameter and result shapes.
//!
//! These mirror the wire format the fleet manager uses when talking to an
//! external provider: bootstrap parameters arrive as JSON on stdin, and
//! query results are serialised back to stdout. Everything here is plain
//! data; no cloud types leak into this module.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating system requested for a runner.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    /// A Linux image; user data is shipped as a plain boot script.
    Linux,
    /// A Windows image; user data must be wrapped in `<powershell>` tags.
    Windows,
    /// Any OS name this provider does not know how to bootstrap.
    #[default]
    #[serde(other)]
    Unknown,
}

impl OsType {
    /// Canonical lowercase name, as written to instance tags.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Unknown => "unknown",
        }
    }
}

impl From<&str> for OsType {
    fn from(value: &str) -> Self {
        match value {
            "linux" => Self::Linux,
            "windows" => Self::Windows,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architecture requested for a runner, in the host's naming scheme.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OsArch {
    /// 64-bit x86.
    Amd64,
    /// 64-bit ARM.
    Arm64,
    /// 32-bit ARM.
    Arm,
    /// Any architecture name this provider does not recognise.
    #[default]
    #[serde(other)]
    Unknown,
}

impl OsArch {
    /// Canonical lowercase name, as written to instance tags.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::Arm => "arm",
            Self::Unknown => "unknown",
        }
    }
}

impl From<&str> for OsArch {
    fn from(value: &str) -> Self {
        match value {
            "amd64" => Self::Amd64,
            "arm64" => Self::Arm64,
            "arm" => Self::Arm,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for OsArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-visible instance status. The cloud's six lifecycle states collapse
/// into these three buckets; see [`crate::util::instance_status`].
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// The instance is up, or still counts as up for host bookkeeping.
    Running,
    /// The instance is stopped or already terminated.
    Stopped,
    /// Any state the mapping does not recognise, including missing state.
    #[default]
    Unknown,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One downloadable runner-agent build, as published by the forge.
///
/// The host offers a list of these; the provider picks the one matching the
/// requested OS and architecture.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct RunnerApplicationDownload {
    /// Operating system the build targets (forge naming, e.g. `linux`).
    #[serde(default)]
    pub os: Option<String>,
    /// Architecture the build targets (forge naming, e.g. `x64`).
    #[serde(default)]
    pub architecture: Option<String>,
    /// URL the boot script downloads the agent archive from.
    #[serde(default)]
    pub download_url: Option<String>,
    /// Archive file name.
    #[serde(default)]
    pub filename: Option<String>,
    /// Expected SHA-256 of the archive.
    #[serde(default)]
    pub sha256_checksum: Option<String>,
    /// Short-lived token required by some download endpoints.
    #[serde(default)]
    pub temp_download_token: Option<String>,
}

/// Parameters the host supplies for one instance launch. Read-only input.
///
/// Unknown fields are ignored so newer hosts can talk to older providers.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct BootstrapInstance {
    /// Desired instance name; also written to the `Name` tag.
    #[serde(default)]
    pub name: String,
    /// Image identifier to boot, e.g. `ami-12345678`.
    #[serde(default)]
    pub image: String,
    /// Instance type / flavor string, e.g. `t2.micro`.
    #[serde(default)]
    pub flavor: String,
    /// Operating system of the image.
    #[serde(default)]
    pub os_type: OsType,
    /// CPU architecture of the image.
    #[serde(default, rename = "arch")]
    pub os_arch: OsArch,
    /// Identifier of the runner pool this instance belongs to.
    #[serde(default)]
    pub pool_id: String,
    /// Runner-agent builds offered by the host.
    #[serde(default)]
    pub tools: Vec<RunnerApplicationDownload>,
    /// Opaque provider-specific tuning blob; validated by
    /// [`crate::spec::ExtraSpecs::parse`].
    #[serde(default)]
    pub extra_specs: serde_json::Value,
    /// URL of the repository or organisation the runner registers against.
    #[serde(default)]
    pub repo_url: String,
    /// Instance metadata endpoint the boot script fetches registration
    /// details from.
    #[serde(default, rename = "metadata-url")]
    pub metadata_url: String,
    /// Endpoint the boot script reports lifecycle status to.
    #[serde(default, rename = "callback-url")]
    pub callback_url: String,
    /// Bearer token authorising metadata and callback requests.
    #[serde(default, rename = "instance-token")]
    pub instance_token: String,
    /// Labels the runner registers with.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Runner group to register into, when the forge supports groups.
    #[serde(default, rename = "github-runner-group")]
    pub github_runner_group: String,
    /// Optional CA bundle (base64) the boot script installs before phoning
    /// home. Kept opaque; decoding is the composer's concern.
    #[serde(default, rename = "ca-cert-bundle")]
    pub ca_cert_bundle: Option<String>,
}

/// Result shape returned to the host for create/get/list operations.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct ProviderInstance {
    /// Cloud-assigned instance identifier; empty means "absent".
    #[serde(default)]
    pub provider_id: String,
    /// Instance name as recorded in the `Name` tag.
    #[serde(default)]
    pub name: String,
    /// OS type as recorded in the `OSType` tag.
    #[serde(default)]
    pub os_type: OsType,
    /// Architecture as recorded in the `OSArch` tag.
    #[serde(default)]
    pub os_arch: OsArch,
    /// Collapsed lifecycle status.
    #[serde(default)]
    pub status: InstanceStatus,
}
