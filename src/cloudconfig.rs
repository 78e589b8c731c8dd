//! Boot-script composition for launched runners.
//!
//! The launch request carries a base64 user-data payload that installs and
//! registers the runner agent on first boot. Scripts are rendered from a
//! per-OS template with `{{ placeholder }}` substitution; pools may replace
//! the template wholesale and extend the substitution context through extra
//! specs. Windows payloads are wrapped in `<powershell>` tags before
//! encoding, matching the cloud's convention for Windows instances.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

use crate::params::OsType;
use crate::spec::RunnerSpec;

/// Errors raised while composing user data.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudConfigError {
    /// Raised for OS types this provider cannot bootstrap.
    #[error("unsupported OS type for cloud config: {os}")]
    UnsupportedOsType {
        /// The OS name from the bootstrap parameters.
        os: String,
    },
    /// Raised when a custom install template is not valid UTF-8.
    #[error("runner install template is not valid UTF-8")]
    TemplateNotUtf8,
    /// Raised when a pre-install script is not valid UTF-8.
    #[error("pre-install script `{name}` is not valid UTF-8")]
    PreInstallScriptNotUtf8 {
        /// Script name from the extra specs.
        name: String,
    },
    /// Raised when a template still contains a `{{ … }}` marker after every
    /// context entry has been substituted.
    #[error("unresolved placeholder {placeholder} in install template")]
    UnresolvedPlaceholder {
        /// The first marker left unresolved.
        placeholder: String,
    },
}

const LINUX_INSTALL_TEMPLATE: &str = r#"#!/bin/bash
set -e
{{ boot_debug }}
CALLBACK_URL="{{ callback_url }}"
BEARER_TOKEN="{{ instance_token }}"

function call() {
    curl -s -X POST -d "$1" -H 'Accept: application/json' -H "Authorization: Bearer ${BEARER_TOKEN}" "${CALLBACK_URL}" || true
}

function fail() {
    call '{"status": "failed", "message": "'"$1"'"}'
    exit 1
}

{{ pre_install }}

{{ update_setup }}
{{ package_setup }}

call '{"status": "installing", "message": "downloading runner agent"}'
useradd -m runner || true
mkdir -p /home/runner/actions-runner
curl -fsSL -o "/home/runner/{{ file_name }}" "{{ download_url }}" || fail "failed to download runner agent"
tar -xf "/home/runner/{{ file_name }}" -C /home/runner/actions-runner
chown -R runner:runner /home/runner/actions-runner

call '{"status": "installing", "message": "configuring runner agent"}'
GITHUB_TOKEN=$(curl -fsSL -H "Authorization: Bearer ${BEARER_TOKEN}" "{{ metadata_url }}/runner-registration-token/")
sudo -u runner -- /home/runner/actions-runner/config.sh \
    --unattended --ephemeral \
    --url "{{ repo_url }}" \
    --token "${GITHUB_TOKEN}" \
    --name "{{ runner_name }}" \
    --labels "{{ runner_labels }}" || fail "failed to configure runner agent"

/home/runner/actions-runner/svc.sh install runner || fail "failed to install runner service"
/home/runner/actions-runner/svc.sh start || fail "failed to start runner service"

call '{"status": "idle", "message": "runner registered and idle"}'
"#;

const WINDOWS_INSTALL_TEMPLATE: &str = r#"$ErrorActionPreference = "Stop"
{{ boot_debug }}
$CallbackUrl = "{{ callback_url }}"
$BearerToken = "{{ instance_token }}"

function Invoke-Callback($Body) {
    try {
        Invoke-RestMethod -Method Post -Uri $CallbackUrl -Body $Body -Headers @{"Authorization"="Bearer $BearerToken"}
    } catch {}
}

{{ pre_install }}

{{ package_setup }}

Invoke-Callback '{"status": "installing", "message": "downloading runner agent"}'
mkdir C:\actions-runner
Invoke-WebRequest -Uri "{{ download_url }}" -OutFile "C:\{{ file_name }}"
Expand-Archive -Path "C:\{{ file_name }}" -DestinationPath C:\actions-runner

Invoke-Callback '{"status": "installing", "message": "configuring runner agent"}'
$GithubToken = Invoke-RestMethod -Uri "{{ metadata_url }}/runner-registration-token/" -Headers @{"Authorization"="Bearer $BearerToken"}
C:\actions-runner\config.cmd --unattended --ephemeral --runasservice `
    --url "{{ repo_url }}" --token $GithubToken `
    --name "{{ runner_name }}" --labels "{{ runner_labels }}"

Invoke-Callback '{"status": "idle", "message": "runner registered and idle"}'
"#;

/// Renders and encodes the user-data payload for a launch.
///
/// # Errors
///
/// Returns [`CloudConfigError`] for unsupported OS types and template
/// problems.
pub fn compose_user_data(spec: &RunnerSpec) -> Result<String, CloudConfigError> {
    match spec.bootstrap_params.os_type {
        OsType::Linux => {
            let script = render_install_script(spec, OsType::Linux)?;
            Ok(BASE64.encode(script))
        }
        OsType::Windows => {
            let script = render_install_script(spec, OsType::Windows)?;
            Ok(BASE64.encode(format!("<powershell>{script}</powershell>")))
        }
        OsType::Unknown => Err(CloudConfigError::UnsupportedOsType {
            os: spec.bootstrap_params.os_type.to_string(),
        }),
    }
}

/// Renders the install script without encoding; used by tests and by
/// [`compose_user_data`].
///
/// # Errors
///
/// Returns [`CloudConfigError`] when the template or a pre-install script is
/// not UTF-8, or a placeholder remains unresolved after substitution.
pub fn render_install_script(spec: &RunnerSpec, os: OsType) -> Result<String, CloudConfigError> {
    let template = match &spec.runner_install_template {
        Some(raw) => std::str::from_utf8(raw)
            .map_err(|_| CloudConfigError::TemplateNotUtf8)?
            .to_owned(),
        None => default_template(os).to_owned(),
    };
    let context = build_context(spec, os)?;
    render(&template, &context)
}

const fn default_template(os: OsType) -> &'static str {
    match os {
        OsType::Windows => WINDOWS_INSTALL_TEMPLATE,
        // Unknown never reaches here; compose_user_data rejects it first.
        OsType::Linux | OsType::Unknown => LINUX_INSTALL_TEMPLATE,
    }
}

fn build_context(
    spec: &RunnerSpec,
    os: OsType,
) -> Result<BTreeMap<String, String>, CloudConfigError> {
    let bootstrap = &spec.bootstrap_params;
    let tools = &spec.tools;

    let mut context = BTreeMap::new();
    let mut insert = |key: &str, value: String| {
        context.insert(key.to_owned(), value);
    };
    insert("file_name", tools.filename.clone().unwrap_or_default());
    insert("download_url", tools.download_url.clone().unwrap_or_default());
    insert(
        "download_token",
        tools.temp_download_token.clone().unwrap_or_default(),
    );
    insert("runner_name", bootstrap.name.clone());
    insert("runner_labels", bootstrap.labels.join(","));
    insert("runner_group", bootstrap.github_runner_group.clone());
    insert("repo_url", bootstrap.repo_url.clone());
    insert("metadata_url", bootstrap.metadata_url.clone());
    insert("callback_url", bootstrap.callback_url.clone());
    insert("instance_token", bootstrap.instance_token.clone());
    insert("boot_debug", boot_debug_snippet(spec, os).to_owned());
    insert("update_setup", update_setup_snippet(spec, os).to_owned());
    insert("package_setup", package_setup_snippet(spec, os));
    insert("pre_install", pre_install_snippet(spec)?);

    // Pool-supplied entries win over the built-ins.
    for (key, value) in &spec.extra_context {
        context.insert(key.clone(), value.clone());
    }
    Ok(context)
}

const fn boot_debug_snippet(spec: &RunnerSpec, os: OsType) -> &'static str {
    if !spec.enable_boot_debug {
        return "";
    }
    match os {
        OsType::Windows => "Set-PSDebug -Trace 1",
        OsType::Linux | OsType::Unknown => "set -x",
    }
}

const fn update_setup_snippet(spec: &RunnerSpec, os: OsType) -> &'static str {
    if spec.disable_updates || !matches!(os, OsType::Linux) {
        return "";
    }
    "apt-get update -q -y 2>/dev/null || dnf makecache -q 2>/dev/null || true"
}

fn package_setup_snippet(spec: &RunnerSpec, os: OsType) -> String {
    if spec.extra_packages.is_empty() {
        return String::new();
    }
    let packages = spec.extra_packages.join(" ");
    match os {
        OsType::Windows => format!("choco install -y {packages}"),
        OsType::Linux | OsType::Unknown => format!(
            "apt-get install -q -y {packages} 2>/dev/null || dnf install -q -y {packages} || fail \"failed to install extra packages\""
        ),
    }
}

fn pre_install_snippet(spec: &RunnerSpec) -> Result<String, CloudConfigError> {
    let mut rendered = String::new();
    for (name, body) in &spec.pre_install_scripts {
        let script = std::str::from_utf8(body).map_err(|_| {
            CloudConfigError::PreInstallScriptNotUtf8 { name: name.clone() }
        })?;
        rendered.push_str(script);
        if !script.ends_with('\n') {
            rendered.push('\n');
        }
    }
    Ok(rendered)
}

fn render(
    template: &str,
    context: &BTreeMap<String, String>,
) -> Result<String, CloudConfigError> {
    let mut rendered = template.to_owned();
    for (key, value) in context {
        rendered = rendered.replace(&format!("{{{{ {key} }}}}"), value);
    }
    if let Some(placeholder) = leftover_placeholder(&rendered) {
        return Err(CloudConfigError::UnresolvedPlaceholder { placeholder });
    }
    Ok(rendered)
}

fn leftover_placeholder(rendered: &str) -> Option<String> {
    let start = rendered.find("{{")?;
    let rest = rendered.get(start..)?;
    let end = rest.find("}}").map_or_else(|| rest.len(), |idx| idx + 2);
    rest.get(..end).map(str::to_owned)
}
