//! The host's external-provider ABI: one verb per process invocation.
//!
//! The host execs this binary with the verb and identifiers in environment
//! variables and, for creates, the bootstrap parameters as JSON on stdin.
//! Results are serialised to stdout; diagnostics go to stderr with a
//! non-zero exit.

use std::io::Read;
use std::str::FromStr;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::client::Ec2Api;
use crate::params::BootstrapInstance;
use crate::provider::{AwsProvider, ProviderError, VERSION};

/// Environment variable carrying the command verb.
pub const COMMAND_ENV: &str = "GARM_COMMAND";
/// Environment variable carrying the provider config file path.
pub const CONFIG_FILE_ENV: &str = "GARM_PROVIDER_CONFIG_FILE";
/// Environment variable carrying the controller identity.
pub const CONTROLLER_ID_ENV: &str = "GARM_CONTROLLER_ID";
/// Environment variable carrying the pool identity.
pub const POOL_ID_ENV: &str = "GARM_POOL_ID";
/// Environment variable carrying the target instance ID or name.
pub const INSTANCE_ID_ENV: &str = "GARM_INSTANCE_ID";

/// Errors raised while decoding the environment or running a verb.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ExecutionError {
    /// Raised when a required environment variable is absent or empty.
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
    /// Raised for verbs this provider does not implement.
    #[error("unknown command {0}")]
    UnknownCommand(String),
    /// Raised when bootstrap parameters cannot be read from stdin.
    #[error("failed to read bootstrap params: {0}")]
    BootstrapRead(String),
    /// Raised when the bootstrap JSON does not decode.
    #[error("failed to decode bootstrap params: {0}")]
    BootstrapDecode(String),
    /// Raised when a provider operation fails.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Raised when a result cannot be serialised.
    #[error("failed to encode result: {0}")]
    Encode(String),
}

/// The lifecycle verbs of the external-provider contract.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProviderCommand {
    /// Launch one instance from stdin-supplied bootstrap parameters.
    CreateInstance,
    /// Delete an instance by ID or name; absence is success.
    DeleteInstance,
    /// Fetch one instance by ID or name.
    GetInstance,
    /// List a pool's instances.
    ListInstances,
    /// Start a stopped instance.
    StartInstance,
    /// Stop a running instance.
    StopInstance,
    /// Bulk teardown; deliberately a no-op for this provider.
    RemoveAllInstances,
    /// Report the provider build version without touching the cloud.
    GetVersion,
}

impl FromStr for ProviderCommand {
    type Err = ExecutionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CreateInstance" => Ok(Self::CreateInstance),
            "DeleteInstance" => Ok(Self::DeleteInstance),
            "GetInstance" => Ok(Self::GetInstance),
            "ListInstances" => Ok(Self::ListInstances),
            "StartInstance" => Ok(Self::StartInstance),
            "StopInstance" => Ok(Self::StopInstance),
            "RemoveAllInstances" => Ok(Self::RemoveAllInstances),
            "GetVersion" => Ok(Self::GetVersion),
            other => Err(ExecutionError::UnknownCommand(other.to_owned())),
        }
    }
}

/// Everything the host passed for this invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionEnvironment {
    /// The verb to execute.
    pub command: ProviderCommand,
    /// Path of the provider config file.
    pub config_file: Utf8PathBuf,
    /// Controller identity for tag-based lookups.
    pub controller_id: String,
    /// Pool identity; only meaningful for create/list.
    pub pool_id: String,
    /// Target instance ID or name; only meaningful for instance verbs.
    pub instance_id: String,
    /// Bootstrap parameters, present for creates only.
    pub bootstrap_params: Option<BootstrapInstance>,
}

impl ExecutionEnvironment {
    /// Decodes the process environment and, for creates, stdin.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when required variables are missing or the
    /// bootstrap payload is unreadable.
    pub fn from_env() -> Result<Self, ExecutionError> {
        Self::from_sources(|name| std::env::var(name).ok(), std::io::stdin().lock())
    }

    /// Decodes from explicit sources; the seam [`Self::from_env`] uses and
    /// tests exercise directly.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] as for [`Self::from_env`].
    pub fn from_sources(
        env: impl Fn(&str) -> Option<String>,
        mut stdin: impl Read,
    ) -> Result<Self, ExecutionError> {
        let command: ProviderCommand = require(&env, COMMAND_ENV)?.parse()?;

        // The version verb answers before any config or cloud work, so it
        // needs none of the other variables.
        if command == ProviderCommand::GetVersion {
            return Ok(Self {
                command,
                config_file: Utf8PathBuf::new(),
                controller_id: String::new(),
                pool_id: String::new(),
                instance_id: String::new(),
                bootstrap_params: None,
            });
        }

        let config_file = Utf8PathBuf::from(require(&env, CONFIG_FILE_ENV)?);
        let controller_id = require(&env, CONTROLLER_ID_ENV)?;

        let pool_id = match command {
            ProviderCommand::CreateInstance | ProviderCommand::ListInstances => {
                require(&env, POOL_ID_ENV)?
            }
            _ => env(POOL_ID_ENV).unwrap_or_default(),
        };

        let instance_id = match command {
            ProviderCommand::DeleteInstance
            | ProviderCommand::GetInstance
            | ProviderCommand::StartInstance
            | ProviderCommand::StopInstance => require(&env, INSTANCE_ID_ENV)?,
            _ => env(INSTANCE_ID_ENV).unwrap_or_default(),
        };

        let bootstrap_params = if command == ProviderCommand::CreateInstance {
            let mut raw = String::new();
            stdin
                .read_to_string(&mut raw)
                .map_err(|err| ExecutionError::BootstrapRead(err.to_string()))?;
            if raw.trim().is_empty() {
                return Err(ExecutionError::BootstrapRead(String::from(
                    "no bootstrap params on stdin",
                )));
            }
            let params: BootstrapInstance = serde_json::from_str(&raw)
                .map_err(|err| ExecutionError::BootstrapDecode(err.to_string()))?;
            Some(params)
        } else {
            None
        };

        Ok(Self {
            command,
            config_file,
            controller_id,
            pool_id,
            instance_id,
            bootstrap_params,
        })
    }
}

fn require(
    env: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ExecutionError> {
    match env(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ExecutionError::MissingEnv(name)),
    }
}

/// Runs the decoded verb against a provider and returns the stdout payload.
///
/// Verbs without a result shape return the empty string, which the caller
/// does not print.
///
/// # Errors
///
/// Returns [`ExecutionError`] when the operation or result encoding fails.
pub async fn dispatch<C: Ec2Api>(
    provider: &AwsProvider<C>,
    environment: ExecutionEnvironment,
) -> Result<String, ExecutionError> {
    match environment.command {
        ProviderCommand::CreateInstance => {
            let bootstrap_params = environment
                .bootstrap_params
                .ok_or_else(|| ExecutionError::BootstrapRead(String::from("missing params")))?;
            let instance = provider.create_instance(bootstrap_params).await?;
            encode(&instance)
        }
        ProviderCommand::DeleteInstance => {
            provider.delete_instance(&environment.instance_id).await?;
            Ok(String::new())
        }
        ProviderCommand::GetInstance => {
            let instance = provider.get_instance(&environment.instance_id).await?;
            encode(&instance)
        }
        ProviderCommand::ListInstances => {
            let instances = provider.list_instances(&environment.pool_id).await?;
            encode(&instances)
        }
        ProviderCommand::StartInstance => {
            provider.start_instance(&environment.instance_id).await?;
            Ok(String::new())
        }
        ProviderCommand::StopInstance => {
            provider.stop_instance(&environment.instance_id).await?;
            Ok(String::new())
        }
        ProviderCommand::RemoveAllInstances => {
            provider.remove_all_instances()?;
            Ok(String::new())
        }
        ProviderCommand::GetVersion => Ok(String::from(VERSION)),
    }
}

fn encode(value: &impl serde::Serialize) -> Result<String, ExecutionError> {
    serde_json::to_string(value).map_err(|err| ExecutionError::Encode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;

    fn env_map(pairs: &[(&'static str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn missing_command_is_reported_by_name() {
        let err = ExecutionEnvironment::from_sources(env_map(&[]), io::empty())
            .expect_err("missing command should fail");
        assert_eq!(err, ExecutionError::MissingEnv(COMMAND_ENV));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = ExecutionEnvironment::from_sources(
            env_map(&[(COMMAND_ENV, "DestroyEverything")]),
            io::empty(),
        )
        .expect_err("unknown command should fail");
        assert_eq!(
            err,
            ExecutionError::UnknownCommand(String::from("DestroyEverything"))
        );
    }

    #[test]
    fn get_version_needs_no_other_variables() {
        let environment = ExecutionEnvironment::from_sources(
            env_map(&[(COMMAND_ENV, "GetVersion")]),
            io::empty(),
        )
        .unwrap_or_else(|err| panic!("version env: {err}"));
        assert_eq!(environment.command, ProviderCommand::GetVersion);
    }

    #[test]
    fn instance_verbs_require_the_instance_id() {
        let err = ExecutionEnvironment::from_sources(
            env_map(&[
                (COMMAND_ENV, "DeleteInstance"),
                (CONFIG_FILE_ENV, "/etc/garm/aws.toml"),
                (CONTROLLER_ID_ENV, "controller-1"),
            ]),
            io::empty(),
        )
        .expect_err("missing instance ID should fail");
        assert_eq!(err, ExecutionError::MissingEnv(INSTANCE_ID_ENV));
    }

    #[test]
    fn create_reads_bootstrap_params_from_stdin() {
        let stdin = io::Cursor::new(
            r#"{"name": "garm-instance", "image": "ami-12345678", "flavor": "t2.micro"}"#,
        );
        let environment = ExecutionEnvironment::from_sources(
            env_map(&[
                (COMMAND_ENV, "CreateInstance"),
                (CONFIG_FILE_ENV, "/etc/garm/aws.toml"),
                (CONTROLLER_ID_ENV, "controller-1"),
                (POOL_ID_ENV, "pool-1"),
            ]),
            stdin,
        )
        .unwrap_or_else(|err| panic!("create env: {err}"));

        let params = environment
            .bootstrap_params
            .unwrap_or_else(|| panic!("bootstrap params expected"));
        assert_eq!(params.name, "garm-instance");
        assert_eq!(params.flavor, "t2.micro");
    }

    #[test]
    fn create_with_empty_stdin_is_an_error() {
        let err = ExecutionEnvironment::from_sources(
            env_map(&[
                (COMMAND_ENV, "CreateInstance"),
                (CONFIG_FILE_ENV, "/etc/garm/aws.toml"),
                (CONTROLLER_ID_ENV, "controller-1"),
                (POOL_ID_ENV, "pool-1"),
            ]),
            io::empty(),
        )
        .expect_err("empty stdin should fail");
        assert!(matches!(err, ExecutionError::BootstrapRead(_)));
    }

    #[test]
    fn malformed_bootstrap_json_is_a_decode_error() {
        let err = ExecutionEnvironment::from_sources(
            env_map(&[
                (COMMAND_ENV, "CreateInstance"),
                (CONFIG_FILE_ENV, "/etc/garm/aws.toml"),
                (CONTROLLER_ID_ENV, "controller-1"),
                (POOL_ID_ENV, "pool-1"),
            ]),
            io::Cursor::new("{broken"),
        )
        .expect_err("broken JSON should fail");
        assert!(matches!(err, ExecutionError::BootstrapDecode(_)));
    }
}
