//! Provider facade implementing the host's instance-lifecycle contract.
//!
//! Each process invocation handles exactly one verb, so the facade keeps no
//! state of its own: the cloud's instance records are the state of record,
//! re-queried on every call.

use thiserror::Error;
use tracing::debug;

use crate::client::{AwsCli, ClientError, Ec2Api, INSTANCE_ID_PREFIX};
use crate::params::{BootstrapInstance, InstanceStatus, ProviderInstance};
use crate::spec::{RunnerSpec, SpecError, ToolFetch};
use crate::util;

/// Build identifier reported by the version verb.
pub const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// Errors raised by provider operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when the runner spec cannot be built or validated.
    #[error("failed to get runner spec: {0}")]
    Spec(#[from] SpecError),
    /// Raised when a compute-client operation fails.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Raised when a start is requested while the instance is mid-stop;
    /// starting an instance in that transition is undefined on the cloud
    /// API.
    #[error("instance {instance} cannot be started in {state} state")]
    InvalidStartState {
        /// The identifier the host asked to start.
        instance: String,
        /// The state that blocked the start.
        state: String,
    },
}

/// The provider facade: lifecycle verbs over an [`AwsCli`].
#[derive(Clone, Debug)]
pub struct AwsProvider<C> {
    cli: AwsCli<C>,
    controller_id: String,
    tool_fetch: ToolFetch,
}

impl<C: Ec2Api> AwsProvider<C> {
    /// Builds a provider for one deployment, identified by `controller_id`.
    pub fn new(cli: AwsCli<C>, controller_id: impl Into<String>) -> Self {
        Self {
            cli,
            controller_id: controller_id.into(),
            tool_fetch: util::get_tools,
        }
    }

    /// Substitutes the runner-build selection strategy; used by tests.
    #[must_use]
    pub fn with_tool_fetch(mut self, tool_fetch: ToolFetch) -> Self {
        self.tool_fetch = tool_fetch;
        self
    }

    /// Launches one instance for the given bootstrap parameters.
    ///
    /// The launch is accept-synchronous, so the returned status is fixed to
    /// `running`; the host polls for the real state afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when spec construction or the launch fails.
    pub async fn create_instance(
        &self,
        bootstrap_params: BootstrapInstance,
    ) -> Result<ProviderInstance, ProviderError> {
        let spec = RunnerSpec::from_bootstrap(
            self.cli.config(),
            bootstrap_params,
            &self.controller_id,
            self.tool_fetch,
        )?;
        let instance_id = self.cli.create_running_instance(&spec).await?;

        Ok(ProviderInstance {
            provider_id: instance_id,
            name: spec.bootstrap_params.name.clone(),
            os_type: spec.bootstrap_params.os_type,
            os_arch: spec.bootstrap_params.os_arch,
            status: InstanceStatus::Running,
        })
    }

    /// Deletes an instance by ID or name. Absence, at either the lookup or
    /// the terminate step, counts as success.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] for failures other than absence.
    pub async fn delete_instance(&self, instance: &str) -> Result<(), ProviderError> {
        let instance_id = if instance.starts_with(INSTANCE_ID_PREFIX) {
            instance.to_owned()
        } else {
            match self.cli.find_one_instance(&self.controller_id, instance).await {
                Ok(found) => match found.instance_id() {
                    Some(id) => id.to_owned(),
                    None => return Ok(()),
                },
                Err(err) if err.is_not_found() => {
                    debug!(instance = %instance, "nothing to delete");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
        };
        self.cli.terminate_instance(&instance_id).await?;
        Ok(())
    }

    /// Fetches one instance by ID or name.
    ///
    /// A record without an instance ID yields the empty result; the host
    /// reads an empty provider ID as "absent".
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the lookup fails.
    pub async fn get_instance(&self, instance: &str) -> Result<ProviderInstance, ProviderError> {
        let found = self
            .cli
            .find_one_instance(&self.controller_id, instance)
            .await?;
        if found.instance_id().is_none() {
            return Ok(ProviderInstance::default());
        }
        Ok(util::to_provider_instance(&found)?)
    }

    /// Lists the instances belonging to a runner pool.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the listing or a record conversion
    /// fails.
    pub async fn list_instances(
        &self,
        pool_id: &str,
    ) -> Result<Vec<ProviderInstance>, ProviderError> {
        let instances = self.cli.list_described_instances(pool_id).await?;
        instances
            .iter()
            .map(|instance| util::to_provider_instance(instance).map_err(ProviderError::from))
            .collect()
    }

    /// Stops an instance by ID. No state precondition is enforced.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the cloud call fails.
    pub async fn stop_instance(&self, instance: &str) -> Result<(), ProviderError> {
        self.cli.stop_instance(instance).await?;
        Ok(())
    }

    /// Starts an instance by ID or name.
    ///
    /// The current state is checked first: a `stopping` instance is rejected
    /// outright. Other transitional states are deliberately not blocked; the
    /// cloud API accepts those starts.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidStartState`] for a stopping instance,
    /// or [`ProviderError`] when a cloud call fails.
    pub async fn start_instance(&self, instance: &str) -> Result<(), ProviderError> {
        let found = self
            .cli
            .find_one_instance(&self.controller_id, instance)
            .await?;

        let state = found
            .state()
            .and_then(|state| state.name())
            .map(|name| name.as_str().to_owned());
        if state.as_deref() == Some("stopping") {
            return Err(ProviderError::InvalidStartState {
                instance: instance.to_owned(),
                state: String::from("stopping"),
            });
        }

        let instance_id = found.instance_id().unwrap_or(instance);
        self.cli.start_instance(instance_id).await?;
        Ok(())
    }

    /// Bulk teardown is a deliberate no-op; the host deletes instances
    /// individually.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the lifecycle contract.
    pub fn remove_all_instances(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Static build identifier.
    #[must_use]
    pub fn get_version(&self) -> &'static str {
        VERSION
    }
}
