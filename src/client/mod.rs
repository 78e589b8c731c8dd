//! Narrow compute-client seam and the composite operations built on it.
//!
//! [`Ec2Api`] wraps the five cloud calls this provider consumes so tests can
//! substitute a double without a live account. [`AwsCli`] layers the
//! composite behaviour on top: tag-based lookup, idempotent termination, and
//! the fully-tagged launch call.

pub mod error;
mod sdk;

use std::future::Future;
use std::pin::Pin;

use aws_sdk_ec2::types::{Filter, Instance};
use tracing::{debug, info};

pub use error::ClientError;
pub use sdk::SdkEc2;

use crate::cloudconfig;
use crate::config::Config;
use crate::spec::RunnerSpec;

/// Display-name tag.
pub const NAME_TAG: &str = "Name";
/// Tag grouping instances launched for the same runner pool.
pub const POOL_ID_TAG: &str = "GARM_POOL_ID";
/// Tag distinguishing this deployment's instances from unrelated resources.
pub const CONTROLLER_ID_TAG: &str = "GARM_CONTROLLER_ID";
/// Tag recording the OS type for later queries.
pub const OS_TYPE_TAG: &str = "OSType";
/// Tag recording the architecture for later queries.
pub const OS_ARCH_TAG: &str = "OSArch";

/// The cloud's fixed prefix for instance IDs, used to tell an ID-shaped
/// lookup key from a name-shaped one.
pub const INSTANCE_ID_PREFIX: &str = "i-";

/// Lifecycle states a lookup should still surface. Shutting-down and
/// terminated instances are excluded so a recycled name never matches a
/// corpse.
const ACTIVE_INSTANCE_STATES: [&str; 4] = ["pending", "running", "stopping", "stopped"];

/// Future returned by [`Ec2Api`] operations.
pub type Ec2Future<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'a>>;

/// The five cloud operations this provider consumes.
///
/// This is the substitution seam: the production implementation is
/// [`SdkEc2`]; tests implement it with canned responses.
pub trait Ec2Api: Send + Sync {
    /// Launches one instance described by `spec` and returns its ID.
    fn run_instances<'a>(
        &'a self,
        spec: &'a RunnerSpec,
        user_data: &'a str,
    ) -> Ec2Future<'a, String>;

    /// Describes instances by explicit IDs and/or filters.
    fn describe_instances<'a>(
        &'a self,
        instance_ids: Vec<String>,
        filters: Vec<Filter>,
    ) -> Ec2Future<'a, Vec<Instance>>;

    /// Starts a stopped instance by ID.
    fn start_instances<'a>(&'a self, instance_id: &'a str) -> Ec2Future<'a, ()>;

    /// Stops a running instance by ID.
    fn stop_instances<'a>(&'a self, instance_id: &'a str) -> Ec2Future<'a, ()>;

    /// Terminates an instance by ID.
    fn terminate_instances<'a>(&'a self, instance_id: &'a str) -> Ec2Future<'a, ()>;
}

/// Compute client: configuration plus composite operations over [`Ec2Api`].
#[derive(Clone, Debug)]
pub struct AwsCli<C> {
    config: Config,
    client: C,
}

impl AwsCli<SdkEc2> {
    /// Builds a client backed by the real cloud SDK, resolving region and
    /// credentials from the provider config.
    pub async fn new(config: Config) -> Self {
        let client = SdkEc2::connect(&config).await;
        Self { config, client }
    }
}

impl<C: Ec2Api> AwsCli<C> {
    /// Builds a client over an explicit [`Ec2Api`] implementation.
    pub const fn with_client(config: Config, client: C) -> Self {
        Self { config, client }
    }

    /// The provider configuration this client was built from.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Starts an instance by ID.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the cloud call fails.
    pub async fn start_instance(&self, instance_id: &str) -> Result<(), ClientError> {
        debug!(instance_id = %instance_id, "starting instance");
        self.client.start_instances(instance_id).await
    }

    /// Stops an instance by ID.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the cloud call fails.
    pub async fn stop_instance(&self, instance_id: &str) -> Result<(), ClientError> {
        debug!(instance_id = %instance_id, "stopping instance");
        self.client.stop_instances(instance_id).await
    }

    /// Finds instances carrying this deployment's controller tag and the
    /// given `Name` tag, in any non-terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the cloud call fails.
    pub async fn find_instances(
        &self,
        controller_id: &str,
        instance_name: &str,
    ) -> Result<Vec<Instance>, ClientError> {
        let filters = vec![
            tag_filter(CONTROLLER_ID_TAG, controller_id),
            tag_filter(NAME_TAG, instance_name),
            state_filter(),
        ];
        self.client.describe_instances(Vec::new(), filters).await
    }

    /// Fetches one instance by its cloud-assigned ID.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when no non-terminal instance has
    /// that ID, and [`ClientError`] when the cloud call fails.
    pub async fn get_instance(&self, instance_id: &str) -> Result<Instance, ClientError> {
        let instances = self
            .client
            .describe_instances(vec![instance_id.to_owned()], vec![state_filter()])
            .await?;
        instances
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound {
                instance: instance_id.to_owned(),
            })
    }

    /// Resolves an identifier that may be either an instance ID or a `Name`
    /// tag value.
    ///
    /// ID-shaped identifiers are fetched directly. Names are matched by tag;
    /// zero matches is [`ClientError::NotFound`] and more than one is
    /// [`ClientError::AmbiguousMatch`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] as described above, or when the cloud call
    /// fails.
    pub async fn find_one_instance(
        &self,
        controller_id: &str,
        instance: &str,
    ) -> Result<Instance, ClientError> {
        if instance.starts_with(INSTANCE_ID_PREFIX) {
            return self.get_instance(instance).await;
        }
        let mut matches = self.find_instances(controller_id, instance).await?;
        if matches.len() > 1 {
            return Err(ClientError::AmbiguousMatch {
                name: instance.to_owned(),
            });
        }
        matches.pop().ok_or_else(|| ClientError::NotFound {
            instance: instance.to_owned(),
        })
    }

    /// Terminates an instance by ID. A not-found answer counts as success so
    /// deletes are idempotent under races.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] for any failure other than not-found.
    pub async fn terminate_instance(&self, instance_id: &str) -> Result<(), ClientError> {
        info!(instance_id = %instance_id, "terminating instance");
        match self.client.terminate_instances(instance_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!(instance_id = %instance_id, "instance already gone");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Lists the non-terminal instances belonging to a runner pool.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the cloud call fails.
    pub async fn list_described_instances(
        &self,
        pool_id: &str,
    ) -> Result<Vec<Instance>, ClientError> {
        let filters = vec![tag_filter(POOL_ID_TAG, pool_id), state_filter()];
        self.client.describe_instances(Vec::new(), filters).await
    }

    /// Composes user data and launches one instance for `spec`.
    ///
    /// The launch is accept-synchronous: the cloud acknowledges the request
    /// and boots in the background; nothing here waits for running state.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when composition or the launch call fails.
    pub async fn create_running_instance(&self, spec: &RunnerSpec) -> Result<String, ClientError> {
        let user_data = cloudconfig::compose_user_data(spec)?;
        let instance_id = self.client.run_instances(spec, &user_data).await?;
        info!(
            instance_id = %instance_id,
            name = %spec.bootstrap_params.name,
            "launched instance"
        );
        Ok(instance_id)
    }
}

fn tag_filter(tag: &str, value: &str) -> Filter {
    Filter::builder()
        .name(format!("tag:{tag}"))
        .values(value)
        .build()
}

fn state_filter() -> Filter {
    let mut filter = Filter::builder().name("instance-state-name");
    for state in ACTIVE_INSTANCE_STATES {
        filter = filter.values(state);
    }
    filter.build()
}
