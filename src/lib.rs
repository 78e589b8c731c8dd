//! External provider plugin that runs ephemeral CI runners on EC2.
//!
//! The crate exposes the building blocks of a fleet-manager provider: a TOML
//! configuration loader, a validated launch-spec builder with per-pool
//! overrides, a boot-script composer, a narrow compute-client seam over the
//! cloud SDK, and the facade implementing the host's lifecycle contract
//! (create → get/list → stop/start → delete).

pub mod client;
pub mod cloudconfig;
pub mod config;
pub mod execution;
pub mod params;
pub mod provider;
pub mod spec;
pub mod util;

pub use client::{AwsCli, ClientError, Ec2Api, Ec2Future, SdkEc2};
pub use cloudconfig::CloudConfigError;
pub use config::{Config, ConfigError, Credentials};
pub use execution::{ExecutionEnvironment, ExecutionError, ProviderCommand};
pub use params::{
    BootstrapInstance, InstanceStatus, OsArch, OsType, ProviderInstance,
    RunnerApplicationDownload,
};
pub use provider::{AwsProvider, ProviderError, VERSION};
pub use spec::{ExtraSpecs, RunnerSpec, SpecError, VolumeType};
