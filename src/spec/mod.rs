//! Runner launch specification: defaults, overrides, and validation.
//!
//! A [`RunnerSpec`] is built fresh for every create call: it starts from the
//! provider config defaults, absorbs the bootstrap parameters, merges the
//! per-pool [`ExtraSpecs`] overrides, and is then validated as a whole. It is
//! owned by the call that launches it and never persisted.

mod error;
mod extra_specs;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use error::SpecError;
pub use extra_specs::{ExtraSpecs, THROUGHPUT_RANGE};

use crate::config::Config;
use crate::params::{BootstrapInstance, OsArch, OsType, RunnerApplicationDownload};

/// EBS volume types accepted in extra specs.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    /// General purpose SSD, previous generation.
    Gp2,
    /// General purpose SSD with tunable IOPS and throughput.
    Gp3,
    /// Provisioned-IOPS SSD, previous generation.
    Io1,
    /// Provisioned-IOPS SSD.
    Io2,
    /// Throughput-optimised HDD.
    St1,
    /// Cold HDD.
    Sc1,
    /// Magnetic, previous generation.
    Standard,
}

impl VolumeType {
    /// Lowercase name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gp2 => "gp2",
            Self::Gp3 => "gp3",
            Self::Io1 => "io1",
            Self::Io2 => "io2",
            Self::St1 => "st1",
            Self::Sc1 => "sc1",
            Self::Standard => "standard",
        }
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy for picking the runner-agent build matching an OS/arch pair.
///
/// Injected into [`RunnerSpec::from_bootstrap`] so tests can substitute a
/// fixed answer without fabricating download lists.
pub type ToolFetch = fn(
    OsType,
    OsArch,
    &[RunnerApplicationDownload],
) -> Result<RunnerApplicationDownload, SpecError>;

/// Fully resolved description of one instance launch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunnerSpec {
    /// Region the launch targets.
    pub region: String,
    /// Subnet the instance attaches to.
    pub subnet_id: String,
    /// Identity tag distinguishing this deployment's instances.
    pub controller_id: String,
    /// Key pair name, when one should be installed.
    pub ssh_key_name: Option<String>,
    /// Security groups to associate; empty means the VPC default.
    pub security_group_ids: Vec<String>,
    /// Provisioned IOPS for the root volume.
    pub iops: Option<i32>,
    /// Provisioned throughput for the root volume (MiB/s).
    pub throughput: Option<i32>,
    /// Root volume size in GiB.
    pub volume_size: Option<i32>,
    /// Root volume type.
    pub volume_type: Option<VolumeType>,
    /// Disable automatic updates on first boot.
    pub disable_updates: bool,
    /// Trace the boot script for debugging.
    pub enable_boot_debug: bool,
    /// Extra OS packages installed before the runner agent.
    pub extra_packages: Vec<String>,
    /// Replacement install-script template, when the pool supplies one.
    pub runner_install_template: Option<Vec<u8>>,
    /// Additional template context entries.
    pub extra_context: BTreeMap<String, String>,
    /// Named scripts executed before the install body.
    pub pre_install_scripts: BTreeMap<String, Vec<u8>>,
    /// Runner-agent build selected for this OS/arch.
    pub tools: RunnerApplicationDownload,
    /// The host's launch parameters, kept verbatim for naming and tagging.
    pub bootstrap_params: BootstrapInstance,
}

impl RunnerSpec {
    /// Builds a validated spec from config defaults, bootstrap parameters,
    /// and the extra-specs blob carried inside them.
    ///
    /// Pure function of its inputs plus the injected `tool_fetch` strategy.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when no matching runner build exists, the extra
    /// specs fail validation, or the merged spec violates a cross-field rule.
    pub fn from_bootstrap(
        config: &Config,
        bootstrap_params: BootstrapInstance,
        controller_id: &str,
        tool_fetch: ToolFetch,
    ) -> Result<Self, SpecError> {
        let tools = tool_fetch(
            bootstrap_params.os_type,
            bootstrap_params.os_arch,
            &bootstrap_params.tools,
        )?;
        let extra_specs = ExtraSpecs::from_value(&bootstrap_params.extra_specs)?;

        let mut spec = Self {
            region: config.region.clone(),
            subnet_id: config.subnet_id.clone(),
            controller_id: controller_id.to_owned(),
            tools,
            bootstrap_params,
            ..Self::default()
        };
        spec.merge_extra_specs(extra_specs);
        spec.validate()?;
        Ok(spec)
    }

    /// Applies overrides onto the config-derived defaults.
    ///
    /// Scalars are overwritten unconditionally when present; list and map
    /// fields are replaced wholesale, never appended. Merging an empty
    /// [`ExtraSpecs`] leaves the spec untouched.
    pub fn merge_extra_specs(&mut self, extra_specs: ExtraSpecs) {
        if let Some(subnet_id) = extra_specs.subnet_id {
            if !subnet_id.is_empty() {
                self.subnet_id = subnet_id;
            }
        }
        if let Some(iops) = extra_specs.iops {
            self.iops = Some(iops);
        }
        if let Some(throughput) = extra_specs.throughput {
            self.throughput = Some(throughput);
        }
        if let Some(volume_size) = extra_specs.volume_size {
            self.volume_size = Some(volume_size);
        }
        if let Some(volume_type) = extra_specs.volume_type {
            self.volume_type = Some(volume_type);
        }
        if let Some(ssh_key_name) = extra_specs.ssh_key_name {
            self.ssh_key_name = Some(ssh_key_name);
        }
        if !extra_specs.security_group_ids.is_empty() {
            self.security_group_ids = extra_specs.security_group_ids;
        }
        if let Some(disable_updates) = extra_specs.disable_updates {
            self.disable_updates = disable_updates;
        }
        if let Some(enable_boot_debug) = extra_specs.enable_boot_debug {
            self.enable_boot_debug = enable_boot_debug;
        }
        if !extra_specs.extra_packages.is_empty() {
            self.extra_packages = extra_specs.extra_packages;
        }
        if let Some(template) = extra_specs.runner_install_template {
            self.runner_install_template = Some(template);
        }
        if !extra_specs.extra_context.is_empty() {
            self.extra_context = extra_specs.extra_context;
        }
        if !extra_specs.pre_install_scripts.is_empty() {
            self.pre_install_scripts = extra_specs.pre_install_scripts;
        }
    }

    /// Cross-field validation of the merged spec.
    ///
    /// Checks run in a fixed order and the first failure wins: iops
    /// type/range, throughput, volume size, then the io1/io2 IOPS
    /// requirement.
    ///
    /// # Errors
    ///
    /// Returns the first [`SpecError`] encountered.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.region.is_empty() {
            return Err(SpecError::MissingRegion);
        }
        if self.bootstrap_params.name.is_empty() {
            return Err(SpecError::MissingBootstrapName);
        }
        self.validate_iops()?;
        if self.throughput.is_some() && self.volume_type != Some(VolumeType::Gp3) {
            return Err(SpecError::ThroughputNotSupported);
        }
        self.validate_volume_size()?;
        if let Some(volume_type @ (VolumeType::Io1 | VolumeType::Io2)) = self.volume_type {
            if self.iops.is_none() {
                return Err(SpecError::IopsRequired { volume_type });
            }
        }
        Ok(())
    }

    fn validate_iops(&self) -> Result<(), SpecError> {
        let Some(iops) = self.iops else {
            return Ok(());
        };
        let (volume_type, min, max) = match self.volume_type {
            Some(VolumeType::Io1) => (VolumeType::Io1, 100, 64_000),
            Some(VolumeType::Io2) => (VolumeType::Io2, 100, 256_000),
            Some(VolumeType::Gp3) => (VolumeType::Gp3, 3_000, 16_000),
            _ => return Err(SpecError::IopsNotSupported),
        };
        if iops < min || iops > max {
            return Err(SpecError::IopsOutOfRange {
                volume_type,
                min,
                max,
            });
        }
        Ok(())
    }

    fn validate_volume_size(&self) -> Result<(), SpecError> {
        let Some(volume_size) = self.volume_size else {
            return Ok(());
        };
        // The unset case shares the magnetic default's range.
        let (name, min, max) = match self.volume_type {
            Some(VolumeType::Io1) => ("io1", 4, 16_384),
            Some(VolumeType::Io2) => ("io2", 4, 16_384),
            Some(VolumeType::Gp2) => ("gp2", 1, 16_384),
            Some(VolumeType::Gp3) => ("gp3", 1, 16_384),
            Some(VolumeType::St1) => ("st1", 125, 16_384),
            Some(VolumeType::Sc1) => ("sc1", 125, 16_384),
            Some(VolumeType::Standard) | None => ("standard", 1, 1_024),
        };
        if volume_size < min || volume_size > max {
            return Err(SpecError::VolumeSizeOutOfRange {
                volume_type: name,
                min,
                max,
            });
        }
        Ok(())
    }

    /// True when any root-volume tuning field is set, meaning the launch
    /// request needs an explicit block-device mapping.
    #[must_use]
    pub const fn has_volume_tuning(&self) -> bool {
        self.iops.is_some()
            || self.throughput.is_some()
            || self.volume_size.is_some()
            || self.volume_type.is_some()
    }
}
