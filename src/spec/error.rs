//! Error types for extra-specs parsing and runner-spec validation.

use thiserror::Error;

use crate::spec::VolumeType;

/// Errors raised while parsing extra specs or validating a runner spec.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SpecError {
    /// Raised when the extra-specs blob is not JSON at all.
    #[error("failed to parse extra specs: {0}")]
    MalformedJson(String),
    /// Raised when the blob is valid JSON but violates the field schema:
    /// unknown keys, wrong primitive types, bad base64, a malformed subnet
    /// ID, or an out-of-bounds throughput.
    #[error("extra specs schema validation failed: {0}")]
    Schema(String),
    /// Raised when the merged spec has no region to launch into.
    #[error("missing region")]
    MissingRegion,
    /// Raised when the bootstrap parameters carry no instance name.
    #[error("missing bootstrap name")]
    MissingBootstrapName,
    /// Raised when `iops` is supplied for a volume type that does not take
    /// provisioned IOPS.
    #[error("EBS iops is only valid for volume types io1, io2 and gp3")]
    IopsNotSupported,
    /// Raised when `iops` is outside the provisionable range for its volume
    /// type.
    #[error("EBS iops for volume type {volume_type} must be between {min} and {max}")]
    IopsOutOfRange {
        /// Volume type whose range was violated.
        volume_type: VolumeType,
        /// Inclusive lower bound.
        min: i32,
        /// Inclusive upper bound.
        max: i32,
    },
    /// Raised when `throughput` is supplied for anything but gp3.
    #[error("EBS throughput is only valid for volume type gp3")]
    ThroughputNotSupported,
    /// Raised when `volume_size` is outside the range for its volume type.
    #[error("EBS volume size for volume type {volume_type} must be between {min} and {max}")]
    VolumeSizeOutOfRange {
        /// Volume type name whose range was violated; `standard` also covers
        /// the unset case.
        volume_type: &'static str,
        /// Inclusive lower bound.
        min: i32,
        /// Inclusive upper bound.
        max: i32,
    },
    /// Raised when an io1/io2 volume is requested without provisioned IOPS.
    #[error("the parameter iops must be specified for {volume_type} volumes")]
    IopsRequired {
        /// Volume type that mandates IOPS.
        volume_type: VolumeType,
    },
    /// Raised when the host offers no runner-agent build for the requested
    /// OS/architecture pair.
    #[error("failed to find tools for os {os} and arch {arch}")]
    ToolsNotFound {
        /// Requested operating system.
        os: String,
        /// Requested architecture.
        arch: String,
    },
}
