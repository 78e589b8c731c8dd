//! Conversions between cloud instance records and host-facing shapes.

use aws_sdk_ec2::types::{Instance, InstanceState, InstanceStateName};

use crate::client::error::ClientError;
use crate::client::{NAME_TAG, OS_ARCH_TAG, OS_TYPE_TAG};
use crate::params::{
    InstanceStatus, OsArch, OsType, ProviderInstance, RunnerApplicationDownload,
};
use crate::spec::SpecError;

/// Collapses the cloud's lifecycle states into the host's three buckets.
///
/// Shutting-down and stopping instances still count as running because the
/// host only cares whether the machine is gone, not how far along teardown
/// is. Anything unrecognised, including a missing state, maps to unknown.
#[must_use]
pub fn instance_status(state: Option<&InstanceState>) -> InstanceStatus {
    match state.and_then(InstanceState::name) {
        Some(name) => match name {
            InstanceStateName::Running
            | InstanceStateName::ShuttingDown
            | InstanceStateName::Stopping => InstanceStatus::Running,
            InstanceStateName::Stopped | InstanceStateName::Terminated => InstanceStatus::Stopped,
            _ => InstanceStatus::Unknown,
        },
        None => InstanceStatus::Unknown,
    }
}

/// Builds the host-facing result shape from a cloud instance record.
///
/// Identity comes from the instance ID; name, OS type, and architecture are
/// read back from the tags written at launch.
///
/// # Errors
///
/// Returns [`ClientError::MissingInstanceId`] when the record carries no
/// instance ID.
pub fn to_provider_instance(instance: &Instance) -> Result<ProviderInstance, ClientError> {
    let provider_id = instance
        .instance_id()
        .ok_or(ClientError::MissingInstanceId)?
        .to_owned();

    let mut details = ProviderInstance {
        provider_id,
        status: instance_status(instance.state()),
        ..ProviderInstance::default()
    };
    for tag in instance.tags() {
        let (Some(key), Some(value)) = (tag.key(), tag.value()) else {
            continue;
        };
        match key {
            NAME_TAG => details.name = value.to_owned(),
            OS_TYPE_TAG => details.os_type = OsType::from(value),
            OS_ARCH_TAG => details.os_arch = OsArch::from(value),
            _ => {}
        }
    }
    Ok(details)
}

/// Picks the runner-agent build matching the requested OS and architecture.
///
/// Host architecture names differ from the forge's download names; `amd64`
/// maps to `x64` and Windows builds are published under `win`.
///
/// # Errors
///
/// Returns [`SpecError::ToolsNotFound`] when no offered build matches.
pub fn get_tools(
    os_type: OsType,
    os_arch: OsArch,
    tools: &[RunnerApplicationDownload],
) -> Result<RunnerApplicationDownload, SpecError> {
    let not_found = || SpecError::ToolsNotFound {
        os: os_type.to_string(),
        arch: os_arch.to_string(),
    };

    let wanted_os = match os_type {
        OsType::Linux => "linux",
        OsType::Windows => "win",
        OsType::Unknown => return Err(not_found()),
    };
    let wanted_arch = match os_arch {
        OsArch::Amd64 => "x64",
        OsArch::Arm64 => "arm64",
        OsArch::Arm => "arm",
        OsArch::Unknown => return Err(not_found()),
    };

    tools
        .iter()
        .find(|tool| {
            tool.os.as_deref().is_some_and(|os| os.eq_ignore_ascii_case(wanted_os))
                && tool
                    .architecture
                    .as_deref()
                    .is_some_and(|arch| arch.eq_ignore_ascii_case(wanted_arch))
        })
        .cloned()
        .ok_or_else(not_found)
}
