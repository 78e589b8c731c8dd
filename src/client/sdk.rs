//! Production [`Ec2Api`] implementation over the cloud SDK.

use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::Client;
use aws_sdk_ec2::config::Credentials as SdkCredentials;
use aws_sdk_ec2::types::{
    BlockDeviceMapping, EbsBlockDevice, Filter, Instance, InstanceType, ResourceType, Tag,
    TagSpecification, VolumeType as Ec2VolumeType,
};
use tracing::debug;

use crate::client::error::ClientError;
use crate::client::{
    CONTROLLER_ID_TAG, Ec2Api, Ec2Future, NAME_TAG, OS_ARCH_TAG, OS_TYPE_TAG, POOL_ID_TAG,
};
use crate::config::{Config, Credentials};
use crate::spec::RunnerSpec;

/// Device name the root EBS volume is mapped to when tuning is requested.
const ROOT_DEVICE_NAME: &str = "/dev/sda1";

/// [`Ec2Api`] backed by `aws-sdk-ec2`.
#[derive(Clone, Debug)]
pub struct SdkEc2 {
    client: Client,
}

impl SdkEc2 {
    /// Resolves region and credentials from the provider config and builds
    /// the SDK client.
    ///
    /// Static credentials are injected as a fixed provider; the role variant
    /// leaves the SDK's ambient chain in charge.
    pub async fn connect(config: &Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Credentials::Static {
            access_key_id,
            secret_access_key,
            session_token,
        } = &config.credentials
        {
            loader = loader.credentials_provider(SdkCredentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                Some(session_token.clone()),
                None,
                "garm-provider-config",
            ));
        }
        let sdk_config = loader.load().await;
        Self {
            client: Client::new(&sdk_config),
        }
    }
}

impl Ec2Api for SdkEc2 {
    fn run_instances<'a>(
        &'a self,
        spec: &'a RunnerSpec,
        user_data: &'a str,
    ) -> Ec2Future<'a, String> {
        Box::pin(async move {
            let mut request = self
                .client
                .run_instances()
                .image_id(&spec.bootstrap_params.image)
                .instance_type(InstanceType::from(spec.bootstrap_params.flavor.as_str()))
                .min_count(1)
                .max_count(1)
                .subnet_id(&spec.subnet_id)
                .user_data(user_data)
                .tag_specifications(instance_tags(spec));
            if let Some(key_name) = &spec.ssh_key_name {
                request = request.key_name(key_name);
            }
            if !spec.security_group_ids.is_empty() {
                request = request.set_security_group_ids(Some(spec.security_group_ids.clone()));
            }
            if spec.has_volume_tuning() {
                request = request.block_device_mappings(root_device_mapping(spec));
            }

            let response = request
                .send()
                .await
                .map_err(|err| ClientError::api("RunInstances", err))?;
            response
                .instances()
                .first()
                .and_then(Instance::instance_id)
                .map(str::to_owned)
                .ok_or(ClientError::EmptyLaunchResponse)
        })
    }

    fn describe_instances<'a>(
        &'a self,
        instance_ids: Vec<String>,
        filters: Vec<Filter>,
    ) -> Ec2Future<'a, Vec<Instance>> {
        Box::pin(async move {
            debug!(ids = instance_ids.len(), filters = filters.len(), "describing instances");
            let response = self
                .client
                .describe_instances()
                .set_instance_ids((!instance_ids.is_empty()).then_some(instance_ids))
                .set_filters((!filters.is_empty()).then_some(filters))
                .send()
                .await
                .map_err(|err| ClientError::api("DescribeInstances", err))?;

            let mut instances = Vec::new();
            for reservation in response.reservations() {
                instances.extend(reservation.instances().iter().cloned());
            }
            Ok(instances)
        })
    }

    fn start_instances<'a>(&'a self, instance_id: &'a str) -> Ec2Future<'a, ()> {
        Box::pin(async move {
            self.client
                .start_instances()
                .instance_ids(instance_id)
                .send()
                .await
                .map_err(|err| ClientError::api("StartInstances", err))?;
            Ok(())
        })
    }

    fn stop_instances<'a>(&'a self, instance_id: &'a str) -> Ec2Future<'a, ()> {
        Box::pin(async move {
            self.client
                .stop_instances()
                .instance_ids(instance_id)
                .send()
                .await
                .map_err(|err| ClientError::api("StopInstances", err))?;
            Ok(())
        })
    }

    fn terminate_instances<'a>(&'a self, instance_id: &'a str) -> Ec2Future<'a, ()> {
        Box::pin(async move {
            self.client
                .terminate_instances()
                .instance_ids(instance_id)
                .send()
                .await
                .map_err(|err| ClientError::api("TerminateInstances", err))?;
            Ok(())
        })
    }
}

fn instance_tags(spec: &RunnerSpec) -> TagSpecification {
    let tag = |key: &str, value: &str| Tag::builder().key(key).value(value).build();
    TagSpecification::builder()
        .resource_type(ResourceType::Instance)
        .tags(tag(NAME_TAG, &spec.bootstrap_params.name))
        .tags(tag(POOL_ID_TAG, &spec.bootstrap_params.pool_id))
        .tags(tag(OS_TYPE_TAG, spec.bootstrap_params.os_type.as_str()))
        .tags(tag(OS_ARCH_TAG, spec.bootstrap_params.os_arch.as_str()))
        .tags(tag(CONTROLLER_ID_TAG, &spec.controller_id))
        .build()
}

fn root_device_mapping(spec: &RunnerSpec) -> BlockDeviceMapping {
    let mut ebs = EbsBlockDevice::builder().delete_on_termination(true);
    if let Some(iops) = spec.iops {
        ebs = ebs.iops(iops);
    }
    if let Some(throughput) = spec.throughput {
        ebs = ebs.throughput(throughput);
    }
    if let Some(volume_size) = spec.volume_size {
        ebs = ebs.volume_size(volume_size);
    }
    if let Some(volume_type) = spec.volume_type {
        ebs = ebs.volume_type(Ec2VolumeType::from(volume_type.as_str()));
    }
    BlockDeviceMapping::builder()
        .device_name(ROOT_DEVICE_NAME)
        .ebs(ebs.build())
        .build()
}
