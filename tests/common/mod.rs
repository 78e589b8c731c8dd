//! Shared test doubles and fixture builders.

use std::collections::VecDeque;
use std::sync::Mutex;

use aws_sdk_ec2::types::{Filter, Instance, InstanceState, InstanceStateName, Tag};

use garm_provider_aws::client::{Ec2Api, Ec2Future};
use garm_provider_aws::spec::RunnerSpec;
use garm_provider_aws::{
    BootstrapInstance, ClientError, Config, Credentials, OsArch, OsType,
    RunnerApplicationDownload,
};

/// One observed call against the fake client.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCall {
    Run {
        name: String,
        subnet_id: String,
        has_volume_tuning: bool,
        user_data: String,
    },
    Describe {
        instance_ids: Vec<String>,
        filters: Vec<Filter>,
    },
    Start {
        instance_id: String,
    },
    Stop {
        instance_id: String,
    },
    Terminate {
        instance_id: String,
    },
}

/// Hand-rolled [`Ec2Api`] double with queued answers and a call journal.
#[derive(Debug, Default)]
pub struct FakeEc2 {
    pub describe_results: Mutex<VecDeque<Result<Vec<Instance>, ClientError>>>,
    pub run_result: Mutex<Option<Result<String, ClientError>>>,
    pub start_result: Mutex<Option<Result<(), ClientError>>>,
    pub stop_result: Mutex<Option<Result<(), ClientError>>>,
    pub terminate_result: Mutex<Option<Result<(), ClientError>>>,
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl FakeEc2 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_describe(self, result: Result<Vec<Instance>, ClientError>) -> Self {
        self.describe_results
            .lock()
            .expect("describe queue lock")
            .push_back(result);
        self
    }

    pub fn with_run_result(self, result: Result<String, ClientError>) -> Self {
        *self.run_result.lock().expect("run result lock") = Some(result);
        self
    }

    pub fn with_terminate_result(self, result: Result<(), ClientError>) -> Self {
        *self.terminate_result.lock().expect("terminate result lock") = Some(result);
        self
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

impl Ec2Api for FakeEc2 {
    fn run_instances<'a>(
        &'a self,
        spec: &'a RunnerSpec,
        user_data: &'a str,
    ) -> Ec2Future<'a, String> {
        Box::pin(async move {
            self.record(RecordedCall::Run {
                name: spec.bootstrap_params.name.clone(),
                subnet_id: spec.subnet_id.clone(),
                has_volume_tuning: spec.has_volume_tuning(),
                user_data: user_data.to_owned(),
            });
            self.run_result
                .lock()
                .expect("run result lock")
                .take()
                .unwrap_or_else(|| Ok(String::from("i-0fcf1bab5571e4a4d")))
        })
    }

    fn describe_instances<'a>(
        &'a self,
        instance_ids: Vec<String>,
        filters: Vec<Filter>,
    ) -> Ec2Future<'a, Vec<Instance>> {
        Box::pin(async move {
            self.record(RecordedCall::Describe {
                instance_ids,
                filters,
            });
            self.describe_results
                .lock()
                .expect("describe queue lock")
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        })
    }

    fn start_instances<'a>(&'a self, instance_id: &'a str) -> Ec2Future<'a, ()> {
        Box::pin(async move {
            self.record(RecordedCall::Start {
                instance_id: instance_id.to_owned(),
            });
            self.start_result
                .lock()
                .expect("start result lock")
                .take()
                .unwrap_or(Ok(()))
        })
    }

    fn stop_instances<'a>(&'a self, instance_id: &'a str) -> Ec2Future<'a, ()> {
        Box::pin(async move {
            self.record(RecordedCall::Stop {
                instance_id: instance_id.to_owned(),
            });
            self.stop_result
                .lock()
                .expect("stop result lock")
                .take()
                .unwrap_or(Ok(()))
        })
    }

    fn terminate_instances<'a>(&'a self, instance_id: &'a str) -> Ec2Future<'a, ()> {
        Box::pin(async move {
            self.record(RecordedCall::Terminate {
                instance_id: instance_id.to_owned(),
            });
            self.terminate_result
                .lock()
                .expect("terminate result lock")
                .take()
                .unwrap_or(Ok(()))
        })
    }
}

impl Ec2Api for std::sync::Arc<FakeEc2> {
    fn run_instances<'a>(
        &'a self,
        spec: &'a RunnerSpec,
        user_data: &'a str,
    ) -> Ec2Future<'a, String> {
        self.as_ref().run_instances(spec, user_data)
    }

    fn describe_instances<'a>(
        &'a self,
        instance_ids: Vec<String>,
        filters: Vec<Filter>,
    ) -> Ec2Future<'a, Vec<Instance>> {
        self.as_ref().describe_instances(instance_ids, filters)
    }

    fn start_instances<'a>(&'a self, instance_id: &'a str) -> Ec2Future<'a, ()> {
        self.as_ref().start_instances(instance_id)
    }

    fn stop_instances<'a>(&'a self, instance_id: &'a str) -> Ec2Future<'a, ()> {
        self.as_ref().stop_instances(instance_id)
    }

    fn terminate_instances<'a>(&'a self, instance_id: &'a str) -> Ec2Future<'a, ()> {
        self.as_ref().terminate_instances(instance_id)
    }
}

/// Provider config with the role credential source and a fixed subnet.
pub fn test_config() -> Config {
    Config {
        region: String::from("us-east-1"),
        subnet_id: String::from("subnet-0a0a0a0a0a0a0a0a0"),
        credentials: Credentials::Role,
    }
}

/// One cloud instance record with the given ID, state, and tags.
pub fn ec2_instance(
    instance_id: Option<&str>,
    state: InstanceStateName,
    tags: &[(&str, &str)],
) -> Instance {
    let mut builder = Instance::builder().state(InstanceState::builder().name(state).build());
    if let Some(instance_id) = instance_id {
        builder = builder.instance_id(instance_id);
    }
    for (key, value) in tags {
        builder = builder.tags(Tag::builder().key(*key).value(*value).build());
    }
    builder.build()
}

/// Bootstrap parameters carrying a matching Linux x64 runner build, so the
/// production tool selection succeeds unmodified.
pub fn bootstrap(name: &str) -> BootstrapInstance {
    BootstrapInstance {
        name: name.to_owned(),
        image: String::from("ami-12345678"),
        flavor: String::from("t2.micro"),
        os_type: OsType::Linux,
        os_arch: OsArch::Amd64,
        pool_id: String::from("pool-1"),
        tools: vec![RunnerApplicationDownload {
            os: Some(String::from("linux")),
            architecture: Some(String::from("x64")),
            download_url: Some(String::from("https://example.com/runner.tar.gz")),
            filename: Some(String::from("actions-runner-linux-x64.tar.gz")),
            ..RunnerApplicationDownload::default()
        }],
        extra_specs: serde_json::json!({}),
        repo_url: String::from("https://github.com/org/repo"),
        metadata_url: String::from("https://garm.example.com/api/v1/metadata"),
        callback_url: String::from("https://garm.example.com/api/v1/callbacks/status"),
        instance_token: String::from("secret-token"),
        labels: vec![String::from("self-hosted")],
        ..BootstrapInstance::default()
    }
}
