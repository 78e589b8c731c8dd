//! The opaque extra-specs blob and its two-stage validation.
//!
//! Stage one is a shape check: the blob must be a JSON object using only the
//! recognised keys with the right primitive types, a well-formed subnet ID,
//! and an in-bounds throughput. Stage two (cross-field volume rules) runs
//! later, on the merged [`crate::spec::RunnerSpec`], because it needs the
//! final field values rather than the overrides in isolation.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer};

use crate::spec::{SpecError, VolumeType};

/// Inclusive throughput bounds enforced at the schema stage (MiB/s).
pub const THROUGHPUT_RANGE: (i32, i32) = (125, 1000);

/// Per-pool overrides parsed from the extra-specs blob.
///
/// Every field is optional; absent fields leave the corresponding runner-spec
/// value at its config-derived default. Unknown keys are rejected.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExtraSpecs {
    /// Subnet override, formatted as `subnet-` plus 17 hex digits.
    #[serde(default)]
    pub subnet_id: Option<String>,
    /// Name of the key pair to install on the instance.
    #[serde(default)]
    pub ssh_key_name: Option<String>,
    /// Provisioned IOPS for the root volume (io1/io2/gp3 only).
    #[serde(default)]
    pub iops: Option<i32>,
    /// Provisioned throughput in MiB/s for the root volume (gp3 only).
    #[serde(default)]
    pub throughput: Option<i32>,
    /// Root volume size in GiB.
    #[serde(default)]
    pub volume_size: Option<i32>,
    /// Root volume type.
    #[serde(default)]
    pub volume_type: Option<VolumeType>,
    /// Security groups to associate instead of the VPC default.
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    /// Disable automatic updates on first boot.
    #[serde(default)]
    pub disable_updates: Option<bool>,
    /// Trace the boot script for debugging.
    #[serde(default)]
    pub enable_boot_debug: Option<bool>,
    /// Extra OS packages installed before the runner agent.
    #[serde(default)]
    pub extra_packages: Vec<String>,
    /// Replacement install-script template, base64 encoded.
    #[serde(default, deserialize_with = "base64_optional")]
    pub runner_install_template: Option<Vec<u8>>,
    /// Additional key/value pairs exposed to the install template.
    #[serde(default)]
    pub extra_context: BTreeMap<String, String>,
    /// Named scripts (base64) executed before the runner install body.
    #[serde(default, deserialize_with = "base64_map")]
    pub pre_install_scripts: BTreeMap<String, Vec<u8>>,
}

impl ExtraSpecs {
    /// Parses and shape-checks a raw extra-specs string.
    ///
    /// An empty or whitespace-only input yields the all-defaults value.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::MalformedJson`] when the input is not JSON and
    /// [`SpecError::Schema`] when it is JSON but violates the field schema.
    pub fn parse(raw: &str) -> Result<Self, SpecError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|err| SpecError::MalformedJson(err.to_string()))?;
        Self::from_value(&value)
    }

    /// Shape-checks an already-decoded JSON value.
    ///
    /// `null` (the default for hosts that send no extra specs) yields the
    /// all-defaults value.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::Schema`] on unknown keys, wrong types, invalid
    /// base64, a malformed subnet ID, or an out-of-bounds throughput.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, SpecError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let specs: Self = serde_json::from_value(value.clone())
            .map_err(|err| SpecError::Schema(err.to_string()))?;
        specs.check_shape()?;
        Ok(specs)
    }

    /// Field-local checks that sit outside what serde's typed decode covers.
    fn check_shape(&self) -> Result<(), SpecError> {
        if let Some(subnet_id) = &self.subnet_id {
            if !is_valid_subnet_id(subnet_id) {
                return Err(SpecError::Schema(format!(
                    "subnet_id `{subnet_id}` does not match pattern ^subnet-[0-9a-fA-F]{{17}}$"
                )));
            }
        }
        if let Some(throughput) = self.throughput {
            let (min, max) = THROUGHPUT_RANGE;
            if throughput < min || throughput > max {
                return Err(SpecError::Schema(format!(
                    "throughput must be between {min} and {max}"
                )));
            }
        }
        Ok(())
    }
}

/// Checks the fixed `subnet-` + 17 hex digits shape.
fn is_valid_subnet_id(value: &str) -> bool {
    value
        .strip_prefix("subnet-")
        .is_some_and(|suffix| suffix.len() == 17 && suffix.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn decode_base64<E: serde::de::Error>(field: &str, raw: &str) -> Result<Vec<u8>, E> {
    BASE64
        .decode(raw)
        .map_err(|err| E::custom(format!("{field} is not valid base64: {err}")))
}

fn base64_optional<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|encoded| decode_base64("runner_install_template", &encoded))
        .transpose()
}

fn base64_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, String> = BTreeMap::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(name, encoded)| decode_base64(&name, &encoded).map(|bytes| (name, bytes)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_defaults() {
        let specs = ExtraSpecs::parse("").unwrap_or_else(|err| panic!("empty input: {err}"));
        assert_eq!(specs, ExtraSpecs::default());
    }

    #[test]
    fn subnet_only_blob_leaves_other_fields_unset() {
        let specs = ExtraSpecs::parse(r#"{"subnet_id": "subnet-0a0a0a0a0a0a0a0a0"}"#)
            .unwrap_or_else(|err| panic!("subnet blob: {err}"));
        assert_eq!(
            specs,
            ExtraSpecs {
                subnet_id: Some(String::from("subnet-0a0a0a0a0a0a0a0a0")),
                ..ExtraSpecs::default()
            }
        );
    }

    #[test]
    fn full_blob_decodes_every_field() {
        let raw = r#"{
            "subnet_id": "subnet-0a0a0a0a0a0a0a0a0",
            "ssh_key_name": "runner-key",
            "security_group_ids": ["sg-018c35963edfb1cce", "sg-018c35963edfb1cee"],
            "iops": 3000,
            "throughput": 200,
            "volume_size": 50,
            "volume_type": "gp3",
            "disable_updates": true,
            "enable_boot_debug": true,
            "extra_packages": ["package1", "package2"],
            "runner_install_template": "IyEvYmluL2Jhc2gKZWNobyBJbnN0YWxsaW5nIHJ1bm5lci4uLg==",
            "pre_install_scripts": {"setup.sh": "IyEvYmluL2Jhc2gKZWNobyBTZXR1cCBzY3JpcHQuLi4="},
            "extra_context": {"key": "value"}
        }"#;
        let specs = ExtraSpecs::parse(raw).unwrap_or_else(|err| panic!("full blob: {err}"));

        assert_eq!(specs.iops, Some(3000));
        assert_eq!(specs.throughput, Some(200));
        assert_eq!(specs.volume_size, Some(50));
        assert_eq!(specs.volume_type, Some(VolumeType::Gp3));
        assert_eq!(specs.security_group_ids.len(), 2);
        assert_eq!(specs.disable_updates, Some(true));
        assert_eq!(specs.enable_boot_debug, Some(true));
        assert_eq!(
            specs.runner_install_template.as_deref(),
            Some(b"#!/bin/bash\necho Installing runner...".as_slice())
        );
        assert_eq!(
            specs.pre_install_scripts.get("setup.sh").map(Vec::as_slice),
            Some(b"#!/bin/bash\necho Setup script...".as_slice())
        );
        assert_eq!(
            specs.extra_context.get("key").map(String::as_str),
            Some("value")
        );
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = ExtraSpecs::parse(r#"{"unknown_key": 1}"#)
            .expect_err("unknown key should be rejected");
        let SpecError::Schema(message) = err else {
            panic!("expected schema error, got {err:?}");
        };
        assert!(message.contains("unknown field"), "got: {message}");
    }

    #[test]
    fn type_mismatch_is_a_schema_error_not_a_pattern_error() {
        let err = ExtraSpecs::parse(r#"{"subnet_id": 123}"#)
            .expect_err("integer subnet should be rejected");
        let SpecError::Schema(message) = err else {
            panic!("expected schema error, got {err:?}");
        };
        assert!(message.contains("invalid type"), "got: {message}");
        assert!(!message.contains("pattern"), "got: {message}");
    }

    #[test]
    fn malformed_json_is_distinct_from_schema_mismatch() {
        let err = ExtraSpecs::parse("{not json").expect_err("broken JSON should be rejected");
        assert!(
            matches!(err, SpecError::MalformedJson(_)),
            "expected malformed-JSON error, got {err:?}"
        );
    }

    #[test]
    fn subnet_pattern_is_enforced() {
        for bad in [
            "subnet-123",
            "subnet-0a0a0a0a0a0a0a0a00",
            "subnet-0a0a0a0a0a0a0a0ag",
            "net-0a0a0a0a0a0a0a0a0",
        ] {
            let raw = format!(r#"{{"subnet_id": "{bad}"}}"#);
            let err = ExtraSpecs::parse(&raw).expect_err("bad subnet should be rejected");
            let SpecError::Schema(message) = err else {
                panic!("expected schema error for {bad}, got {err:?}");
            };
            assert!(message.contains("pattern"), "got: {message}");
        }
    }

    #[test]
    fn unknown_volume_type_is_rejected_at_decode() {
        let err = ExtraSpecs::parse(r#"{"volume_type": "gp4"}"#)
            .expect_err("unknown volume type should be rejected");
        assert!(matches!(err, SpecError::Schema(_)), "got {err:?}");
    }

    #[test]
    fn throughput_bounds_are_schema_checked() {
        for (value, ok) in [(125, true), (1000, true), (124, false), (1001, false)] {
            let raw = format!(r#"{{"throughput": {value}, "volume_type": "gp3"}}"#);
            let result = ExtraSpecs::parse(&raw);
            assert_eq!(result.is_ok(), ok, "throughput {value}: {result:?}");
        }
    }

    #[test]
    fn invalid_base64_template_is_rejected() {
        let err = ExtraSpecs::parse(r#"{"runner_install_template": "%%%"}"#)
            .expect_err("invalid base64 should be rejected");
        let SpecError::Schema(message) = err else {
            panic!("expected schema error, got {err:?}");
        };
        assert!(message.contains("base64"), "got: {message}");
    }
}
