//! Error types for the compute client.

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

use crate::cloudconfig::CloudConfigError;

/// Error code the cloud returns for operations on unknown instance IDs.
pub const NOT_FOUND_CODE: &str = "InvalidInstanceID.NotFound";

/// Errors raised by the compute client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClientError {
    /// Raised when no instance matches a lookup.
    #[error("no such instance {instance}")]
    NotFound {
        /// The name or ID that was looked up.
        instance: String,
    },
    /// Raised when a name lookup matches more than one instance. Never
    /// auto-resolved; the caller must disambiguate.
    #[error("found more than one instance with name {name}")]
    AmbiguousMatch {
        /// The ambiguous name.
        name: String,
    },
    /// Raised when a launch response carries no instance.
    #[error("launch returned no instance")]
    EmptyLaunchResponse,
    /// Raised when a record that should identify an instance has no ID.
    #[error("instance record carries no instance ID")]
    MissingInstanceId,
    /// Raised when user-data composition fails ahead of a launch.
    #[error("failed to compose user data: {0}")]
    UserData(#[from] CloudConfigError),
    /// Wrapper for cloud API failures.
    #[error("{operation} failed: {message}")]
    Api {
        /// The cloud operation that failed.
        operation: &'static str,
        /// Error code reported by the cloud, when one was present.
        code: Option<String>,
        /// Human-readable failure description.
        message: String,
    },
}

impl ClientError {
    /// True when the error means "that instance does not exist", whether it
    /// came from a lookup or from the cloud's own not-found code.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Api { code, .. } => code.as_deref() == Some(NOT_FOUND_CODE),
            _ => false,
        }
    }

    /// Wraps an SDK failure, preserving the cloud's error code for
    /// classification.
    pub(crate) fn api<E, R>(operation: &'static str, err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug,
    {
        let meta = ProvideErrorMetadata::meta(&err);
        let code = meta.code().map(str::to_owned);
        let message = match meta.message() {
            Some(message) => message.to_owned(),
            None => format!("{}", DisplayErrorContext(&err)),
        };
        Self::Api {
            operation,
            code,
            message,
        }
    }
}
