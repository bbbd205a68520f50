//! Error types for the kernel's outer API.

use ressim_types::{ModelKind, ResourceId};
use thiserror::Error;

/// Caller mistakes rejected before any state is touched.
///
/// Simulation outcomes (resource failures, cancellations) are not errors;
/// they show up as action states.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    /// No resource with this id in the model.
    #[error("Unknown resource: {0}")]
    UnknownResource(ResourceId),

    /// The resource exists but is the wrong technology for the operation.
    #[error("Resource {resource} is a {actual}, expected a {expected}")]
    WrongResourceKind {
        resource: ResourceId,
        expected: &'static str,
        actual: &'static str,
    },

    /// Factory called on a model of another technology.
    #[error("Operation requires the {expected} model, called on the {actual} model")]
    WrongModel {
        expected: ModelKind,
        actual: ModelKind,
    },

    /// Out-of-range numeric argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
