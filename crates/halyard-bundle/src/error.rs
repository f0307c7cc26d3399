//! Bundle decoding and validation error types.

use thiserror::Error;

/// Errors raised while decoding or validating a bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("cannot unmarshal bundle data: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid charm URL {url:?}: {reason}")]
    InvalidCharmUrl { url: String, reason: String },

    #[error("expected charm URL, got bundle URL {charm:?}")]
    BundleUrl { charm: String },

    #[error("negative number of units specified on service {service:?}")]
    NegativeUnits { service: String },

    #[error("malformed constraint {constraint:?}")]
    MalformedConstraint { constraint: String },

    #[error("invalid constraints {constraints:?} in service {service:?}: {source}")]
    ServiceConstraints {
        service: String,
        constraints: String,
        source: Box<BundleError>,
    },

    #[error("invalid constraints {constraints:?} in machine {machine:?}: {source}")]
    MachineConstraints {
        machine: String,
        constraints: String,
        source: Box<BundleError>,
    },

    #[error("relation {relation:?} has {count} endpoint(s), expected 2")]
    RelationArity { relation: String, count: usize },

    #[error("relation {relation:?} refers to service {service:?} not defined in this bundle")]
    UnknownRelationService { relation: String, service: String },

    #[error("invalid placement {placement:?}")]
    InvalidPlacement { placement: String },

    #[error("invalid container type {container:?}")]
    InvalidContainerType { container: String },

    #[error("placement {placement:?} in service {service:?} refers to a machine not defined in this bundle")]
    UnknownPlacementMachine { placement: String, service: String },

    #[error("placement {placement:?} in service {service:?} refers to a service not defined in this bundle")]
    UnknownPlacementService { placement: String, service: String },

    #[error("placement {placement:?} in service {service:?} specifies a unit greater than the {units} unit(s) started by service {target:?}")]
    PlacementUnitOutOfRange {
        placement: String,
        service: String,
        target: String,
        units: i64,
    },

    #[error("too many units specified in unit placement for service {service:?}")]
    TooManyPlacements { service: String },

    #[error("machine {machine:?} is not referred to by a placement directive")]
    UnreferencedMachine { machine: String },

    #[error("cyclic placement detected for service {service:?}")]
    PlacementCycle { service: String },
}

pub type BundleResult<T> = Result<T, BundleError>;
