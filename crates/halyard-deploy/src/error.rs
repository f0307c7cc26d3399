//! Deployment error types.
//!
//! Every variant carries the context a user needs to locate the failing
//! change; the control-plane cause is embedded in the message so the
//! single error line the CLI prints tells the whole story.

use halyard_api::ApiError;
use halyard_bundle::BundleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("cannot get model status: {0}")]
    Status(ApiError),

    #[error("cannot watch model: {0}")]
    Watch(ApiError),

    #[error("cannot resolve URL {url:?}: {source}")]
    ResolveCharm { url: String, source: ApiError },

    #[error("cannot add charm {charm:?}: {source}")]
    AddCharm { charm: String, source: ApiError },

    #[error("cannot deploy service {service:?}: {source}")]
    DeployService { service: String, source: ApiError },

    #[error("cannot upgrade service {service:?}: {source}")]
    UpgradeService {
        service: String,
        source: Box<DeployError>,
    },

    #[error("cannot retrieve info for service {service:?}: {source}")]
    ServiceInfo { service: String, source: ApiError },

    #[error("bundle charm {bundle:?} is incompatible with existing charm {existing:?}")]
    IncompatibleCharm { bundle: String, existing: String },

    #[error("cannot upgrade charm to {charm:?}: {source}")]
    SetCharm { charm: String, source: ApiError },

    #[error("cannot marshal options for service {service:?}: {source}")]
    MarshalOptions {
        service: String,
        source: serde_yaml::Error,
    },

    #[error("cannot set options for service {service:?}: {source}")]
    SetOptions { service: String, source: ApiError },

    #[error("cannot create machine for hosting {service:?} unit: {source}")]
    CreateMachine {
        service: String,
        source: Box<DeployError>,
    },

    #[error("cannot retrieve parent placement for {service:?} unit: {source}")]
    ParentPlacement {
        service: String,
        source: Box<DeployError>,
    },

    #[error("cannot retrieve placement for {service:?} unit: {source}")]
    UnitPlacement {
        service: String,
        source: Box<DeployError>,
    },

    #[error("cannot add unit for service {service:?}: {source}")]
    AddUnit { service: String, source: ApiError },

    #[error("cannot add relation between {endpoint1:?} and {endpoint2:?}: {source}")]
    AddRelation {
        endpoint1: String,
        endpoint2: String,
        source: ApiError,
    },

    #[error("cannot update model status: watcher stopped")]
    WatcherStopped,

    #[error("timed out waiting for unit {unit:?} to be assigned a machine")]
    WaitUnit { unit: String },
}

pub type DeployResult<T> = Result<T, DeployError>;
