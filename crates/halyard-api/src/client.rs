//! The control-plane client interface.
//!
//! The deployment engine drives a remote model exclusively through
//! [`ModelClient`]; the concrete transport lives behind the trait (see
//! the `http` module for the REST client, and the deploy crate's test
//! suite for an in-memory model).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use halyard_bundle::ContainerType;

use crate::error::ApiResult;

/// Point-in-time view of the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelStatus {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceStatus>,
    #[serde(default)]
    pub machines: BTreeMap<String, MachineStatus>,
    #[serde(default)]
    pub relations: Vec<RelationStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub charm: String,
    #[serde(default)]
    pub units: BTreeMap<String, UnitStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitStatus {
    /// Id of the machine hosting the unit; empty while unassigned.
    #[serde(default)]
    pub machine: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineStatus {
    #[serde(default)]
    pub series: Option<String>,
}

/// A relation as two canonical endpoint strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationStatus {
    pub endpoints: Vec<String>,
}

/// Arguments for deploying a service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceDeployArgs {
    pub charm_url: String,
    pub service: String,
    pub num_units: u32,
    #[serde(default)]
    pub config_yaml: String,
    #[serde(default)]
    pub constraints: String,
    #[serde(default)]
    pub machine_spec: String,
}

/// Arguments for creating one machine or container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddMachineArgs {
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub constraints: String,
    #[serde(default)]
    pub container_type: Option<ContainerType>,
    /// Id of the machine hosting the container.
    #[serde(default)]
    pub parent_id: String,
}

/// Per-machine outcome of an add-machines call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddMachineResult {
    pub machine: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// One entry in the watcher's change stream. The tracker only consumes
/// unit deltas; everything else is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "lowercase")]
pub enum Delta {
    Unit { name: String, machine: String },
    Machine { id: String },
    Service { name: String },
}

/// A long-lived stream of model deltas.
#[async_trait]
pub trait ModelWatcher: Send {
    /// Block until the next batch of deltas arrives.
    async fn next(&mut self) -> ApiResult<Vec<Delta>>;

    /// Release the watcher on the control plane.
    async fn stop(&mut self) -> ApiResult<()>;
}

/// The control-plane operations the deployment engine needs.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn status(&self) -> ApiResult<ModelStatus>;

    async fn add_charm(&self, url: &str) -> ApiResult<()>;

    async fn add_charm_with_authorization(
        &self,
        url: &str,
        macaroon: &crate::charms::Macaroon,
    ) -> ApiResult<()>;

    async fn service_deploy(&self, args: ServiceDeployArgs) -> ApiResult<()>;

    /// Set service options from a `{service: {option: value}}` YAML
    /// document.
    async fn service_set_yaml(&self, service: &str, config_yaml: &str) -> ApiResult<()>;

    async fn service_get_charm_url(&self, service: &str) -> ApiResult<String>;

    async fn service_set_charm(&self, service: &str, url: &str, force: bool) -> ApiResult<()>;

    async fn add_machines(&self, machines: Vec<AddMachineArgs>)
        -> ApiResult<Vec<AddMachineResult>>;

    /// Add units to a service; an empty machine spec lets the control
    /// plane allocate new machines. Returns the new unit names.
    async fn add_service_units(
        &self,
        service: &str,
        num_units: u32,
        machine_spec: &str,
    ) -> ApiResult<Vec<String>>;

    async fn add_relation(&self, endpoint1: &str, endpoint2: &str) -> ApiResult<()>;

    async fn watch_all(&self) -> ApiResult<Box<dyn ModelWatcher>>;
}
