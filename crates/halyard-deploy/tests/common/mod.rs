//! An in-memory model and charm store for deployment tests.
//!
//! Implements both client interfaces over one shared state so a test
//! can seed charms, run deployments, and assert on the resulting model.
//! Unit and machine ids are allocated the way the real control plane
//! does: sequential machine numbers, `parent/<type>/<n>` containers,
//! `service/<n>` units.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use halyard_api::{
    AddMachineArgs, AddMachineResult, ApiError, ApiResult, CharmSource, Delta, ErrorCode,
    Macaroon, ModelClient, ModelStatus, ModelWatcher, ServiceStatus, UnitStatus,
};
use halyard_bundle::CharmUrl;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct FakeService {
    charm: String,
    config: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Default)]
struct ModelState {
    /// Published charms, resolvable by reference.
    store: Vec<CharmUrl>,
    /// Charm URLs that require a macaroon discharge.
    gated: BTreeSet<String>,
    /// Macaroons handed out, for assertions.
    macaroons: Vec<String>,
    /// Charms added to the model.
    charms: BTreeSet<String>,
    services: BTreeMap<String, FakeService>,
    /// unit name → machine id.
    units: BTreeMap<String, String>,
    machines: BTreeSet<String>,
    relations: Vec<(String, String)>,
    /// Machine specs received, for assertions.
    machine_args: Vec<AddMachineArgs>,
    next_machine: u32,
    containers: BTreeMap<String, u32>,
    unit_counter: BTreeMap<String, u32>,
    watchers: Vec<mpsc::UnboundedSender<Vec<Delta>>>,
}

/// The fake control plane + charm store.
#[derive(Clone, Default)]
pub struct FakeModel {
    state: Arc<Mutex<ModelState>>,
}

impl FakeModel {
    pub fn new() -> FakeModel {
        FakeModel::default()
    }

    fn lock(&self) -> MutexGuard<'_, ModelState> {
        self.state.lock().expect("model lock poisoned")
    }

    /// Publish a charm so references to it resolve.
    pub fn upload_charm(&self, url: &str) {
        let url = CharmUrl::parse(url).expect("bad charm URL in test");
        self.lock().store.push(url);
    }

    /// Make a published charm require a macaroon discharge.
    pub fn gate_charm(&self, url: &str) {
        self.lock().gated.insert(url.to_string());
    }

    /// Seed an existing service with one unit on a fresh machine.
    pub fn seed_service(&self, name: &str, charm: &str) {
        let mut state = self.lock();
        state.charms.insert(charm.to_string());
        state.services.insert(
            name.to_string(),
            FakeService {
                charm: charm.to_string(),
                config: BTreeMap::new(),
            },
        );
        let machine = state.next_machine.to_string();
        state.next_machine += 1;
        state.machines.insert(machine.clone());
        state.units.insert(format!("{name}/0"), machine);
        state.unit_counter.insert(name.to_string(), 1);
    }

    pub fn charms_in_model(&self) -> Vec<String> {
        self.lock().charms.iter().cloned().collect()
    }

    pub fn service_charm(&self, name: &str) -> Option<String> {
        self.lock().services.get(name).map(|s| s.charm.clone())
    }

    pub fn service_config(&self, name: &str) -> BTreeMap<String, serde_yaml::Value> {
        self.lock()
            .services
            .get(name)
            .map(|s| s.config.clone())
            .unwrap_or_default()
    }

    pub fn unit_machines(&self) -> BTreeMap<String, String> {
        self.lock().units.clone()
    }

    pub fn relations(&self) -> Vec<(String, String)> {
        self.lock().relations.clone()
    }

    pub fn machine_args(&self) -> Vec<AddMachineArgs> {
        self.lock().machine_args.clone()
    }

    pub fn issued_macaroons(&self) -> Vec<String> {
        self.lock().macaroons.clone()
    }
}

fn new_top_machine(state: &mut ModelState) -> String {
    let machine = state.next_machine.to_string();
    state.next_machine += 1;
    state.machines.insert(machine.clone());
    machine
}

fn broadcast(state: &mut ModelState, deltas: Vec<Delta>) {
    state
        .watchers
        .retain(|watcher| watcher.send(deltas.clone()).is_ok());
}

#[async_trait]
impl ModelClient for FakeModel {
    async fn status(&self) -> ApiResult<ModelStatus> {
        let state = self.lock();
        let mut status = ModelStatus::default();
        for (name, service) in &state.services {
            let mut units = BTreeMap::new();
            for (unit, machine) in &state.units {
                if unit.split('/').next() == Some(name) {
                    units.insert(
                        unit.clone(),
                        UnitStatus {
                            machine: machine.clone(),
                        },
                    );
                }
            }
            status.services.insert(
                name.clone(),
                ServiceStatus {
                    charm: service.charm.clone(),
                    units,
                },
            );
        }
        Ok(status)
    }

    async fn add_charm(&self, url: &str) -> ApiResult<()> {
        let mut state = self.lock();
        if state.gated.contains(url) {
            return Err(ApiError::new(
                ErrorCode::DischargeRequired,
                format!("cannot add charm {url:?}: discharge required"),
            ));
        }
        state.charms.insert(url.to_string());
        Ok(())
    }

    async fn add_charm_with_authorization(&self, url: &str, macaroon: &Macaroon) -> ApiResult<()> {
        let mut state = self.lock();
        if macaroon.as_str() != format!("is-entity {url}") {
            return Err(ApiError::new(
                ErrorCode::Unauthorized,
                format!("invalid macaroon for {url:?}"),
            ));
        }
        state.charms.insert(url.to_string());
        Ok(())
    }

    async fn service_deploy(&self, args: halyard_api::ServiceDeployArgs) -> ApiResult<()> {
        let mut state = self.lock();
        if state.services.contains_key(&args.service) {
            return Err(ApiError::new(
                ErrorCode::AlreadyExists,
                format!(
                    "cannot deploy service {:?}: service already exists",
                    args.service
                ),
            ));
        }
        if !state.charms.contains(&args.charm_url) {
            return Err(ApiError::not_found(format!(
                "charm {:?} not found in model",
                args.charm_url
            )));
        }
        state.services.insert(
            args.service.clone(),
            FakeService {
                charm: args.charm_url,
                config: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn service_set_yaml(&self, service: &str, config_yaml: &str) -> ApiResult<()> {
        let document: BTreeMap<String, BTreeMap<String, serde_yaml::Value>> =
            serde_yaml::from_str(config_yaml)
                .map_err(|e| ApiError::other(format!("invalid config YAML: {e}")))?;
        let options = document
            .get(service)
            .cloned()
            .ok_or_else(|| ApiError::other("config YAML does not name the service"))?;
        let mut state = self.lock();
        let entry = state
            .services
            .get_mut(service)
            .ok_or_else(|| ApiError::not_found(format!("service {service:?} not found")))?;
        entry.config.extend(options);
        Ok(())
    }

    async fn service_get_charm_url(&self, service: &str) -> ApiResult<String> {
        let state = self.lock();
        state
            .services
            .get(service)
            .map(|s| s.charm.clone())
            .ok_or_else(|| ApiError::not_found(format!("service {service:?} not found")))
    }

    async fn service_set_charm(&self, service: &str, url: &str, _force: bool) -> ApiResult<()> {
        let mut state = self.lock();
        let entry = state
            .services
            .get_mut(service)
            .ok_or_else(|| ApiError::not_found(format!("service {service:?} not found")))?;
        entry.charm = url.to_string();
        Ok(())
    }

    async fn add_machines(
        &self,
        machines: Vec<AddMachineArgs>,
    ) -> ApiResult<Vec<AddMachineResult>> {
        let mut state = self.lock();
        let mut results = Vec::with_capacity(machines.len());
        for args in machines {
            state.machine_args.push(args.clone());
            let machine = match args.container_type {
                Some(container) => {
                    let parent = if args.parent_id.is_empty() {
                        new_top_machine(&mut state)
                    } else {
                        args.parent_id.clone()
                    };
                    let key = format!("{parent}/{container}");
                    let index = state.containers.entry(key.clone()).or_insert(0);
                    let machine = format!("{key}/{index}");
                    *index += 1;
                    state.machines.insert(machine.clone());
                    machine
                }
                None => new_top_machine(&mut state),
            };
            results.push(AddMachineResult {
                machine,
                error: None,
            });
        }
        Ok(results)
    }

    async fn add_service_units(
        &self,
        service: &str,
        num_units: u32,
        machine_spec: &str,
    ) -> ApiResult<Vec<String>> {
        let mut state = self.lock();
        if !state.services.contains_key(service) {
            return Err(ApiError::not_found(format!(
                "service {service:?} not found"
            )));
        }
        let mut units = Vec::with_capacity(num_units as usize);
        for _ in 0..num_units {
            let index = state.unit_counter.entry(service.to_string()).or_insert(0);
            let unit = format!("{service}/{index}");
            *index += 1;
            let machine = if machine_spec.is_empty() {
                new_top_machine(&mut state)
            } else {
                state.machines.insert(machine_spec.to_string());
                machine_spec.to_string()
            };
            state.units.insert(unit.clone(), machine.clone());
            broadcast(
                &mut state,
                vec![Delta::Unit {
                    name: unit.clone(),
                    machine,
                }],
            );
            units.push(unit);
        }
        Ok(units)
    }

    async fn add_relation(&self, endpoint1: &str, endpoint2: &str) -> ApiResult<()> {
        let mut state = self.lock();
        let exists = state.relations.iter().any(|(a, b)| {
            (a == endpoint1 && b == endpoint2) || (a == endpoint2 && b == endpoint1)
        });
        if exists {
            return Err(ApiError::new(
                ErrorCode::RelationAlreadyExists,
                format!("cannot add relation {endpoint1:?} {endpoint2:?}: relation already exists"),
            ));
        }
        state
            .relations
            .push((endpoint1.to_string(), endpoint2.to_string()));
        Ok(())
    }

    async fn watch_all(&self) -> ApiResult<Box<dyn ModelWatcher>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().watchers.push(tx);
        Ok(Box::new(FakeWatcher { rx }))
    }
}

struct FakeWatcher {
    rx: mpsc::UnboundedReceiver<Vec<Delta>>,
}

#[async_trait]
impl ModelWatcher for FakeWatcher {
    async fn next(&mut self) -> ApiResult<Vec<Delta>> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| ApiError::other("watcher closed"))
    }

    async fn stop(&mut self) -> ApiResult<()> {
        self.rx.close();
        Ok(())
    }
}

#[async_trait]
impl CharmSource for FakeModel {
    async fn resolve(&self, charm_ref: &str) -> ApiResult<CharmUrl> {
        let wanted = CharmUrl::parse(charm_ref)
            .map_err(|e| ApiError::other(format!("invalid charm reference: {e}")))?;
        let state = self.lock();
        let mut candidates: Vec<&CharmUrl> = state
            .store
            .iter()
            .filter(|url| {
                url.schema == wanted.schema
                    && url.name == wanted.name
                    && url.user == wanted.user
                    && wanted
                        .series
                        .as_ref()
                        .map_or(true, |series| url.series.as_ref() == Some(series))
                    && wanted
                        .revision
                        .map_or(true, |revision| url.revision == Some(revision))
            })
            .collect();
        candidates.sort_by_key(|url| (url.series.clone(), url.revision));
        candidates
            .last()
            .map(|url| (*url).clone())
            .ok_or_else(|| ApiError::not_found("charm or bundle not found"))
    }

    async fn delegatable_macaroon(&self, url: &CharmUrl) -> ApiResult<Macaroon> {
        let token = format!("is-entity {url}");
        self.lock().macaroons.push(token.clone());
        Ok(Macaroon::new(token))
    }
}
