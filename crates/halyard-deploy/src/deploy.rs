//! The change applicator.
//!
//! Applies a planned change list against the live model, in order, one
//! change at a time. Every handler is idempotent: deploying the same
//! bundle twice converges to the same model and the second run reports
//! what it reused or avoided instead of acting again.
//!
//! The deployment is not transactional. A terminal error leaves every
//! previously applied change live; re-running the same bundle is the
//! recovery path.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use tracing::debug;

use halyard_api::{
    AddMachineArgs, CharmSource, ModelClient, ServiceDeployArgs,
};
use halyard_bundle::{
    is_valid_unit_name, BundleData, BundleError, CharmUrl, Constraints, ContainerType,
};
use halyard_plan::{
    plan, AddCharmParams, AddMachineParams, AddRelationParams, AddServiceParams, AddUnitParams,
    Change, ChangeKind, Placeholder, SetAnnotationsParams, UnitTarget,
};

use crate::error::{DeployError, DeployResult};
use crate::progress::Progress;
use crate::results::ResultsTable;
use crate::tracker::UnitTracker;

/// How long placement resolution waits for the watcher to report a
/// unit's machine before the deployment fails.
const UNIT_ASSIGNMENT_WAIT: Duration = Duration::from_secs(60);

/// Validate, plan and apply `data` against the model behind `client`.
///
/// Progress lines are emitted in the exact order changes are processed.
/// On error the model keeps whatever has been applied so far.
pub async fn deploy_bundle(
    data: &BundleData,
    client: &dyn ModelClient,
    charms: &dyn CharmSource,
    progress: &dyn Progress,
) -> DeployResult<()> {
    data.validate(|s| Constraints::parse(s).map(|_| ()))?;
    let changes = plan(data)?;

    // Seed the unit view from one snapshot, then follow the stream.
    let status = client.status().await.map_err(DeployError::Status)?;
    let mut seed = HashMap::new();
    for service in status.services.values() {
        for (unit, info) in &service.units {
            seed.insert(unit.clone(), info.machine.clone());
        }
    }
    let watcher = client.watch_all().await.map_err(DeployError::Watch)?;
    let tracker = UnitTracker::start(watcher, seed);

    let mut deployer = Deployer {
        changes: &changes,
        data,
        client,
        charms,
        progress,
        tracker: &tracker,
        results: ResultsTable::default(),
        ignored_machines: BTreeSet::new(),
        ignored_units: BTreeSet::new(),
    };
    let result = deployer.run().await;
    tracker.stop().await;
    result
}

/// Per-deployment state: the change list, the results table, and the
/// guards that keep "avoid ..." reported once per service.
struct Deployer<'a> {
    changes: &'a [Change],
    data: &'a BundleData,
    client: &'a dyn ModelClient,
    charms: &'a dyn CharmSource,
    progress: &'a dyn Progress,
    tracker: &'a UnitTracker,
    results: ResultsTable,
    ignored_machines: BTreeSet<String>,
    ignored_units: BTreeSet<String>,
}

impl Deployer<'_> {
    async fn run(&mut self) -> DeployResult<()> {
        for change in self.changes {
            debug!(change = %change.id, method = change.method(), "applying change");
            match &change.kind {
                ChangeKind::AddCharm(p) => self.add_charm(&change.id, p).await?,
                ChangeKind::AddService(p) => self.add_service(&change.id, p).await?,
                ChangeKind::AddMachine(p) => self.add_machine(&change.id, p).await?,
                ChangeKind::AddUnit(p) => self.add_unit(&change.id, p).await?,
                ChangeKind::AddRelation(p) => self.add_relation(&change.id, p).await?,
                ChangeKind::SetAnnotations(p) => self.set_annotations(&change.id, p)?,
            }
        }
        Ok(())
    }

    /// Resolve the charm reference and add the charm to the model,
    /// acquiring a charm-scoped macaroon when the store asks for one.
    async fn add_charm(&mut self, id: &str, p: &AddCharmParams) -> DeployResult<()> {
        let resolved = self
            .charms
            .resolve(&p.charm)
            .await
            .map_err(|source| DeployError::ResolveCharm {
                url: p.charm.clone(),
                source,
            })?;
        if resolved.is_bundle() {
            return Err(BundleError::BundleUrl {
                charm: p.charm.clone(),
            }
            .into());
        }
        let url = resolved.to_string();
        match self.client.add_charm(&url).await {
            Ok(()) => {}
            Err(err) if err.is_discharge_required() => {
                let macaroon = self
                    .charms
                    .delegatable_macaroon(&resolved)
                    .await
                    .map_err(|source| DeployError::AddCharm {
                        charm: p.charm.clone(),
                        source,
                    })?;
                self.client
                    .add_charm_with_authorization(&url, &macaroon)
                    .await
                    .map_err(|source| DeployError::AddCharm {
                        charm: p.charm.clone(),
                        source,
                    })?;
            }
            Err(source) => {
                return Err(DeployError::AddCharm {
                    charm: p.charm.clone(),
                    source,
                });
            }
        }
        self.progress.info(format!("added charm {url}"));
        self.results.record(id, url);
        Ok(())
    }

    /// Deploy a service with no units, or reconcile with an existing
    /// one: reuse it when the charm matches, upgrade it when only the
    /// revision differs, fail when the charms are incompatible.
    async fn add_service(&mut self, id: &str, p: &AddServiceParams) -> DeployResult<()> {
        let charm = self.results.resolve(&p.charm);
        let args = ServiceDeployArgs {
            charm_url: charm.clone(),
            service: p.service.clone(),
            num_units: 0,
            constraints: p.constraints.clone(),
            ..Default::default()
        };
        match self.client.service_deploy(args).await {
            Ok(()) => {
                self.progress
                    .info(format!("service {} deployed (charm: {charm})", p.service));
            }
            Err(err) if err.is_service_already_deployed() => {
                self.upgrade_charm(&p.service, &charm).await.map_err(|e| {
                    DeployError::UpgradeService {
                        service: p.service.clone(),
                        source: Box::new(e),
                    }
                })?;
            }
            Err(source) => {
                return Err(DeployError::DeployService {
                    service: p.service.clone(),
                    source,
                });
            }
        }
        if !p.options.is_empty() {
            self.set_service_options(&p.service, &p.options).await?;
            self.progress
                .info(format!("service {} configured", p.service));
        }
        self.results.record(id, p.service.clone());
        Ok(())
    }

    /// Create a machine or container, unless the service it is meant to
    /// host already has all its units.
    async fn add_machine(&mut self, id: &str, p: &AddMachineParams) -> DeployResult<()> {
        let service = self.service_for_machine_change(id);
        let existing = self.tracker.machines_for_service(&service).await;
        if existing.len() >= self.data.unit_count(&service) {
            if self.ignored_machines.insert(service.clone()) {
                self.progress.info(format!(
                    "avoid creating other machines to host {service} units: {}",
                    existing_units_message(existing.len())
                ));
            }
            // Later changes may still depend on this one; give them one
            // of the machines already hosting the service.
            self.results.record(id, pick_existing(&existing));
            return Ok(());
        }

        let constraints = Constraints::parse(&p.constraints)?;
        let mut args = AddMachineArgs {
            series: p.series.clone(),
            constraints: constraints.to_string(),
            container_type: None,
            parent_id: String::new(),
        };
        if let Some(container) = &p.container_type {
            let container: ContainerType =
                container
                    .parse()
                    .map_err(|e: BundleError| DeployError::CreateMachine {
                        service: service.clone(),
                        source: Box::new(e.into()),
                    })?;
            args.container_type = Some(container);
            if let Some(parent) = &p.parent {
                args.parent_id = self.resolve_machine(parent).await.map_err(|e| {
                    DeployError::ParentPlacement {
                        service: service.clone(),
                        source: Box::new(e),
                    }
                })?;
            }
        }
        let results = self
            .client
            .add_machines(vec![args.clone()])
            .await
            .map_err(|source| DeployError::CreateMachine {
                service: service.clone(),
                source: Box::new(source.into()),
            })?;
        let entry = results.into_iter().next().unwrap_or_default();
        if let Some(message) = entry.error {
            return Err(DeployError::CreateMachine {
                service: service.clone(),
                source: Box::new(halyard_api::ApiError::other(message).into()),
            });
        }
        let machine = entry.machine;
        if p.container_type.is_none() {
            self.progress.info(format!(
                "created new machine {machine} for holding {service} unit"
            ));
        } else if args.parent_id.is_empty() {
            self.progress.info(format!(
                "created {machine} container in new machine for holding {service} unit"
            ));
        } else {
            self.progress.info(format!(
                "created {machine} container in machine {} for holding {service} unit",
                args.parent_id
            ));
        }
        self.results.record(id, machine);
        Ok(())
    }

    /// Add one unit, unless the service already has all its units.
    async fn add_unit(&mut self, id: &str, p: &AddUnitParams) -> DeployResult<()> {
        let service = self.results.resolve(&p.service);
        let existing = self.tracker.machines_for_service(&service).await;
        if existing.len() >= self.data.unit_count(&service) {
            if self.ignored_units.insert(service.clone()) {
                self.progress.info(format!(
                    "avoid adding new units to service {service}: {}",
                    existing_units_message(existing.len())
                ));
            }
            self.results.record(id, pick_existing(&existing));
            return Ok(());
        }

        let machine_spec = match &p.to {
            Some(target) => {
                self.resolve_unit_target(target)
                    .await
                    .map_err(|e| DeployError::UnitPlacement {
                        service: service.clone(),
                        source: Box::new(e),
                    })?
            }
            None => String::new(),
        };
        let units = self
            .client
            .add_service_units(&service, 1, &machine_spec)
            .await
            .map_err(|source| DeployError::AddUnit {
                service: service.clone(),
                source,
            })?;
        let unit = units.into_iter().next().unwrap_or_default();
        if machine_spec.is_empty() {
            self.progress.info(format!("added {unit} unit to new machine"));
            // Record the unit name; its machine id is learned lazily
            // from the watcher only if something needs it.
            self.results.record(id, unit.clone());
        } else {
            self.progress
                .info(format!("added {unit} unit to machine {machine_spec}"));
            self.results.record(id, machine_spec.clone());
        }
        self.tracker.record(&unit, &machine_spec).await;
        Ok(())
    }

    /// Relate two endpoints; an already existing relation is reported
    /// and skipped.
    async fn add_relation(&mut self, _id: &str, p: &AddRelationParams) -> DeployResult<()> {
        let endpoint1 = self.results.resolve_endpoint(&p.endpoint1);
        let endpoint2 = self.results.resolve_endpoint(&p.endpoint2);
        match self.client.add_relation(&endpoint1, &endpoint2).await {
            Ok(()) => {
                self.progress
                    .info(format!("related {endpoint1} and {endpoint2}"));
                Ok(())
            }
            Err(err) if err.is_relation_already_present() => {
                self.progress
                    .info(format!("{endpoint1} and {endpoint2} are already related"));
                Ok(())
            }
            Err(source) => Err(DeployError::AddRelation {
                endpoint1,
                endpoint2,
                source,
            }),
        }
    }

    /// Required but inert: the control plane has no annotations
    /// operation yet.
    fn set_annotations(&mut self, id: &str, p: &SetAnnotationsParams) -> DeployResult<()> {
        debug!(
            change = %id,
            entity = %p.entity.token(),
            kind = p.entity_kind.as_str(),
            "annotations not applied: no control-plane operation"
        );
        Ok(())
    }

    /// Upgrade the charm of an existing service, or report reuse when
    /// the charm already matches. Charms are compatible only when their
    /// revisionless paths are equal.
    async fn upgrade_charm(&mut self, service: &str, charm: &str) -> DeployResult<()> {
        let existing = self
            .client
            .service_get_charm_url(service)
            .await
            .map_err(|source| DeployError::ServiceInfo {
                service: service.to_string(),
                source,
            })?;
        if existing == charm {
            self.progress
                .info(format!("reusing service {service} (charm: {charm})"));
            return Ok(());
        }
        let new_url = CharmUrl::parse(charm)?;
        let existing_url = CharmUrl::parse(&existing)?;
        if new_url.without_revision().path() != existing_url.without_revision().path() {
            return Err(DeployError::IncompatibleCharm {
                bundle: charm.to_string(),
                existing,
            });
        }
        self.client
            .service_set_charm(service, charm, false)
            .await
            .map_err(|source| DeployError::SetCharm {
                charm: charm.to_string(),
                source,
            })?;
        self.progress.info(format!(
            "upgraded charm for existing service {service} (from {existing} to {charm})"
        ));
        Ok(())
    }

    /// Set service options as a `{service: {option: value}}` document.
    async fn set_service_options(
        &mut self,
        service: &str,
        options: &BTreeMap<String, serde_yaml::Value>,
    ) -> DeployResult<()> {
        let mut document = BTreeMap::new();
        document.insert(service.to_string(), options.clone());
        let config_yaml =
            serde_yaml::to_string(&document).map_err(|source| DeployError::MarshalOptions {
                service: service.to_string(),
                source,
            })?;
        self.client
            .service_set_yaml(service, &config_yaml)
            .await
            .map_err(|source| DeployError::SetOptions {
                service: service.to_string(),
                source,
            })
    }

    /// The service whose units a machine change exists to host: follow
    /// the change graph from the machine change to the unit that is
    /// placed on it. Machine changes are only ever planned for unit
    /// placement, so the walk always ends at an `addUnit`.
    fn service_for_machine_change(&self, id: &str) -> String {
        for change in self.changes {
            if !change.requires.iter().any(|required| required == id) {
                continue;
            }
            match &change.kind {
                // A container whose parent is this machine: keep
                // walking from the container change.
                ChangeKind::AddMachine(_) => return self.service_for_machine_change(&change.id),
                ChangeKind::AddUnit(p) => return self.results.resolve(&p.service),
                // Machine annotations depend on the machine change but
                // say nothing about placement.
                ChangeKind::SetAnnotations(_) => continue,
                _ => unreachable!(
                    "change {} cannot depend on machine change {id}",
                    change.id
                ),
            }
        }
        unreachable!("machine change {id} has no dependent unit")
    }

    /// Resolve a unit target to a machine spec, re-attaching any
    /// container prefix.
    async fn resolve_unit_target(&self, target: &UnitTarget) -> DeployResult<String> {
        let machine = self.resolve_machine(&target.target).await?;
        Ok(match &target.container {
            Some(container) => format!("{container}:{machine}"),
            None => machine,
        })
    }

    /// Resolve a machine-or-unit placeholder to a machine id. A unit
    /// name resolves through the tracker, waiting for the stream to
    /// report the unit's machine; anything else (including the empty
    /// string, meaning "allocate a new machine") passes through.
    async fn resolve_machine(&self, placeholder: &Placeholder) -> DeployResult<String> {
        let value = self.results.resolve(placeholder);
        if !is_valid_unit_name(&value) {
            return Ok(value);
        }
        self.tracker
            .wait_for_unit(&value, UNIT_ASSIGNMENT_WAIT)
            .await
    }
}

/// Deterministic stand-in result for a skipped machine or unit change:
/// the smallest machine id already hosting the service, so re-runs
/// trace identically.
fn pick_existing(machines: &[String]) -> String {
    machines
        .iter()
        .find(|machine| !machine.is_empty())
        .cloned()
        .unwrap_or_default()
}

fn existing_units_message(count: usize) -> String {
    if count == 1 {
        "1 unit already present".to_string()
    } else {
        format!("{count} units already present")
    }
}
