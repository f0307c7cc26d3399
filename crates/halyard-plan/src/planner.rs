//! The change planner: bundle in, ordered change list out.
//!
//! Planning runs in phases over the validated bundle, each phase
//! appending changes to a single list with one global id counter:
//!
//! 1. services — an `addCharm` for each first-seen charm reference,
//!    then the service's `deploy` (and its annotations);
//! 2. machines — one `addMachines` per declared label (and annotations);
//! 3. relations — one `addRelation` per declared relation;
//! 4. units — one `addUnit` per desired unit, then a placement pass
//!    that rewrites placed units and creates the container and
//!    new-machine `addMachines` changes placement calls for.
//!
//! The final order is a dependency sort over that list: pop the front
//! change, re-queue it while any prerequisite is still unmet, emit it
//! otherwise. The rotation is deterministic, so identical bundles
//! always produce identical ids in identical order.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use halyard_bundle::{BundleData, BundleResult, UnitPlacement};

use crate::change::{
    AddCharmParams, AddMachineParams, AddRelationParams, AddServiceParams, AddUnitParams,
    Change, ChangeKind, EndpointRef, EntityKind, Placeholder, SetAnnotationsParams, UnitTarget,
};

/// Plan the changes required to deploy `data`.
///
/// The bundle must have passed [`BundleData::validate`]; planning relies
/// on every cross-reference (machines, services, unit indexes) resolving.
pub fn plan(data: &BundleData) -> BundleResult<Vec<Change>> {
    let mut cs = Changeset::default();
    let deployed = handle_services(&mut cs, data);
    let machines = handle_machines(&mut cs, data);
    handle_relations(&mut cs, data, &deployed);
    handle_units(&mut cs, data, &deployed, &machines)?;
    Ok(cs.sorted())
}

#[derive(Default)]
struct Changeset {
    changes: Vec<Change>,
}

impl Changeset {
    fn add(&mut self, kind: ChangeKind, requires: Vec<String>) -> String {
        let id = format!("{}-{}", kind.method(), self.changes.len());
        self.changes.push(Change {
            id: id.clone(),
            kind,
            requires,
        });
        id
    }

    /// Dependency sort preserving insertion order among ready changes.
    fn sorted(self) -> Vec<Change> {
        let mut queue: VecDeque<Change> = self.changes.into();
        let mut emitted: BTreeSet<String> = BTreeSet::new();
        let mut sorted = Vec::with_capacity(queue.len());
        while let Some(change) = queue.pop_front() {
            if change
                .requires
                .iter()
                .any(|required| !emitted.contains(required))
            {
                // Not ready yet: retry after the changes it waits for.
                queue.push_back(change);
                continue;
            }
            emitted.insert(change.id.clone());
            sorted.push(change);
        }
        sorted
    }
}

/// Emit charm and deploy changes, returning service name → deploy id.
fn handle_services(cs: &mut Changeset, data: &BundleData) -> BTreeMap<String, String> {
    let mut charms: BTreeMap<String, String> = BTreeMap::new();
    let mut deployed = BTreeMap::new();
    for (name, spec) in &data.services {
        if !charms.contains_key(&spec.charm) {
            let id = cs.add(
                ChangeKind::AddCharm(AddCharmParams {
                    charm: spec.charm.clone(),
                }),
                Vec::new(),
            );
            charms.insert(spec.charm.clone(), id);
        }
        let charm_id = charms[&spec.charm].clone();
        let deploy_id = cs.add(
            ChangeKind::AddService(AddServiceParams {
                charm: Placeholder::new(charm_id.clone()),
                service: name.clone(),
                options: spec.options.clone(),
                constraints: spec.constraints.clone(),
            }),
            vec![charm_id],
        );
        if !spec.annotations.is_empty() {
            cs.add(
                ChangeKind::SetAnnotations(SetAnnotationsParams {
                    entity: Placeholder::new(deploy_id.clone()),
                    entity_kind: EntityKind::Service,
                    annotations: spec.annotations.clone(),
                }),
                vec![deploy_id.clone()],
            );
        }
        deployed.insert(name.clone(), deploy_id);
    }
    deployed
}

/// Emit one machine change per declared label, returning label → id.
fn handle_machines(cs: &mut Changeset, data: &BundleData) -> BTreeMap<String, String> {
    let mut machines = BTreeMap::new();
    for (label, spec) in &data.machines {
        let id = cs.add(
            ChangeKind::AddMachine(AddMachineParams {
                series: spec.series.clone(),
                constraints: spec.constraints.clone(),
                container_type: None,
                parent: None,
            }),
            Vec::new(),
        );
        if !spec.annotations.is_empty() {
            cs.add(
                ChangeKind::SetAnnotations(SetAnnotationsParams {
                    entity: Placeholder::new(id.clone()),
                    entity_kind: EntityKind::Machine,
                    annotations: spec.annotations.clone(),
                }),
                vec![id.clone()],
            );
        }
        machines.insert(label.clone(), id);
    }
    machines
}

fn handle_relations(cs: &mut Changeset, data: &BundleData, deployed: &BTreeMap<String, String>) {
    for relation in &data.relations {
        let endpoints: Vec<EndpointRef> = relation
            .iter()
            .map(|endpoint| {
                let (service, name) = match endpoint.split_once(':') {
                    Some((service, name)) => (service, Some(name.to_string())),
                    None => (endpoint.as_str(), None),
                };
                EndpointRef {
                    service: Placeholder::new(deployed[service].clone()),
                    relation: name,
                }
            })
            .collect();
        let mut requires: Vec<String> = endpoints
            .iter()
            .map(|ep| ep.service.change_id().to_string())
            .collect();
        requires.dedup();
        cs.add(
            ChangeKind::AddRelation(AddRelationParams {
                endpoint1: endpoints[0].clone(),
                endpoint2: endpoints[1].clone(),
            }),
            requires,
        );
    }
}

/// Emit unit changes, then rewrite them with placement targets.
fn handle_units(
    cs: &mut Changeset,
    data: &BundleData,
    deployed: &BTreeMap<String, String>,
    machines: &BTreeMap<String, String>,
) -> BundleResult<()> {
    // First pass: every desired unit, unplaced. Keyed by the unit name
    // the bundle would give it (`svc/i`) so placement can refer back.
    let mut unit_changes: BTreeMap<String, usize> = BTreeMap::new();
    for name in data.services.keys() {
        let deploy_id = &deployed[name];
        for i in 0..data.unit_count(name) {
            cs.add(
                ChangeKind::AddUnit(AddUnitParams {
                    service: Placeholder::new(deploy_id.clone()),
                    to: None,
                }),
                vec![deploy_id.clone()],
            );
            unit_changes.insert(format!("{name}/{i}"), cs.changes.len() - 1);
        }
    }

    // Placement pass. The i-th unit takes the i-th directive, with the
    // last directive repeated when units outnumber directives.
    for (name, spec) in &data.services {
        let Some(last) = spec.to.last() else { continue };
        // Units of this service already co-located on each target
        // service by bare-service directives.
        let mut placed: BTreeMap<String, usize> = BTreeMap::new();
        for i in 0..data.unit_count(name) {
            let directive = spec.to.get(i).unwrap_or(last);
            let placement = UnitPlacement::parse(directive)?;
            let (target, new_requires) =
                place_unit(cs, data, &placement, &unit_changes, machines, &mut placed);
            let change = &mut cs.changes[unit_changes[&format!("{name}/{i}")]];
            if let ChangeKind::AddUnit(params) = &mut change.kind {
                params.to = Some(target);
            }
            change.requires.extend(new_requires);
        }
    }
    Ok(())
}

/// Turn one placement directive into a unit target, creating the
/// machine change it needs (a container, or an explicitly requested new
/// machine) as a side effect.
fn place_unit(
    cs: &mut Changeset,
    data: &BundleData,
    placement: &UnitPlacement,
    unit_changes: &BTreeMap<String, usize>,
    machines: &BTreeMap<String, String>,
    placed: &mut BTreeMap<String, usize>,
) -> (UnitTarget, Vec<String>) {
    if let Some(machine) = &placement.machine {
        if machine == "new" {
            let id = cs.add(
                ChangeKind::AddMachine(AddMachineParams {
                    series: None,
                    constraints: String::new(),
                    container_type: placement.container.clone(),
                    parent: None,
                }),
                Vec::new(),
            );
            return (UnitTarget::to(Placeholder::new(id.clone())), vec![id]);
        }
        let machine_id = machines[machine].clone();
        return match &placement.container {
            Some(container) => {
                let id = cs.add(
                    ChangeKind::AddMachine(AddMachineParams {
                        series: None,
                        constraints: String::new(),
                        container_type: Some(container.clone()),
                        parent: Some(Placeholder::new(machine_id.clone())),
                    }),
                    vec![machine_id],
                );
                (UnitTarget::to(Placeholder::new(id.clone())), vec![id])
            }
            None => (
                UnitTarget::to(Placeholder::new(machine_id.clone())),
                vec![machine_id],
            ),
        };
    }

    // Co-location on another service's unit. Bare-service directives
    // consume target units in order, wrapping around the declared count.
    let service = placement.service.as_deref().unwrap_or_default();
    let index = match placement.unit {
        Some(index) => index as usize,
        None => {
            let counter = placed.entry(service.to_string()).or_insert(0);
            let index = *counter % data.unit_count(service).max(1);
            *counter += 1;
            index
        }
    };
    let unit_id = cs.changes[unit_changes[&format!("{service}/{index}")]]
        .id
        .clone();
    match &placement.container {
        Some(container) => {
            let id = cs.add(
                ChangeKind::AddMachine(AddMachineParams {
                    series: None,
                    constraints: String::new(),
                    container_type: Some(container.clone()),
                    parent: Some(Placeholder::new(unit_id.clone())),
                }),
                vec![unit_id],
            );
            (UnitTarget::to(Placeholder::new(id.clone())), vec![id])
        }
        None => (
            UnitTarget::to(Placeholder::new(unit_id.clone())),
            vec![unit_id],
        ),
    }
}
