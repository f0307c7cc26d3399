//! Semantic bundle validation.
//!
//! Decoding only proves the YAML had the right shape; validation proves
//! the bundle can be planned: every reference resolves, counts are sane,
//! and placement directives form no cycles. All checks run before any
//! remote call, and the first failure (in deterministic order) is
//! returned.

use std::collections::{BTreeMap, BTreeSet};

use crate::charm::CharmUrl;
use crate::error::{BundleError, BundleResult};
use crate::model::BundleData;
use crate::placement::UnitPlacement;

impl BundleData {
    /// Run all semantic checks. Constraint strings are validated through
    /// the supplied parser so the caller decides what a constraint is.
    pub fn validate<F>(&self, verify_constraints: F) -> BundleResult<()>
    where
        F: Fn(&str) -> BundleResult<()>,
    {
        self.check_services(&verify_constraints)?;
        self.check_relations()?;
        self.check_machines(&verify_constraints)?;
        self.check_placements()
    }

    fn check_services<F>(&self, verify_constraints: &F) -> BundleResult<()>
    where
        F: Fn(&str) -> BundleResult<()>,
    {
        for (name, spec) in &self.services {
            let url = CharmUrl::parse(&spec.charm)?;
            if url.is_bundle() {
                return Err(BundleError::BundleUrl {
                    charm: spec.charm.clone(),
                });
            }
            if spec.num_units < 0 {
                return Err(BundleError::NegativeUnits {
                    service: name.clone(),
                });
            }
            if !spec.constraints.is_empty() {
                verify_constraints(&spec.constraints).map_err(|e| {
                    BundleError::ServiceConstraints {
                        service: name.clone(),
                        constraints: spec.constraints.clone(),
                        source: Box::new(e),
                    }
                })?;
            }
            if spec.to.len() as i64 > spec.num_units {
                return Err(BundleError::TooManyPlacements {
                    service: name.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_relations(&self) -> BundleResult<()> {
        for relation in &self.relations {
            if relation.len() != 2 {
                return Err(BundleError::RelationArity {
                    relation: format!("{relation:?}"),
                    count: relation.len(),
                });
            }
            for endpoint in relation {
                let service = endpoint.split(':').next().unwrap_or_default();
                if !self.services.contains_key(service) {
                    return Err(BundleError::UnknownRelationService {
                        relation: format!("{relation:?}"),
                        service: service.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_machines<F>(&self, verify_constraints: &F) -> BundleResult<()>
    where
        F: Fn(&str) -> BundleResult<()>,
    {
        for (label, spec) in &self.machines {
            if !spec.constraints.is_empty() {
                verify_constraints(&spec.constraints).map_err(|e| {
                    BundleError::MachineConstraints {
                        machine: label.clone(),
                        constraints: spec.constraints.clone(),
                        source: Box::new(e),
                    }
                })?;
            }
        }
        Ok(())
    }

    fn check_placements(&self) -> BundleResult<()> {
        let mut referenced = BTreeSet::new();
        // service → services it is co-located on, for cycle detection.
        let mut colocations: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for (name, spec) in &self.services {
            for directive in &spec.to {
                let placement = UnitPlacement::parse(directive)?;
                if let Some(machine) = &placement.machine {
                    if machine != "new" {
                        if !self.machines.contains_key(machine) {
                            return Err(BundleError::UnknownPlacementMachine {
                                placement: directive.clone(),
                                service: name.clone(),
                            });
                        }
                        referenced.insert(machine.clone());
                    }
                } else if let Some(target) = &placement.service {
                    let target_spec = self.services.get(target.as_str()).ok_or_else(|| {
                        BundleError::UnknownPlacementService {
                            placement: directive.clone(),
                            service: name.clone(),
                        }
                    })?;
                    // An explicit unit index must exist; a bare service
                    // target needs at least one unit to land on.
                    let needed = placement.unit.map_or(1, |unit| i64::from(unit) + 1);
                    if needed > target_spec.num_units {
                        return Err(BundleError::PlacementUnitOutOfRange {
                            placement: directive.clone(),
                            service: name.clone(),
                            target: target.clone(),
                            units: target_spec.num_units,
                        });
                    }
                    colocations
                        .entry(name.clone())
                        .or_default()
                        .insert(target.clone());
                }
            }
        }

        for label in self.machines.keys() {
            if !referenced.contains(label) {
                return Err(BundleError::UnreferencedMachine {
                    machine: label.clone(),
                });
            }
        }

        check_colocation_cycles(&colocations)
    }
}

/// Reject self-referential and circular co-location chains. A unit placed
/// on a service whose units are (transitively) placed back on it can
/// never be planned.
fn check_colocation_cycles(edges: &BTreeMap<String, BTreeSet<String>>) -> BundleResult<()> {
    fn visit<'a>(
        node: &'a str,
        edges: &'a BTreeMap<String, BTreeSet<String>>,
        in_progress: &mut BTreeSet<&'a str>,
        done: &mut BTreeSet<&'a str>,
    ) -> BundleResult<()> {
        if done.contains(node) {
            return Ok(());
        }
        if !in_progress.insert(node) {
            return Err(BundleError::PlacementCycle {
                service: node.to_string(),
            });
        }
        for next in edges.get(node).into_iter().flatten() {
            visit(next, edges, in_progress, done)?;
        }
        in_progress.remove(node);
        done.insert(node);
        Ok(())
    }

    let mut done = BTreeSet::new();
    for node in edges.keys() {
        visit(node, edges, &mut BTreeSet::new(), &mut done)?;
    }
    Ok(())
}
