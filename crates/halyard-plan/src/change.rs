//! Typed change records.
//!
//! A change is one primitive operation against the model, with a unique
//! identifier and the identifiers of the changes it depends on. Change
//! parameters never embed raw `$id` sentinels: references to earlier
//! changes are [`Placeholder`] values, and the dollar-token form only
//! appears at the wire boundary (see the `wire` module).

use std::collections::BTreeMap;
use std::fmt;

/// A reference to the result of an earlier change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Placeholder(String);

impl Placeholder {
    pub fn new(change_id: impl Into<String>) -> Placeholder {
        Placeholder(change_id.into())
    }

    /// The referenced change id.
    pub fn change_id(&self) -> &str {
        &self.0
    }

    /// The external `$<change-id>` token form.
    pub fn token(&self) -> String {
        format!("${}", self.0)
    }

    /// Parse a `$<change-id>` token.
    pub fn from_token(token: &str) -> Option<Placeholder> {
        token.strip_prefix('$').map(Placeholder::new)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// One side of a relation: a service reference plus an optional relation
/// name (`$deploy-1:db`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRef {
    pub service: Placeholder,
    pub relation: Option<String>,
}

impl EndpointRef {
    pub fn token(&self) -> String {
        match &self.relation {
            Some(relation) => format!("{}:{relation}", self.service.token()),
            None => self.service.token(),
        }
    }
}

/// Where a unit goes: a machine or unit reference, optionally inside a
/// container (`lxc:$addMachines-5`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitTarget {
    /// Container prefix as written in the bundle, unvalidated.
    pub container: Option<String>,
    pub target: Placeholder,
}

impl UnitTarget {
    pub fn to(target: Placeholder) -> UnitTarget {
        UnitTarget {
            container: None,
            target,
        }
    }

    pub fn token(&self) -> String {
        match &self.container {
            Some(container) => format!("{container}:{}", self.target.token()),
            None => self.target.token(),
        }
    }
}

/// The entity kind a `setAnnotations` change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Service,
    Machine,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Service => "service",
            EntityKind::Machine => "machine",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCharmParams {
    /// The charm reference as written in the bundle.
    pub charm: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddMachineParams {
    pub series: Option<String>,
    pub constraints: String,
    /// Container type as written, checked against the known types when
    /// the machine is created.
    pub container_type: Option<String>,
    /// Parent machine or unit for container machines.
    pub parent: Option<Placeholder>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddServiceParams {
    /// The charm to deploy, referenced through its `addCharm` change.
    pub charm: Placeholder,
    pub service: String,
    pub options: BTreeMap<String, serde_yaml::Value>,
    pub constraints: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddUnitParams {
    pub service: Placeholder,
    /// Placement target; `None` lets the control plane allocate a new
    /// machine.
    pub to: Option<UnitTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRelationParams {
    pub endpoint1: EndpointRef,
    pub endpoint2: EndpointRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetAnnotationsParams {
    pub entity: Placeholder,
    pub entity_kind: EntityKind,
    pub annotations: BTreeMap<String, String>,
}

/// The closed set of change kinds, each carrying its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    AddCharm(AddCharmParams),
    AddMachine(AddMachineParams),
    AddService(AddServiceParams),
    AddUnit(AddUnitParams),
    AddRelation(AddRelationParams),
    SetAnnotations(SetAnnotationsParams),
}

impl ChangeKind {
    /// The wire method name, also the prefix of generated change ids.
    pub fn method(&self) -> &'static str {
        match self {
            ChangeKind::AddCharm(_) => "addCharm",
            ChangeKind::AddMachine(_) => "addMachines",
            ChangeKind::AddService(_) => "deploy",
            ChangeKind::AddUnit(_) => "addUnit",
            ChangeKind::AddRelation(_) => "addRelation",
            ChangeKind::SetAnnotations(_) => "setAnnotations",
        }
    }
}

/// A planned change: identifier, kind-specific parameters, and the ids
/// of prerequisite changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub id: String,
    pub kind: ChangeKind,
    pub requires: Vec<String>,
}

impl Change {
    pub fn method(&self) -> &'static str {
        self.kind.method()
    }

    /// A placeholder referring to this change's result.
    pub fn placeholder(&self) -> Placeholder {
        Placeholder::new(self.id.clone())
    }
}
