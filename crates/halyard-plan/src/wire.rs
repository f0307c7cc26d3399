//! External encoding of planned changes.
//!
//! Consumers outside this process (the GUI among them) receive changes
//! as `{id, method, args, requires}` records with positional JSON args,
//! where references to earlier changes appear as `$<change-id>` tokens.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::change::{Change, ChangeKind};

/// One change in its external form.
#[derive(Debug, Clone, Serialize)]
pub struct WireChange {
    pub id: String,
    pub method: String,
    pub args: Vec<Value>,
    pub requires: Vec<String>,
}

/// Encode a planned change list for external consumers.
pub fn encode(changes: &[Change]) -> Vec<WireChange> {
    changes.iter().map(encode_change).collect()
}

fn encode_change(change: &Change) -> WireChange {
    let args = match &change.kind {
        ChangeKind::AddCharm(p) => vec![json!(p.charm)],
        ChangeKind::AddMachine(p) => {
            let mut spec = Map::new();
            if let Some(series) = &p.series {
                spec.insert("series".to_string(), json!(series));
            }
            if !p.constraints.is_empty() {
                spec.insert("constraints".to_string(), json!(p.constraints));
            }
            if let Some(container) = &p.container_type {
                spec.insert("containerType".to_string(), json!(container));
            }
            if let Some(parent) = &p.parent {
                spec.insert("parentId".to_string(), json!(parent.token()));
            }
            vec![Value::Object(spec)]
        }
        ChangeKind::AddService(p) => {
            let options = serde_json::to_value(&p.options).unwrap_or(Value::Null);
            vec![json!(p.charm.token()), json!(p.service), options]
        }
        ChangeKind::AddUnit(p) => {
            let to = p.to.as_ref().map_or(Value::Null, |t| json!(t.token()));
            vec![json!(p.service.token()), to]
        }
        ChangeKind::AddRelation(p) => {
            vec![json!(p.endpoint1.token()), json!(p.endpoint2.token())]
        }
        ChangeKind::SetAnnotations(p) => vec![
            json!(p.entity.token()),
            json!(p.entity_kind.as_str()),
            serde_json::to_value(&p.annotations).unwrap_or(Value::Null),
        ],
    };
    WireChange {
        id: change.id.clone(),
        method: change.method().to_string(),
        args,
        requires: change.requires.clone(),
    }
}
