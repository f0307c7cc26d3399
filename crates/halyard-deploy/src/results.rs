//! The results table.
//!
//! As each change is applied its observable outcome is recorded under
//! the change id: the resolved charm URL, the service name, the machine
//! id, or the unit name. Later changes resolve their placeholder
//! arguments against this table. Resolution is total: a missing entry
//! resolves to the empty string, which machine placement reads as
//! "allocate a new machine".

use std::collections::HashMap;

use halyard_plan::{EndpointRef, Placeholder};

#[derive(Debug, Default)]
pub struct ResultsTable {
    entries: HashMap<String, String>,
}

impl ResultsTable {
    pub fn record(&mut self, change_id: &str, value: impl Into<String>) {
        self.entries.insert(change_id.to_string(), value.into());
    }

    /// The recorded result for a placeholder, or the empty string.
    pub fn resolve(&self, placeholder: &Placeholder) -> String {
        self.entries
            .get(placeholder.change_id())
            .cloned()
            .unwrap_or_default()
    }

    /// A relation endpoint with its service placeholder resolved and
    /// the relation name re-attached.
    pub fn resolve_endpoint(&self, endpoint: &EndpointRef) -> String {
        let service = self.resolve(&endpoint.service);
        match &endpoint.relation {
            Some(relation) => format!("{service}:{relation}"),
            None => service,
        }
    }
}
