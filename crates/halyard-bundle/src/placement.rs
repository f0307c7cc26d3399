//! The unit placement sublanguage.
//!
//! A placement directive names where a unit lands:
//!
//! ```text
//! <machine-label> | new | <service> | <service>/<unit-index>
//! ```
//!
//! optionally prefixed with a container type (`lxc:2`, `kvm:ror`,
//! `lxc:wp/0`). Machine labels are decimal digit strings. The container
//! prefix is kept as written here; it is checked against the known
//! container types only when a machine is actually created, so the
//! failure surfaces against the live model like any other machine error.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::charm::is_valid_charm_name;
use crate::error::BundleError;

/// Container types the control plane can provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    Lxc,
    Kvm,
}

impl ContainerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerType::Lxc => "lxc",
            ContainerType::Kvm => "kvm",
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerType {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lxc" => Ok(ContainerType::Lxc),
            "kvm" => Ok(ContainerType::Kvm),
            other => Err(BundleError::InvalidContainerType {
                container: other.to_string(),
            }),
        }
    }
}

/// A parsed placement directive. Exactly one of `machine` and `service`
/// is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPlacement {
    /// Container prefix as written, unvalidated.
    pub container: Option<String>,
    /// A declared machine label, or `new`.
    pub machine: Option<String>,
    /// A target service for co-location.
    pub service: Option<String>,
    /// Specific unit index of the target service.
    pub unit: Option<u32>,
}

impl UnitPlacement {
    pub fn parse(directive: &str) -> Result<UnitPlacement, BundleError> {
        let fail = || BundleError::InvalidPlacement {
            placement: directive.to_string(),
        };

        let (container, rest) = match directive.split_once(':') {
            Some((c, rest)) => {
                if c.is_empty() || !c.bytes().all(|b| b.is_ascii_lowercase()) {
                    return Err(fail());
                }
                (Some(c.to_string()), rest)
            }
            None => (None, directive),
        };
        if rest.is_empty() {
            return Err(fail());
        }

        if rest == "new" || rest.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(UnitPlacement {
                container,
                machine: Some(rest.to_string()),
                service: None,
                unit: None,
            });
        }

        let (service, unit) = match rest.split_once('/') {
            Some((service, index)) => {
                let index: u32 = index.parse().map_err(|_| fail())?;
                (service, Some(index))
            }
            None => (rest, None),
        };
        if !is_valid_charm_name(service) {
            return Err(fail());
        }
        Ok(UnitPlacement {
            container,
            machine: None,
            service: Some(service.to_string()),
            unit,
        })
    }
}
