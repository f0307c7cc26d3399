//! halyard-bundle — the declarative bundle model.
//!
//! A bundle is a YAML description of an application topology: services
//! running charms, machines, unit placement, and relations. This crate
//! decodes the format, validates it, and provides the small vocabulary
//! types the rest of the engine shares:
//!
//! - [`BundleData`] / [`ServiceSpec`] / [`MachineSpec`] — the decoded tree
//! - [`CharmUrl`] — charm references (`cs:trusty/mysql-42`)
//! - [`Constraints`] — syntactic `key=value` machine constraints
//! - [`UnitPlacement`] / [`ContainerType`] — the placement sublanguage

pub mod charm;
pub mod constraints;
pub mod error;
pub mod model;
pub mod names;
pub mod placement;
mod validate;

pub use charm::{CharmUrl, Schema};
pub use constraints::Constraints;
pub use error::{BundleError, BundleResult};
pub use model::{BundleData, MachineSpec, ServiceSpec};
pub use names::{is_valid_unit_name, unit_service};
pub use placement::{ContainerType, UnitPlacement};
