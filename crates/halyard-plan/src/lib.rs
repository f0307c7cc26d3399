//! halyard-plan — from a validated bundle to an ordered change list.
//!
//! The planner turns a bundle into a sequence of typed, idempotently
//! identified change records, each declaring the earlier changes it
//! depends on. Applying the records in order (see `halyard-deploy`)
//! converges the live model toward the bundle.
//!
//! ```text
//! BundleData ──plan()──▶ Vec<Change> ──wire::encode()──▶ external form
//! ```

pub mod change;
pub mod planner;
pub mod wire;

pub use change::{
    AddCharmParams, AddMachineParams, AddRelationParams, AddServiceParams, AddUnitParams,
    Change, ChangeKind, EndpointRef, EntityKind, Placeholder, SetAnnotationsParams, UnitTarget,
};
pub use planner::plan;
pub use wire::{encode, WireChange};
