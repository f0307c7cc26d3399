//! halyard-api — interfaces to the deployment engine's collaborators.
//!
//! Two external systems sit behind traits here:
//!
//! - the **control plane**, which owns the live model
//!   ([`ModelClient`], [`ModelWatcher`]);
//! - the **charm source**, which resolves charm references and hands
//!   out charm-scoped authorization ([`CharmSource`]).
//!
//! Errors carry typed causes ([`ErrorCode`]) so recovery paths match on
//! codes rather than message strings, with the historical suffix match
//! kept as a fallback. The `http` module provides the REST-backed
//! implementations used by the CLI.

pub mod charms;
pub mod client;
pub mod error;
pub mod http;

pub use charms::{CharmSource, Macaroon};
pub use client::{
    AddMachineArgs, AddMachineResult, Delta, MachineStatus, ModelClient, ModelStatus,
    ModelWatcher, RelationStatus, ServiceDeployArgs, ServiceStatus, UnitStatus,
};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use http::{HttpCharmSource, HttpModelClient};
