//! halyard-deploy — applies a planned change list to a live model.
//!
//! The apply loop is single-threaded and processes changes strictly in
//! planner order; a concurrent tracker task follows the model's delta
//! stream so placement can wait for unit→machine assignments.
//!
//! ```text
//! deploy_bundle
//!   ├── validate + plan                 (halyard-bundle, halyard-plan)
//!   ├── status() snapshot ─▶ UnitTracker ◀─ watch_all() stream
//!   └── Deployer: per change
//!       ├── resolve placeholders against the results table
//!       ├── call the control plane (idempotent reconciliation)
//!       ├── record the result
//!       └── emit one progress line
//! ```
//!
//! Deployments are not transactional: a terminal error leaves the model
//! partially converged, and re-running the same bundle is the intended
//! recovery path.

pub mod deploy;
pub mod error;
pub mod progress;
pub mod results;
pub mod tracker;

pub use deploy::deploy_bundle;
pub use error::{DeployError, DeployResult};
pub use progress::{Progress, RecordingProgress, StdoutProgress, TracingProgress};
pub use results::ResultsTable;
pub use tracker::UnitTracker;
