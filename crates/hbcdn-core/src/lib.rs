#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

pub mod api;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod export;
pub mod ingest;
pub mod lock;
pub mod package_store;
pub mod paths;
pub mod probe;
pub mod reconcile;
pub mod scheduler;
pub mod snapshot_store;

pub use bootstrap::Services;
pub use config::{AppConfig, EnvSnapshot, OutputTarget, UserSettings};
pub use paths::RuntimePaths;
pub use reconcile::{ReconcileResult, Reconciler};
