//! # ct-remote
//!
//! The system under test as seen from CrowdTune: an HTTP client for the
//! apply/monitor contract, metric-based objectives, the remote evaluator
//! that plugs into the optimizers, driver configuration, and CSV reporting.

pub mod client;
pub mod config;
pub mod contract;
pub mod evaluator;
pub mod objective;
pub mod report;
pub mod system;

pub use client::{HttpSystem, RemoteConfig};
pub use config::{StrategyConfig, TunerConfig, BASE_URL_ENV, CONFIG_ENV};
pub use contract::{router_cost_objective, router_schema, router_sigma_schema, travel_objectives};
pub use evaluator::RemoteEvaluator;
pub use objective::{MetricObjective, MetricTerm, ObjectiveDirection, ScalarObjective, VectorObjective};
pub use report::{save_history, save_pareto, write_history_csv, write_pareto_csv};
pub use system::{flatten_metrics, Metrics, SystemUnderTest};
