//! # ct-optimizer
//!
//! Parameter search for CrowdTune.
//!
//! Provides the evaluator seam, a Gaussian-process surrogate with Expected
//! Improvement acquisition driving single-objective Bayesian optimization,
//! and an NSGA-II style multi-objective search producing a Pareto front.

mod acquisition;
mod bayesian;
mod evaluator;
mod nsga2;
mod run;
mod surrogate;

pub use acquisition::{argmax, norm_cdf, norm_pdf, ExpectedImprovement, DEFAULT_XI};
pub use bayesian::{BayesianConfig, BayesianOptimizer, BayesianOutcome, History, HistoryEntry};
pub use evaluator::{Evaluation, ObjectiveEvaluator};
pub use nsga2::{
    crowding_distance, dominates, fast_non_dominated_sort, Front, GenerationRecord, Individual,
    Nsga2Config, Nsga2Optimizer, OffspringConfig, ParetoFront,
};
pub use run::{RunId, RunState, RunStatus, Strategy};
pub use surrogate::{GaussianProcess, Hyperparameters, Prediction, SurrogateModel, VARIANCE_FLOOR};
