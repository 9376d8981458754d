//! Single-objective Bayesian optimization.
//!
//! Each iteration fits the surrogate on every observation so far, scores a
//! batch of uniformly drawn candidates with Expected Improvement, evaluates
//! the best-scoring candidate and records the result. The objective is
//! maximized; callers wanting minimization negate their objective.

use ct_types::{
    validation_error, Bounds, Configuration, CtResult, Observation, ParameterSchema,
    ParameterVector,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::acquisition::{argmax, ExpectedImprovement, DEFAULT_XI};
use crate::evaluator::ObjectiveEvaluator;
use crate::run::{RunStatus, Strategy};
use crate::surrogate::{GaussianProcess, SurrogateModel};

/// Tuning knobs for [`BayesianOptimizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BayesianConfig {
    /// Random candidates scored per iteration.
    pub candidate_count: usize,
    /// Exploration margin for Expected Improvement.
    pub xi: f64,
    /// RNG seed; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            candidate_count: 1000,
            xi: DEFAULT_XI,
            seed: None,
        }
    }
}

impl BayesianConfig {
    pub fn with_candidate_count(mut self, n: usize) -> Self {
        self.candidate_count = n;
        self
    }

    pub fn with_xi(mut self, xi: f64) -> Self {
        self.xi = xi;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// One row of the iteration log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub iteration: usize,
    /// Raw objective value (`-inf` when the evaluation failed).
    pub value: f64,
    /// Best value seen up to and including this iteration.
    pub best_value: f64,
    pub parameters: ParameterVector,
    pub failed: bool,
}

/// Append-only iteration log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.value).collect()
    }

    pub fn best_values(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.best_value).collect()
    }

    fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }
}

/// Result of [`BayesianOptimizer::optimize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianOutcome {
    /// `None` when no evaluation produced a value above `-inf`.
    pub best_parameters: Option<ParameterVector>,
    pub best_configuration: Option<Configuration>,
    pub best_value: f64,
    pub history: History,
    pub status: RunStatus,
}

/// Surrogate-guided search over a [`ParameterSchema`].
pub struct BayesianOptimizer<E, M = GaussianProcess> {
    schema: ParameterSchema,
    bounds: Bounds,
    evaluator: E,
    surrogate: M,
    acquisition: ExpectedImprovement,
    config: BayesianConfig,
    observations: Vec<Observation>,
    best_value: f64,
    best_parameters: Option<ParameterVector>,
    history: History,
    rng: StdRng,
    status: RunStatus,
}

impl<E> BayesianOptimizer<E, GaussianProcess> {
    /// Create an optimizer with a Gaussian-process surrogate.
    pub fn new(schema: ParameterSchema, evaluator: E, config: BayesianConfig) -> CtResult<Self> {
        Self::with_surrogate(schema, evaluator, GaussianProcess::new(), config)
    }
}

impl<E, M> BayesianOptimizer<E, M> {
    /// Create an optimizer with a caller-supplied surrogate model.
    pub fn with_surrogate(
        schema: ParameterSchema,
        evaluator: E,
        surrogate: M,
        config: BayesianConfig,
    ) -> CtResult<Self> {
        schema.validate()?;
        if !(config.xi >= 0.0 && config.xi.is_finite()) {
            return Err(validation_error!("xi must be a non-negative number, got {}", config.xi));
        }
        if config.candidate_count == 0 {
            return Err(validation_error!("candidate_count must be positive"));
        }
        let bounds = schema.bounds()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            schema,
            bounds,
            evaluator,
            surrogate,
            acquisition: ExpectedImprovement::new(config.xi),
            config,
            observations: Vec::new(),
            best_value: f64::NEG_INFINITY,
            best_parameters: None,
            history: History::default(),
            rng,
            status: RunStatus::new(Strategy::Bayesian),
        })
    }

    /// Seed the observation set with earlier evaluations.
    pub fn with_observations(mut self, observations: Vec<Observation>) -> CtResult<Self> {
        for observation in observations {
            self.bounds.check(&observation.parameters)?;
            self.observe(observation.parameters, observation.value);
        }
        Ok(self)
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn best_value(&self) -> f64 {
        self.best_value
    }

    pub fn best_parameters(&self) -> Option<&ParameterVector> {
        self.best_parameters.as_ref()
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn into_evaluator(self) -> E {
        self.evaluator
    }

    fn observe(&mut self, parameters: ParameterVector, value: f64) {
        // NaN and +inf would poison the incumbent.
        let value = if value.is_nan() || value == f64::INFINITY {
            f64::NEG_INFINITY
        } else {
            value
        };
        if value > self.best_value {
            self.best_value = value;
            self.best_parameters = Some(parameters.clone());
        }
        self.observations.push(Observation::new(parameters, value));
    }
}

impl<E, M> BayesianOptimizer<E, M>
where
    E: ObjectiveEvaluator<Fitness = f64>,
    M: SurrogateModel,
{
    /// Propose the next point to evaluate.
    pub fn suggest(&mut self) -> ParameterVector {
        // Without a finite label the improvement target is undefined.
        if !self.best_value.is_finite() {
            return self.bounds.sample(&mut self.rng);
        }

        let x: Vec<Vec<f64>> = self
            .observations
            .iter()
            .map(|o| self.bounds.normalize(&o.parameters))
            .collect();
        let y: Vec<f64> = self.observations.iter().map(|o| o.value).collect();

        if let Err(e) = self.surrogate.fit(&x, &y) {
            warn!(error = %e, "surrogate fit failed, sampling at random");
            return self.bounds.sample(&mut self.rng);
        }

        let mut candidates: Vec<ParameterVector> = (0..self.config.candidate_count)
            .map(|_| self.bounds.sample(&mut self.rng))
            .collect();
        let normalized: Vec<Vec<f64>> = candidates
            .iter()
            .map(|c| self.bounds.normalize(c))
            .collect();
        let predictions = self.surrogate.predict(&normalized);
        let scores = self.acquisition.score_batch(&predictions, self.best_value);

        match argmax(&scores) {
            Some(i) => {
                debug!(
                    ei = scores[i],
                    mean = predictions[i].mean,
                    std = predictions[i].std(),
                    "acquisition maximum"
                );
                candidates.swap_remove(i)
            }
            None => self.bounds.sample(&mut self.rng),
        }
    }

    /// Run `iterations` evaluate-and-update rounds.
    ///
    /// Failed evaluations are recorded as `-inf` and still consume an
    /// iteration. Only an out-of-bounds proposal aborts the run.
    pub fn optimize(&mut self, iterations: usize) -> CtResult<BayesianOutcome> {
        self.status.mark_running();
        info!(
            run = %self.status.id,
            iterations,
            dimensions = self.bounds.dim(),
            "starting Bayesian optimization"
        );

        for _ in 0..iterations {
            let iteration = self.history.len();
            let candidate = self.suggest();
            let configuration = self.schema.configuration(&candidate)?;

            let (value, failed) = match self.evaluator.evaluate(&configuration) {
                Ok(value) if value.is_finite() => (value, false),
                Ok(value) => {
                    warn!(iteration, value, "non-finite objective, recording -inf");
                    (f64::NEG_INFINITY, true)
                }
                Err(e) => {
                    warn!(iteration, error = %e, "evaluation failed, recording -inf");
                    (f64::NEG_INFINITY, true)
                }
            };
            self.status.record_evaluation(failed);
            self.observe(candidate.clone(), value);

            self.history.push(HistoryEntry {
                iteration,
                value,
                best_value: self.best_value,
                parameters: candidate,
                failed,
            });
            info!(iteration, value, best = self.best_value, "iteration complete");
        }

        self.status.mark_completed();
        info!(
            run = %self.status.id,
            best = self.best_value,
            failed = self.status.evaluations_failed,
            "Bayesian optimization finished"
        );

        let best_configuration = match &self.best_parameters {
            Some(params) => Some(self.schema.configuration(params)?),
            None => None,
        };
        Ok(BayesianOutcome {
            best_parameters: self.best_parameters.clone(),
            best_configuration,
            best_value: self.best_value,
            history: self.history.clone(),
            status: self.status.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluation;
    use ct_types::{CtError, EvaluationError, ParameterValue};

    fn unit_schema() -> ParameterSchema {
        ParameterSchema::new().add_float("x", 0.0, 1.0)
    }

    fn router_like_schema() -> ParameterSchema {
        ParameterSchema::new()
            .add_float("route_random_sigma", 0.0, 1.0)
            .add_float("freshness_cut_off_value", 0.0, 10000.0)
            .add_int("re_route_every_ticks", 0, 60)
            .add_float("offset", -5.0, -2.0)
            .add_fixed("total_car_counter", ParameterValue::Int(750))
    }

    /// Records every configuration it is asked to score.
    struct Recorder {
        schema: ParameterSchema,
        seen: Vec<Configuration>,
    }

    impl ObjectiveEvaluator for Recorder {
        type Fitness = f64;

        fn evaluate(&mut self, configuration: &Configuration) -> Evaluation<f64> {
            self.seen.push(configuration.clone());
            Ok(configuration
                .iter()
                .filter(|(name, _)| name.as_str() != "total_car_counter")
                .map(|(_, v)| v.as_f64())
                .sum::<f64>()
                .sin())
        }
    }

    struct BrokenSurrogate;

    impl SurrogateModel for BrokenSurrogate {
        fn fit(&mut self, _x: &[Vec<f64>], _y: &[f64]) -> CtResult<()> {
            Err(CtError::Numeric("broken".to_string()))
        }

        fn predict(&self, _x: &[Vec<f64>]) -> Vec<crate::surrogate::Prediction> {
            Vec::new()
        }
    }

    #[test]
    fn finds_maximum_of_identity() {
        let evaluator = |c: &Configuration| -> Evaluation<f64> { Ok(c["x"].as_f64()) };
        let config = BayesianConfig::default().with_seed(42);
        let mut optimizer = BayesianOptimizer::new(unit_schema(), evaluator, config).unwrap();

        let outcome = optimizer.optimize(25).unwrap();
        assert!(outcome.best_value >= 0.9, "best value {}", outcome.best_value);
        assert_eq!(outcome.history.len(), 25);
        let best = outcome.best_parameters.unwrap();
        assert_eq!(best[0], outcome.best_value);
        assert_eq!(
            outcome.best_configuration.unwrap()["x"],
            ParameterValue::Float(best[0])
        );
    }

    #[test]
    fn always_failing_evaluator_still_completes() {
        let evaluator = |_: &Configuration| -> Evaluation<f64> {
            Err(EvaluationError::Transport {
                message: "connection refused".to_string(),
            })
        };
        let config = BayesianConfig::default().with_seed(1);
        let mut optimizer = BayesianOptimizer::new(unit_schema(), evaluator, config).unwrap();

        let outcome = optimizer.optimize(5).unwrap();
        assert_eq!(outcome.best_value, f64::NEG_INFINITY);
        assert!(outcome.best_parameters.is_none());
        assert!(outcome.best_configuration.is_none());
        assert_eq!(outcome.history.len(), 5);
        assert!(outcome.history.iter().all(|e| e.failed));
        assert_eq!(outcome.status.evaluations_failed, 5);
        assert_eq!(optimizer.observations().len(), 5);
    }

    #[test]
    fn failures_are_recorded_but_never_best() {
        let mut calls = 0;
        let evaluator = move |c: &Configuration| -> Evaluation<f64> {
            calls += 1;
            if calls % 2 == 0 {
                Err(EvaluationError::Status {
                    endpoint: "/monitor".to_string(),
                    status: 500,
                })
            } else {
                Ok(-c["x"].as_f64())
            }
        };
        let config = BayesianConfig::default().with_seed(3).with_candidate_count(200);
        let mut optimizer = BayesianOptimizer::new(unit_schema(), evaluator, config).unwrap();

        let outcome = optimizer.optimize(10).unwrap();
        let failed: Vec<_> = outcome.history.iter().filter(|e| e.failed).collect();
        assert_eq!(failed.len(), 5);
        assert!(failed.iter().all(|e| e.value == f64::NEG_INFINITY));
        assert!(outcome.best_value.is_finite());
        assert!(outcome.best_value <= 0.0);
    }

    #[test]
    fn best_value_is_monotone() {
        let evaluator =
            |c: &Configuration| -> Evaluation<f64> { Ok((7.0 * c["x"].as_f64()).cos()) };
        let config = BayesianConfig::default().with_seed(11).with_candidate_count(300);
        let mut optimizer = BayesianOptimizer::new(unit_schema(), evaluator, config).unwrap();

        let outcome = optimizer.optimize(15).unwrap();
        let best = outcome.history.best_values();
        for pair in best.windows(2) {
            assert!(pair[1] >= pair[0], "best decreased: {pair:?}");
        }
        let max_raw = outcome.history.values().into_iter().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(outcome.best_value, max_raw);
    }

    #[test]
    fn never_proposes_out_of_bounds() {
        let schema = router_like_schema();
        let recorder = Recorder {
            schema: schema.clone(),
            seen: Vec::new(),
        };
        let config = BayesianConfig::default().with_seed(5).with_candidate_count(100);
        let mut optimizer = BayesianOptimizer::new(schema.clone(), recorder, config).unwrap();
        optimizer.optimize(12).unwrap();

        let bounds = schema.bounds().unwrap();
        for entry in optimizer.history().iter() {
            assert!(bounds.contains(&entry.parameters), "{:?}", entry.parameters);
        }

        let recorder = optimizer.into_evaluator();
        assert_eq!(recorder.seen.len(), 12);
        for config in &recorder.seen {
            let sigma = config["route_random_sigma"].as_f64();
            assert!((0.0..=1.0).contains(&sigma));
            let offset = config["offset"].as_f64();
            assert!((-5.0..=-2.0).contains(&offset));
            match config["re_route_every_ticks"] {
                ParameterValue::Int(ticks) => assert!((0..=60).contains(&ticks)),
                ref other => panic!("expected int ticks, got {other:?}"),
            }
            assert_eq!(config["total_car_counter"], ParameterValue::Int(750));
        }
        assert_eq!(recorder.schema.dim(), 4);
    }

    #[test]
    fn repeated_calls_continue_the_history() {
        let evaluator = |c: &Configuration| -> Evaluation<f64> { Ok(c["x"].as_f64()) };
        let config = BayesianConfig::default().with_seed(9).with_candidate_count(50);
        let mut optimizer = BayesianOptimizer::new(unit_schema(), evaluator, config).unwrap();

        optimizer.optimize(3).unwrap();
        let outcome = optimizer.optimize(2).unwrap();
        let iterations: Vec<usize> = outcome.history.iter().map(|e| e.iteration).collect();
        assert_eq!(iterations, vec![0, 1, 2, 3, 4]);
        assert_eq!(outcome.status.total_evaluations(), 5);
    }

    #[test]
    fn warm_start_sets_best() {
        let evaluator = |_: &Configuration| -> Evaluation<f64> { Ok(0.0) };
        let config = BayesianConfig::default().with_seed(2).with_candidate_count(20);
        let optimizer = BayesianOptimizer::new(unit_schema(), evaluator, config)
            .unwrap()
            .with_observations(vec![
                Observation::new(vec![0.2], 1.0),
                Observation::new(vec![0.7], 3.0),
            ])
            .unwrap();
        assert_eq!(optimizer.best_value(), 3.0);
        assert_eq!(optimizer.best_parameters(), Some(&vec![0.7]));

        let rejected = BayesianOptimizer::new(
            unit_schema(),
            |_: &Configuration| -> Evaluation<f64> { Ok(0.0) },
            BayesianConfig::default(),
        )
        .unwrap()
        .with_observations(vec![Observation::new(vec![1.5], 1.0)]);
        assert!(rejected.is_err());
    }

    #[test]
    fn surrogate_failure_falls_back_to_random() {
        let evaluator = |c: &Configuration| -> Evaluation<f64> { Ok(c["x"].as_f64()) };
        let config = BayesianConfig::default().with_seed(4);
        let mut optimizer =
            BayesianOptimizer::with_surrogate(unit_schema(), evaluator, BrokenSurrogate, config)
                .unwrap();

        let outcome = optimizer.optimize(6).unwrap();
        assert_eq!(outcome.history.len(), 6);
        assert!(outcome.history.iter().all(|e| !e.failed));
    }

    #[test]
    fn non_finite_values_are_failures() {
        let mut calls = 0;
        let evaluator = move |c: &Configuration| -> Evaluation<f64> {
            calls += 1;
            match calls {
                1 => Ok(f64::INFINITY),
                2 => Ok(f64::NAN),
                3 => Ok(f64::NEG_INFINITY),
                _ => Ok(c["x"].as_f64()),
            }
        };
        let config = BayesianConfig::default().with_seed(9).with_candidate_count(100);
        let mut optimizer = BayesianOptimizer::new(unit_schema(), evaluator, config).unwrap();
        let outcome = optimizer.optimize(10).unwrap();

        let flags: Vec<bool> = outcome.history.iter().map(|e| e.failed).collect();
        assert_eq!(&flags[..4], &[true, true, true, false]);
        assert!(outcome.history.iter().take(3).all(|e| e.value == f64::NEG_INFINITY));
        assert!(outcome.best_value.is_finite());
        assert!(outcome.history.best_values().iter().skip(3).all(|v| v.is_finite()));
        assert_eq!(outcome.status.evaluations_failed, 3);
    }

    #[test]
    fn warm_start_ignores_non_finite_incumbents() {
        let evaluator = |_: &Configuration| -> Evaluation<f64> { Ok(0.0) };
        let optimizer = BayesianOptimizer::new(unit_schema(), evaluator, BayesianConfig::default())
            .unwrap()
            .with_observations(vec![
                Observation::new(vec![0.1], f64::INFINITY),
                Observation::new(vec![0.2], f64::NAN),
                Observation::new(vec![0.3], 0.5),
            ])
            .unwrap();
        assert_eq!(optimizer.best_value(), 0.5);
        assert_eq!(optimizer.best_parameters(), Some(&vec![0.3]));
    }

    #[test]
    fn bad_acquisition_settings_are_rejected_up_front() {
        let evaluator = |_: &Configuration| -> Evaluation<f64> { Ok(0.0) };
        let negative_xi = BayesianConfig::default().with_xi(-0.1);
        assert!(matches!(
            BayesianOptimizer::new(unit_schema(), evaluator, negative_xi),
            Err(CtError::Validation(_))
        ));

        let evaluator = |_: &Configuration| -> Evaluation<f64> { Ok(0.0) };
        let nan_xi = BayesianConfig::default().with_xi(f64::NAN);
        assert!(BayesianOptimizer::new(unit_schema(), evaluator, nan_xi).is_err());

        let evaluator = |_: &Configuration| -> Evaluation<f64> { Ok(0.0) };
        let no_candidates = BayesianConfig::default().with_candidate_count(0);
        assert!(BayesianOptimizer::new(unit_schema(), evaluator, no_candidates).is_err());
    }

    #[test]
    fn invalid_schema_is_rejected_up_front() {
        let schema = ParameterSchema::new().add_float("x", 1.0, 0.0);
        let evaluator = |_: &Configuration| -> Evaluation<f64> { Ok(0.0) };
        assert!(BayesianOptimizer::new(schema, evaluator, BayesianConfig::default()).is_err());
    }
}
