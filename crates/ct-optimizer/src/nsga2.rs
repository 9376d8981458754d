//! Multi-objective evolutionary search (NSGA-II style).
//!
//! By default a generation only re-evaluates, ranks and truncates the
//! population created at start-up; no new individuals are bred. Setting
//! [`Nsga2Config::offspring`] switches on tournament selection, SBX
//! crossover and polynomial mutation, with crowding-distance truncation of
//! the last admitted front.

use std::cmp::Ordering;

use ct_types::{
    validation_error, Bounds, Configuration, CtResult, EvaluationError, FitnessVector,
    ParameterSchema, ParameterVector,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::evaluator::ObjectiveEvaluator;
use crate::run::{RunStatus, Strategy};

/// Population indices that are mutually non-dominated.
pub type Front = Vec<usize>;

/// `a` dominates `b` when it is no worse in every objective and strictly
/// better in at least one (all objectives minimized).
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if !(x <= y) {
            return false;
        }
        if x < y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Partition `fitness` into ranked fronts (front 0 = non-dominated).
///
/// Front 0 is in index order; later fronts list members in the order they
/// were released, which decides who survives truncation of the last front.
pub fn fast_non_dominated_sort(fitness: &[FitnessVector]) -> Vec<Front> {
    let n = fitness.len();
    let mut domination_count = vec![0usize; n];
    let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];

    for i in 0..n {
        for j in (i + 1)..n {
            if dominates(fitness[i].values(), fitness[j].values()) {
                dominated[i].push(j);
                domination_count[j] += 1;
            } else if dominates(fitness[j].values(), fitness[i].values()) {
                dominated[j].push(i);
                domination_count[i] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Front = (0..n).filter(|&i| domination_count[i] == 0).collect();
    while !current.is_empty() {
        let mut next = Front::new();
        for &i in &current {
            for &j in &dominated[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        fronts.push(current);
        current = next;
    }
    fronts
}

/// Crowding distance of each member of `front`, in `front` order.
pub fn crowding_distance(fitness: &[FitnessVector], front: &[usize]) -> Vec<f64> {
    let len = front.len();
    if len <= 2 {
        return vec![f64::INFINITY; len];
    }

    let mut distance = vec![0.0; len];
    let objectives = fitness[front[0]].len();
    let mut order: Vec<usize> = (0..len).collect();

    for m in 0..objectives {
        let value = |k: usize| fitness[front[k]].values()[m];
        order.sort_by(|&a, &b| value(a).partial_cmp(&value(b)).unwrap_or(Ordering::Equal));

        let first = order[0];
        let last = order[len - 1];
        distance[first] = f64::INFINITY;
        distance[last] = f64::INFINITY;

        let range = value(last) - value(first);
        if !range.is_finite() || range.abs() < 1e-12 {
            continue;
        }
        for w in order.windows(3) {
            distance[w[1]] += (value(w[2]) - value(w[0])) / range;
        }
    }
    distance
}

/// Parameters of the opt-in offspring generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffspringConfig {
    /// Probability that a parent pair is recombined.
    pub crossover_prob: f64,
    /// Per-gene mutation probability.
    pub mutation_prob: f64,
    /// Distribution index for SBX crossover.
    pub eta_c: f64,
    /// Distribution index for polynomial mutation.
    pub eta_m: f64,
}

impl Default for OffspringConfig {
    fn default() -> Self {
        Self {
            crossover_prob: 0.9,
            mutation_prob: 0.1,
            eta_c: 20.0,
            eta_m: 20.0,
        }
    }
}

/// Tuning knobs for [`Nsga2Optimizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nsga2Config {
    pub pop_size: usize,
    pub generations: usize,
    /// Length of every fitness vector.
    pub objectives: usize,
    /// `None` keeps the population fixed after initialization.
    pub offspring: Option<OffspringConfig>,
    pub seed: Option<u64>,
}

impl Default for Nsga2Config {
    fn default() -> Self {
        Self {
            pop_size: 5,
            generations: 3,
            objectives: 2,
            offspring: None,
            seed: None,
        }
    }
}

impl Nsga2Config {
    pub fn with_pop_size(mut self, n: usize) -> Self {
        self.pop_size = n;
        self
    }

    pub fn with_generations(mut self, n: usize) -> Self {
        self.generations = n;
        self
    }

    pub fn with_objectives(mut self, n: usize) -> Self {
        self.objectives = n;
        self
    }

    pub fn with_offspring(mut self, offspring: OffspringConfig) -> Self {
        self.offspring = Some(offspring);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A configuration together with its last fitness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub parameters: ParameterVector,
    pub configuration: Configuration,
    pub fitness: FitnessVector,
    /// Whether the last evaluation failed (fitness is the worst sentinel).
    pub failed: bool,
}

/// Summary of one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    pub evaluations: usize,
    pub failed: usize,
    pub front_sizes: Vec<usize>,
}

/// Result of [`Nsga2Optimizer::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoFront {
    pub individuals: Vec<Individual>,
    pub generations: Vec<GenerationRecord>,
    pub status: RunStatus,
}

/// Evolutionary multi-objective search over a [`ParameterSchema`].
pub struct Nsga2Optimizer<E> {
    schema: ParameterSchema,
    bounds: Bounds,
    evaluator: E,
    config: Nsga2Config,
    rng: StdRng,
    status: RunStatus,
}

impl<E> Nsga2Optimizer<E> {
    pub fn new(schema: ParameterSchema, evaluator: E, config: Nsga2Config) -> CtResult<Self> {
        schema.validate()?;
        if config.pop_size == 0 {
            return Err(validation_error!("pop_size must be positive"));
        }
        if config.objectives == 0 {
            return Err(validation_error!("objectives must be positive"));
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
            config,
            rng,
            status: RunStatus::new(Strategy::Nsga2),
        })
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn into_evaluator(self) -> E {
        self.evaluator
    }

    fn spawn(&self, parameters: ParameterVector) -> CtResult<Individual> {
        let configuration = self.schema.configuration(&parameters)?;
        Ok(Individual {
            parameters,
            configuration,
            fitness: FitnessVector::worst(self.config.objectives),
            failed: false,
        })
    }

    fn initial_population(&mut self) -> CtResult<Vec<Individual>> {
        let mut population = Vec::with_capacity(self.config.pop_size);
        for _ in 0..self.config.pop_size {
            let parameters = self.bounds.sample(&mut self.rng);
            population.push(self.spawn(parameters)?);
        }
        Ok(population)
    }
}

impl<E> Nsga2Optimizer<E>
where
    E: ObjectiveEvaluator<Fitness = FitnessVector>,
{
    /// Evaluate every individual in order. Returns the number of failures.
    fn evaluate_all(&mut self, population: &mut [Individual]) -> usize {
        let objectives = self.config.objectives;
        let mut failures = 0;
        for individual in population.iter_mut() {
            let result = self
                .evaluator
                .evaluate(&individual.configuration)
                .and_then(|fitness| {
                    if fitness.len() != objectives {
                        Err(EvaluationError::MalformedPayload {
                            message: format!(
                                "expected {objectives} objectives, got {}",
                                fitness.len()
                            ),
                        })
                    } else if fitness
                        .values()
                        .iter()
                        .any(|v| v.is_nan() || *v == f64::NEG_INFINITY)
                    {
                        // NaN is never dominated and -inf dominates everything.
                        Err(EvaluationError::MalformedPayload {
                            message: format!("unusable fitness {:?}", fitness.values()),
                        })
                    } else {
                        Ok(fitness)
                    }
                });
            match result {
                Ok(fitness) => {
                    debug!(fitness = ?fitness.values(), "individual evaluated");
                    individual.fitness = fitness;
                    individual.failed = false;
                }
                Err(e) => {
                    warn!(error = %e, "evaluation failed, assigning worst fitness");
                    individual.fitness = FitnessVector::worst(objectives);
                    individual.failed = true;
                    failures += 1;
                }
            }
            self.status.record_evaluation(individual.failed);
        }
        failures
    }

    /// Run the configured number of generations and return the final
    /// non-dominated set.
    pub fn run(&mut self) -> CtResult<ParetoFront> {
        self.status.mark_running();
        info!(
            run = %self.status.id,
            pop_size = self.config.pop_size,
            generations = self.config.generations,
            offspring = self.config.offspring.is_some(),
            "starting NSGA-II"
        );

        let mut population = self.initial_population()?;
        let mut records = Vec::with_capacity(self.config.generations);
        let offspring = self.config.offspring.clone();

        if offspring.is_some() {
            self.evaluate_all(&mut population);
        }

        for generation in 0..self.config.generations {
            let (evaluations, failed, crowded) = match &offspring {
                None => {
                    let failed = self.evaluate_all(&mut population);
                    (population.len(), failed, false)
                }
                Some(params) => {
                    let mut children = self.breed(&population, params)?;
                    let failed = self.evaluate_all(&mut children);
                    let evaluations = children.len();
                    population.extend(children);
                    (evaluations, failed, true)
                }
            };
            // Every fitness of the generation is in before ranking starts.
            let fronts = fast_non_dominated_sort(&fitness_of(&population));
            population = truncate_by_fronts(population, &fronts, self.config.pop_size, crowded);

            let front_sizes: Vec<usize> = fronts.iter().map(Vec::len).collect();
            info!(
                generation,
                evaluations,
                failed,
                fronts = front_sizes.len(),
                front0 = front_sizes.first().copied().unwrap_or(0),
                "generation complete"
            );
            records.push(GenerationRecord {
                generation,
                evaluations,
                failed,
                front_sizes,
            });
        }

        // The last ranking may rest on stale fitness; score once more.
        self.evaluate_all(&mut population);
        let fronts = fast_non_dominated_sort(&fitness_of(&population));
        let individuals: Vec<Individual> = match fronts.first() {
            Some(front) => front.iter().map(|&i| population[i].clone()).collect(),
            None => Vec::new(),
        };

        self.status.mark_completed();
        info!(
            run = %self.status.id,
            pareto = individuals.len(),
            evaluations = self.status.total_evaluations(),
            "NSGA-II finished"
        );

        Ok(ParetoFront {
            individuals,
            generations: records,
            status: self.status.clone(),
        })
    }

    /// Build `pop_size` children from `parents` by tournament, SBX and
    /// polynomial mutation.
    fn breed(
        &mut self,
        parents: &[Individual],
        params: &OffspringConfig,
    ) -> CtResult<Vec<Individual>> {
        let fitness = fitness_of(parents);
        let fronts = fast_non_dominated_sort(&fitness);
        let mut rank = vec![0usize; parents.len()];
        let mut crowding = vec![0.0; parents.len()];
        for (r, front) in fronts.iter().enumerate() {
            for (&i, d) in front.iter().zip(crowding_distance(&fitness, front)) {
                rank[i] = r;
                crowding[i] = d;
            }
        }

        let mut children = Vec::with_capacity(self.config.pop_size);
        while children.len() < self.config.pop_size {
            let a = self.tournament(&rank, &crowding);
            let b = self.tournament(&rank, &crowding);
            let (mut c1, mut c2) =
                self.sbx_crossover(&parents[a].parameters, &parents[b].parameters, params);
            self.polynomial_mutation(&mut c1, params);
            self.polynomial_mutation(&mut c2, params);

            children.push(self.spawn(c1)?);
            if children.len() < self.config.pop_size {
                children.push(self.spawn(c2)?);
            }
        }
        Ok(children)
    }

    /// Binary tournament: lower rank wins, then larger crowding distance.
    fn tournament(&mut self, rank: &[usize], crowding: &[f64]) -> usize {
        let a = self.rng.random_range(0..rank.len());
        let b = self.rng.random_range(0..rank.len());
        match rank[a].cmp(&rank[b]) {
            Ordering::Less => a,
            Ordering::Greater => b,
            Ordering::Equal if crowding[a] >= crowding[b] => a,
            Ordering::Equal => b,
        }
    }

    fn sbx_crossover(
        &mut self,
        p1: &[f64],
        p2: &[f64],
        params: &OffspringConfig,
    ) -> (ParameterVector, ParameterVector) {
        let mut c1 = p1.to_vec();
        let mut c2 = p2.to_vec();
        if self.rng.random::<f64>() > params.crossover_prob {
            return (c1, c2);
        }

        let exponent = 1.0 / (params.eta_c + 1.0);
        for (i, &(lo, hi)) in self.bounds.ranges().iter().enumerate() {
            if self.rng.random::<f64>() > 0.5 {
                continue;
            }
            let y1 = p1[i].min(p2[i]);
            let y2 = p1[i].max(p2[i]);
            if (y2 - y1).abs() < 1e-12 {
                continue;
            }

            let beta = 1.0 + 2.0 * (y1 - lo) / (y2 - y1);
            let alpha = 2.0 - beta.powf(-(params.eta_c + 1.0));
            let u = self.rng.random::<f64>();
            let betaq = if u <= 1.0 / alpha {
                (u * alpha).powf(exponent)
            } else {
                (1.0 / (2.0 - u * alpha)).powf(exponent)
            };

            c1[i] = (0.5 * ((y1 + y2) - betaq * (y2 - y1))).clamp(lo, hi);
            c2[i] = (0.5 * ((y1 + y2) + betaq * (y2 - y1))).clamp(lo, hi);
        }
        (c1, c2)
    }

    fn polynomial_mutation(&mut self, x: &mut [f64], params: &OffspringConfig) {
        let exponent = 1.0 / (params.eta_m + 1.0);
        for (v, &(lo, hi)) in x.iter_mut().zip(self.bounds.ranges()) {
            let width = hi - lo;
            if width <= 0.0 || self.rng.random::<f64>() > params.mutation_prob {
                continue;
            }
            let delta1 = (*v - lo) / width;
            let delta2 = (hi - *v) / width;
            let u = self.rng.random::<f64>();
            let deltaq = if u < 0.5 {
                let val = 2.0 * u + (1.0 - 2.0 * u) * (1.0 - delta1).powf(params.eta_m + 1.0);
                val.powf(exponent) - 1.0
            } else {
                let val =
                    2.0 * (1.0 - u) + 2.0 * (u - 0.5) * (1.0 - delta2).powf(params.eta_m + 1.0);
                1.0 - val.powf(exponent)
            };
            *v = (*v + deltaq * width).clamp(lo, hi);
        }
    }
}

fn fitness_of(population: &[Individual]) -> Vec<FitnessVector> {
    population.iter().map(|i| i.fitness.clone()).collect()
}

/// Admit whole fronts in rank order until `pop_size` is reached. The last
/// admitted front is cut in front order, or by descending crowding distance
/// when `crowded` is set.
fn truncate_by_fronts(
    population: Vec<Individual>,
    fronts: &[Front],
    pop_size: usize,
    crowded: bool,
) -> Vec<Individual> {
    let fitness = fitness_of(&population);
    let mut slots: Vec<Option<Individual>> = population.into_iter().map(Some).collect();
    let mut next = Vec::with_capacity(pop_size);

    for front in fronts {
        let remaining = pop_size - next.len();
        if remaining == 0 {
            break;
        }
        let admitted: Vec<usize> = if front.len() <= remaining {
            front.clone()
        } else if crowded {
            let distance = crowding_distance(&fitness, front);
            let mut order: Vec<usize> = (0..front.len()).collect();
            order.sort_by(|&a, &b| {
                distance[b]
                    .partial_cmp(&distance[a])
                    .unwrap_or(Ordering::Equal)
            });
            order.into_iter().take(remaining).map(|k| front[k]).collect()
        } else {
            front[..remaining].to_vec()
        };
        next.extend(admitted.into_iter().filter_map(|i| slots[i].take()));
    }
    next
}
