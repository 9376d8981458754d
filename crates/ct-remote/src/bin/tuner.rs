use std::path::PathBuf;

use anyhow::{bail, Context};
use ct_optimizer::{BayesianOptimizer, Nsga2Optimizer};
use ct_remote::{
    save_history, save_pareto, HttpSystem, RemoteEvaluator, StrategyConfig, TunerConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = TunerConfig::resolve(std::env::args_os().nth(1).map(PathBuf::from))
        .context("loading tuner configuration")?;
    config.validate()?;

    let system = HttpSystem::new(config.remote.clone())?;
    if !system.wait_until_ready(config.ready_attempts, config.ready_interval()) {
        bail!("system under test at {} is not reachable", config.remote.base_url);
    }
    if let Some(dir) = &config.output_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let settle = config.remote.settle();
    match config.strategy.clone() {
        StrategyConfig::Bayesian {
            iterations,
            config: bayes,
        } => {
            let evaluator = RemoteEvaluator::new(system, config.scalar_objective.clone(), settle);
            let mut optimizer = BayesianOptimizer::new(config.schema.clone(), evaluator, bayes)?;
            let outcome = optimizer.optimize(iterations)?;

            info!(
                best_value = outcome.best_value,
                best = ?outcome.best_configuration,
                failed = outcome.status.evaluations_failed,
                "bayesian optimization finished"
            );
            if let Some(dir) = &config.output_dir {
                save_history(&dir.join("history.csv"), &outcome.history)?;
            }
        }
        StrategyConfig::Nsga2 { config: nsga } => {
            let evaluator = RemoteEvaluator::new(system, config.vector_objective.clone(), settle);
            let mut optimizer = Nsga2Optimizer::new(config.schema.clone(), evaluator, nsga)?;
            let front = optimizer.run()?;

            for individual in &front.individuals {
                info!(
                    configuration = ?individual.configuration,
                    fitness = ?individual.fitness.values(),
                    "pareto member"
                );
            }
            info!(
                size = front.individuals.len(),
                failed = front.status.evaluations_failed,
                "nsga2 optimization finished"
            );
            if let Some(dir) = &config.output_dir {
                save_pareto(&dir.join("pareto.csv"), &front, &config.vector_objective.metrics)?;
            }
        }
    }

    Ok(())
}
