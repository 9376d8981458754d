//! The seam between the optimizers and whatever scores a configuration.

use ct_types::{Configuration, EvaluationError};

/// Outcome of one evaluation: the fitness, or the reason none was produced.
pub type Evaluation<T> = Result<T, EvaluationError>;

/// Scores a named configuration.
///
/// Implementations own every failure of the underlying call and report it as
/// `Err`; the optimizers convert failures into worst-case fitness.
pub trait ObjectiveEvaluator {
    type Fitness;

    fn evaluate(&mut self, configuration: &Configuration) -> Evaluation<Self::Fitness>;
}

impl<F, T> ObjectiveEvaluator for F
where
    F: FnMut(&Configuration) -> Evaluation<T>,
{
    type Fitness = T;

    fn evaluate(&mut self, configuration: &Configuration) -> Evaluation<T> {
        self(configuration)
    }
}
