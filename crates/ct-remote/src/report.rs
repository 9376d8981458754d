//! Tabular export of optimization results.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use ct_optimizer::{History, ParetoFront};
use ct_types::{CtError, CtResult};
use tracing::info;

fn csv_error(e: csv::Error) -> CtError {
    CtError::Csv(e.to_string())
}

/// One row per Bayesian iteration: `iteration,value,best_value,failed,parameters`.
///
/// Parameters are joined with `;` so the row stays a fixed width. Failed
/// values are written as `-inf`, which parses back as `f64`.
pub fn write_history_csv<W: Write>(writer: W, history: &History) -> CtResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["iteration", "value", "best_value", "failed", "parameters"])
        .map_err(csv_error)?;
    for entry in history.iter() {
        let parameters = entry
            .parameters
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(";");
        csv.write_record([
            entry.iteration.to_string(),
            entry.value.to_string(),
            entry.best_value.to_string(),
            entry.failed.to_string(),
            parameters,
        ])
        .map_err(csv_error)?;
    }
    csv.flush()?;
    Ok(())
}

/// One row per front member: its configuration fields, then its objectives.
pub fn write_pareto_csv<W: Write>(
    writer: W,
    front: &ParetoFront,
    objective_names: &[String],
) -> CtResult<()> {
    let mut csv = csv::Writer::from_writer(writer);

    let fields: Vec<String> = front
        .individuals
        .first()
        .map(|ind| ind.configuration.keys().cloned().collect())
        .unwrap_or_default();
    let objectives = front
        .individuals
        .first()
        .map(|ind| ind.fitness.len())
        .unwrap_or(objective_names.len());

    let mut header = fields.clone();
    header.extend((0..objectives).map(|i| {
        objective_names
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("objective_{i}"))
    }));
    csv.write_record(&header).map_err(csv_error)?;

    for ind in &front.individuals {
        let mut row: Vec<String> = fields
            .iter()
            .map(|name| {
                ind.configuration
                    .get(name)
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
            .collect();
        row.extend(ind.fitness.values().iter().map(|v| v.to_string()));
        csv.write_record(&row).map_err(csv_error)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn save_history(path: &Path, history: &History) -> CtResult<()> {
    write_history_csv(File::create(path)?, history)?;
    info!(path = %path.display(), rows = history.len(), "history written");
    Ok(())
}

pub fn save_pareto(path: &Path, front: &ParetoFront, objective_names: &[String]) -> CtResult<()> {
    write_pareto_csv(File::create(path)?, front, objective_names)?;
    info!(path = %path.display(), rows = front.individuals.len(), "pareto front written");
    Ok(())
}
