use amrdose::{Config, EvaluationReport, Evaluator, stats::Accumulator};
use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    io::{self, Write},
    path::Path,
    time::Instant,
};

/// Summary of repeated evaluations of the same encoding.
#[derive(Debug, Serialize)]
struct TestSummary {
    n_runs: usize,
    n_samples: usize,
    mean_death_frac: f64,
    std_dev_death_frac: f64,
    mean_survival: f64,
    secs_per_eval: f64,
    report: EvaluationReport,
}

pub struct Manager {
    cfg: Config,
    evaluator: Evaluator,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(config_file: P) -> Result<Self> {
        let cfg = Config::from_file(config_file).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        let evaluator = Evaluator::from_config(&cfg).context("failed to construct evaluator")?;

        Ok(Self { cfg, evaluator })
    }

    pub fn evaluate(&self, encoding: &[f64]) -> Result<()> {
        let report = self
            .evaluator
            .evaluate_report(encoding)
            .context("failed to evaluate encoding")?;
        log::info!("schedule:\n{}", report.schedule);

        write_json(&report)
    }

    pub fn test(&self, encoding: &[f64], n_runs: usize) -> Result<()> {
        let schedule = self
            .evaluator
            .decode(encoding)
            .context("failed to decode encoding")?;
        log::info!("schedule:\n{schedule}");

        let mut acc = Accumulator::new();
        let mut last_report = None;
        let start = Instant::now();
        for i_run in 0..n_runs {
            let report = self
                .evaluator
                .evaluate_report(encoding)
                .context("failed to evaluate encoding")?;
            acc.add(report.objectives.death_frac);
            last_report = Some(report);

            let progress = 100.0 * (i_run + 1) as f64 / n_runs as f64;
            log::info!("completed {progress:06.2}%");
        }
        let secs_per_eval = start.elapsed().as_secs_f64() / n_runs as f64;
        let report = last_report.context("number of runs must be positive")?;

        let stats = acc.report();
        let trt = &self.cfg.treatment;
        log::info!("relative time: {}", trt.relative_time);
        log::info!("relative dose: {}", trt.relative_dose);
        log::info!("max time: {}", self.cfg.model.max_time);
        log::info!("mean deaths: {:.3}", stats.mean);
        log::info!("mean survive: {:.3}", 1.0 - stats.mean);
        log::info!(
            "test runs: {n_runs} with {} samples per evaluation",
            self.evaluator.n_samples()
        );
        log::info!("seconds per evaluation: {secs_per_eval:.4}");
        log::info!(
            "max loops per evaluation: {:.0}",
            self.evaluator.model().n_steps() * self.evaluator.n_samples() as f64
        );

        write_json(&TestSummary {
            n_runs,
            n_samples: self.evaluator.n_samples(),
            mean_death_frac: stats.mean,
            std_dev_death_frac: stats.std_dev,
            mean_survival: 1.0 - stats.mean,
            secs_per_eval,
            report,
        })
    }
}

fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let mut writer = io::stdout().lock();
    serde_json::to_writer_pretty(&mut writer, value).context("failed to serialize report")?;
    writeln!(writer).context("failed to write report")?;
    Ok(())
}
