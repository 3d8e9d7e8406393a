use crate::config::{Config, Sampling, Treatment};
use crate::error::EvalError;
use crate::model::{Model, Outcome, Trajectory};
use crate::schedule::{Bounds, Schedule};
use crate::stats::{Accumulator, AccumulatorReport};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

pub const N_OBJECTIVES: usize = 3;

/// Objective vector of one evaluated schedule, all to be minimized.
#[derive(Debug, PartialEq, Clone, Copy, Serialize)]
pub struct Objectives {
    /// Fraction of sampled hosts that died.
    pub death_frac: f64,
    /// Sum of all scheduled dose quantities.
    pub total_dose: f64,
    /// Number of clinically meaningful doses.
    pub n_doses: f64,
}

impl From<Objectives> for [f64; N_OBJECTIVES] {
    fn from(obj: Objectives) -> Self {
        [obj.death_frac, obj.total_dose, obj.n_doses]
    }
}

/// Search space and fitness function seen by an outer optimizer.
pub trait Problem: Sync {
    fn n_variables(&self) -> usize;

    fn n_objectives(&self) -> usize {
        N_OBJECTIVES
    }

    fn bounds(&self) -> &Bounds;

    fn evaluate(&self, encoding: &[f64]) -> Result<Objectives, EvalError>;
}

/// Outcome counts of a set of trajectories.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    pub n_cured: usize,
    pub n_died: usize,
    pub n_survived: usize,
    pub cure_time: Accumulator,
    pub max_conc: f64,
}

impl Tally {
    pub fn n_samples(&self) -> usize {
        self.n_cured + self.n_died + self.n_survived
    }

    pub fn death_frac(&self) -> f64 {
        self.n_died as f64 / self.n_samples() as f64
    }

    fn add(&mut self, traj: &Trajectory) {
        match traj.outcome {
            Outcome::Cured => {
                self.n_cured += 1;
                self.cure_time.add(traj.final_time);
            }
            Outcome::Died => self.n_died += 1,
            Outcome::Survived => self.n_survived += 1,
        }
        self.max_conc = self.max_conc.max(traj.max_conc);
    }
}

/// Simulate `n_samples` independent trajectories in parallel and tally them.
///
/// Trajectory `i` uses stream `i` of a generator seeded with `seed`, so the
/// result depends only on the inputs, not on thread scheduling.
///
/// # Errors
/// Returns [`EvalError::InvalidSampleCount`] if `n_samples` is zero.
pub fn run_samples(
    model: &Model,
    schedule: &Schedule,
    n_samples: usize,
    seed: u64,
) -> Result<Tally, EvalError> {
    if n_samples == 0 {
        return Err(EvalError::InvalidSampleCount(n_samples));
    }

    let traj_vec: Vec<Trajectory> = (0..n_samples)
        .into_par_iter()
        .map(|i_sample| {
            let mut rng = ChaCha12Rng::seed_from_u64(seed);
            rng.set_stream(i_sample as u64);
            model.run_trajectory(schedule, &mut rng)
        })
        .collect::<Result<_, _>>()?;

    let mut tally = Tally::default();
    for traj in &traj_vec {
        tally.add(traj);
    }
    Ok(tally)
}

/// Detailed result of one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub objectives: Objectives,
    pub schedule: Schedule,
    pub n_samples: usize,
    pub n_cured: usize,
    pub n_died: usize,
    pub n_survived: usize,
    /// Time of cure over the cured samples.
    pub cure_time: AccumulatorReport,
    /// Highest antibiotic concentration reached in any sample.
    pub max_conc: f64,
    /// Largest single dose.
    pub max_dose: f64,
    /// Time of the last meaningful dose.
    pub treatment_time: f64,
}

impl EvaluationReport {
    fn new(schedule: Schedule, tally: Tally) -> Self {
        let objectives = Objectives {
            death_frac: tally.death_frac(),
            total_dose: schedule.total_dose(),
            n_doses: schedule.n_meaningful_doses() as f64,
        };
        Self {
            objectives,
            n_samples: tally.n_samples(),
            n_cured: tally.n_cured,
            n_died: tally.n_died,
            n_survived: tally.n_survived,
            cure_time: tally.cure_time.report(),
            max_conc: tally.max_conc,
            max_dose: schedule.max_dose(),
            treatment_time: schedule.treatment_time(),
            schedule,
        }
    }
}

/// Dosing schedule evaluator.
///
/// Holds the validated model, the treatment encoding and a master random
/// number generator from which every evaluation draws its own seed.
pub struct Evaluator {
    model: Model,
    treatment: Treatment,
    bounds: Bounds,
    n_samples: usize,
    rng: Mutex<ChaCha12Rng>,
}

impl Evaluator {
    /// Create a new `Evaluator`, seeding the master generator from
    /// `sampling.seed` or, if absent, from the operating system.
    pub fn new(model: Model, treatment: Treatment, sampling: &Sampling) -> Result<Self, EvalError> {
        if sampling.n_samples == 0 {
            return Err(EvalError::InvalidSampleCount(sampling.n_samples));
        }
        if treatment.interventions == 0 {
            return Err(EvalError::InvalidParameter(
                "number of interventions must be positive".into(),
            ));
        }
        let bounds = treatment.bounds();
        if bounds.len() != treatment.n_variables() || bounds.upper.len() != bounds.len() {
            return Err(EvalError::InvalidParameter(format!(
                "bounds must have length {}",
                treatment.n_variables()
            )));
        }

        let rng = match sampling.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => {
                ChaCha12Rng::try_from_os_rng().map_err(|err| EvalError::Seed(err.to_string()))?
            }
        };

        Ok(Self {
            model,
            treatment,
            bounds,
            n_samples: sampling.n_samples,
            rng: Mutex::new(rng),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, EvalError> {
        let model = Model::new(cfg.model.clone(), cfg.sampling.variate)?;
        Self::new(model, cfg.treatment.clone(), &cfg.sampling)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Decode an encoding with the configured budget and interpretation.
    pub fn decode(&self, encoding: &[f64]) -> Result<Schedule, EvalError> {
        if !self.bounds.contains(encoding) {
            log::warn!("encoding {encoding:?} lies outside the configured bounds");
        }
        Schedule::decode(encoding, self.treatment.max_dose, self.treatment.mode())
    }

    /// Evaluate one encoding and return the full report.
    pub fn evaluate_report(&self, encoding: &[f64]) -> Result<EvaluationReport, EvalError> {
        let schedule = self.decode(encoding)?;
        let seed = self.next_seed();
        self.simulate(schedule, seed)
    }

    /// Evaluate several encodings in parallel.
    ///
    /// Encodings are decoded and seeded in input order before any simulation
    /// starts, so each valid encoding gets the seed it would get from
    /// consecutive [`Evaluator::evaluate_report`] calls.
    pub fn evaluate_batch(&self, encodings: &[Vec<f64>]) -> Vec<Result<Objectives, EvalError>> {
        let jobs: Vec<Result<(Schedule, u64), EvalError>> = encodings
            .iter()
            .map(|encoding| {
                let schedule = self.decode(encoding)?;
                Ok((schedule, self.next_seed()))
            })
            .collect();
        jobs.into_par_iter()
            .map(|job| -> Result<Objectives, EvalError> {
                let (schedule, seed) = job?;
                Ok(self.simulate(schedule, seed)?.objectives)
            })
            .collect()
    }

    fn simulate(&self, schedule: Schedule, seed: u64) -> Result<EvaluationReport, EvalError> {
        let tally = run_samples(&self.model, &schedule, self.n_samples, seed)?;
        let report = EvaluationReport::new(schedule, tally);
        log::debug!("{:?}", report.objectives);
        Ok(report)
    }

    fn next_seed(&self) -> u64 {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.random()
    }
}

impl Problem for Evaluator {
    fn n_variables(&self) -> usize {
        self.treatment.n_variables()
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    fn evaluate(&self, encoding: &[f64]) -> Result<Objectives, EvalError> {
        Ok(self.evaluate_report(encoding)?.objectives)
    }
}
