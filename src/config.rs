use crate::model::{Model, ModelParams};
use crate::schedule::{Bounds, ScheduleMode};
use crate::variate::VariateMode;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Evaluation configuration.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Model parameters (calibrated defaults if omitted).
    #[serde(default)]
    pub model: ModelParams,

    /// Treatment encoding parameters.
    pub treatment: Treatment,

    /// Sampling parameters.
    pub sampling: Sampling,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Treatment {
    /// Number of doses that can be given.
    pub interventions: usize,
    /// Maximum total antibiotic dose (budget for relative doses).
    pub max_dose: f64,

    /// Dose times are relative to the previous dose.
    #[serde(default = "enabled")]
    pub relative_time: bool,
    /// Dose quantities are fractions of the remaining budget.
    #[serde(default = "enabled")]
    pub relative_dose: bool,

    /// Lower bounds of the encoding (length `2 * interventions`).
    pub lower_bounds: Vec<f64>,
    /// Upper bounds of the encoding (length `2 * interventions`).
    pub upper_bounds: Vec<f64>,
}

impl Treatment {
    pub fn n_variables(&self) -> usize {
        2 * self.interventions
    }

    pub fn mode(&self) -> ScheduleMode {
        ScheduleMode {
            relative_time: self.relative_time,
            relative_dose: self.relative_dose,
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            lower: self.lower_bounds.clone(),
            upper: self.upper_bounds.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sampling {
    /// Number of trajectories simulated per evaluation.
    pub n_samples: usize,
    /// Distribution of the stochastic increments.
    #[serde(default)]
    pub variate: VariateMode,
    /// Master seed (drawn from the OS if omitted).
    #[serde(default)]
    pub seed: Option<u64>,
}

fn enabled() -> bool {
    true
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        Model::new(self.model.clone(), self.sampling.variate)
            .context("invalid model parameters")?;

        let trt = &self.treatment;
        check_num(trt.interventions, 1..1_000).context("invalid number of interventions")?;
        check_num(trt.max_dose, 0.0..1e6).context("invalid maximum dose")?;
        check_bounds(&trt.lower_bounds, &trt.upper_bounds, trt.n_variables())
            .context("invalid encoding bounds")?;

        check_num(self.sampling.n_samples, 1..=10_000_000).context("invalid number of samples")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_bounds(lower: &[f64], upper: &[f64], exp_len: usize) -> Result<()> {
    // Ensure both vectors have the expected length.
    for (name, vec) in [("lower", lower), ("upper", upper)] {
        let len = vec.len();
        if len != exp_len {
            bail!("{name} bounds length must be {exp_len}, but is {len}");
        }
    }
    for (idx, (lo, hi)) in lower.iter().zip(upper).enumerate() {
        if !(lo.is_finite() && hi.is_finite()) {
            bail!("bounds of position {idx} must be finite");
        }
        if lo > hi {
            bail!("lower bound {lo} of position {idx} exceeds upper bound {hi}");
        }
    }
    Ok(())
}
