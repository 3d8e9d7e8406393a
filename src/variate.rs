use crate::error::EvalError;
use rand::prelude::*;
use rand_distr::{Poisson, StandardNormal};
use serde::{Deserialize, Serialize};

/// Strategy used to draw the stochastic increments of the model.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariateMode {
    /// Normal approximation `N(mean, sqrt(mean))`, unclamped.
    #[default]
    Gaussian,
    /// Exact Poisson count with the given mean.
    Poisson,
}

impl VariateMode {
    /// Draw the number of events of a process with the given mean.
    ///
    /// A non-positive mean produces no events.
    pub fn draw_count<R: Rng + ?Sized>(&self, mean: f64, rng: &mut R) -> Result<f64, EvalError> {
        if mean <= 0.0 {
            return Ok(0.0);
        }
        match self {
            VariateMode::Gaussian => {
                let z: f64 = StandardNormal.sample(rng);
                Ok(mean + mean.sqrt() * z)
            }
            VariateMode::Poisson => {
                let dist = Poisson::new(mean).map_err(|err| EvalError::Variate(err.to_string()))?;
                Ok(dist.sample(rng))
            }
        }
    }
}
