use crate::error::EvalError;
use crate::schedule::Schedule;
use crate::variate::VariateMode;
use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

/// Parameters of the within-host infection model.
///
/// Defaults are the calibrated values; times are in hours.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelParams {
    /// Mean replication rate of the bacteria.
    pub rate_rep: f64,
    /// Mean coefficient of the host immune response.
    pub coef_immune: f64,
    /// Hill exponent of the immune response.
    pub hill_immune: f64,
    /// Standard deviation of host heterogeneity.
    pub std_dev_host: f64,

    /// Maximum kill rate of the antibiotic.
    pub kill_max: f64,
    /// Antibiotic concentration giving half the maximum kill rate.
    pub conc_half_kill: f64,
    /// Hill exponent of antibiotic induced death.
    pub hill_kill: f64,
    /// Decay rate of the antibiotic.
    pub rate_decay: f64,
    /// Multiplier keeping the decay count in a stable range.
    pub decay_scale: f64,

    /// Bacterial load at which the host dies.
    pub load_death: f64,
    pub load_init: f64,
    pub conc_init: f64,

    pub time_step: f64,
    pub max_time: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            rate_rep: 0.4779,
            coef_immune: 0.6772,
            hill_immune: 0.9193,
            std_dev_host: 0.0525,
            kill_max: 0.7281,
            conc_half_kill: 0.1910,
            hill_kill: 2.9821,
            rate_decay: 0.1174,
            decay_scale: 200.0,
            load_death: 1e9,
            load_init: 1e5,
            conc_init: 0.0,
            time_step: 0.25,
            max_time: 192.0,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Cured,
    Died,
    /// Reached the time horizon without cure or death.
    Survived,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Trajectory {
    pub outcome: Outcome,
    pub final_time: f64,
    pub max_conc: f64,
}

struct TrajectoryState {
    load: f64,
    conc: f64,
    time: f64,
    i_dose: usize,
    next_dose_time: f64,
    max_conc: f64,
}

/// Validated infection model.
///
/// Holds the parameters together with the quantities derived from them once.
#[derive(Debug, Clone)]
pub struct Model {
    params: ModelParams,
    variate: VariateMode,
    rep_dist: Normal<f64>,
    immune_dist: Normal<f64>,
    conc_half_kill_k: f64,
}

impl Model {
    /// Validate the parameters and construct the model.
    ///
    /// # Errors
    /// Returns [`EvalError::InvalidParameter`] if a parameter is non-finite,
    /// out of range, or if the time step does not fit in the horizon.
    pub fn new(params: ModelParams, variate: VariateMode) -> Result<Self, EvalError> {
        params.validate()?;

        let rep_dist = Normal::new(params.rate_rep, params.std_dev_host)
            .map_err(|err| EvalError::InvalidParameter(err.to_string()))?;
        let immune_dist = Normal::new(params.coef_immune, params.std_dev_host)
            .map_err(|err| EvalError::InvalidParameter(err.to_string()))?;
        let conc_half_kill_k = params.conc_half_kill.powf(params.hill_kill);
        if !(conc_half_kill_k > 0.0 && conc_half_kill_k.is_finite()) {
            return Err(invalid(format!(
                "half-kill term must be positive and finite, but is {conc_half_kill_k}"
            )));
        }

        Ok(Self {
            params,
            variate,
            rep_dist,
            immune_dist,
            conc_half_kill_k,
        })
    }

    /// Number of time steps needed to cover the horizon.
    pub fn n_steps(&self) -> f64 {
        (self.params.max_time / self.params.time_step).ceil()
    }

    /// Simulate one stochastic trajectory under the given schedule.
    pub fn run_trajectory<R: Rng + ?Sized>(
        &self,
        schedule: &Schedule,
        rng: &mut R,
    ) -> Result<Trajectory, EvalError> {
        let par = &self.params;
        let doses = schedule.doses();

        // Host heterogeneity, drawn once per trajectory.
        let rate_rep = self.rep_dist.sample(rng);
        let coef_immune = self.immune_dist.sample(rng);

        let mut state = TrajectoryState {
            load: par.load_init,
            conc: par.conc_init,
            time: 0.0,
            i_dose: 0,
            next_dose_time: doses.first().map_or(par.max_time + 1.0, |dose| dose.time),
            max_conc: par.conc_init,
        };

        while state.time < par.max_time && state.load > 0.0 {
            // A dose is given only while the clock is inside its window; a
            // missed window holds back every later dose.
            if state.next_dose_time <= state.time
                && state.time <= state.next_dose_time + par.time_step
            {
                state.conc += doses[state.i_dose].quantity;
                state.max_conc = state.max_conc.max(state.conc);
                state.i_dose += 1;
                state.next_dose_time = match doses.get(state.i_dose) {
                    Some(dose) => dose.time,
                    None => par.max_time + 1.0,
                };
            }

            let growth = rate_rep * state.load;
            let kill = coef_immune * state.load.powf(par.hill_immune)
                + state.load * par.kill_max * self.kill_frac(state.conc);

            state.load += self.variate.draw_count(par.time_step * growth, rng)?
                - self.variate.draw_count(par.time_step * kill, rng)?;

            let decay_mean = par.time_step * par.rate_decay * state.conc * par.decay_scale;
            let decay = self.variate.draw_count(decay_mean, rng)? / par.decay_scale;
            state.conc = (state.conc - decay).max(0.0);

            if state.load < 1.0 {
                return Ok(state.finish(Outcome::Cured));
            }
            if state.load > par.load_death {
                return Ok(state.finish(Outcome::Died));
            }

            state.time += par.time_step;
        }

        Ok(state.finish(Outcome::Survived))
    }
}

impl Model {
    /// Fraction of the maximum antibiotic kill rate at the given concentration.
    ///
    /// Non-positive concentrations kill nothing.
    fn kill_frac(&self, conc: f64) -> f64 {
        if !(conc > 0.0) {
            return 0.0;
        }
        let conc_k = conc.powf(self.params.hill_kill);
        if conc_k.is_infinite() {
            return 1.0;
        }
        conc_k / (conc_k + self.conc_half_kill_k)
    }
}

impl TrajectoryState {
    fn finish(self, outcome: Outcome) -> Trajectory {
        Trajectory {
            outcome,
            final_time: self.time,
            max_conc: self.max_conc,
        }
    }
}

impl ModelParams {
    fn validate(&self) -> Result<(), EvalError> {
        let finite = [
            ("replication rate", self.rate_rep),
            ("immune coefficient", self.coef_immune),
            ("immune Hill exponent", self.hill_immune),
            ("maximum kill rate", self.kill_max),
            ("decay rate", self.rate_decay),
        ];
        for (name, val) in finite {
            if !val.is_finite() {
                return Err(invalid(format!("{name} must be finite, but is {val}")));
            }
        }

        let non_negative = [
            ("host heterogeneity standard deviation", self.std_dev_host),
            ("initial concentration", self.conc_init),
        ];
        for (name, val) in non_negative {
            if !(val >= 0.0 && val.is_finite()) {
                return Err(invalid(format!("{name} must be non-negative, but is {val}")));
            }
        }

        let positive = [
            ("half-kill concentration", self.conc_half_kill),
            ("antibiotic Hill exponent", self.hill_kill),
            ("decay scale", self.decay_scale),
            ("death load", self.load_death),
            ("initial load", self.load_init),
            ("time step", self.time_step),
            ("maximum time", self.max_time),
        ];
        for (name, val) in positive {
            if !(val > 0.0 && val.is_finite()) {
                return Err(invalid(format!("{name} must be positive, but is {val}")));
            }
        }

        if self.time_step >= self.max_time {
            return Err(invalid(format!(
                "time step {} must be smaller than maximum time {}",
                self.time_step, self.max_time
            )));
        }

        Ok(())
    }
}

fn invalid(msg: String) -> EvalError {
    EvalError::InvalidParameter(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleMode;
    use rand_chacha::ChaCha12Rng;

    fn schedule(encoding: &[f64]) -> Schedule {
        Schedule::decode(encoding, 0.0, ScheduleMode::ABSOLUTE).unwrap()
    }

    /// Model with no growth, no kill and no decay: nothing ever happens.
    fn inert_params() -> ModelParams {
        ModelParams {
            rate_rep: 0.0,
            coef_immune: 0.0,
            std_dev_host: 0.0,
            kill_max: 0.0,
            rate_decay: 0.0,
            max_time: 10.0,
            ..ModelParams::default()
        }
    }

    #[test]
    fn rejects_degenerate_time_grid() {
        for (time_step, max_time) in [(0.0, 192.0), (0.25, 0.0), (-1.0, 192.0), (2.0, 2.0)] {
            let params = ModelParams {
                time_step,
                max_time,
                ..ModelParams::default()
            };
            assert!(matches!(
                Model::new(params, VariateMode::Gaussian),
                Err(EvalError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn rejects_negative_heterogeneity() {
        let params = ModelParams {
            std_dev_host: -0.1,
            ..ModelParams::default()
        };
        assert!(Model::new(params, VariateMode::Gaussian).is_err());
    }

    #[test]
    fn rejects_degenerate_kill_curve() {
        for (conc_half_kill, hill_kill) in [(0.0, 2.9821), (0.191, -1.0), (0.191, 0.0)] {
            let params = ModelParams {
                conc_half_kill,
                hill_kill,
                ..ModelParams::default()
            };
            assert!(matches!(
                Model::new(params, VariateMode::Gaussian),
                Err(EvalError::InvalidParameter(_))
            ));
        }
    }

    /// Model where only the immune response acts on the bacteria.
    fn immune_only_params() -> ModelParams {
        ModelParams {
            rate_rep: 0.0,
            std_dev_host: 0.0,
            ..ModelParams::default()
        }
    }

    #[test]
    fn immune_response_clears_untreated_infection() {
        let model = Model::new(immune_only_params(), VariateMode::Gaussian).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let traj = model.run_trajectory(&schedule(&[0.0, 0.0]), &mut rng).unwrap();
        assert_eq!(traj.outcome, Outcome::Cured);
        assert!(traj.final_time < 48.0, "{traj:?}");
    }

    #[test]
    fn negative_dose_keeps_immune_response() {
        let model = Model::new(immune_only_params(), VariateMode::Gaussian).unwrap();
        let untreated = model
            .run_trajectory(&schedule(&[0.0, 0.0]), &mut ChaCha12Rng::seed_from_u64(12))
            .unwrap();
        let negative = model
            .run_trajectory(&schedule(&[0.0, -1.0]), &mut ChaCha12Rng::seed_from_u64(12))
            .unwrap();
        assert_eq!(untreated.outcome, Outcome::Cured);
        assert_eq!(negative, untreated);
    }

    #[test]
    fn huge_dose_saturates_kill_curve() {
        let model = Model::new(ModelParams::default(), VariateMode::Gaussian).unwrap();
        assert_eq!(model.kill_frac(0.0), 0.0);
        assert_eq!(model.kill_frac(-1.0), 0.0);
        assert_eq!(model.kill_frac(f64::MAX), 1.0);
        assert!((model.kill_frac(0.191) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn horizon_exhaustion_is_survival() {
        let model = Model::new(inert_params(), VariateMode::Gaussian).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        let traj = model.run_trajectory(&schedule(&[1.0, 0.5]), &mut rng).unwrap();
        assert_eq!(traj.outcome, Outcome::Survived);
        assert_eq!(traj.final_time, 10.0);
        assert_eq!(traj.max_conc, 0.5);
    }

    #[test]
    fn doses_apply_once_inside_their_window() {
        let model = Model::new(inert_params(), VariateMode::Poisson).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(6);
        let traj = model
            .run_trajectory(&schedule(&[1.0, 0.5, 1.1, 0.25, 3.0, 1.0]), &mut rng)
            .unwrap();
        // Doses at 1.0 and 1.1 fall in consecutive steps, the last at 3.0.
        assert_eq!(traj.max_conc, 1.75);
    }

    #[test]
    fn missed_window_blocks_later_doses() {
        let model = Model::new(inert_params(), VariateMode::Gaussian).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        // The second dose is due at 0.5, long before the first is given at 5.0.
        let traj = model
            .run_trajectory(&schedule(&[5.0, 0.5, 0.5, 1.0, 6.0, 2.0]), &mut rng)
            .unwrap();
        assert_eq!(traj.outcome, Outcome::Survived);
        assert_eq!(traj.max_conc, 0.5);
    }

    #[test]
    fn untreated_infection_is_fatal() {
        let model = Model::new(ModelParams::default(), VariateMode::Gaussian).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(8);
        let traj = model.run_trajectory(&schedule(&[2.0, 0.0]), &mut rng).unwrap();
        assert_eq!(traj.outcome, Outcome::Died);
        assert!(traj.final_time < 192.0);
    }

    #[test]
    fn strong_treatment_cures() {
        for variate in [VariateMode::Gaussian, VariateMode::Poisson] {
            let model = Model::new(ModelParams::default(), variate).unwrap();
            let mut rng = ChaCha12Rng::seed_from_u64(9);
            let encoding = [0.0, 5.0, 12.0, 5.0, 24.0, 5.0, 36.0, 5.0];
            let traj = model.run_trajectory(&schedule(&encoding), &mut rng).unwrap();
            assert_eq!(traj.outcome, Outcome::Cured, "{variate:?}");
        }
    }

    #[test]
    fn negative_doses_do_not_crash() {
        let model = Model::new(ModelParams::default(), VariateMode::Gaussian).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(10);
        model
            .run_trajectory(&schedule(&[0.0, -1.0, 1.0, -0.5]), &mut rng)
            .unwrap();
    }
}
