//! Evaluation of antibiotic dosing schedules against a stochastic model of
//! bacterial infection.
//!
//! An outer optimizer hands in a flat encoding of a schedule and receives an
//! [`Objectives`] vector through [`Problem::evaluate`].

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod schedule;
pub mod stats;
pub mod variate;

pub use config::Config;
pub use engine::{EvaluationReport, Evaluator, Objectives, Problem};
pub use error::EvalError;
pub use model::{Model, ModelParams, Outcome};
pub use schedule::{Bounds, Dose, Schedule, ScheduleMode};
pub use variate::VariateMode;
