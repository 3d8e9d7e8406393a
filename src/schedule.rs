use crate::error::EvalError;
use serde::Serialize;
use std::fmt;

/// Doses at or below this quantity are not counted as clinically meaningful.
pub const MEANINGFUL_DOSE: f64 = 0.05;

/// How the two axes of an encoding are interpreted.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ScheduleMode {
    /// Each time is an offset from the previous dose time.
    pub relative_time: bool,
    /// Each dose is a fraction of the remaining dose budget.
    pub relative_dose: bool,
}

impl ScheduleMode {
    pub const ABSOLUTE: Self = Self {
        relative_time: false,
        relative_dose: false,
    };

    pub const RELATIVE: Self = Self {
        relative_time: true,
        relative_dose: true,
    };
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize)]
pub struct Dose {
    pub time: f64,
    pub quantity: f64,
}

/// Decoded dosing schedule, one [`Dose`] per encoded pair, in encoding order.
///
/// Dose times are not necessarily increasing.
#[derive(Debug, PartialEq, Clone, Serialize)]
#[serde(transparent)]
pub struct Schedule {
    doses: Vec<Dose>,
}

impl Schedule {
    /// Decode a flat `[time_0, dose_0, time_1, dose_1, ...]` encoding.
    ///
    /// # Errors
    /// Returns [`EvalError::InvalidEncoding`] if the encoding is empty, has odd
    /// length or contains a non-finite value.
    pub fn decode(encoding: &[f64], max_dose: f64, mode: ScheduleMode) -> Result<Self, EvalError> {
        let len = encoding.len();
        if len == 0 {
            return Err(EvalError::InvalidEncoding("encoding is empty".into()));
        }
        if len % 2 != 0 {
            return Err(EvalError::InvalidEncoding(format!(
                "encoding length must be even, but is {len}"
            )));
        }
        if let Some(idx) = encoding.iter().position(|val| !val.is_finite()) {
            return Err(EvalError::InvalidEncoding(format!(
                "value at position {idx} must be finite, but is {}",
                encoding[idx]
            )));
        }

        // The remaining budget is not clamped and may become negative.
        let (doses, _, _) = encoding.chunks_exact(2).fold(
            (Vec::with_capacity(len / 2), 0.0, max_dose),
            |(mut doses, clock, remaining), pair| {
                let (time, fraction) = (pair[0], pair[1]);

                let time = if mode.relative_time { clock + time } else { time };
                let (quantity, remaining) = if mode.relative_dose {
                    let quantity = fraction * remaining;
                    (quantity, remaining - quantity)
                } else {
                    (fraction, remaining)
                };

                doses.push(Dose { time, quantity });
                (doses, time, remaining)
            },
        );

        Ok(Self { doses })
    }

    pub fn doses(&self) -> &[Dose] {
        &self.doses
    }

    pub fn len(&self) -> usize {
        self.doses.len()
    }

    pub fn total_dose(&self) -> f64 {
        self.doses.iter().map(|dose| dose.quantity).sum()
    }

    pub fn n_meaningful_doses(&self) -> usize {
        self.doses
            .iter()
            .filter(|dose| dose.quantity > MEANINGFUL_DOSE)
            .count()
    }

    /// Largest single dose, or 0 if no dose is positive.
    pub fn max_dose(&self) -> f64 {
        self.doses
            .iter()
            .map(|dose| dose.quantity)
            .fold(0.0, f64::max)
    }

    /// Time of the last meaningful dose in schedule order, or 0 if there is none.
    pub fn treatment_time(&self) -> f64 {
        self.doses
            .iter()
            .rev()
            .find(|dose| dose.quantity > MEANINGFUL_DOSE)
            .map_or(0.0, |dose| dose.time)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Time\tDose")?;
        for dose in &self.doses {
            writeln!(f, "{:.2}\t{:.2}", dose.time, dose.quantity)?;
        }
        Ok(())
    }
}

/// Per-position lower and upper bounds of an encoding.
///
/// Bounds are enforced by the optimizer; the evaluator only reports violations.
#[derive(Debug, PartialEq, Clone)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// Whether every component lies within its bounds.
    pub fn contains(&self, encoding: &[f64]) -> bool {
        encoding.len() == self.len()
            && encoding
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(val, (lo, hi))| (lo..=hi).contains(&val))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(schedule: &Schedule) -> Vec<f64> {
        schedule.doses().iter().map(|dose| dose.time).collect()
    }

    fn quantities(schedule: &Schedule) -> Vec<f64> {
        schedule.doses().iter().map(|dose| dose.quantity).collect()
    }

    #[test]
    fn absolute_decoding_copies_pairs() {
        let schedule =
            Schedule::decode(&[2.0, 0.5, 3.0, 1.0], 1.0, ScheduleMode::ABSOLUTE).unwrap();
        assert_eq!(
            schedule.doses(),
            &[
                Dose {
                    time: 2.0,
                    quantity: 0.5
                },
                Dose {
                    time: 3.0,
                    quantity: 1.0
                },
            ]
        );
    }

    #[test]
    fn relative_decoding_accumulates_time_and_budget() {
        let schedule =
            Schedule::decode(&[2.0, 0.5, 3.0, 1.0], 1.0, ScheduleMode::RELATIVE).unwrap();
        assert_eq!(times(&schedule), vec![2.0, 5.0]);
        assert_eq!(quantities(&schedule), vec![0.5, 0.5]);
        assert_eq!(schedule.total_dose(), 1.0);
    }

    #[test]
    fn mixed_modes_are_independent() {
        let mode = ScheduleMode {
            relative_time: true,
            relative_dose: false,
        };
        let schedule = Schedule::decode(&[2.0, 0.3, 22.0, 0.4], 0.9, mode).unwrap();
        assert_eq!(times(&schedule), vec![2.0, 24.0]);
        assert_eq!(quantities(&schedule), vec![0.3, 0.4]);

        let mode = ScheduleMode {
            relative_time: false,
            relative_dose: true,
        };
        let schedule = Schedule::decode(&[2.0, 0.5, 1.0, 0.5], 2.0, mode).unwrap();
        assert_eq!(times(&schedule), vec![2.0, 1.0]);
        assert_eq!(quantities(&schedule), vec![1.0, 0.5]);
    }

    #[test]
    fn budget_may_go_negative() {
        let encoding = [0.0, 1.5, 1.0, 1.0, 1.0, 1.0];
        let schedule = Schedule::decode(&encoding, 1.0, ScheduleMode::RELATIVE).unwrap();
        // 1.5 of 1.0, then 1.0 of -0.5, then 1.0 of 0.0.
        assert_eq!(quantities(&schedule), vec![1.5, -0.5, 0.0]);
        assert_eq!(schedule.total_dose(), 1.0);
    }

    #[test]
    fn decoding_is_deterministic() {
        let encoding = [2.01, 0.5, 22.01, 1.0, 24.1, 0.0];
        let a = Schedule::decode(&encoding, 0.9, ScheduleMode::RELATIVE).unwrap();
        let b = Schedule::decode(&encoding, 0.9, ScheduleMode::RELATIVE).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn rejects_empty_and_odd_encodings() {
        assert!(matches!(
            Schedule::decode(&[], 1.0, ScheduleMode::RELATIVE),
            Err(EvalError::InvalidEncoding(_))
        ));
        assert!(matches!(
            Schedule::decode(&[1.0, 0.5, 2.0], 1.0, ScheduleMode::ABSOLUTE),
            Err(EvalError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn rejects_non_finite_values() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                Schedule::decode(&[1.0, bad], 1.0, ScheduleMode::ABSOLUTE),
                Err(EvalError::InvalidEncoding(_))
            ));
        }
    }

    #[test]
    fn summary_statistics() {
        let encoding = [2.0, 0.45, 24.0, 0.04, 48.0, 0.3, 72.0, 0.0];
        let schedule = Schedule::decode(&encoding, 0.0, ScheduleMode::ABSOLUTE).unwrap();
        assert_eq!(schedule.n_meaningful_doses(), 2);
        assert_eq!(schedule.max_dose(), 0.45);
        assert_eq!(schedule.treatment_time(), 48.0);

        let empty = Schedule::decode(&[2.0, 0.0], 0.0, ScheduleMode::ABSOLUTE).unwrap();
        assert_eq!(empty.n_meaningful_doses(), 0);
        assert_eq!(empty.treatment_time(), 0.0);
    }

    #[test]
    fn display_lists_doses() {
        let schedule = Schedule::decode(&[2.0, 0.45], 0.0, ScheduleMode::ABSOLUTE).unwrap();
        assert_eq!(schedule.to_string(), "Time\tDose\n2.00\t0.45\n");
    }

    #[test]
    fn bounds_check_every_position() {
        let bounds = Bounds {
            lower: vec![2.0, 0.0],
            upper: vec![2.01, 1.0],
        };
        assert!(bounds.contains(&[2.0, 0.5]));
        assert!(!bounds.contains(&[2.0, -0.1]));
        assert!(!bounds.contains(&[2.0]));
    }
}
