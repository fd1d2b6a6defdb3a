//! Beam integration rules.
//!
//! Force-based beam-column elements sample their sections at points along the
//! member. A rule supplies those locations as fractions of the member length
//! in `[0, 1]` and the matching weights.
//!
//! [`UserDefinedIntegration`] holds caller-supplied points and weights; both
//! are updatable through [`ParameterId::Point`] and [`ParameterId::Weight`].

use crate::broker::ObjectBroker;
use crate::channel::{Channel, Movable};
use crate::error::{Error, Result};
use crate::parameter::{finite, parse_index, ParameterId, Parameterized};
use crate::types::ClassTag;
use std::fmt;
use tracing::warn;

/// Gauss-Legendre points and weights on [-1, 1].
fn gauss_1d(n: usize) -> Option<Vec<(f64, f64)>> {
    let rule = match n {
        1 => vec![(0.0, 2.0)],
        2 => {
            let p = 1.0 / 3.0_f64.sqrt();
            vec![(-p, 1.0), (p, 1.0)]
        }
        3 => {
            let p = (3.0 / 5.0_f64).sqrt();
            vec![(-p, 5.0 / 9.0), (0.0, 8.0 / 9.0), (p, 5.0 / 9.0)]
        }
        4 => {
            let sqrt_6_5 = (6.0 / 5.0_f64).sqrt();
            let p1 = ((3.0 - 2.0 * sqrt_6_5) / 7.0).sqrt();
            let p2 = ((3.0 + 2.0 * sqrt_6_5) / 7.0).sqrt();
            let sqrt_30 = 30.0_f64.sqrt();
            let w1 = (18.0 + sqrt_30) / 36.0;
            let w2 = (18.0 - sqrt_30) / 36.0;
            vec![(-p2, w2), (-p1, w1), (p1, w1), (p2, w2)]
        }
        _ => return None,
    };
    Some(rule)
}

/// Section sampling rule along a beam.
pub trait BeamIntegration: Movable + fmt::Debug + Send + Sync {
    /// Number of integration points defined by the rule.
    fn num_points(&self) -> usize;

    /// Section locations as fractions of `length`, for `num_sections` sections.
    fn section_locations(&self, num_sections: usize, length: f64) -> Vec<f64>;

    /// Section weights as fractions of `length`, for `num_sections` sections.
    fn section_weights(&self, num_sections: usize, length: f64) -> Vec<f64>;

    /// Independent duplicate.
    fn get_copy(&self) -> Box<dyn BeamIntegration>;
}

/// Caller-supplied integration points and weights.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserDefinedIntegration {
    points: Vec<f64>,
    weights: Vec<f64>,
}

impl UserDefinedIntegration {
    /// Create a rule from points in `[0, 1]` and their weights.
    ///
    /// Points outside `[0, 1]` are accepted with a warning.
    ///
    /// # Errors
    ///
    /// Returns error if the arrays differ in length or hold non-finite values.
    pub fn new(points: Vec<f64>, weights: Vec<f64>) -> Result<Self> {
        if points.len() != weights.len() {
            return Err(Error::Config(format!(
                "{} integration points but {} weights",
                points.len(),
                weights.len()
            )));
        }
        if points.iter().chain(&weights).any(|v| !v.is_finite()) {
            return Err(Error::Config(
                "integration points and weights must be finite".into(),
            ));
        }
        for &p in &points {
            if !(0.0..=1.0).contains(&p) {
                warn!(point = p, "integration point lies outside [0,1]");
            }
        }
        Ok(Self { points, weights })
    }

    /// Gauss-Legendre rule with `n` points mapped onto `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns error unless `n` is 1 to 4.
    pub fn gauss_legendre(n: usize) -> Result<Self> {
        let rule = gauss_1d(n).ok_or_else(|| {
            Error::Config(format!("Gauss-Legendre rule needs 1 to 4 points, got {n}"))
        })?;
        let (points, weights) = rule
            .into_iter()
            .map(|(xi, w)| (0.5 * (xi + 1.0), 0.5 * w))
            .unzip();
        Ok(Self { points, weights })
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

impl BeamIntegration for UserDefinedIntegration {
    fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Sections beyond the defined points sit at 0.0.
    fn section_locations(&self, num_sections: usize, _length: f64) -> Vec<f64> {
        let mut xi = self.points.clone();
        xi.resize(num_sections, 0.0);
        xi
    }

    /// Sections beyond the defined points get weight 1.0.
    fn section_weights(&self, num_sections: usize, _length: f64) -> Vec<f64> {
        let mut wt = self.weights.clone();
        wt.resize(num_sections, 1.0);
        wt
    }

    fn get_copy(&self) -> Box<dyn BeamIntegration> {
        Box::new(self.clone())
    }
}

impl Parameterized for UserDefinedIntegration {
    /// `["pt", i]` or `["wt", i]` with a 1-based point index.
    fn set_parameter(&self, args: &[&str]) -> Result<ParameterId> {
        match args.first().copied() {
            Some("pt") => Ok(ParameterId::Point(parse_index(args, self.points.len())?)),
            Some("wt") => Ok(ParameterId::Weight(parse_index(args, self.weights.len())?)),
            other => Err(Error::Parameter(format!(
                "user-defined integration has no parameter {other:?}"
            ))),
        }
    }

    fn update_parameter(&mut self, id: ParameterId, value: f64) -> Result<()> {
        let value = finite(id, value)?;
        let slot = match id {
            ParameterId::Point(i) => self.points.get_mut(i),
            ParameterId::Weight(i) => self.weights.get_mut(i),
            _ => None,
        };
        let slot = slot.ok_or_else(|| {
            Error::Parameter(format!("user-defined integration cannot update {id:?}"))
        })?;
        *slot = value;
        Ok(())
    }
}

impl Movable for UserDefinedIntegration {
    fn class_tag(&self) -> ClassTag {
        ClassTag::UserDefinedIntegration
    }

    fn send_self(&self, commit_tag: i32, channel: &mut dyn Channel) -> Result<()> {
        let db_tag = self.db_tag();
        channel.send_id(db_tag, commit_tag, &[self.points.len() as i32])?;
        channel.send_vector(db_tag, commit_tag, &self.points)?;
        channel.send_vector(db_tag, commit_tag, &self.weights)
    }

    fn recv_self(
        &mut self,
        commit_tag: i32,
        channel: &mut dyn Channel,
        _broker: &dyn ObjectBroker,
    ) -> Result<()> {
        let db_tag = self.db_tag();
        let mut ids = [0i32; 1];
        channel.recv_id(db_tag, commit_tag, &mut ids)?;
        let n = usize::try_from(ids[0])
            .map_err(|_| Error::Channel(format!("invalid point count {}", ids[0])))?;

        let points = channel.recv_values(db_tag, commit_tag, n)?;
        let weights = channel.recv_values(db_tag, commit_tag, n)?;
        let rule = Self::new(points, weights)
            .map_err(|e| Error::Channel(format!("received invalid integration rule: {e}")))?;

        *self = rule;
        Ok(())
    }
}

impl fmt::Display for UserDefinedIntegration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "UserDefined")?;
        writeln!(f, " Points: {:?}", self.points)?;
        writeln!(f, " Weights: {:?}", self.weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::DefaultBroker;
    use crate::channel::MemoryChannel;
    use approx::assert_relative_eq;

    #[test]
    fn test_section_padding() {
        let rule = UserDefinedIntegration::new(vec![0.0, 1.0], vec![0.5, 0.5]).unwrap();
        assert_eq!(rule.section_locations(4, 3.0), vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(rule.section_weights(4, 3.0), vec![0.5, 0.5, 1.0, 1.0]);
        assert_eq!(rule.section_locations(1, 3.0), vec![0.0]);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        assert!(UserDefinedIntegration::new(vec![0.0, 1.0], vec![1.0]).is_err());
    }

    #[test]
    fn test_outside_unit_interval_accepted() {
        let rule = UserDefinedIntegration::new(vec![-0.1, 1.2], vec![0.5, 0.5]).unwrap();
        assert_eq!(rule.num_points(), 2);
    }

    #[test]
    fn test_gauss_legendre_weights_sum_to_one() {
        for n in 1..=4 {
            let rule = UserDefinedIntegration::gauss_legendre(n).unwrap();
            let sum: f64 = rule.weights().iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-14);
            assert!(rule.points().iter().all(|p| (0.0..=1.0).contains(p)));
        }
        assert!(UserDefinedIntegration::gauss_legendre(5).is_err());
    }

    #[test]
    fn test_gauss_legendre_integrates_cubic() {
        // ∫₀¹ x³ dx = 1/4
        let rule = UserDefinedIntegration::gauss_legendre(2).unwrap();
        let integral: f64 = rule
            .points()
            .iter()
            .zip(rule.weights())
            .map(|(x, w)| w * x.powi(3))
            .sum();
        assert_relative_eq!(integral, 0.25, epsilon = 1e-14);
    }

    #[test]
    fn test_structured_parameters() {
        let mut rule = UserDefinedIntegration::new(vec![0.1, 0.5, 0.9], vec![0.2, 0.6, 0.2]).unwrap();

        let pt = rule.set_parameter(&["pt", "2"]).unwrap();
        let wt = rule.set_parameter(&["wt", "3"]).unwrap();
        assert_eq!(pt, ParameterId::Point(1));
        assert_eq!(wt, ParameterId::Weight(2));

        rule.update_parameter(pt, 0.45).unwrap();
        rule.update_parameter(wt, 0.25).unwrap();
        assert_eq!(rule.points(), &[0.1, 0.45, 0.9]);
        assert_eq!(rule.weights(), &[0.2, 0.6, 0.25]);
    }

    #[test]
    fn test_invalid_parameters() {
        let mut rule = UserDefinedIntegration::new(vec![0.5], vec![1.0]).unwrap();
        assert!(rule.set_parameter(&["pt", "0"]).is_err());
        assert!(rule.set_parameter(&["pt", "2"]).is_err());
        assert!(rule.set_parameter(&["xx", "1"]).is_err());
        assert!(rule.set_parameter(&["pt"]).is_err());
        assert!(rule.update_parameter(ParameterId::Point(4), 0.5).is_err());
        assert!(rule.update_parameter(ParameterId::Area, 0.5).is_err());
    }

    #[test]
    fn test_send_recv_roundtrip() {
        let rule = UserDefinedIntegration::new(vec![0.0, 0.5, 1.0], vec![0.25, 0.5, 0.25]).unwrap();
        let mut channel = MemoryChannel::new();
        rule.send_self(2, &mut channel).unwrap();

        let mut received = UserDefinedIntegration::default();
        received.recv_self(2, &mut channel, &DefaultBroker).unwrap();
        assert_eq!(received, rule);
    }

    #[test]
    fn test_recv_rejects_non_finite_rule() {
        let mut channel = MemoryChannel::new();
        channel.send_id(0, 2, &[2]).unwrap();
        channel.send_vector(0, 2, &[0.25, f64::NAN]).unwrap();
        channel.send_vector(0, 2, &[0.5, 0.5]).unwrap();

        let mut received = UserDefinedIntegration::new(vec![0.5], vec![1.0]).unwrap();
        let before = received.clone();
        assert!(matches!(
            received.recv_self(2, &mut channel, &DefaultBroker),
            Err(Error::Channel(_))
        ));
        assert_eq!(received, before);
    }

    #[test]
    fn test_recv_header_only_is_an_error() {
        let mut channel = MemoryChannel::new();
        channel.send_id(0, 0, &[i32::MAX]).unwrap();

        let mut received = UserDefinedIntegration::new(vec![0.5], vec![1.0]).unwrap();
        assert!(matches!(
            received.recv_self(0, &mut channel, &DefaultBroker),
            Err(Error::Channel(_))
        ));
        assert_eq!(received.points(), &[0.5]);
    }

    #[test]
    fn test_copy_is_independent() {
        let mut rule = UserDefinedIntegration::new(vec![0.5], vec![1.0]).unwrap();
        let copy = rule.get_copy();
        rule.update_parameter(ParameterId::Point(0), 0.25).unwrap();
        assert_eq!(copy.section_locations(1, 1.0), vec![0.5]);
    }
}
