//! Piecewise-linear elastic uniaxial material.
//!
//! The response is defined by a strictly increasing sequence of strain
//! breakpoints and matching stress values. Between breakpoints the stress is
//! interpolated affinely; beyond the first or last breakpoint the end
//! segments are extrapolated.
//!
//! # Interval search
//!
//! The active interval `i` covers `[ε_i, ε_{i+1})`. On a new trial strain the
//! search walks forward from the previous interval while the strain is at or
//! above the upper breakpoint, and backward while it is below the lower one,
//! clamped to `[0, N-2]`. Successive trial strains in a Newton iteration are
//! close together, so the walk is amortized O(1).
//!
//! A strain exactly on an interior breakpoint therefore always belongs to the
//! interval above it, whichever direction the search came from.

use crate::broker::ObjectBroker;
use crate::channel::{Channel, Movable};
use crate::error::{Error, Result};
use crate::material::UniaxialMaterial;
use crate::types::{ClassTag, Tag};
use std::fmt;
use tracing::{trace, warn};

/// Evaluated state at one strain.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct PointState {
    interval: usize,
    strain: f64,
    stress: f64,
    tangent: f64,
}

/// Piecewise-linear elastic material.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiLinearElastic {
    tag: Tag,
    strain_points: Vec<f64>,
    stress_points: Vec<f64>,
    initial_tangent: f64,
    trial: PointState,
    committed: PointState,
}

/// Validate breakpoint arrays.
fn validate_points(strain_points: &[f64], stress_points: &[f64]) -> Result<()> {
    if strain_points.len() != stress_points.len() {
        return Err(Error::Config(format!(
            "strain and stress arrays do not have same length ({} vs {})",
            strain_points.len(),
            stress_points.len()
        )));
    }
    if strain_points.len() < 2 {
        return Err(Error::Config(
            "at least two stress-strain points are required".into(),
        ));
    }
    if let Some(bad) = strain_points
        .iter()
        .chain(stress_points)
        .find(|v| !v.is_finite())
    {
        return Err(Error::Config(format!("breakpoint {bad} is not finite")));
    }
    if let Some(w) = strain_points.windows(2).find(|w| w[1] <= w[0]) {
        return Err(Error::Config(format!(
            "strain points must be strictly increasing ({} then {})",
            w[0], w[1]
        )));
    }
    Ok(())
}

/// Walk from `from` to the interval containing `strain`.
fn locate(strain_points: &[f64], strain: f64, from: usize) -> usize {
    let last = strain_points.len() - 2;
    let mut i = from.min(last);
    while i < last && strain >= strain_points[i + 1] {
        i += 1;
    }
    while i > 0 && strain < strain_points[i] {
        i -= 1;
    }
    i
}

impl MultiLinearElastic {
    /// Create a new piecewise-linear material.
    ///
    /// # Arguments
    ///
    /// * `tag` - Unique material tag
    /// * `strain_points` - Strictly increasing strain breakpoints
    /// * `stress_points` - Stress at each breakpoint
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the arrays differ in length, hold fewer
    /// than two points, contain non-finite values, or the strains are not
    /// strictly increasing.
    pub fn new(tag: Tag, strain_points: Vec<f64>, stress_points: Vec<f64>) -> Result<Self> {
        validate_points(&strain_points, &stress_points)?;
        let mut material = Self {
            tag,
            strain_points,
            stress_points,
            initial_tangent: 0.0,
            trial: PointState::default(),
            committed: PointState::default(),
        };
        material.reset_to_start();
        material.initial_tangent = material.trial.tangent;
        Ok(material)
    }

    /// Receivable instance with no breakpoints.
    ///
    /// Only meaningful as the target of [`Movable::recv_self`]; trial strains
    /// are rejected until breakpoints have been received.
    pub fn blank() -> Self {
        Self {
            tag: 0,
            strain_points: Vec::new(),
            stress_points: Vec::new(),
            initial_tangent: 0.0,
            trial: PointState::default(),
            committed: PointState::default(),
        }
    }

    pub fn strain_points(&self) -> &[f64] {
        &self.strain_points
    }

    pub fn stress_points(&self) -> &[f64] {
        &self.stress_points
    }

    /// Index of the active trial interval.
    pub fn interval(&self) -> usize {
        self.trial.interval
    }

    /// Committed strain.
    pub fn committed_strain(&self) -> f64 {
        self.committed.strain
    }

    /// Committed stress.
    pub fn committed_stress(&self) -> f64 {
        self.committed.stress
    }

    /// Committed tangent.
    pub fn committed_tangent(&self) -> f64 {
        self.committed.tangent
    }

    fn evaluate(&self, strain: f64, interval: usize) -> PointState {
        let (eps1, eps2) = (self.strain_points[interval], self.strain_points[interval + 1]);
        let (sig1, sig2) = (self.stress_points[interval], self.stress_points[interval + 1]);
        let tangent = (sig2 - sig1) / (eps2 - eps1);
        PointState {
            interval,
            strain,
            stress: sig1 + tangent * (strain - eps1),
            tangent,
        }
    }

    /// State implied by a zero strain, searched from the first interval.
    fn start_state(&self) -> PointState {
        if self.strain_points.len() < 2 {
            return PointState::default();
        }
        let interval = locate(&self.strain_points, 0.0, 0);
        self.evaluate(0.0, interval)
    }

    fn reset_to_start(&mut self) {
        self.trial = self.start_state();
        self.committed = self.trial;
    }
}

impl UniaxialMaterial for MultiLinearElastic {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn set_trial_strain(&mut self, strain: f64, _strain_rate: f64) -> Result<()> {
        if self.strain_points.len() < 2 {
            return Err(Error::Config(format!(
                "material {} has no breakpoints",
                self.tag
            )));
        }
        let interval = locate(&self.strain_points, strain, self.trial.interval);
        if interval != self.trial.interval {
            trace!(
                tag = self.tag,
                from = self.trial.interval,
                to = interval,
                strain,
                "interval change"
            );
        }
        self.trial = self.evaluate(strain, interval);
        Ok(())
    }

    fn strain(&self) -> f64 {
        self.trial.strain
    }

    fn stress(&self) -> f64 {
        self.trial.stress
    }

    fn tangent(&self) -> f64 {
        self.trial.tangent
    }

    fn initial_tangent(&self) -> f64 {
        self.initial_tangent
    }

    fn commit_state(&mut self) -> Result<()> {
        self.committed = self.trial;
        Ok(())
    }

    fn revert_to_last_commit(&mut self) -> Result<()> {
        self.trial = self.committed;
        Ok(())
    }

    fn revert_to_start(&mut self) -> Result<()> {
        self.reset_to_start();
        Ok(())
    }

    fn get_copy(&self) -> Box<dyn UniaxialMaterial> {
        let mut copy = self.clone();
        copy.reset_to_start();
        Box::new(copy)
    }
}

impl Movable for MultiLinearElastic {
    fn class_tag(&self) -> ClassTag {
        ClassTag::MultiLinearElastic
    }

    /// Message sequence:
    ///
    /// 1. id `[tag, num_points, committed_interval]`
    /// 2. vector `[initial_tangent, committed_strain, committed_stress, committed_tangent]`
    /// 3. vector strain points
    /// 4. vector stress points
    fn send_self(&self, commit_tag: i32, channel: &mut dyn Channel) -> Result<()> {
        let db_tag = self.db_tag();
        let ids = [
            self.tag,
            self.strain_points.len() as i32,
            self.committed.interval as i32,
        ];
        let data = [
            self.initial_tangent,
            self.committed.strain,
            self.committed.stress,
            self.committed.tangent,
        ];

        let result = channel
            .send_id(db_tag, commit_tag, &ids)
            .and_then(|_| channel.send_vector(db_tag, commit_tag, &data))
            .and_then(|_| channel.send_vector(db_tag, commit_tag, &self.strain_points))
            .and_then(|_| channel.send_vector(db_tag, commit_tag, &self.stress_points));
        if let Err(err) = &result {
            warn!(tag = self.tag, %err, "MultiLinearElastic: failed to send data");
        }
        result
    }

    fn recv_self(
        &mut self,
        commit_tag: i32,
        channel: &mut dyn Channel,
        _broker: &dyn ObjectBroker,
    ) -> Result<()> {
        let db_tag = self.db_tag();
        let mut ids = [0i32; 3];
        let mut data = [0.0; 4];

        channel.recv_id(db_tag, commit_tag, &mut ids)?;
        let n = usize::try_from(ids[1])
            .map_err(|_| Error::Channel(format!("invalid point count {}", ids[1])))?;
        let interval = usize::try_from(ids[2])
            .map_err(|_| Error::Channel(format!("invalid interval {}", ids[2])))?;

        let received = channel.recv_vector(db_tag, commit_tag, &mut data).and_then(|_| {
            let strain_points = channel.recv_values(db_tag, commit_tag, n)?;
            let stress_points = channel.recv_values(db_tag, commit_tag, n)?;
            Ok((strain_points, stress_points))
        });
        let (strain_points, stress_points) = match received {
            Ok(points) => points,
            Err(err) => {
                warn!(%err, "MultiLinearElastic: failed to recv arrays");
                return Err(err);
            }
        };

        validate_points(&strain_points, &stress_points)
            .map_err(|e| Error::Channel(format!("received invalid breakpoints: {e}")))?;
        if interval + 1 >= n {
            return Err(Error::Channel(format!(
                "received interval {interval} outside {n} breakpoints"
            )));
        }

        self.tag = ids[0];
        self.strain_points = strain_points;
        self.stress_points = stress_points;
        self.initial_tangent = data[0];
        self.committed = PointState {
            interval,
            strain: data[1],
            stress: data[2],
            tangent: data[3],
        };
        self.trial = self.committed;
        Ok(())
    }
}

impl fmt::Display for MultiLinearElastic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MultiLinearElastic tag: {}", self.tag)?;
        writeln!(f, "  strain points: {:?}", self.strain_points)?;
        writeln!(f, "  stress points: {:?}", self.stress_points)?;
        writeln!(
            f,
            "  current state: strain: {} stress: {} tangent: {}",
            self.trial.strain, self.trial.stress, self.trial.tangent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::DefaultBroker;
    use crate::channel::MemoryChannel;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn symmetric() -> MultiLinearElastic {
        MultiLinearElastic::new(1, vec![-1.0, 0.0, 1.0], vec![-5.0, 0.0, 5.0]).unwrap()
    }

    fn four_point() -> MultiLinearElastic {
        // Slopes 1, 2, 4 on [-1,0], [0,1], [1,2]
        MultiLinearElastic::new(2, vec![-1.0, 0.0, 1.0, 2.0], vec![-1.0, 0.0, 2.0, 6.0]).unwrap()
    }

    #[test]
    fn test_scenario_symmetric_bilinear() {
        let mut mat = symmetric();

        mat.set_trial_strain(0.5, 0.0).unwrap();
        assert_relative_eq!(mat.stress(), 2.5, epsilon = 1e-12);
        assert_relative_eq!(mat.tangent(), 5.0, epsilon = 1e-12);

        mat.set_trial_strain(-0.5, 0.0).unwrap();
        assert_relative_eq!(mat.stress(), -2.5, epsilon = 1e-12);
        assert_relative_eq!(mat.tangent(), 5.0, epsilon = 1e-12);

        mat.revert_to_start().unwrap();
        assert_relative_eq!(mat.strain(), 0.0);
        assert_relative_eq!(mat.tangent(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_interval_search_symmetry() {
        let mut fresh = four_point();
        fresh.set_trial_strain(1.5, 0.0).unwrap();

        let mut walked = four_point();
        walked.set_trial_strain(1.5, 0.0).unwrap();
        walked.set_trial_strain(-0.5, 0.0).unwrap();
        assert_relative_eq!(walked.tangent(), 1.0);
        walked.set_trial_strain(1.5, 0.0).unwrap();

        assert_eq!(walked.interval(), fresh.interval());
        assert_relative_eq!(walked.tangent(), fresh.tangent());
        assert_relative_eq!(walked.tangent(), 4.0);
        assert_relative_eq!(walked.stress(), 4.0);
    }

    #[test]
    fn test_breakpoint_belongs_to_upper_interval() {
        let mut mat = four_point();
        // Approached from below
        mat.set_trial_strain(0.5, 0.0).unwrap();
        mat.set_trial_strain(1.0, 0.0).unwrap();
        assert_eq!(mat.interval(), 2);

        // Approached from above
        mat.set_trial_strain(1.9, 0.0).unwrap();
        mat.set_trial_strain(1.0, 0.0).unwrap();
        assert_eq!(mat.interval(), 2);
        assert_relative_eq!(mat.stress(), 2.0);
    }

    #[test]
    fn test_extrapolation_clamps_interval() {
        let mut mat = four_point();
        mat.set_trial_strain(10.0, 0.0).unwrap();
        assert_eq!(mat.interval(), 2);
        assert_relative_eq!(mat.stress(), 2.0 + 4.0 * 9.0);

        mat.set_trial_strain(-10.0, 0.0).unwrap();
        assert_eq!(mat.interval(), 0);
        assert_relative_eq!(mat.stress(), -10.0);
    }

    #[test]
    fn test_trial_never_commits_itself() {
        let mut mat = symmetric();
        mat.set_trial_strain(0.7, 0.0).unwrap();
        assert_relative_eq!(mat.committed_strain(), 0.0);
        mat.commit_state().unwrap();
        assert_relative_eq!(mat.committed_strain(), 0.7);
        assert_relative_eq!(mat.committed_stress(), 3.5);
    }

    #[test]
    fn test_revert_restores_committed() {
        let mut mat = four_point();
        mat.set_trial_strain(0.5, 0.0).unwrap();
        mat.commit_state().unwrap();
        let (stress, tangent) = (mat.stress(), mat.tangent());

        mat.set_trial_strain(1.7, 0.0).unwrap();
        assert_relative_eq!(mat.tangent(), 4.0);
        mat.revert_to_last_commit().unwrap();

        assert_eq!(mat.stress(), stress);
        assert_eq!(mat.tangent(), tangent);
        assert_eq!(mat.strain(), 0.5);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let err = MultiLinearElastic::new(1, vec![0.0, 1.0, 2.0], vec![0.0, 1.0]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_invalid_breakpoints_rejected() {
        assert!(MultiLinearElastic::new(1, vec![0.0], vec![0.0]).is_err());
        assert!(MultiLinearElastic::new(1, vec![0.0, 0.0], vec![0.0, 1.0]).is_err());
        assert!(MultiLinearElastic::new(1, vec![1.0, 0.0], vec![0.0, 1.0]).is_err());
        assert!(MultiLinearElastic::new(1, vec![0.0, f64::NAN], vec![0.0, 1.0]).is_err());
    }

    #[test]
    fn test_blank_rejects_trial() {
        let mut blank = MultiLinearElastic::blank();
        assert!(blank.set_trial_strain(0.1, 0.0).is_err());
    }

    #[test]
    fn test_start_state_off_origin() {
        // Zero strain lies in the second interval; curve does not pass through origin
        let mat = MultiLinearElastic::new(9, vec![-2.0, -1.0, 3.0], vec![0.0, 1.0, 5.0]).unwrap();
        assert_eq!(mat.interval(), 1);
        assert_relative_eq!(mat.stress(), 2.0);
        assert_relative_eq!(mat.initial_tangent(), 1.0);
    }

    #[test]
    fn test_copy_starts_fresh() {
        let mut mat = four_point();
        mat.set_trial_strain(1.5, 0.0).unwrap();
        mat.commit_state().unwrap();

        let copy = mat.get_copy();
        assert_eq!(copy.tag(), mat.tag());
        assert_relative_eq!(copy.strain(), 0.0);
        assert_relative_eq!(copy.tangent(), 2.0);
    }

    #[test]
    fn test_send_recv_roundtrip() {
        let mut mat = MultiLinearElastic::new(7, vec![0.0, 1.0, 2.0], vec![0.0, 10.0, 15.0]).unwrap();
        mat.set_trial_strain(1.5, 0.0).unwrap();
        mat.commit_state().unwrap();

        let mut channel = MemoryChannel::new();
        mat.send_self(3, &mut channel).unwrap();

        let mut received = MultiLinearElastic::blank();
        received.recv_self(3, &mut channel, &DefaultBroker).unwrap();

        assert_eq!(received.tag(), 7);
        assert_eq!(received.strain_points(), &[0.0, 1.0, 2.0]);
        assert_eq!(received.stress_points(), &[0.0, 10.0, 15.0]);
        assert_eq!(received.committed_strain(), 1.5);
        assert_eq!(received.committed_stress(), 12.5);
        assert_eq!(received.committed_tangent(), 5.0);
        assert_eq!(received.initial_tangent(), mat.initial_tangent());
        assert_eq!(received, mat);
    }

    #[test]
    fn test_recv_failure_leaves_receiver_untouched() {
        let mat = four_point();
        let mut channel = MemoryChannel::new();
        mat.send_self(0, &mut channel).unwrap();

        let mut receiver = symmetric();
        let before = receiver.clone();
        // Wrong commit tag: detected before any field is written
        assert!(receiver.recv_self(1, &mut channel, &DefaultBroker).is_err());
        assert_eq!(receiver, before);
    }

    #[test]
    fn test_recv_truncated_stream() {
        let mat = four_point();
        let mut channel = MemoryChannel::new();
        mat.send_self(0, &mut channel).unwrap();

        // Keep only the id and the state vector
        let mut truncated = MemoryChannel::new();
        let mut ids = [0; 3];
        let mut data = [0.0; 4];
        channel.recv_id(0, 0, &mut ids).unwrap();
        channel.recv_vector(0, 0, &mut data).unwrap();
        truncated.send_id(0, 0, &ids).unwrap();
        truncated.send_vector(0, 0, &data).unwrap();

        let mut receiver = symmetric();
        let before = receiver.clone();
        assert!(matches!(
            receiver.recv_self(0, &mut truncated, &DefaultBroker),
            Err(Error::Channel(_))
        ));
        assert_eq!(receiver, before);
    }

    #[test]
    fn test_recv_huge_point_count_is_an_error() {
        let mut channel = MemoryChannel::new();
        channel.send_id(0, 0, &[3, i32::MAX, 0]).unwrap();
        channel.send_vector(0, 0, &[1.0, 0.0, 0.0, 1.0]).unwrap();
        channel.send_vector(0, 0, &[0.0, 1.0]).unwrap();

        let mut receiver = symmetric();
        let before = receiver.clone();
        assert!(matches!(
            receiver.recv_self(0, &mut channel, &DefaultBroker),
            Err(Error::Channel(_))
        ));
        assert_eq!(receiver, before);
    }

    #[test]
    fn test_print() {
        let text = symmetric().to_string();
        assert!(text.starts_with("MultiLinearElastic tag: 1"));
        assert!(text.contains("tangent: 5"));
    }

    proptest! {
        #[test]
        fn prop_commit_idempotent(strain in -3.0f64..3.0) {
            let mut once = four_point();
            once.set_trial_strain(strain, 0.0).unwrap();
            once.commit_state().unwrap();

            let mut twice = once.clone();
            twice.commit_state().unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_revert_to_start_deterministic(history in proptest::collection::vec(-3.0f64..3.0, 0..20)) {
            let mut mat = four_point();
            for strain in &history {
                mat.set_trial_strain(*strain, 0.0).unwrap();
                mat.commit_state().unwrap();
            }
            mat.revert_to_start().unwrap();
            prop_assert_eq!(mat, four_point());
        }

        #[test]
        fn prop_search_matches_fresh_evaluation(history in proptest::collection::vec(-3.0f64..3.0, 1..20), target in -3.0f64..3.0) {
            let mut walked = four_point();
            for strain in &history {
                walked.set_trial_strain(*strain, 0.0).unwrap();
            }
            walked.set_trial_strain(target, 0.0).unwrap();

            let mut fresh = four_point();
            fresh.set_trial_strain(target, 0.0).unwrap();
            prop_assert_eq!(walked.interval(), fresh.interval());
            prop_assert_eq!(walked.tangent(), fresh.tangent());
            prop_assert_eq!(walked.stress(), fresh.stress());
        }
    }
}
