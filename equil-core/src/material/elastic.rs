//! Linear elastic uniaxial material with optional viscous damping.
//!
//! σ = E·ε + η·ε̇, tangent = E.

use crate::broker::ObjectBroker;
use crate::channel::{Channel, Movable};
use crate::error::{Error, Result};
use crate::material::UniaxialMaterial;
use crate::parameter::{finite, ParameterId};
use crate::types::{ClassTag, Tag};
use std::fmt;

/// Linear elastic material.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearElastic {
    tag: Tag,
    youngs_modulus: f64,
    damping: f64,
    trial_strain: f64,
    trial_strain_rate: f64,
    committed_strain: f64,
    committed_strain_rate: f64,
}

impl LinearElastic {
    /// Create a new linear elastic material.
    ///
    /// # Errors
    ///
    /// Returns error if `youngs_modulus` is not finite or `damping` is negative.
    pub fn new(tag: Tag, youngs_modulus: f64, damping: f64) -> Result<Self> {
        if !youngs_modulus.is_finite() {
            return Err(Error::Config(format!(
                "Young's modulus must be finite, got {youngs_modulus}"
            )));
        }
        if !(damping.is_finite() && damping >= 0.0) {
            return Err(Error::Config(format!(
                "damping must be non-negative, got {damping}"
            )));
        }
        Ok(Self {
            tag,
            youngs_modulus,
            damping,
            trial_strain: 0.0,
            trial_strain_rate: 0.0,
            committed_strain: 0.0,
            committed_strain_rate: 0.0,
        })
    }

    /// Receivable instance.
    pub fn blank() -> Self {
        Self {
            tag: 0,
            youngs_modulus: 0.0,
            damping: 0.0,
            trial_strain: 0.0,
            trial_strain_rate: 0.0,
            committed_strain: 0.0,
            committed_strain_rate: 0.0,
        }
    }

    pub fn youngs_modulus(&self) -> f64 {
        self.youngs_modulus
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }
}

impl UniaxialMaterial for LinearElastic {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn set_trial_strain(&mut self, strain: f64, strain_rate: f64) -> Result<()> {
        self.trial_strain = strain;
        self.trial_strain_rate = strain_rate;
        Ok(())
    }

    fn strain(&self) -> f64 {
        self.trial_strain
    }

    fn strain_rate(&self) -> f64 {
        self.trial_strain_rate
    }

    fn stress(&self) -> f64 {
        self.youngs_modulus * self.trial_strain + self.damping * self.trial_strain_rate
    }

    fn tangent(&self) -> f64 {
        self.youngs_modulus
    }

    fn initial_tangent(&self) -> f64 {
        self.youngs_modulus
    }

    fn commit_state(&mut self) -> Result<()> {
        self.committed_strain = self.trial_strain;
        self.committed_strain_rate = self.trial_strain_rate;
        Ok(())
    }

    fn revert_to_last_commit(&mut self) -> Result<()> {
        self.trial_strain = self.committed_strain;
        self.trial_strain_rate = self.committed_strain_rate;
        Ok(())
    }

    fn revert_to_start(&mut self) -> Result<()> {
        self.trial_strain = 0.0;
        self.trial_strain_rate = 0.0;
        self.committed_strain = 0.0;
        self.committed_strain_rate = 0.0;
        Ok(())
    }

    fn get_copy(&self) -> Box<dyn UniaxialMaterial> {
        let mut copy = self.clone();
        copy.trial_strain = 0.0;
        copy.trial_strain_rate = 0.0;
        copy.committed_strain = 0.0;
        copy.committed_strain_rate = 0.0;
        Box::new(copy)
    }

    fn set_parameter(&self, args: &[&str]) -> Result<ParameterId> {
        match args.first().copied() {
            Some("E") => Ok(ParameterId::YoungsModulus),
            Some("eta") => Ok(ParameterId::Damping),
            other => Err(Error::Parameter(format!(
                "LinearElastic {} has no parameter {:?}",
                self.tag, other
            ))),
        }
    }

    fn update_parameter(&mut self, id: ParameterId, value: f64) -> Result<()> {
        let value = finite(id, value)?;
        match id {
            ParameterId::YoungsModulus => self.youngs_modulus = value,
            ParameterId::Damping if value >= 0.0 => self.damping = value,
            _ => {
                return Err(Error::Parameter(format!(
                    "LinearElastic {} cannot set {:?} to {}",
                    self.tag, id, value
                )))
            }
        }
        Ok(())
    }
}

impl Movable for LinearElastic {
    fn class_tag(&self) -> ClassTag {
        ClassTag::LinearElastic
    }

    fn send_self(&self, commit_tag: i32, channel: &mut dyn Channel) -> Result<()> {
        let db_tag = self.db_tag();
        channel.send_id(db_tag, commit_tag, &[self.tag])?;
        channel.send_vector(
            db_tag,
            commit_tag,
            &[
                self.youngs_modulus,
                self.damping,
                self.committed_strain,
                self.committed_strain_rate,
            ],
        )
    }

    fn recv_self(
        &mut self,
        commit_tag: i32,
        channel: &mut dyn Channel,
        _broker: &dyn ObjectBroker,
    ) -> Result<()> {
        let db_tag = self.db_tag();
        let mut ids = [0i32; 1];
        let mut data = [0.0; 4];
        channel.recv_id(db_tag, commit_tag, &mut ids)?;
        channel.recv_vector(db_tag, commit_tag, &mut data)?;

        let mut received = Self::new(ids[0], data[0], data[1])
            .map_err(|e| Error::Channel(format!("received invalid material: {e}")))?;
        received.committed_strain = data[2];
        received.committed_strain_rate = data[3];
        received.revert_to_last_commit()?;
        *self = received;
        Ok(())
    }
}

impl fmt::Display for LinearElastic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "LinearElastic tag: {}", self.tag)?;
        writeln!(f, "  E: {} eta: {}", self.youngs_modulus, self.damping)?;
        writeln!(
            f,
            "  current state: strain: {} stress: {}",
            self.trial_strain,
            self.stress()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::DefaultBroker;
    use crate::channel::MemoryChannel;
    use approx::assert_relative_eq;

    #[test]
    fn test_damped_stress() {
        let mut mat = LinearElastic::new(1, 200.0, 3.0).unwrap();
        mat.set_trial_strain(0.01, 2.0).unwrap();
        assert_relative_eq!(mat.stress(), 2.0 + 6.0);
        assert_relative_eq!(mat.tangent(), 200.0);
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(LinearElastic::new(1, f64::INFINITY, 0.0).is_err());
        assert!(LinearElastic::new(1, 1.0, -0.5).is_err());
    }

    #[test]
    fn test_revert_restores_committed() {
        let mut mat = LinearElastic::new(1, 10.0, 0.0).unwrap();
        mat.set_trial_strain(0.2, 0.0).unwrap();
        mat.commit_state().unwrap();
        mat.set_trial_strain(0.9, 0.0).unwrap();
        mat.revert_to_last_commit().unwrap();
        assert_relative_eq!(mat.stress(), 2.0);
    }

    #[test]
    fn test_parameters() {
        let mut mat = LinearElastic::new(1, 10.0, 0.0).unwrap();
        let e = mat.set_parameter(&["E"]).unwrap();
        let eta = mat.set_parameter(&["eta"]).unwrap();
        assert!(mat.set_parameter(&["nu"]).is_err());

        mat.update_parameter(e, 20.0).unwrap();
        mat.update_parameter(eta, 1.5).unwrap();
        assert_relative_eq!(mat.youngs_modulus(), 20.0);
        assert_relative_eq!(mat.damping(), 1.5);

        assert!(mat.update_parameter(eta, -1.0).is_err());
        assert!(mat.update_parameter(ParameterId::Area, 1.0).is_err());
        assert_relative_eq!(mat.damping(), 1.5);
    }

    #[test]
    fn test_send_recv_roundtrip() {
        let mut mat = LinearElastic::new(4, 30e3, 0.5).unwrap();
        mat.set_trial_strain(0.001, 0.1).unwrap();
        mat.commit_state().unwrap();

        let mut channel = MemoryChannel::new();
        mat.send_self(0, &mut channel).unwrap();
        let mut received = LinearElastic::blank();
        received.recv_self(0, &mut channel, &DefaultBroker).unwrap();
        assert_eq!(received, mat);
    }
}
