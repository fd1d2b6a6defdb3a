//! Object factory for deserialization.
//!
//! The channel protocol is not self-describing, so a sender writes the
//! [`ClassTag`] of an object ahead of the object itself. The receiver reads
//! the tag, asks an [`ObjectBroker`] for a blank instance of that type, and
//! then calls `recv_self` on it.

use crate::channel::{Channel, Movable};
use crate::element::{Element, Truss};
use crate::error::{Error, Result};
use crate::integration::{BeamIntegration, UserDefinedIntegration};
use crate::material::{LinearElastic, MultiLinearElastic, UniaxialMaterial};
use crate::soe::SparseGenColSoe;
use crate::solver::{CholeskySolver, ConjugateGradientSolver, DenseLuSolver, LinearSolver};
use crate::types::ClassTag;
use tracing::warn;

/// Maps class tags to blank, receivable instances.
pub trait ObjectBroker: Sync {
    fn new_material(&self, class_tag: ClassTag) -> Result<Box<dyn UniaxialMaterial>>;

    fn new_element(&self, class_tag: ClassTag) -> Result<Box<dyn Element>>;

    fn new_beam_integration(&self, class_tag: ClassTag) -> Result<Box<dyn BeamIntegration>>;

    fn new_solver(&self, class_tag: ClassTag) -> Result<Box<dyn LinearSolver>>;

    fn new_soe(&self, class_tag: ClassTag) -> Result<SparseGenColSoe>;
}

/// Broker for every type defined in this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBroker;

impl ObjectBroker for DefaultBroker {
    fn new_material(&self, class_tag: ClassTag) -> Result<Box<dyn UniaxialMaterial>> {
        match class_tag {
            ClassTag::MultiLinearElastic => Ok(Box::new(MultiLinearElastic::blank())),
            ClassTag::LinearElastic => Ok(Box::new(LinearElastic::blank())),
            other => Err(Error::UnknownClassTag(other.code())),
        }
    }

    fn new_element(&self, class_tag: ClassTag) -> Result<Box<dyn Element>> {
        match class_tag {
            ClassTag::Truss => Ok(Box::new(Truss::blank())),
            other => Err(Error::UnknownClassTag(other.code())),
        }
    }

    fn new_beam_integration(&self, class_tag: ClassTag) -> Result<Box<dyn BeamIntegration>> {
        match class_tag {
            ClassTag::UserDefinedIntegration => Ok(Box::new(UserDefinedIntegration::default())),
            other => Err(Error::UnknownClassTag(other.code())),
        }
    }

    fn new_solver(&self, class_tag: ClassTag) -> Result<Box<dyn LinearSolver>> {
        match class_tag {
            ClassTag::CholeskySolver => Ok(Box::new(CholeskySolver::new())),
            ClassTag::ConjugateGradientSolver => Ok(Box::new(ConjugateGradientSolver::default())),
            ClassTag::DenseLuSolver => Ok(Box::new(DenseLuSolver::new())),
            other => Err(Error::UnknownClassTag(other.code())),
        }
    }

    fn new_soe(&self, class_tag: ClassTag) -> Result<SparseGenColSoe> {
        match class_tag {
            ClassTag::SparseGenColSoe => Ok(SparseGenColSoe::new(Box::new(CholeskySolver::new()))),
            other => Err(Error::UnknownClassTag(other.code())),
        }
    }
}

/// Read a class tag sent with [`send_class_tag`].
pub fn recv_class_tag(db_tag: i32, commit_tag: i32, channel: &mut dyn Channel) -> Result<ClassTag> {
    let mut code = [0i32; 1];
    channel.recv_id(db_tag, commit_tag, &mut code)?;
    ClassTag::try_from(code[0])
}

/// Write the class tag of `object` so the receiver can resolve its type.
pub fn send_class_tag<M: Movable + ?Sized>(
    object: &M,
    db_tag: i32,
    commit_tag: i32,
    channel: &mut dyn Channel,
) -> Result<()> {
    channel.send_id(db_tag, commit_tag, &[object.class_tag().code()])
}

/// Send a material preceded by its class tag.
pub fn send_material(
    material: &dyn UniaxialMaterial,
    commit_tag: i32,
    channel: &mut dyn Channel,
) -> Result<()> {
    send_class_tag(material, 0, commit_tag, channel)?;
    material.send_self(commit_tag, channel)
}

/// Receive a material of whatever type the sender announced.
pub fn recv_material(
    commit_tag: i32,
    channel: &mut dyn Channel,
    broker: &dyn ObjectBroker,
) -> Result<Box<dyn UniaxialMaterial>> {
    let class_tag = recv_class_tag(0, commit_tag, channel)?;
    let mut material = broker.new_material(class_tag)?;
    material.recv_self(commit_tag, channel, broker).map_err(|err| {
        warn!(%class_tag, %err, "failed to receive material");
        err
    })?;
    Ok(material)
}

/// Send an element preceded by its class tag.
pub fn send_element(element: &dyn Element, commit_tag: i32, channel: &mut dyn Channel) -> Result<()> {
    send_class_tag(element, 0, commit_tag, channel)?;
    element.send_self(commit_tag, channel)
}

/// Receive an element of whatever type the sender announced.
pub fn recv_element(
    commit_tag: i32,
    channel: &mut dyn Channel,
    broker: &dyn ObjectBroker,
) -> Result<Box<dyn Element>> {
    let class_tag = recv_class_tag(0, commit_tag, channel)?;
    let mut element = broker.new_element(class_tag)?;
    element.recv_self(commit_tag, channel, broker).map_err(|err| {
        warn!(%class_tag, %err, "failed to receive element");
        err
    })?;
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use approx::assert_relative_eq;

    #[test]
    fn test_material_resolved_through_broker() {
        let mut mat = MultiLinearElastic::new(5, vec![0.0, 1.0, 2.0], vec![0.0, 10.0, 15.0]).unwrap();
        mat.set_trial_strain(1.2, 0.0).unwrap();
        mat.commit_state().unwrap();

        let mut channel = MemoryChannel::new();
        send_material(&mat, 1, &mut channel).unwrap();
        let received = recv_material(1, &mut channel, &DefaultBroker).unwrap();

        assert_eq!(received.class_tag(), ClassTag::MultiLinearElastic);
        assert_eq!(received.tag(), 5);
        assert_relative_eq!(received.strain(), 1.2);
        assert_relative_eq!(received.stress(), 11.0);
    }

    #[test]
    fn test_heterogeneous_materials() {
        let materials: Vec<Box<dyn UniaxialMaterial>> = vec![
            Box::new(LinearElastic::new(1, 100.0, 0.0).unwrap()),
            Box::new(MultiLinearElastic::new(2, vec![-1.0, 1.0], vec![-3.0, 3.0]).unwrap()),
        ];

        let mut channel = MemoryChannel::new();
        for m in &materials {
            send_material(m.as_ref(), 0, &mut channel).unwrap();
        }
        let back: Vec<_> = (0..2)
            .map(|_| recv_material(0, &mut channel, &DefaultBroker).unwrap())
            .collect();

        assert_eq!(back[0].class_tag(), ClassTag::LinearElastic);
        assert_eq!(back[1].class_tag(), ClassTag::MultiLinearElastic);
        assert_relative_eq!(back[1].tangent(), 3.0);
    }

    #[test]
    fn test_wrong_family_rejected() {
        assert!(matches!(
            DefaultBroker.new_material(ClassTag::Truss),
            Err(Error::UnknownClassTag(101))
        ));
        assert!(DefaultBroker.new_solver(ClassTag::MultiLinearElastic).is_err());
        assert!(DefaultBroker.new_element(ClassTag::LinearElastic).is_err());
    }

    #[test]
    fn test_unknown_code_on_channel() {
        let mut channel = MemoryChannel::new();
        channel.send_id(0, 0, &[9999]).unwrap();
        assert!(matches!(
            recv_material(0, &mut channel, &DefaultBroker),
            Err(Error::UnknownClassTag(9999))
        ));
    }
}
