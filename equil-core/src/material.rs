//! Uniaxial material points.
//!
//! Every material point follows the trial/commit protocol:
//!
//! - `set_trial_strain` installs a tentative state; it never becomes the
//!   committed state on its own.
//! - `commit_state` promotes trial to committed.
//! - `revert_to_last_commit` discards trial and restores committed.
//! - `revert_to_start` resets both to the construction-time state.
//!
//! # Submodules
//!
//! - [`multilinear`] - Piecewise-linear elastic response
//! - [`elastic`] - Linear elastic response with optional damping

use crate::channel::Movable;
use crate::error::{Error, Result};
use crate::parameter::ParameterId;
use crate::response::{Information, Response, ResponseId};
use crate::types::Tag;
use nalgebra::DVector;
use std::fmt;

pub mod elastic;
pub mod multilinear;

pub use elastic::LinearElastic;
pub use multilinear::MultiLinearElastic;

/// Material-point interface.
///
/// Accessors are pure reads of the current trial state. Materials must be
/// thread-safe (Send + Sync) so elements can be evaluated in parallel.
pub trait UniaxialMaterial: Movable + fmt::Display + fmt::Debug + Send + Sync {
    /// Caller-assigned identity.
    fn tag(&self) -> Tag;

    /// Install a new trial strain and strain rate.
    fn set_trial_strain(&mut self, strain: f64, strain_rate: f64) -> Result<()>;

    /// Trial strain.
    fn strain(&self) -> f64;

    /// Trial strain rate.
    fn strain_rate(&self) -> f64 {
        0.0
    }

    /// Trial stress.
    fn stress(&self) -> f64;

    /// Trial tangent modulus.
    fn tangent(&self) -> f64;

    /// Tangent at the construction-time state.
    fn initial_tangent(&self) -> f64;

    /// Promote trial to committed.
    fn commit_state(&mut self) -> Result<()>;

    /// Discard trial and restore committed.
    fn revert_to_last_commit(&mut self) -> Result<()>;

    /// Reset committed and trial to the construction-time state.
    fn revert_to_start(&mut self) -> Result<()>;

    /// Independent duplicate built from this material's configuration.
    fn get_copy(&self) -> Box<dyn UniaxialMaterial>;

    /// Bind a response query by name.
    ///
    /// Supported names: `stress`, `strain`, `tangent`, `stressStrain`.
    fn set_response(&self, args: &[&str]) -> Option<Response> {
        let query = MaterialResponse::parse(args.first()?)?;
        Some(Response::new(query.id(), query.evaluate(self)))
    }

    /// Refresh a bound response from the current trial state.
    fn get_response(&self, response: &mut Response) -> Result<()> {
        let query = MaterialResponse::from_id(response.id()).ok_or_else(|| {
            Error::Parameter(format!("unknown material response {:?}", response.id()))
        })?;
        response.set(query.evaluate(self))
    }

    /// Resolve a parameter by name. Materials without parameters reject all names.
    fn set_parameter(&self, args: &[&str]) -> Result<ParameterId> {
        Err(Error::Parameter(format!(
            "material {} has no parameter {:?}",
            self.tag(),
            args.first()
        )))
    }

    /// Apply a resolved parameter.
    fn update_parameter(&mut self, id: ParameterId, _value: f64) -> Result<()> {
        Err(Error::Parameter(format!(
            "material {} cannot update {:?}",
            self.tag(),
            id
        )))
    }
}

/// Response queries shared by all uniaxial materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaterialResponse {
    Stress,
    Strain,
    Tangent,
    StressStrain,
}

impl MaterialResponse {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "stress" => Some(Self::Stress),
            "strain" => Some(Self::Strain),
            "tangent" => Some(Self::Tangent),
            "stressStrain" | "stress_strain" => Some(Self::StressStrain),
            _ => None,
        }
    }

    fn id(self) -> ResponseId {
        ResponseId(match self {
            Self::Stress => 1,
            Self::Strain => 2,
            Self::Tangent => 3,
            Self::StressStrain => 4,
        })
    }

    fn from_id(id: ResponseId) -> Option<Self> {
        match id.0 {
            1 => Some(Self::Stress),
            2 => Some(Self::Strain),
            3 => Some(Self::Tangent),
            4 => Some(Self::StressStrain),
            _ => None,
        }
    }

    fn evaluate<M: UniaxialMaterial + ?Sized>(self, material: &M) -> Information {
        match self {
            Self::Stress => Information::Double(material.stress()),
            Self::Strain => Information::Double(material.strain()),
            Self::Tangent => Information::Double(material.tangent()),
            Self::StressStrain => Information::Vector(DVector::from_vec(vec![
                material.stress(),
                material.strain(),
            ])),
        }
    }
}
