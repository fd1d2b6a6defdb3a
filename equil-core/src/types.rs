//! Core identifiers shared across equil.
//!
//! This module defines:
//! - Entity and session tags
//! - Global equation numbers (negative = constrained, skipped on assembly)
//! - Class tags used to resolve concrete types during deserialization

use crate::error::{Error, Result};
use std::fmt;

/// Caller-assigned identity of an entity or serialization session.
pub type Tag = i32;

/// Global equation number. Negative values mark constrained degrees of freedom.
pub type EqnNumber = i32;

/// Map an equation number onto a storage index, if it is active.
#[inline]
pub fn active_index(eqn: EqnNumber) -> Option<usize> {
    usize::try_from(eqn).ok()
}

/// Concrete type identifiers carried alongside serialized objects.
///
/// Sender and receiver agree on the type being reconstructed through this
/// tag before `recv_self` is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ClassTag {
    /// Piecewise-linear elastic uniaxial material.
    MultiLinearElastic = 1,
    /// Linear elastic uniaxial material with optional damping.
    LinearElastic = 2,
    /// Two-node axial truss element.
    Truss = 101,
    /// User-defined beam integration rule.
    UserDefinedIntegration = 201,
    /// Column-compressed general sparse equation system.
    SparseGenColSoe = 301,
    /// faer sparse Cholesky backend.
    CholeskySolver = 401,
    /// Jacobi-preconditioned conjugate gradient backend.
    ConjugateGradientSolver = 402,
    /// nalgebra dense LU backend.
    DenseLuSolver = 403,
}

impl ClassTag {
    /// Integer code sent over a channel.
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for ClassTag {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        Ok(match code {
            1 => ClassTag::MultiLinearElastic,
            2 => ClassTag::LinearElastic,
            101 => ClassTag::Truss,
            201 => ClassTag::UserDefinedIntegration,
            301 => ClassTag::SparseGenColSoe,
            401 => ClassTag::CholeskySolver,
            402 => ClassTag::ConjugateGradientSolver,
            403 => ClassTag::DenseLuSolver,
            other => return Err(Error::UnknownClassTag(other)),
        })
    }
}

impl fmt::Display for ClassTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}
