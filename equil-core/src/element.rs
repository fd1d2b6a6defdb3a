//! Element trait and implementations.
//!
//! Elements follow the same trial/commit protocol as material points. The
//! analysis driver sets trial displacements, collects the tangent stiffness
//! and resisting force for assembly, and commits or reverts once the
//! iteration has converged or failed.
//!
//! # Submodules
//!
//! - [`truss`] - Two-node axial element

use crate::channel::Movable;
use crate::error::{Error, Result};
use crate::response::Response;
use crate::types::{active_index, EqnNumber, Tag};
use nalgebra::{DMatrix, DVector};
use std::fmt;

pub mod truss;

pub use truss::Truss;

/// Finite element interface.
///
/// Tangent and resisting force are pure reads of the current trial state.
/// Elements must be thread-safe (Send + Sync) to enable parallel evaluation.
pub trait Element: Movable + fmt::Display + fmt::Debug + Send + Sync {
    /// Caller-assigned identity.
    fn tag(&self) -> Tag;

    /// Global equation number of each local degree of freedom.
    ///
    /// Negative numbers mark constrained degrees of freedom.
    fn equation_numbers(&self) -> &[EqnNumber];

    /// Number of local degrees of freedom.
    fn n_dofs(&self) -> usize {
        self.equation_numbers().len()
    }

    /// Install trial displacements, one per local degree of freedom.
    fn set_trial_displacements(&mut self, displacements: &[f64]) -> Result<()>;

    /// Tangent stiffness at the trial state, shape (n_dofs, n_dofs).
    fn tangent_stiffness(&self) -> DMatrix<f64>;

    /// Internal resisting force at the trial state, length n_dofs.
    fn resisting_force(&self) -> DVector<f64>;

    /// Promote trial to committed.
    fn commit_state(&mut self) -> Result<()>;

    /// Discard trial and restore committed.
    fn revert_to_last_commit(&mut self) -> Result<()>;

    /// Reset to the construction-time state.
    fn revert_to_start(&mut self) -> Result<()>;

    /// Independent duplicate sharing no mutable state with `self`.
    fn get_copy(&self) -> Box<dyn Element>;

    /// Bind a response query by name.
    fn set_response(&self, _args: &[&str]) -> Option<Response> {
        None
    }

    /// Refresh a bound response from the current trial state.
    fn get_response(&self, response: &mut Response) -> Result<()>;
}

/// Gather an element's local displacements from the global solution.
///
/// Constrained degrees of freedom read as zero. An active equation past the
/// end of `global` is an [`Error::Assembly`].
pub fn local_displacements(equation_numbers: &[EqnNumber], global: &[f64]) -> Result<Vec<f64>> {
    equation_numbers
        .iter()
        .map(|&eqn| match active_index(eqn) {
            None => Ok(0.0),
            Some(i) => global.get(i).copied().ok_or_else(|| {
                Error::Assembly(format!(
                    "equation {eqn} outside displacement vector of length {}",
                    global.len()
                ))
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_displacements_skip_constrained() {
        let global = [1.0, 2.0, 3.0];
        assert_eq!(
            local_displacements(&[2, -1, 0], &global).unwrap(),
            vec![3.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_local_displacements_out_of_range() {
        let global = [1.0, 2.0];
        assert!(matches!(
            local_displacements(&[0, 2], &global),
            Err(Error::Assembly(_))
        ));
    }
}
