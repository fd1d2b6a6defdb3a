//! System assembly from element contributions.
//!
//! Element tangents and resisting forces can be evaluated in parallel with
//! Rayon. Scattering into the [`SparseGenColSoe`] is always sequential in
//! element order, so the assembled system is identical with or without
//! parallel evaluation.

use crate::element::{local_displacements, Element};
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::soe::SparseGenColSoe;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::debug;

/// Assembly options.
#[derive(Debug, Clone, Default)]
pub struct AssemblyOptions {
    /// Evaluate element contributions on the Rayon thread pool.
    pub parallel: bool,
}

/// Connectivity graph of `elements` over `num_eqn` equations.
pub fn connectivity_graph(num_eqn: usize, elements: &[Box<dyn Element>]) -> Result<Graph> {
    Graph::from_equation_sets(num_eqn, elements.iter().map(|e| e.equation_numbers()))
}

fn evaluate<T, F>(elements: &[Box<dyn Element>], options: &AssemblyOptions, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&dyn Element) -> T + Sync + Send,
{
    if options.parallel {
        elements.par_iter().map(|e| f(e.as_ref())).collect()
    } else {
        elements.iter().map(|e| f(e.as_ref())).collect()
    }
}

/// Assemble the tangent into `A` and the negated resisting force into `b`.
///
/// Both are zeroed first. Applied loads are added afterwards by the caller,
/// or `b` is rebuilt with [`form_unbalance`].
///
/// # Arguments
///
/// * `soe` - System sized with [`connectivity_graph`] of the same elements
/// * `elements` - Elements at the current trial state
/// * `options` - Assembly configuration
pub fn assemble(
    soe: &mut SparseGenColSoe,
    elements: &[Box<dyn Element>],
    options: &AssemblyOptions,
) -> Result<()> {
    let contributions: Vec<(DMatrix<f64>, DVector<f64>)> = evaluate(elements, options, |e| {
        (e.tangent_stiffness(), e.resisting_force())
    });

    soe.zero_a();
    soe.zero_b();
    for (element, (k, f)) in elements.iter().zip(&contributions) {
        let eqns = element.equation_numbers();
        soe.add_a(k, eqns, 1.0)?;
        soe.add_b(f.as_slice(), eqns, -1.0)?;
    }

    debug!(
        elements = elements.len(),
        parallel = options.parallel,
        "assembled system"
    );
    Ok(())
}

/// Rebuild `b = external - internal` without touching `A`.
///
/// Used by modified Newton iterations that keep the last factorization.
pub fn form_unbalance(
    soe: &mut SparseGenColSoe,
    elements: &[Box<dyn Element>],
    external: &[f64],
) -> Result<()> {
    soe.set_b(external, 1.0)?;
    for element in elements {
        soe.add_b(element.resisting_force().as_slice(), element.equation_numbers(), -1.0)?;
    }
    Ok(())
}

/// Push the global displacement vector into every element's trial state.
pub fn set_trial_displacements(
    elements: &mut [Box<dyn Element>],
    displacements: &[f64],
    options: &AssemblyOptions,
) -> Result<()> {
    let update = |e: &mut Box<dyn Element>| {
        let local = local_displacements(e.equation_numbers(), displacements)?;
        e.set_trial_displacements(&local)
    };
    if options.parallel {
        elements.par_iter_mut().try_for_each(update)
    } else {
        elements.iter_mut().try_for_each(update)
    }
}

/// Commit every element.
pub fn commit_state(elements: &mut [Box<dyn Element>]) -> Result<()> {
    elements.iter_mut().try_for_each(|e| e.commit_state())
}

/// Revert every element to its last commit.
pub fn revert_to_last_commit(elements: &mut [Box<dyn Element>]) -> Result<()> {
    elements.iter_mut().try_for_each(|e| e.revert_to_last_commit())
}

/// Number of equations implied by the largest equation number in use.
pub fn count_equations(elements: &[Box<dyn Element>]) -> Result<usize> {
    let max = elements
        .iter()
        .flat_map(|e| e.equation_numbers().iter().copied())
        .max()
        .unwrap_or(-1);
    max.checked_add(1)
        .and_then(|count| usize::try_from(count).ok())
        .ok_or_else(|| Error::Assembly(format!("invalid equation number {max}")))
}
