//! Structured parameter descriptors.
//!
//! A parameter is resolved once from a name and an optional 1-based index
//! (for example `["pt", "3"]`) into a [`ParameterId`], which is then used for
//! repeated updates during sensitivity or reliability studies.

use crate::error::{Error, Result};

/// Identifies an updatable parameter of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterId {
    /// Location of an integration point (0-based).
    Point(usize),
    /// Weight of an integration point (0-based).
    Weight(usize),
    /// Elastic modulus.
    YoungsModulus,
    /// Viscous damping coefficient.
    Damping,
    /// Cross-sectional area.
    Area,
}

/// Entities whose configuration can be updated through [`ParameterId`]s.
pub trait Parameterized {
    /// Resolve a parameter from its name and arguments.
    fn set_parameter(&self, args: &[&str]) -> Result<ParameterId>;

    /// Apply a new value to a resolved parameter.
    fn update_parameter(&mut self, id: ParameterId, value: f64) -> Result<()>;
}

/// Parse the 1-based index argument following a parameter name.
///
/// Returns the 0-based index, rejecting anything outside `1..=count`.
pub fn parse_index(args: &[&str], count: usize) -> Result<usize> {
    let raw = args
        .get(1)
        .ok_or_else(|| Error::Parameter(format!("{:?}: missing index", args.first())))?;
    let index: usize = raw
        .parse()
        .map_err(|_| Error::Parameter(format!("invalid index {raw:?}")))?;
    if index == 0 || index > count {
        return Err(Error::Parameter(format!(
            "index {index} outside 1..={count}"
        )));
    }
    Ok(index - 1)
}

/// Reject non-finite parameter values.
pub fn finite(id: ParameterId, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::Parameter(format!("{id:?} must be finite, got {value}")))
    }
}
