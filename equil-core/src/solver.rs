//! Linear system solvers.
//!
//! Provides direct and iterative backends for the assembled system A·x = b.
//! A backend is owned by one [`SparseGenColSoe`](crate::soe::SparseGenColSoe)
//! and sees the matrix in two steps: [`LinearSolver::factor`] whenever the
//! coefficients changed, then [`LinearSolver::solve`] once per right-hand side.
//!
//! # Solver Backends
//!
//! - [`CholeskySolver`]: Sparse Cholesky factorization using the faer library.
//!   The symbolic analysis is computed once per sparsity pattern and reused
//!   by every numeric re-factorization until the next `set_size`.
//! - [`ConjugateGradientSolver`]: Jacobi-preconditioned conjugate gradient.
//! - [`DenseLuSolver`]: nalgebra dense LU for small or unsymmetric systems.
//!
//! All scratch storage belongs to the solver instance.

use crate::broker::ObjectBroker;
use crate::channel::{Channel, Movable};
use crate::error::{Error, Result};
use crate::types::ClassTag;
use faer::linalg::cholesky::llt::factor::LltError;
use faer::prelude::*;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::sparse::linalg::LltError as SparseLltError;
use faer::sparse::{SparseColMatRef, SymbolicSparseColMatRef};
use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};
use nalgebra_sparse::CscMatrix;
use std::fmt;
use tracing::{debug, trace, warn};

/// Linear solver interface.
pub trait LinearSolver: Movable + fmt::Debug + Send {
    /// Solver name for diagnostics.
    fn name(&self) -> &str;

    /// Prepare for a system of `num_eqn` equations.
    ///
    /// Drops any symbolic or numeric factorization.
    fn set_size(&mut self, num_eqn: usize) -> Result<()>;

    /// Factor (or otherwise prepare) the system matrix.
    ///
    /// # Arguments
    ///
    /// * `matrix` - Square system matrix (A)
    fn factor(&mut self, matrix: &CscMatrix<f64>) -> Result<()>;

    /// Whether a successful `factor` is available for `solve`.
    fn is_factored(&self) -> bool;

    /// Solve A·x = b with the current factorization.
    ///
    /// # Arguments
    ///
    /// * `rhs` - Right-hand side vector (b)
    /// * `x` - Output solution vector, same length as `rhs`
    fn solve(&mut self, rhs: &[f64], x: &mut [f64]) -> Result<SolveStats>;
}

/// Solver selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverType {
    /// Sparse Cholesky with symbolic reuse.
    Direct,
    /// Jacobi-preconditioned conjugate gradient.
    Iterative,
    /// Dense LU.
    Dense,
    /// Automatically select based on problem size.
    #[default]
    Auto,
}

/// Solver configuration.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Solver type to use.
    pub solver_type: SolverType,
    /// Relative residual tolerance for iterative solvers.
    pub tolerance: f64,
    /// Maximum iterations for iterative solvers.
    pub max_iterations: usize,
    /// Problem size threshold for auto-selection (direct below, iterative above).
    pub auto_threshold: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            solver_type: SolverType::Auto,
            tolerance: 1e-10,
            max_iterations: 10000,
            auto_threshold: 100_000, // 100k equations
        }
    }
}

/// Solution statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveStats {
    /// Solver name used.
    pub solver: String,
    /// Number of iterations (for iterative solvers).
    pub iterations: Option<usize>,
    /// Final relative residual norm (for iterative solvers).
    pub residual: Option<f64>,
}

impl SolveStats {
    fn direct(solver: &str) -> Self {
        Self {
            solver: solver.to_string(),
            iterations: None,
            residual: None,
        }
    }
}

fn check_square(matrix: &CscMatrix<f64>) -> Result<usize> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(Error::Solver(format!(
            "matrix must be square, got {}x{}",
            n,
            matrix.ncols()
        )));
    }
    Ok(n)
}

fn check_lengths(n: usize, rhs: &[f64], x: &[f64]) -> Result<()> {
    if rhs.len() != n || x.len() != n {
        return Err(Error::Solver(format!(
            "size mismatch: system {}, rhs {}, x {}",
            n,
            rhs.len(),
            x.len()
        )));
    }
    Ok(())
}

fn map_llt_error(e: SparseLltError) -> Error {
    match e {
        SparseLltError::Generic(err) => Error::Solver(format!("Sparse Cholesky error: {:?}", err)),
        SparseLltError::Numeric(LltError::NonPositivePivot { index }) => {
            Error::SingularMatrix(format!("matrix is not positive definite at pivot {}", index))
        }
    }
}

/// Sparse Cholesky solver using the faer library.
///
/// Symbolic analysis depends only on the sparsity pattern, so it is kept
/// across calls to [`factor`](LinearSolver::factor) and dropped by
/// [`set_size`](LinearSolver::set_size). Only the lower triangle is read.
pub struct CholeskySolver {
    num_eqn: usize,
    pattern_offsets: Vec<usize>,
    pattern_rows: Vec<usize>,
    symbolic: Option<SymbolicLlt<usize>>,
    numeric: Option<Llt<usize, f64>>,
    symbolic_count: usize,
}

impl CholeskySolver {
    /// Create a new sparse Cholesky solver.
    pub fn new() -> Self {
        Self {
            num_eqn: 0,
            pattern_offsets: Vec::new(),
            pattern_rows: Vec::new(),
            symbolic: None,
            numeric: None,
            symbolic_count: 0,
        }
    }

    /// Number of symbolic analyses performed since construction.
    pub fn symbolic_count(&self) -> usize {
        self.symbolic_count
    }
}

impl Default for CholeskySolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CholeskySolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CholeskySolver")
            .field("num_eqn", &self.num_eqn)
            .field("analyzed", &self.symbolic.is_some())
            .field("factored", &self.numeric.is_some())
            .finish()
    }
}

impl LinearSolver for CholeskySolver {
    fn name(&self) -> &str {
        "faer Sparse Cholesky (LLᵀ)"
    }

    fn set_size(&mut self, num_eqn: usize) -> Result<()> {
        self.num_eqn = num_eqn;
        self.pattern_offsets.clear();
        self.pattern_rows.clear();
        self.symbolic = None;
        self.numeric = None;
        Ok(())
    }

    fn factor(&mut self, matrix: &CscMatrix<f64>) -> Result<()> {
        let n = check_square(matrix)?;
        self.numeric = None;
        if n == 0 {
            self.num_eqn = 0;
            return Ok(());
        }

        // SAFETY: nalgebra-sparse guarantees valid CSC offsets and sorted,
        // in-bounds row indices.
        let symbolic_ref = unsafe {
            SymbolicSparseColMatRef::new_unchecked(
                n,
                n,
                matrix.col_offsets(),
                None,
                matrix.row_indices(),
            )
        };
        let csc = SparseColMatRef::new(symbolic_ref, matrix.values());

        if n != self.num_eqn
            || matrix.col_offsets() != self.pattern_offsets.as_slice()
            || matrix.row_indices() != self.pattern_rows.as_slice()
        {
            self.symbolic = None;
        }
        let symbolic = match &self.symbolic {
            Some(symbolic) => symbolic.clone(),
            None => {
                debug!(num_eqn = n, nnz = matrix.nnz(), "symbolic Cholesky analysis");
                let symbolic = SymbolicLlt::try_new(symbolic_ref, faer::Side::Lower)
                    .map_err(|_| Error::Solver("Symbolic Cholesky analysis failed".into()))?;
                self.num_eqn = n;
                self.pattern_offsets.clear();
                self.pattern_offsets.extend_from_slice(matrix.col_offsets());
                self.pattern_rows.clear();
                self.pattern_rows.extend_from_slice(matrix.row_indices());
                self.symbolic_count += 1;
                self.symbolic = Some(symbolic.clone());
                symbolic
            }
        };

        debug!(num_eqn = n, "numeric Cholesky factorization");
        let llt = Llt::try_new_with_symbolic(symbolic, csc, faer::Side::Lower).map_err(|e| {
            let err = map_llt_error(e);
            warn!(error = %err, "Cholesky factorization failed");
            err
        })?;
        self.numeric = Some(llt);
        Ok(())
    }

    fn is_factored(&self) -> bool {
        self.numeric.is_some() || self.num_eqn == 0
    }

    fn solve(&mut self, rhs: &[f64], x: &mut [f64]) -> Result<SolveStats> {
        check_lengths(self.num_eqn, rhs, x)?;
        if self.num_eqn == 0 {
            return Ok(SolveStats::direct(self.name()));
        }
        let llt = self
            .numeric
            .as_ref()
            .ok_or_else(|| Error::Solver("no factorization available - call factor() first".into()))?;

        let mut sol = faer::Mat::from_fn(rhs.len(), 1, |i, _| rhs[i]);
        llt.solve_in_place(sol.as_mut());
        for (i, xi) in x.iter_mut().enumerate() {
            *xi = sol[(i, 0)];
        }
        trace!(num_eqn = self.num_eqn, "Cholesky solve");
        Ok(SolveStats::direct(self.name()))
    }
}

impl Movable for CholeskySolver {
    fn class_tag(&self) -> ClassTag {
        ClassTag::CholeskySolver
    }

    /// Factorizations are rebuilt by the receiver; nothing is sent.
    fn send_self(&self, _commit_tag: i32, _channel: &mut dyn Channel) -> Result<()> {
        Ok(())
    }

    fn recv_self(
        &mut self,
        _commit_tag: i32,
        _channel: &mut dyn Channel,
        _broker: &dyn ObjectBroker,
    ) -> Result<()> {
        self.set_size(0)
    }
}

/// Jacobi-preconditioned conjugate gradient.
///
/// `factor` copies the matrix into private storage and inverts its diagonal.
/// The copy's buffers are reused across factorizations of the same size.
#[derive(Debug, Clone)]
pub struct ConjugateGradientSolver {
    tolerance: f64,
    max_iterations: usize,
    factored: bool,
    num_eqn: usize,
    col_offsets: Vec<usize>,
    row_indices: Vec<usize>,
    values: Vec<f64>,
    inv_diag: Vec<f64>,
    r: Vec<f64>,
    z: Vec<f64>,
    p: Vec<f64>,
    q: Vec<f64>,
}

impl ConjugateGradientSolver {
    /// Create a solver with the given relative tolerance and iteration cap.
    ///
    /// # Errors
    ///
    /// Returns error if `tolerance` is not positive or `max_iterations` is zero.
    pub fn new(tolerance: f64, max_iterations: usize) -> Result<Self> {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(Error::Config(format!(
                "CG tolerance must be positive, got {tolerance}"
            )));
        }
        if max_iterations == 0 {
            return Err(Error::Config("CG needs at least one iteration".into()));
        }
        Ok(Self {
            tolerance,
            max_iterations,
            factored: false,
            num_eqn: 0,
            col_offsets: Vec::new(),
            row_indices: Vec::new(),
            values: Vec::new(),
            inv_diag: Vec::new(),
            r: Vec::new(),
            z: Vec::new(),
            p: Vec::new(),
            q: Vec::new(),
        })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// y = A·v using the private matrix copy.
    fn apply(&self, v: &[f64], y: &mut [f64]) {
        y.fill(0.0);
        for (j, &vj) in v.iter().enumerate() {
            let range = self.col_offsets[j]..self.col_offsets[j + 1];
            for (&i, &a) in self.row_indices[range.clone()].iter().zip(&self.values[range]) {
                y[i] += a * vj;
            }
        }
    }
}

impl Default for ConjugateGradientSolver {
    fn default() -> Self {
        let config = SolverConfig::default();
        Self {
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
            factored: false,
            num_eqn: 0,
            col_offsets: Vec::new(),
            row_indices: Vec::new(),
            values: Vec::new(),
            inv_diag: Vec::new(),
            r: Vec::new(),
            z: Vec::new(),
            p: Vec::new(),
            q: Vec::new(),
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl LinearSolver for ConjugateGradientSolver {
    fn name(&self) -> &str {
        "Jacobi-preconditioned CG"
    }

    fn set_size(&mut self, num_eqn: usize) -> Result<()> {
        self.num_eqn = num_eqn;
        self.factored = false;
        for buf in [&mut self.inv_diag, &mut self.r, &mut self.z, &mut self.p, &mut self.q] {
            buf.clear();
            buf.resize(num_eqn, 0.0);
        }
        Ok(())
    }

    fn factor(&mut self, matrix: &CscMatrix<f64>) -> Result<()> {
        let n = check_square(matrix)?;
        if n != self.num_eqn {
            self.set_size(n)?;
        }
        self.factored = false;

        self.col_offsets.clear();
        self.col_offsets.extend_from_slice(matrix.col_offsets());
        self.row_indices.clear();
        self.row_indices.extend_from_slice(matrix.row_indices());
        self.values.clear();
        self.values.extend_from_slice(matrix.values());

        self.inv_diag.fill(0.0);
        for (i, j, &a) in matrix.triplet_iter() {
            if i == j {
                self.inv_diag[i] += a;
            }
        }
        for (i, d) in self.inv_diag.iter_mut().enumerate() {
            if !(d.is_finite() && *d > 0.0) {
                warn!(equation = i, diagonal = *d, "non-positive diagonal in CG preconditioner");
                return Err(Error::SingularMatrix(format!(
                    "non-positive diagonal {} at equation {}",
                    d, i
                )));
            }
            *d = 1.0 / *d;
        }

        self.factored = true;
        Ok(())
    }

    fn is_factored(&self) -> bool {
        self.factored
    }

    fn solve(&mut self, rhs: &[f64], x: &mut [f64]) -> Result<SolveStats> {
        let n = self.num_eqn;
        check_lengths(n, rhs, x)?;
        if !self.factored {
            return Err(Error::Solver("no factorization available - call factor() first".into()));
        }

        x.fill(0.0);
        let b_norm = dot(rhs, rhs).sqrt();
        if b_norm == 0.0 {
            return Ok(SolveStats {
                solver: self.name().to_string(),
                iterations: Some(0),
                residual: Some(0.0),
            });
        }

        let mut r = std::mem::take(&mut self.r);
        let mut z = std::mem::take(&mut self.z);
        let mut p = std::mem::take(&mut self.p);
        let mut q = std::mem::take(&mut self.q);

        r.copy_from_slice(rhs);
        for ((zi, ri), di) in z.iter_mut().zip(&r).zip(&self.inv_diag) {
            *zi = ri * di;
        }
        p.copy_from_slice(&z);
        let mut rz = dot(&r, &z);

        let mut outcome = Err(Error::Solver(format!(
            "CG did not converge in {} iterations",
            self.max_iterations
        )));
        for k in 1..=self.max_iterations {
            self.apply(&p, &mut q);
            let pq = dot(&p, &q);
            if !(pq.is_finite() && pq > 0.0) {
                outcome = Err(Error::SingularMatrix(format!(
                    "matrix is not positive definite (pᵀAp = {pq})"
                )));
                break;
            }
            let alpha = rz / pq;
            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * q[i];
            }

            let residual = dot(&r, &r).sqrt() / b_norm;
            if residual <= self.tolerance {
                trace!(iterations = k, residual, "CG converged");
                outcome = Ok(SolveStats {
                    solver: self.name().to_string(),
                    iterations: Some(k),
                    residual: Some(residual),
                });
                break;
            }

            for ((zi, ri), di) in z.iter_mut().zip(&r).zip(&self.inv_diag) {
                *zi = ri * di;
            }
            let rz_new = dot(&r, &z);
            let beta = rz_new / rz;
            rz = rz_new;
            for (pi, zi) in p.iter_mut().zip(&z) {
                *pi = zi + beta * *pi;
            }
        }

        self.r = r;
        self.z = z;
        self.p = p;
        self.q = q;

        if let Err(e) = &outcome {
            warn!(error = %e, "CG solve failed");
        }
        outcome
    }
}

impl Movable for ConjugateGradientSolver {
    fn class_tag(&self) -> ClassTag {
        ClassTag::ConjugateGradientSolver
    }

    fn send_self(&self, commit_tag: i32, channel: &mut dyn Channel) -> Result<()> {
        let db_tag = self.db_tag();
        let max_iterations = i32::try_from(self.max_iterations)
            .map_err(|_| Error::Channel(format!("max_iterations {} too large", self.max_iterations)))?;
        channel.send_id(db_tag, commit_tag, &[max_iterations])?;
        channel.send_vector(db_tag, commit_tag, &[self.tolerance])
    }

    fn recv_self(
        &mut self,
        commit_tag: i32,
        channel: &mut dyn Channel,
        _broker: &dyn ObjectBroker,
    ) -> Result<()> {
        let db_tag = self.db_tag();
        let mut ids = [0i32; 1];
        let mut data = [0.0; 1];
        channel.recv_id(db_tag, commit_tag, &mut ids)?;
        channel.recv_vector(db_tag, commit_tag, &mut data)?;

        let max_iterations = usize::try_from(ids[0])
            .map_err(|_| Error::Channel(format!("invalid max_iterations {}", ids[0])))?;
        *self = Self::new(data[0], max_iterations)
            .map_err(|e| Error::Channel(format!("received invalid CG settings: {e}")))?;
        Ok(())
    }
}

/// Dense LU solver using nalgebra.
///
/// Converts the sparse matrix to dense storage, so only suitable for small
/// systems. Does not require symmetry.
#[derive(Default)]
pub struct DenseLuSolver {
    num_eqn: usize,
    lu: Option<LU<f64, Dyn, Dyn>>,
}

impl DenseLuSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for DenseLuSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseLuSolver")
            .field("num_eqn", &self.num_eqn)
            .field("factored", &self.lu.is_some())
            .finish()
    }
}

impl LinearSolver for DenseLuSolver {
    fn name(&self) -> &str {
        "Dense LU"
    }

    fn set_size(&mut self, num_eqn: usize) -> Result<()> {
        self.num_eqn = num_eqn;
        self.lu = None;
        Ok(())
    }

    fn factor(&mut self, matrix: &CscMatrix<f64>) -> Result<()> {
        let n = check_square(matrix)?;
        self.num_eqn = n;
        self.lu = None;

        let lu = DMatrix::from(matrix).lu();
        if !lu.is_invertible() {
            warn!(num_eqn = n, "dense LU found a singular matrix");
            return Err(Error::SingularMatrix("LU factorization failed".into()));
        }
        self.lu = Some(lu);
        Ok(())
    }

    fn is_factored(&self) -> bool {
        self.lu.is_some()
    }

    fn solve(&mut self, rhs: &[f64], x: &mut [f64]) -> Result<SolveStats> {
        check_lengths(self.num_eqn, rhs, x)?;
        let lu = self
            .lu
            .as_ref()
            .ok_or_else(|| Error::Solver("no factorization available - call factor() first".into()))?;

        let b = DVector::from_column_slice(rhs);
        let solution = lu
            .solve(&b)
            .ok_or_else(|| Error::SingularMatrix("LU solve failed".into()))?;
        x.copy_from_slice(solution.as_slice());
        Ok(SolveStats::direct(self.name()))
    }
}

impl Movable for DenseLuSolver {
    fn class_tag(&self) -> ClassTag {
        ClassTag::DenseLuSolver
    }

    fn send_self(&self, _commit_tag: i32, _channel: &mut dyn Channel) -> Result<()> {
        Ok(())
    }

    fn recv_self(
        &mut self,
        _commit_tag: i32,
        _channel: &mut dyn Channel,
        _broker: &dyn ObjectBroker,
    ) -> Result<()> {
        self.set_size(0)
    }
}

/// Select solver based on configuration and problem size.
pub fn select_solver(config: &SolverConfig, num_eqn: usize) -> Result<Box<dyn LinearSolver>> {
    let iterative = || -> Result<Box<dyn LinearSolver>> {
        Ok(Box::new(ConjugateGradientSolver::new(
            config.tolerance,
            config.max_iterations,
        )?))
    };
    match config.solver_type {
        SolverType::Direct => Ok(Box::new(CholeskySolver::new())),
        SolverType::Iterative => iterative(),
        SolverType::Dense => Ok(Box::new(DenseLuSolver::new())),
        SolverType::Auto => {
            if num_eqn < config.auto_threshold {
                Ok(Box::new(CholeskySolver::new()))
            } else {
                iterative()
            }
        }
    }
}
