//! Sparse system of equations A·x = b.
//!
//! [`SparseGenColSoe`] stores `A` column-compressed with a pattern fixed by
//! [`set_size`](SparseGenColSoe::set_size): every graph edge in both
//! directions plus the full diagonal. Assembly only ever adds into existing
//! slots, so the pattern (and the solver's symbolic analysis) survives
//! every iteration of a nonlinear solve.
//!
//! Any change to `A` marks it dirty. [`solve`](SparseGenColSoe::solve)
//! factors only when dirty; new right-hand sides reuse the factorization.

use crate::broker::{recv_class_tag, send_class_tag, ObjectBroker};
use crate::channel::{Channel, Movable};
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::solver::{LinearSolver, SolveStats};
use crate::types::{ClassTag, EqnNumber};
use nalgebra::DMatrix;
use nalgebra_sparse::CscMatrix;
use tracing::{debug, trace};

/// General sparse system stored by columns.
#[derive(Debug)]
pub struct SparseGenColSoe {
    matrix: CscMatrix<f64>,
    b: Vec<f64>,
    x: Vec<f64>,
    solver: Box<dyn LinearSolver>,
    dirty: bool,
    /// Storage slot of each local entry for the `add_a` call in progress.
    slots: Vec<Option<usize>>,
}

impl SparseGenColSoe {
    /// Empty system driven by `solver`.
    pub fn new(solver: Box<dyn LinearSolver>) -> Self {
        Self {
            matrix: CscMatrix::zeros(0, 0),
            b: Vec::new(),
            x: Vec::new(),
            solver,
            dirty: true,
            slots: Vec::new(),
        }
    }

    /// Rebuild storage for the equations and connectivity in `graph`.
    ///
    /// Clears `A`, `b` and `x`, and drops any factorization. Existing buffer
    /// capacity is reused when it suffices.
    ///
    /// Returns `true` if the pattern buffers had to grow.
    pub fn set_size(&mut self, graph: &Graph) -> Result<bool> {
        let n = graph.num_vertices();
        let nnz = n + 2 * graph.num_edges();

        let previous = std::mem::replace(&mut self.matrix, CscMatrix::zeros(0, 0));
        let (mut col_offsets, mut row_indices, mut values) = previous.disassemble();
        let reallocated = col_offsets.capacity() < n + 1 || row_indices.capacity() < nnz;

        col_offsets.clear();
        row_indices.clear();
        values.clear();
        col_offsets.push(0);
        for col in 0..n {
            let mut diagonal_placed = false;
            for row in graph.neighbors(col) {
                if !diagonal_placed && row > col {
                    row_indices.push(col);
                    diagonal_placed = true;
                }
                row_indices.push(row);
            }
            if !diagonal_placed {
                row_indices.push(col);
            }
            col_offsets.push(row_indices.len());
        }
        values.resize(row_indices.len(), 0.0);

        self.matrix = CscMatrix::try_from_csc_data(n, n, col_offsets, row_indices, values)
            .map_err(|e| Error::Assembly(format!("invalid sparsity pattern: {e}")))?;

        self.b.clear();
        self.b.resize(n, 0.0);
        self.x.clear();
        self.x.resize(n, 0.0);
        self.dirty = true;
        self.solver.set_size(n)?;

        debug!(num_eqn = n, nnz = self.matrix.nnz(), reallocated, "sized equation system");
        Ok(reallocated)
    }

    /// Number of equations.
    pub fn num_eqn(&self) -> usize {
        self.b.len()
    }

    /// Number of stored entries of `A`.
    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    pub fn matrix(&self) -> &CscMatrix<f64> {
        &self.matrix
    }

    pub fn solver(&self) -> &dyn LinearSolver {
        self.solver.as_ref()
    }

    /// Replace the solver. The next `solve` factors from scratch.
    pub fn set_solver(&mut self, mut solver: Box<dyn LinearSolver>) -> Result<()> {
        solver.set_size(self.num_eqn())?;
        self.solver = solver;
        self.dirty = true;
        Ok(())
    }

    /// Whether the next `solve` will factor `A`.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Force a factorization on the next `solve`.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn index(&self, eqn: EqnNumber) -> Result<Option<usize>> {
        if eqn < 0 {
            return Ok(None);
        }
        let i = eqn as usize;
        if i >= self.num_eqn() {
            return Err(Error::Assembly(format!(
                "equation {eqn} out of range for {} equations",
                self.num_eqn()
            )));
        }
        Ok(Some(i))
    }

    /// Zero every stored entry of `A`.
    pub fn zero_a(&mut self) {
        self.matrix.values_mut().fill(0.0);
        self.dirty = true;
    }

    /// Zero `b`.
    pub fn zero_b(&mut self) {
        self.b.fill(0.0);
    }

    /// Add `fact * local[(p, q)]` into `A[eqns[p], eqns[q]]`.
    ///
    /// Entries with a negative equation number are skipped. Every slot is
    /// resolved before any value is written, so on error `A` is unchanged.
    ///
    /// # Errors
    ///
    /// Returns error if `local` is not `eqns.len()` square, an equation is
    /// out of range, or an entry falls outside the sparsity pattern.
    pub fn add_a(&mut self, local: &DMatrix<f64>, eqns: &[EqnNumber], fact: f64) -> Result<()> {
        let n = eqns.len();
        if local.nrows() != n || local.ncols() != n {
            return Err(Error::Assembly(format!(
                "local matrix is {}x{} for {} equations",
                local.nrows(),
                local.ncols(),
                n
            )));
        }
        if fact == 0.0 {
            return Ok(());
        }

        let mut active = Vec::with_capacity(n);
        for &eqn in eqns {
            active.push(self.index(eqn)?);
        }

        self.slots.clear();
        let col_offsets = self.matrix.col_offsets();
        let row_indices = self.matrix.row_indices();
        // Column-major to match DMatrix storage order.
        for &col in &active {
            for &row in &active {
                let slot = match (row, col) {
                    (Some(row), Some(col)) => {
                        let start = col_offsets[col];
                        let rows = &row_indices[start..col_offsets[col + 1]];
                        let offset = rows.binary_search(&row).map_err(|_| {
                            Error::Assembly(format!("entry ({row}, {col}) is outside the sparsity pattern"))
                        })?;
                        Some(start + offset)
                    }
                    _ => None,
                };
                self.slots.push(slot);
            }
        }

        let values = self.matrix.values_mut();
        for (slot, &v) in self.slots.iter().zip(local.iter()) {
            if let Some(k) = *slot {
                values[k] += fact * v;
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Add `fact * local[p]` into `b[eqns[p]]`, skipping negative equations.
    pub fn add_b(&mut self, local: &[f64], eqns: &[EqnNumber], fact: f64) -> Result<()> {
        if local.len() != eqns.len() {
            return Err(Error::Assembly(format!(
                "local vector has {} entries for {} equations",
                local.len(),
                eqns.len()
            )));
        }
        if fact == 0.0 {
            return Ok(());
        }
        let mut active = Vec::with_capacity(eqns.len());
        for &eqn in eqns {
            active.push(self.index(eqn)?);
        }
        for (i, &v) in active.into_iter().zip(local) {
            if let Some(i) = i {
                self.b[i] += fact * v;
            }
        }
        Ok(())
    }

    /// Overwrite `b` with `fact * vector`.
    pub fn set_b(&mut self, vector: &[f64], fact: f64) -> Result<()> {
        if vector.len() != self.num_eqn() {
            return Err(Error::Assembly(format!(
                "load vector has {} entries for {} equations",
                vector.len(),
                self.num_eqn()
            )));
        }
        for (bi, &v) in self.b.iter_mut().zip(vector) {
            *bi = fact * v;
        }
        Ok(())
    }

    /// Solution of the last successful `solve`.
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Euclidean norm of `b`.
    pub fn norm_rhs(&self) -> f64 {
        self.b.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Set one entry of `x`.
    pub fn set_x(&mut self, eqn: usize, value: f64) -> Result<()> {
        let n = self.num_eqn();
        let xi = self
            .x
            .get_mut(eqn)
            .ok_or_else(|| Error::Assembly(format!("equation {eqn} out of range for {n} equations")))?;
        *xi = value;
        Ok(())
    }

    /// Overwrite `x`.
    pub fn set_x_all(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.num_eqn() {
            return Err(Error::Assembly(format!(
                "solution has {} entries for {} equations",
                values.len(),
                self.num_eqn()
            )));
        }
        self.x.copy_from_slice(values);
        Ok(())
    }

    /// Solve A·x = b, factoring `A` first if it changed.
    ///
    /// # Errors
    ///
    /// A singular matrix gives [`Error::SingularMatrix`], which is
    /// recoverable: `A` stays dirty and the system can be reassembled.
    pub fn solve(&mut self) -> Result<SolveStats> {
        if self.dirty || !self.solver.is_factored() {
            trace!(num_eqn = self.num_eqn(), "factoring system matrix");
            self.solver.factor(&self.matrix)?;
            self.dirty = false;
        }
        self.solver.solve(&self.b, &mut self.x)
    }

    /// Dense copy of `A`.
    pub fn to_dense(&self) -> DMatrix<f64> {
        DMatrix::from(&self.matrix)
    }
}

fn to_ids(values: &[usize]) -> Result<Vec<i32>> {
    values
        .iter()
        .map(|&v| i32::try_from(v).map_err(|_| Error::Channel(format!("index {v} exceeds i32"))))
        .collect()
}

fn from_ids(values: &[i32]) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|&v| usize::try_from(v).map_err(|_| Error::Channel(format!("negative index {v}"))))
        .collect()
}

impl Movable for SparseGenColSoe {
    fn class_tag(&self) -> ClassTag {
        ClassTag::SparseGenColSoe
    }

    /// Message sequence: id `[n, nnz]`, column offsets, row indices, values,
    /// `b`, `x`, solver class tag, then the solver.
    fn send_self(&self, commit_tag: i32, channel: &mut dyn Channel) -> Result<()> {
        let db_tag = self.db_tag();
        let header = to_ids(&[self.num_eqn(), self.nnz()])?;
        channel.send_id(db_tag, commit_tag, &header)?;
        channel.send_id(db_tag, commit_tag, &to_ids(self.matrix.col_offsets())?)?;
        channel.send_id(db_tag, commit_tag, &to_ids(self.matrix.row_indices())?)?;
        channel.send_vector(db_tag, commit_tag, self.matrix.values())?;
        channel.send_vector(db_tag, commit_tag, &self.b)?;
        channel.send_vector(db_tag, commit_tag, &self.x)?;
        send_class_tag(self.solver.as_ref(), db_tag, commit_tag, channel)?;
        self.solver.send_self(commit_tag, channel)
    }

    fn recv_self(
        &mut self,
        commit_tag: i32,
        channel: &mut dyn Channel,
        broker: &dyn ObjectBroker,
    ) -> Result<()> {
        let db_tag = self.db_tag();
        let mut header = [0i32; 2];
        channel.recv_id(db_tag, commit_tag, &mut header)?;
        let sizes = from_ids(&header)?;
        let (n, nnz) = (sizes[0], sizes[1]);

        if n.checked_mul(n).map_or(true, |full| nnz > full) {
            return Err(Error::Channel(format!(
                "received {nnz} stored entries for {n} equations"
            )));
        }

        let offsets = channel.recv_ids(db_tag, commit_tag, n + 1)?;
        let rows = channel.recv_ids(db_tag, commit_tag, nnz)?;
        let values = channel.recv_values(db_tag, commit_tag, nnz)?;
        let b = channel.recv_values(db_tag, commit_tag, n)?;
        let x = channel.recv_values(db_tag, commit_tag, n)?;

        let solver_tag = recv_class_tag(db_tag, commit_tag, channel)?;
        let mut solver = broker.new_solver(solver_tag)?;
        solver.recv_self(commit_tag, channel, broker)?;
        solver.set_size(n)?;

        let matrix = CscMatrix::try_from_csc_data(n, n, from_ids(&offsets)?, from_ids(&rows)?, values)
            .map_err(|e| Error::Channel(format!("received invalid sparse matrix: {e}")))?;

        self.matrix = matrix;
        self.b = b;
        self.x = x;
        self.solver = solver;
        self.dirty = true;
        self.slots.clear();
        Ok(())
    }
}
