//! Equation connectivity graph.
//!
//! One vertex per active equation; an edge joins two equations that share an
//! element. The graph fixes the sparsity pattern of the system matrix.

use crate::error::{Error, Result};
use crate::types::{active_index, EqnNumber};
use std::collections::BTreeSet;

/// Undirected graph over equation numbers with sorted adjacency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    adjacency: Vec<BTreeSet<usize>>,
}

impl Graph {
    /// Graph with `num_vertices` isolated vertices.
    pub fn new(num_vertices: usize) -> Self {
        Self {
            adjacency: vec![BTreeSet::new(); num_vertices],
        }
    }

    /// Build the graph from the equation numbers of each element.
    ///
    /// Every pair of active equations within one set is connected. Negative
    /// equation numbers are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if an equation number is `>= num_eqn`.
    pub fn from_equation_sets<'a, I>(num_eqn: usize, sets: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [EqnNumber]>,
    {
        let mut graph = Self::new(num_eqn);
        let mut active = Vec::new();
        for set in sets {
            active.clear();
            active.extend(set.iter().filter_map(|&eqn| active_index(eqn)));
            if let Some(&v) = active.iter().find(|&&v| v >= num_eqn) {
                return Err(Error::Assembly(format!(
                    "equation {v} out of range for {num_eqn} equations"
                )));
            }
            for (k, &a) in active.iter().enumerate() {
                for &b in &active[k + 1..] {
                    graph.add_edge(a, b)?;
                }
            }
        }
        Ok(graph)
    }

    pub fn num_vertices(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of undirected edges.
    pub fn num_edges(&self) -> usize {
        self.adjacency.iter().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Connect vertices `a` and `b`. Self loops are ignored.
    pub fn add_edge(&mut self, a: usize, b: usize) -> Result<()> {
        let n = self.num_vertices();
        if a >= n || b >= n {
            return Err(Error::Assembly(format!(
                "edge ({a}, {b}) out of range for {n} vertices"
            )));
        }
        if a != b {
            self.adjacency[a].insert(b);
            self.adjacency[b].insert(a);
        }
        Ok(())
    }

    /// Neighbours of `vertex` in increasing order.
    pub fn neighbors(&self, vertex: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency
            .get(vertex)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn degree(&self, vertex: usize) -> usize {
        self.adjacency.get(vertex).map_or(0, BTreeSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_equation_sets() {
        let sets: Vec<&[EqnNumber]> = vec![&[0, 1], &[1, 2], &[-1, 2]];
        let graph = Graph::from_equation_sets(3, sets).unwrap();

        assert_eq!(graph.num_vertices(), 3);
        assert_eq!(graph.num_edges(), 2);
        assert_eq!(graph.neighbors(1).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(graph.degree(0), 1);
    }

    #[test]
    fn test_constrained_only_set_adds_nothing() {
        let sets: Vec<&[EqnNumber]> = vec![&[-1, -1]];
        let graph = Graph::from_equation_sets(2, sets).unwrap();
        assert_eq!(graph.num_edges(), 0);
    }

    #[test]
    fn test_out_of_range() {
        let sets: Vec<&[EqnNumber]> = vec![&[0, 5]];
        assert!(Graph::from_equation_sets(2, sets).is_err());

        let lone: Vec<&[EqnNumber]> = vec![&[7]];
        assert!(Graph::from_equation_sets(2, lone).is_err());

        let mut graph = Graph::new(2);
        assert!(graph.add_edge(0, 2).is_err());
    }

    #[test]
    fn test_self_loop_ignored() {
        let mut graph = Graph::new(2);
        graph.add_edge(1, 1).unwrap();
        assert_eq!(graph.num_edges(), 0);
    }
}
