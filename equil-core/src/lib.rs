//! Equil Core - nonlinear equilibrium building blocks
//!
//! Finite element state and equation machinery with:
//! - Trial/commit material points and elements
//! - Sparse column-compressed equation assembly
//! - Direct, iterative and dense linear solvers behind one interface
//! - Flat ordered serialization for checkpointing and partition transfer
//!
//! # Architecture
//!
//! The library is designed around these core abstractions:
//!
//! - [`UniaxialMaterial`] trait: Trial/commit material-point contract
//! - [`Element`] trait: Tangent stiffness and resisting force at the trial state
//! - [`SparseGenColSoe`]: System storage, assembled by scatter-add
//! - [`LinearSolver`] trait: Interchangeable factor/solve backends
//! - [`Channel`] / [`Movable`]: Send and receive object state
//! - [`ObjectBroker`]: Resolves a received class tag to a blank instance
//!
//! A single driver owns the [`SparseGenColSoe`] and runs each iteration:
//! set trial displacements, [`assembly::assemble`], solve, then commit or
//! revert every element.

pub mod types;
pub mod error;
pub mod channel;
pub mod broker;
pub mod response;
pub mod parameter;
pub mod material;
pub mod integration;
pub mod element;
pub mod graph;
pub mod soe;
pub mod solver;
pub mod assembly;
pub mod recorder;

pub use types::{ClassTag, EqnNumber, Tag};
pub use error::{Error, Result};
pub use channel::{Channel, MemoryChannel, Movable, PartitionChannel, StreamChannel};
pub use broker::{DefaultBroker, ObjectBroker};
pub use response::{Information, Response, ResponseId};
pub use parameter::{ParameterId, Parameterized};
pub use material::{LinearElastic, MultiLinearElastic, UniaxialMaterial};
pub use integration::{BeamIntegration, UserDefinedIntegration};
pub use element::{Element, Truss};
pub use graph::Graph;
pub use soe::SparseGenColSoe;
pub use solver::{select_solver, LinearSolver, SolveStats, SolverConfig, SolverType};
pub use assembly::AssemblyOptions;
pub use recorder::EnvelopeRecorder;
