//! The stage index and the operations that walk its dependency graph.
//!
//! An [`Index`] maps stage-file paths to [`Stage`](dud_stage::Stage)s. A stage
//! depends on another when one of its inputs is owned by the other's outputs.
//! Every operation (commit, checkout, status, run, fetch, push, graph) walks
//! this graph depth-first from a starting stage, visiting upstream stages
//! first and failing on cycles.

#![warn(missing_docs)]

mod checkout;
mod commit;
pub mod error;
pub mod graph;
pub mod index;
mod remote;
mod run;
pub mod runner;
mod status;
pub mod traversal;

#[cfg(test)]
mod mock;

pub use error::IndexError;
pub use graph::{DotGraph, EdgeKind, GraphSink};
pub use index::Index;
pub use runner::{CommandRunner, ShellRunner};
pub use traversal::Traversal;
