//! # Herald Store
//! In-memory adapters for the core's store and collaborator contracts.
//!
//! Real deployments put a document store and a broker behind these traits;
//! the adapters here back the worker binary and the test suite with the
//! same observable semantics (bulk cancel races, queue redelivery,
//! append-only audit).

mod collaborators;
mod queue;
mod stores;

pub use collaborators::*;
pub use queue::*;
pub use stores::*;
