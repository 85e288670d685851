//! Garnet Theory Cores
//!
//! The reasoning engines of the Garnet theory layer:
//!
//! - **arith**: stochastic local search over integer/rational variables
//!   under linear and nonlinear constraints
//! - **bv**: the viable-value engine (forbidden intervals layered by
//!   bit-width) and the bit-precise slicing layer (slice equivalence over an
//!   e-graph of slice nodes)
//! - **datatype**: one-shot axiom elaboration for algebraic datatypes
//!
//! The cores share no state. Each tracks a value assignment, maintains
//! derived quantities incrementally, and proposes repair moves on conflict.
//! They interact with the host exclusively through the capabilities in
//! `garnet-core`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod arith;
pub mod bv;
pub mod config;
pub mod datatype;

pub use arith::ArithSls;
pub use bv::plugin::BvCore;
pub use bv::slicing::{Dep, Slicing};
pub use bv::viable::{FindResult, Viable};
pub use bv::PVar;
pub use config::{ArithConfig, ViableConfig};
pub use datatype::DatatypeAxioms;
