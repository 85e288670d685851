//! Garnet Core - Terms, Literals and Host Capabilities for the Theory Cores
//!
//! This crate provides the foundational types shared by the Garnet theory
//! cores:
//! - Arena-allocated, hash-consed terms with [`TermId`] references
//! - A minimal [`Lit`]/[`Var`] literal representation
//! - The numeric capability [`Num`] with checked 64-bit and
//!   arbitrary-precision instantiations
//! - The [`Context`] capability through which cores observe and mutate the
//!   host SAT state
//! - The uniform [`Plugin`] contract implemented by every theory core
//!
//! # Examples
//!
//! ## Creating terms
//!
//! ```
//! use garnet_core::ast::{Sort, TermManager};
//!
//! let mut tm = TermManager::new();
//! let x = tm.mk_var("x", Sort::Int);
//! let three = tm.mk_int(3);
//! let le = tm.mk_le(x, three);
//! assert_eq!(tm.sort(le), Sort::Bool);
//! ```
//!
//! ## Checked numeric capability
//!
//! ```
//! use garnet_core::num::{CheckedInt, Num};
//!
//! let a = CheckedInt::from_i64(i64::MAX);
//! assert!(a.add(&CheckedInt::one()).is_err());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ast;
pub mod context;
pub mod error;
pub mod literal;
pub mod num;
pub mod plugin;

pub use ast::{Sort, TermId, TermKind, TermManager};
pub use context::{Clause, ClauseIdx, Context, SimpleContext};
pub use error::{Error, Result};
pub use literal::{Lit, Var};
pub use num::{CheckedInt, Num, Rational};
pub use plugin::{Model, Plugin};
