//! # aex
//!
//! Abstract execution over an interprocedural control-flow graph (ICFG).
//!
//! The engine computes, at every program point, a sound over-approximation
//! of the values each variable and memory location may hold, using an
//! interval lattice for numeric values and finite address sets for
//! pointers. Iteration follows a weak topological ordering of the ICFG
//! with delayed widening and a narrowing pass, so loops converge to a
//! fixpoint in finitely many steps.
//!
//! ## Modules
//!
//! - `ir`       — the consumed program representation: ICFG, statements,
//!   variable/object tables, and a builder to assemble them
//! - `analysis` — the analyses; `analysis::absint` is the abstract
//!   execution engine, `analysis::core` holds the domains and the weak
//!   topological ordering
//! - `utils`    — logging macros and helpers

#[macro_use]
pub mod utils;

pub mod analysis;
pub mod ir;
