//! Analyses over the consumed program representation.
//!
//! Every analysis implements [`Analysis`]; `absint` is the abstract
//! execution engine, `core` holds the pieces it is built from.

pub mod absint;
pub mod core;

use absint::AeError;

/// The common surface of an analysis pass.
pub trait Analysis {
    /// Return the name of the analysis.
    fn name(&self) -> &'static str;
    /// Run the entire analysis.
    fn run(&mut self) -> Result<(), AeError>;
    /// Reset to the pre-run state so the analysis can run again.
    fn reset(&mut self);
}
