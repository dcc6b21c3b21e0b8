use crate::analysis::absint::{AbstractInterpretation, AeError, AeOptions};
use crate::analysis::Analysis;
use crate::ir::Ir;

mod loops;
mod memory;

/// Run the engine over `ir` with default options, returning it together
/// with the run result so tests can inspect both the trace and errors.
fn analyze(ir: &Ir) -> (AbstractInterpretation<'_>, Result<(), AeError>) {
    crate::utils::log::init_log();
    let mut ae = AbstractInterpretation::new(ir, AeOptions::default()).expect("extern-API model");
    let result = ae.run();
    (ae, result)
}
