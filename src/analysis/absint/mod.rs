//! Abstract execution over the ICFG.
//!
//! The engine walks each function's weak topological ordering, joining
//! refined predecessor states at every node, interpreting its statements,
//! and iterating cycles with delayed widening followed by narrowing. Call
//! sites are classified as external, recursive, direct or indirect and
//! handled accordingly. The result is a trace mapping every reached ICFG
//! node to its abstract state, plus bug records and statistics.

mod branch;
mod calls;
mod engine;
mod transfer;

pub mod bug_records;
pub mod ext_api;
pub mod stats;

#[cfg(test)]
mod tests;

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::analysis::core::domain::AbstractState;
use crate::analysis::core::wto::IcfgWto;
use crate::analysis::Analysis;
use crate::ir::{FunId, Ir, NodeId, NodeKind};

pub use bug_records::{BugInfo, BugRecords};
pub use ext_api::{ExtApi, ExtApiKind};
pub use stats::AeStat;

/// Callee names whose callsites must all be visited and verified.
const CHECKPOINT_NAMES: &[&str] = &["svf_assert"];

#[derive(Debug, Clone)]
pub struct AeOptions {
    /// Cap on enumerated field offsets and copy lengths.
    pub max_field_limit: u32,
    /// Cycle iterations before widening kicks in.
    pub widen_delay: u32,
    /// Bug-report path; empty discards the report.
    pub output_name: String,
    /// Print the statistics summary after the run.
    pub p_stat: bool,
    /// Path to the extern-API model artifact; empty uses the embedded
    /// model.
    pub ext_api_path: String,
}

impl Default for AeOptions {
    fn default() -> Self {
        AeOptions {
            max_field_limit: 512,
            widen_delay: 3,
            output_name: String::new(),
            p_stat: false,
            ext_api_path: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AeError {
    /// The extern-API model artifact could not be located or parsed.
    #[error("extern-API model artifact not found at `{path}`")]
    ExtApiNotFound { path: String },
    /// A visited assertion whose argument is not entailed as true.
    #[error("assertion at node {node} failed: argument is {found}")]
    AssertionFailed { node: NodeId, found: String },
    /// Assertions that were never reached on any feasible path.
    #[error("assertion checkpoint(s) never verified at nodes {nodes:?}")]
    UnverifiedAssertions { nodes: Vec<NodeId> },
}

/// The abstract-execution engine. Borrows the program for the lifetime of
/// the analysis and owns every piece of mutable state: the trace, the
/// per-function orderings, the callsite stack, checkpoints, bug records
/// and statistics.
pub struct AbstractInterpretation<'ir> {
    pub(crate) ir: &'ir Ir,
    pub(crate) opts: AeOptions,
    pub(crate) ext_api: ExtApi,
    pub(crate) trace: IndexMap<NodeId, AbstractState>,
    pub(crate) func_wto: FxHashMap<FunId, Rc<IcfgWto>>,
    pub(crate) call_stack: Vec<NodeId>,
    pub(crate) checkpoints: IndexSet<NodeId>,
    pub(crate) bug_records: BugRecords,
    pub(crate) stat: AeStat,
}

impl<'ir> AbstractInterpretation<'ir> {
    pub fn new(ir: &'ir Ir, opts: AeOptions) -> Result<Self, AeError> {
        let ext_api = ExtApi::load(&opts.ext_api_path)?;
        Ok(AbstractInterpretation {
            ir,
            opts,
            ext_api,
            trace: IndexMap::new(),
            func_wto: FxHashMap::default(),
            call_stack: Vec::new(),
            checkpoints: IndexSet::new(),
            bug_records: BugRecords::new(),
            stat: AeStat::new(),
        })
    }

    /// The final trace: one abstract state per reached ICFG node.
    pub fn trace(&self) -> &IndexMap<NodeId, AbstractState> {
        &self.trace
    }

    pub fn state_at(&self, node: NodeId) -> Option<&AbstractState> {
        self.trace.get(&node)
    }

    pub fn bug_records(&self) -> &BugRecords {
        &self.bug_records
    }

    pub fn stat(&self) -> &AeStat {
        &self.stat
    }

    pub(crate) fn state_mut(&mut self, node: NodeId) -> &mut AbstractState {
        self.trace.entry(node).or_default()
    }

    fn collect_checkpoints(&mut self) {
        for node in self.ir.icfg.nodes() {
            if let NodeKind::Call { callee: Some(f), .. } = &node.kind {
                if CHECKPOINT_NAMES.contains(&self.ir.fun(*f).name.as_str()) {
                    self.checkpoints.insert(node.id);
                }
            }
        }
    }

    fn check_points_all_set(&self) -> Result<(), AeError> {
        if self.checkpoints.is_empty() {
            return Ok(());
        }
        ae_error!("at least one assertion has not been checked");
        for node in &self.checkpoints {
            ae_error!("  unverified assertion at node {}", node);
        }
        Err(AeError::UnverifiedAssertions { nodes: self.checkpoints.iter().copied().collect() })
    }
}

impl Analysis for AbstractInterpretation<'_> {
    fn name(&self) -> &'static str {
        "Abstract Execution"
    }

    fn run(&mut self) -> Result<(), AeError> {
        self.stat.start_clk();
        self.collect_checkpoints();
        self.analyse()?;
        self.check_points_all_set()?;
        self.stat.end_clk();
        self.stat.finalize(self.ir, self.bug_records.len());
        if self.opts.p_stat {
            self.stat.perform();
        }
        self.bug_records.report(&self.opts.output_name);
        Ok(())
    }

    fn reset(&mut self) {
        self.trace.clear();
        self.func_wto.clear();
        self.call_stack.clear();
        self.checkpoints.clear();
        self.bug_records = BugRecords::new();
        self.stat = AeStat::new();
    }
}
