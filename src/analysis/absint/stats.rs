//! Run statistics: visit counters, program counts, and wall time.

use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::ir::{Ir, NodeKind};

#[derive(Debug)]
pub struct AeStat {
    start: Option<Instant>,
    elapsed: Duration,
    blocks_visited: usize,
    stmts_visited: usize,
    callsites_visited: usize,
    bugs_found: usize,
    general: IndexMap<&'static str, usize>,
}

impl AeStat {
    pub fn new() -> AeStat {
        AeStat {
            start: None,
            elapsed: Duration::ZERO,
            blocks_visited: 0,
            stmts_visited: 0,
            callsites_visited: 0,
            bugs_found: 0,
            general: IndexMap::new(),
        }
    }

    pub fn start_clk(&mut self) {
        self.start = Some(Instant::now());
    }

    pub fn end_clk(&mut self) {
        if let Some(start) = self.start {
            self.elapsed = start.elapsed();
        }
    }

    pub fn block_visited(&mut self) {
        self.blocks_visited += 1;
    }

    pub fn stmt_visited(&mut self) {
        self.stmts_visited += 1;
    }

    pub fn callsite_visited(&mut self) {
        self.callsites_visited += 1;
    }

    pub fn bug_found(&mut self) {
        self.bugs_found += 1;
    }

    pub fn blocks_visited(&self) -> usize {
        self.blocks_visited
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn counts(&self) -> &IndexMap<&'static str, usize> {
        &self.general
    }

    /// Fill the summary counters from the program and the run.
    pub fn finalize(&mut self, ir: &Ir, bug_num: usize) {
        let mut callsites = 0usize;
        let mut ext_callsites = 0usize;
        for node in ir.icfg.nodes() {
            if let NodeKind::Call { callee, .. } = &node.kind {
                match callee {
                    Some(f) if !ir.fun(*f).is_decl => callsites += 1,
                    _ => ext_callsites += 1,
                }
            }
        }
        self.general.insert("ICFG_Node_Num", ir.icfg.node_count());
        self.general.insert("Func_Num", ir.funs.iter().filter(|f| !f.is_decl).count());
        self.general.insert("EXT_CallSite_Num", ext_callsites);
        self.general.insert("NonEXT_CallSite_Num", callsites);
        self.general.insert("Blocks_Visited", self.blocks_visited);
        self.general.insert("Stmts_Visited", self.stmts_visited);
        self.general.insert("CallSites_Visited", self.callsites_visited);
        self.general.insert("Bug_Num", bug_num);
    }

    /// Print the summary.
    pub fn perform(&self) {
        ae_info!("************************");
        for (name, value) in &self.general {
            ae_info!("{:<30}{}", name, value);
        }
        ae_info!("-------------------------------------------------------");
        ae_info!("{:<30}{:.3}", "Total_Time(sec)", self.elapsed.as_secs_f64());
        ae_info!("#######################################################");
    }
}

impl Default for AeStat {
    fn default() -> Self {
        Self::new()
    }
}
