//! The fixpoint driver: predecessor merges, the WTO walk, and cycle
//! iteration with delayed widening and narrowing.

use std::rc::Rc;

use crate::analysis::core::domain::{AbstractState, AddressValue, IntervalValue};
use crate::analysis::core::wto::{IcfgWto, WtoComp, WtoCycle};
use crate::ir::{EdgeKind, FunId, NodeId, NodeKind, BLK_PTR, NULL_PTR};

use super::{AbstractInterpretation, AeError};

impl<'ir> AbstractInterpretation<'ir> {
    /// Interpret globals, then walk `main`.
    pub(crate) fn analyse(&mut self) -> Result<(), AeError> {
        self.handle_global_node()?;
        // Unknown external pointers reaching main are modelled by the
        // blackhole pointer holding the full range.
        self.state_mut(self.ir.icfg.global()).set(BLK_PTR, IntervalValue::top());
        if let Some(main) = self.ir.fun_by_name("main") {
            let wto = self.wto_for(main);
            self.handle_wto_components(&wto.comps)?;
        } else {
            ae_warn!("no main function; nothing to analyse");
        }
        Ok(())
    }

    fn handle_global_node(&mut self) -> Result<(), AeError> {
        let ir = self.ir;
        let global = ir.icfg.global();
        let mut state = AbstractState::new();
        state.set(NULL_PTR, AddressValue::new());
        self.trace.insert(global, state);
        // Only addr/load/store/copy/gep are expected here.
        for stmt in &ir.icfg.node(global).stmts {
            self.handle_stmt(global, stmt)?;
        }
        Ok(())
    }

    /// The cached WTO of `f`, built on first use.
    pub(crate) fn wto_for(&mut self, f: FunId) -> Rc<IcfgWto> {
        if let Some(wto) = self.func_wto.get(&f) {
            return Rc::clone(wto);
        }
        let wto = Rc::new(IcfgWto::build(&self.ir.icfg, self.ir.fun(f).entry));
        self.func_wto.insert(f, Rc::clone(&wto));
        wto
    }

    /// Join the states of all predecessors that have been reached,
    /// filtering conditional intra edges through branch refinement.
    /// Returns false when no predecessor contributes a state yet, so the
    /// caller skips the node this round.
    pub(crate) fn merge_states_from_predecessors(&mut self, node: NodeId) -> bool {
        let ir = self.ir;
        let mut work: Vec<AbstractState> = Vec::new();
        for edge in ir.icfg.in_edges(node) {
            let Some(src_state) = self.trace.get(&edge.src) else {
                continue;
            };
            match &edge.kind {
                EdgeKind::Intra { cond: Some((cond, succ)) } => {
                    let mut refined = src_state.clone();
                    if self.is_branch_feasible(*cond, *succ, &mut refined) {
                        work.push(refined);
                    }
                }
                _ => work.push(src_state.clone()),
            }
        }
        let Some(mut merged) = work.pop() else {
            return false;
        };
        for state in work {
            merged.join_with(&state);
        }
        self.trace.insert(node, merged);
        true
    }

    pub(crate) fn handle_wto_components(&mut self, comps: &[WtoComp]) -> Result<(), AeError> {
        for comp in comps {
            self.handle_wto_component(comp)?;
        }
        Ok(())
    }

    fn handle_wto_component(&mut self, comp: &WtoComp) -> Result<(), AeError> {
        match comp {
            WtoComp::Node(n) => {
                if self.merge_states_from_predecessors(*n) {
                    self.handle_singleton_wto(*n)?;
                }
            }
            WtoComp::Cycle(cycle) => {
                if self.merge_states_from_predecessors(cycle.head) {
                    self.handle_cycle_wto(cycle)?;
                }
            }
        }
        Ok(())
    }

    /// Interpret one node: its statements in order, then the callsite
    /// dispatch if it is a call.
    pub(crate) fn handle_singleton_wto(&mut self, node: NodeId) -> Result<(), AeError> {
        let ir = self.ir;
        self.stat.block_visited();
        for stmt in &ir.icfg.node(node).stmts {
            self.handle_stmt(node, stmt)?;
        }
        if matches!(ir.icfg.node(node).kind, NodeKind::Call { .. }) {
            self.handle_call_site(node)?;
        }
        Ok(())
    }

    /// Iterate a cycle to a fixpoint. The first `widen_delay` rounds run
    /// the head without re-merging (loop state reaches it through Phi
    /// reads of the predecessor traces); after that the head is re-merged
    /// and widened until stable, then narrowed until stable.
    fn handle_cycle_wto(&mut self, cycle: &WtoCycle) -> Result<(), AeError> {
        let head = cycle.head;
        let mut increasing = true;
        for cur_iter in 0u32.. {
            if cur_iter >= self.opts.widen_delay {
                let prev = self.trace[&head].clone();
                if self.merge_states_from_predecessors(head) {
                    self.handle_singleton_wto(head)?;
                }
                let cur = self.trace[&head].clone();
                if increasing {
                    let widened = prev.widening(&cur);
                    let stable = widened == prev;
                    self.trace.insert(head, widened);
                    if stable {
                        increasing = false;
                        continue;
                    }
                } else {
                    let narrowed = prev.narrowing(&cur);
                    let stable = narrowed == prev;
                    self.trace.insert(head, narrowed);
                    if stable {
                        break;
                    }
                }
            } else {
                self.handle_singleton_wto(head)?;
            }
            self.handle_wto_components(&cycle.body)?;
        }
        Ok(())
    }
}
