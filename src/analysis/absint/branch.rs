//! Branch feasibility and state refinement along conditional edges.
//!
//! Comparisons are normalized to `var <pred> const` by swapping operands
//! (rewriting the predicate), and negated when the edge is the false
//! successor. The implied meet is applied to the symbolic operand, and,
//! when that operand was loaded from memory, to every address it was
//! loaded from, so later loads observe the refinement too.

use rustc_hash::FxHashSet;

use crate::analysis::core::domain::{AbstractState, Address, IntervalValue};
use crate::ir::{CmpStmt, LoadStmt, Predicate, Stmt, VarId};

use super::AbstractInterpretation;

impl AbstractInterpretation<'_> {
    /// Refine `state` for the edge taking `cond == succ`. Returns false
    /// when the edge is infeasible; `state` is only meaningful when the
    /// result is true.
    pub(crate) fn is_branch_feasible(
        &self,
        cond: VarId,
        succ: i64,
        state: &mut AbstractState,
    ) -> bool {
        match self.ir.def_of(cond) {
            Some(Stmt::Cmp(cmp)) => self.is_cmp_branch_feasible(cmp, succ, state),
            _ => self.is_switch_branch_feasible(cond, succ, state),
        }
    }

    /// The load feeding `var`, looking through at most one copy.
    fn defining_load(&self, var: VarId) -> Option<&LoadStmt> {
        match self.ir.def_of(var)? {
            Stmt::Load(l) => Some(l),
            Stmt::Copy(c) => match self.ir.def_of(c.rhs)? {
                Stmt::Load(l) => Some(l),
                _ => None,
            },
            _ => None,
        }
    }

    fn is_cmp_branch_feasible(&self, cmp: &CmpStmt, succ: i64, state: &mut AbstractState) -> bool {
        // Address comparisons pass through unrefined; the interval domain
        // cannot restrict them, which stays sound.
        if state.in_var_to_addrs(cmp.op0) || state.in_var_to_addrs(cmp.op1) {
            return true;
        }

        let mut res = state.interval_of(cmp.res);
        res.meet_with(&IntervalValue::singleton(succ));
        if res.is_bottom() {
            return false;
        }

        let mut op0 = cmp.op0;
        let mut op1 = cmp.op1;
        let mut predicate = cmp.predicate;
        let mut load0 = self.defining_load(op0);
        let mut load1 = self.defining_load(op1);

        let b0 = state.interval_of(op0).is_numeral();
        let b1 = state.interval_of(op1).is_numeral();
        if b0 && !b1 {
            // const X var: normalize to var X' const.
            std::mem::swap(&mut op0, &mut op1);
            std::mem::swap(&mut load0, &mut load1);
            predicate = predicate.swap();
        } else if !b0 && !b1 {
            // var X var: no single side to refine.
            return true;
        } else if b0 && b1 {
            // const X const was already decided through the result meet.
            return true;
        }

        if succ == 0 {
            predicate = predicate.inverse();
        }

        // Addresses the symbolic operand was loaded from, if any; the
        // refinement is mirrored into them.
        let addrs: Vec<Address> = load0
            .and_then(|l| state.addrs_of(l.rhs))
            .map(|a| a.iter().collect())
            .unwrap_or_default();

        let rhs = state.interval_of(op1);
        let refine = match predicate {
            Predicate::Eq => Some(rhs),
            // The complement of a point is not representable here.
            Predicate::Ne => None,
            Predicate::Gt => Some(rhs.lb_plus_one_to_inf()),
            Predicate::Ge => Some(rhs.lb_to_inf()),
            Predicate::Lt => Some(rhs.inf_to_ub_minus_one()),
            Predicate::Le => Some(rhs.inf_to_ub()),
            Predicate::True | Predicate::False => None,
        };
        if let Some(iv) = refine {
            state.meet_interval(op0, &iv);
            for addr in addrs {
                if state.in_addr_to_val(addr) {
                    state.meet_mem_interval(addr, &iv);
                }
            }
            if state.interval_of(op0).is_bottom() {
                return false;
            }
        }
        true
    }

    /// Switch-style refinement: the scrutinee meets the case value, and
    /// the meet propagates backwards through copies and one load.
    fn is_switch_branch_feasible(&self, var: VarId, succ: i64, state: &mut AbstractState) -> bool {
        if state.in_var_to_addrs(var) {
            return true;
        }
        let case = IntervalValue::singleton(succ);
        state.meet_interval(var, &case);
        if state.interval_of(var).is_bottom() {
            return false;
        }
        let mut seen = FxHashSet::default();
        let mut cur = var;
        while seen.insert(cur) {
            match self.ir.def_of(cur) {
                Some(Stmt::Copy(c)) => {
                    state.meet_interval(c.rhs, &case);
                    cur = c.rhs;
                }
                Some(Stmt::Load(l)) => {
                    let addrs: Vec<Address> = state
                        .addrs_of(l.rhs)
                        .map(|a| a.iter().collect())
                        .unwrap_or_default();
                    for addr in addrs {
                        state.meet_mem_interval(addr, &case);
                    }
                    break;
                }
                _ => break,
            }
        }
        true
    }
}
