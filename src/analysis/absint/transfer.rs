//! Transfer functions, one per statement kind.

use crate::analysis::core::domain::{AbstractValue, IntervalValue};
use crate::ir::{
    AddrStmt, BinOp, BinaryOpStmt, CallPe, CmpStmt, CopyKind, CopyStmt, GepStmt, LoadStmt,
    NodeId, PhiStmt, Predicate, RetPe, SelectStmt, Stmt, StoreStmt, ValType,
};

use super::{AbstractInterpretation, AeError};

/// Numeric range implied by a static type: exact for narrow integers,
/// the 32-bit range for everything numeric but untyped, top otherwise.
pub(crate) fn range_limit_from_type(ty: &ValType) -> IntervalValue {
    match ty {
        ValType::Int { bytes, signed } => IntervalValue::range_of(*bytes, *signed),
        ValType::Float | ValType::Other => IntervalValue::of(i32::MIN as i64, i32::MAX as i64),
        _ => IntervalValue::top(),
    }
}

impl AbstractInterpretation<'_> {
    pub(crate) fn handle_stmt(&mut self, node: NodeId, stmt: &Stmt) -> Result<(), AeError> {
        self.stat.stmt_visited();
        match stmt {
            Stmt::Addr(s) => self.update_state_on_addr(node, s),
            Stmt::BinaryOp(s) => self.update_state_on_binary(node, s),
            Stmt::Cmp(s) => self.update_state_on_cmp(node, s),
            Stmt::Load(s) => self.update_state_on_load(node, s),
            Stmt::Store(s) => self.update_state_on_store(node, s),
            Stmt::Copy(s) => self.update_state_on_copy(node, s),
            Stmt::Gep(s) => self.update_state_on_gep(node, s),
            Stmt::Select(s) => self.update_state_on_select(node, s),
            Stmt::Phi(s) => self.update_state_on_phi(node, s),
            Stmt::Call(s) => self.update_state_on_call_pe(node, s),
            Stmt::Ret(s) => self.update_state_on_ret_pe(node, s),
            // Unary operators transfer nothing in this domain; branches
            // act through edge conditions during the predecessor merge.
            Stmt::UnaryOp(_) | Stmt::Branch(_) => {}
        }
        Ok(())
    }

    fn update_state_on_addr(&mut self, node: NodeId, addr: &AddrStmt) {
        let ir = self.ir;
        let info = ir.obj(addr.obj);
        let state = self.state_mut(node);
        state.init_obj(addr.obj_var, addr.obj, info);
        if info.ty.is_int() {
            state.meet_interval(addr.obj_var, &range_limit_from_type(&info.ty));
        }
        let v = state.get(addr.obj_var).cloned().unwrap_or_default();
        state.set(addr.lhs, v);
    }

    fn update_state_on_binary(&mut self, node: NodeId, binary: &BinaryOpStmt) {
        let state = self.state_mut(node);
        if state.get(binary.op0).is_none() {
            state.set(binary.op0, IntervalValue::top());
        }
        if state.get(binary.op1).is_none() {
            state.set(binary.op1, IntervalValue::top());
        }
        let lhs = state.interval_of(binary.op0);
        let rhs = state.interval_of(binary.op1);
        let res = match binary.op {
            BinOp::Add => lhs + rhs,
            BinOp::Sub => lhs - rhs,
            BinOp::Mul => lhs * rhs,
            BinOp::Div => lhs / rhs,
            BinOp::Rem => lhs % rhs,
            BinOp::Xor => lhs ^ rhs,
            BinOp::And => lhs & rhs,
            BinOp::Or => lhs | rhs,
            BinOp::Shl => lhs << rhs,
            BinOp::Shr => lhs >> rhs,
        };
        state.set(binary.res, res);
    }

    fn update_state_on_cmp(&mut self, node: NodeId, cmp: &CmpStmt) {
        let state = self.state_mut(node);
        if state.get(cmp.op0).is_none() {
            state.set(cmp.op0, IntervalValue::top());
        }
        if state.get(cmp.op1).is_none() {
            state.set(cmp.op1, IntervalValue::top());
        }
        let v0 = state.get(cmp.op0).cloned().unwrap_or_default();
        let v1 = state.get(cmp.op1).cloned().unwrap_or_default();
        let res = match (&v0, &v1) {
            (AbstractValue::Interval(lhs), AbstractValue::Interval(rhs)) => {
                match cmp.predicate {
                    Predicate::Eq => lhs.cmp_eq(rhs),
                    Predicate::Ne => lhs.cmp_ne(rhs),
                    Predicate::Gt => lhs.cmp_gt(rhs),
                    Predicate::Ge => lhs.cmp_ge(rhs),
                    Predicate::Lt => lhs.cmp_lt(rhs),
                    Predicate::Le => lhs.cmp_le(rhs),
                    Predicate::True => IntervalValue::singleton(1),
                    Predicate::False => IntervalValue::singleton(0),
                }
            }
            (AbstractValue::Addr(lhs), AbstractValue::Addr(rhs)) => match cmp.predicate {
                Predicate::Eq => {
                    if lhs.has_intersect(rhs) {
                        IntervalValue::of(0, 1)
                    } else if lhs.is_empty() && rhs.is_empty() {
                        IntervalValue::singleton(1)
                    } else {
                        IntervalValue::singleton(0)
                    }
                }
                Predicate::Ne => {
                    if lhs.has_intersect(rhs) {
                        IntervalValue::of(0, 1)
                    } else if lhs.is_empty() && rhs.is_empty() {
                        IntervalValue::singleton(0)
                    } else {
                        IntervalValue::singleton(1)
                    }
                }
                // Address ordering is defined only between singletons.
                Predicate::Gt | Predicate::Ge | Predicate::Lt | Predicate::Le => {
                    match (lhs.single(), rhs.single()) {
                        (Some(a), Some(b)) => {
                            let holds = match cmp.predicate {
                                Predicate::Gt => a > b,
                                Predicate::Ge => a >= b,
                                Predicate::Lt => a < b,
                                _ => a <= b,
                            };
                            IntervalValue::singleton(holds as i64)
                        }
                        _ => IntervalValue::of(0, 1),
                    }
                }
                Predicate::True => IntervalValue::singleton(1),
                Predicate::False => IntervalValue::singleton(0),
            },
            // Mixed interval/address comparison: no information.
            _ => return,
        };
        state.set(cmp.res, res);
    }

    fn update_state_on_load(&mut self, node: NodeId, load: &LoadStmt) {
        let state = self.state_mut(node);
        let v = state.load_value(load.rhs);
        state.set(load.lhs, v);
    }

    fn update_state_on_store(&mut self, node: NodeId, store: &StoreStmt) {
        let state = self.state_mut(node);
        let v = state.get(store.rhs).cloned().unwrap_or_default();
        state.store_value(store.lhs, &v);
    }

    fn update_state_on_copy(&mut self, node: NodeId, copy: &CopyStmt) {
        let ir = self.ir;
        let state = self.state_mut(node);
        match copy.kind {
            CopyKind::Value => {
                let v = state.get(copy.rhs).cloned().unwrap_or_default();
                state.set(copy.lhs, v);
            }
            CopyKind::Sext
            | CopyKind::Fptosi
            | CopyKind::Fptoui
            | CopyKind::Sitofp
            | CopyKind::Uitofp
            | CopyKind::Fptrunc => {
                let v = state.interval_of(copy.rhs);
                state.set(copy.lhs, v);
            }
            CopyKind::Zext => {
                let itv = state.interval_of(copy.rhs);
                let bits = ir.var_ty(copy.rhs).byte_size() * 8;
                state.set(copy.lhs, zext_value(&itv, bits));
            }
            CopyKind::Trunc => {
                let itv = state.interval_of(copy.rhs);
                let bytes = ir.var_ty(copy.lhs).byte_size();
                state.set(copy.lhs, trunc_value(&itv, bytes));
            }
            CopyKind::Ptrtoint => {
                state.set(copy.lhs, IntervalValue::top());
            }
            // The target keeps its empty address set.
            CopyKind::Inttoptr => {}
            CopyKind::Bitcast => {
                if state.in_var_to_addrs(copy.rhs) {
                    let v = state.get(copy.rhs).cloned().unwrap_or_default();
                    state.set(copy.lhs, v);
                }
            }
        }
    }

    fn update_state_on_gep(&mut self, node: NodeId, gep: &GepStmt) {
        let max_field = self.opts.max_field_limit;
        let ir = self.ir;
        let state = self.state_mut(node);
        let idx = state.element_index(gep, max_field);
        let byte_off = state.byte_offset(gep, max_field);
        let addrs = state.gep_obj_addrs(gep.rhs, &idx, max_field);

        // Offset past the end of a sized base object: record it.
        let mut overflow: Option<String> = None;
        if let Some(base) = state.addrs_of(gep.rhs) {
            for addr in base.iter() {
                if addr.is_null() {
                    continue;
                }
                let info = ir.obj(addr.object());
                if info.byte_size > 0
                    && byte_off.ub().is_finite()
                    && byte_off.ub().num() >= info.byte_size as i64
                {
                    overflow = Some(format!(
                        "byte offset {} may exceed object of {} bytes",
                        byte_off, info.byte_size
                    ));
                    break;
                }
            }
        }
        state.set(gep.lhs, addrs);
        if let Some(msg) = overflow {
            self.bug_records.record_overflow(node, msg);
            self.stat.bug_found();
        }
    }

    fn update_state_on_select(&mut self, node: NodeId, select: &SelectStmt) {
        let state = self.state_mut(node);
        let cond = state.interval_of(select.cond);
        if cond.is_numeral() {
            let pick = if cond.is_zero() { select.fval } else { select.tval };
            let v = state.get(pick).cloned().unwrap_or_default();
            state.set(select.res, v);
        } else {
            let mut v = state.get(select.tval).cloned().unwrap_or_default();
            v.join_with(&state.get(select.fval).cloned().unwrap_or_default());
            state.set(select.res, v);
        }
    }

    /// Join operands only over predecessors that have been reached; an
    /// unreached predecessor contributes nothing.
    fn update_state_on_phi(&mut self, node: NodeId, phi: &PhiStmt) {
        let mut rhs = AbstractValue::bottom();
        for (op, op_node) in &phi.ops {
            if let Some(op_state) = self.trace.get(op_node) {
                rhs.join_with(&op_state.get(*op).cloned().unwrap_or_default());
            }
        }
        self.state_mut(node).set(phi.res, rhs);
    }

    fn update_state_on_call_pe(&mut self, node: NodeId, pe: &CallPe) {
        let state = self.state_mut(node);
        let v = state.get(pe.rhs).cloned().unwrap_or_default();
        state.set(pe.lhs, v);
    }

    fn update_state_on_ret_pe(&mut self, node: NodeId, pe: &RetPe) {
        let state = self.state_mut(node);
        let v = state.get(pe.rhs).cloned().unwrap_or_default();
        state.set(pe.lhs, v);
    }
}

/// Reinterpret a value as unsigned at the source width.
fn zext_value(itv: &IntervalValue, bits: u32) -> IntervalValue {
    if !itv.is_numeral() {
        return IntervalValue::top();
    }
    let n = itv.num();
    let v = match bits {
        8 => (n as u8) as i64,
        16 => (n as u16) as i64,
        32 => (n as u32) as i64,
        // 64-bit extension cannot change the representation.
        _ => n,
    };
    IntervalValue::singleton(v)
}

/// Reinterpret both bounds at the destination width; if truncation
/// inverts them, fall back to the full signed range of that width.
fn trunc_value(itv: &IntervalValue, bytes: u32) -> IntervalValue {
    if itv.is_bottom() {
        return *itv;
    }
    if bytes >= 8 {
        return *itv;
    }
    if !itv.lb().is_finite() || !itv.ub().is_finite() {
        return IntervalValue::range_of(bytes, true);
    }
    let (lb, ub) = (itv.lb().num(), itv.ub().num());
    let (tl, tu) = match bytes {
        1 => (lb as i8 as i64, ub as i8 as i64),
        2 => (lb as i16 as i64, ub as i16 as i64),
        _ => (lb as i32 as i64, ub as i32 as i64),
    };
    if tl > tu {
        return IntervalValue::range_of(bytes, true);
    }
    IntervalValue::of(tl, tu)
}
