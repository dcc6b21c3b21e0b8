//! Callsite handling: classification, interprocedural descent, recursion
//! havoc, indirect resolution, and the extern-API memory transfers.

use rustc_hash::FxHashSet;

use crate::analysis::core::domain::{AbstractValue, Address, IntervalValue};
use crate::ir::{AddrStmt, FunId, NodeId, NodeKind, ObjKind, Stmt, ValType, VarId};

use super::ext_api::{classifier_value, math_value, ExtApiKind};
use super::{AbstractInterpretation, AeError};

const STRCAT_GROUP: &[&str] = &["strcat", "__strcat_chk", "wcscat", "__wcscat_chk"];
const STRNCAT_GROUP: &[&str] = &["strncat", "__strncat_chk", "wcsncat", "__wcsncat_chk"];

impl AbstractInterpretation<'_> {
    /// Classify the callsite and apply the matching handler: external,
    /// then recursive, then direct, then indirect.
    pub(crate) fn handle_call_site(&mut self, node: NodeId) -> Result<(), AeError> {
        let ir = self.ir;
        let NodeKind::Call { callee, .. } = &ir.icfg.node(node).kind else {
            return Ok(());
        };
        self.stat.callsite_visited();
        if let Some(f) = *callee {
            if self.ext_api.is_ext(ir.fun(f)) {
                return self.ext_call_pass(node, f);
            }
            if ir.recursive_funs.contains(&f) {
                self.recursive_call_pass(node, f);
                return Ok(());
            }
            if !ir.fun(f).is_decl {
                return self.direct_call_pass(node, f);
            }
        }
        if ir.indirect_calls.contains_key(&node) {
            return self.indirect_call_pass(node);
        }
        ae_warn!("unclassified callsite at node {}; modelling as unknown external", node);
        self.havoc_ret(node);
        Ok(())
    }

    fn ext_call_pass(&mut self, node: NodeId, f: FunId) -> Result<(), AeError> {
        self.call_stack.push(node);
        let result = self.handle_ext_api(node, f);
        self.call_stack.pop();
        result
    }

    /// Do not descend into a recursive callee: havoc its return value and
    /// every caller-visible location its body may store to.
    fn recursive_call_pass(&mut self, node: NodeId, f: FunId) {
        let ir = self.ir;
        let NodeKind::Call { ret, .. } = ir.icfg.node(node).kind else {
            return;
        };
        for stmt in &ir.icfg.node(ret).stmts {
            if let Stmt::Ret(pe) = stmt {
                if !ir.is_pointer_var(pe.lhs) {
                    self.state_mut(node).set(pe.lhs, IntervalValue::top());
                }
            }
        }
        self.skip_recursive_call(node, f);
        let state = self.trace[&node].clone();
        self.trace.insert(ret, state);
    }

    /// Havoc writes of a skipped recursive callee: every store whose
    /// target resolves to addresses in the caller's state, and whose
    /// stored value is non-pointer, clobbers those addresses with top.
    fn skip_recursive_call(&mut self, node: NodeId, f: FunId) {
        let ir = self.ir;
        let mut targets: Vec<Address> = Vec::new();
        let state = &self.trace[&node];
        for &n in &ir.fun(f).nodes {
            for stmt in &ir.icfg.node(n).stmts {
                if let Stmt::Store(s) = stmt {
                    if ir.is_pointer_var(s.rhs) {
                        continue;
                    }
                    if let Some(addrs) = state.addrs_of(s.lhs) {
                        targets.extend(addrs.iter());
                    }
                }
            }
        }
        let state = self.state_mut(node);
        for addr in targets {
            state.store(addr, IntervalValue::top().into());
        }
    }

    /// Descend into a defined callee: its entry merges from this callsite
    /// through the call edge, and the state after its exit is copied to
    /// the return site.
    fn direct_call_pass(&mut self, node: NodeId, f: FunId) -> Result<(), AeError> {
        let ir = self.ir;
        let NodeKind::Call { ret, .. } = ir.icfg.node(node).kind else {
            return Ok(());
        };
        self.call_stack.push(node);
        let wto = self.wto_for(f);
        self.handle_wto_components(&wto.comps)?;
        self.call_stack.pop();
        let state = self.trace[&node].clone();
        self.trace.insert(ret, state);
        Ok(())
    }

    /// Resolve the callsite through the function pointer's address set;
    /// a resolved defined function is entered like a direct call, anything
    /// else is modelled as an unknown external.
    fn indirect_call_pass(&mut self, node: NodeId) -> Result<(), AeError> {
        let ir = self.ir;
        let fp = ir.indirect_calls[&node];
        let target = self
            .trace
            .get(&node)
            .and_then(|s| s.addrs_of(fp))
            .and_then(|a| a.first());
        if let Some(addr) = target {
            if !addr.is_null() {
                if let ObjKind::Fun(f) = ir.obj(addr.object()).kind {
                    if !ir.fun(f).is_decl {
                        return self.direct_call_pass(node, f);
                    }
                }
            }
        }
        self.havoc_ret(node);
        Ok(())
    }

    /// Model the return value of an unknown external: top, unless the
    /// variable already holds addresses.
    fn havoc_ret(&mut self, node: NodeId) {
        let NodeKind::Call { ret_var: Some(v), .. } = &self.ir.icfg.node(node).kind else {
            return;
        };
        let v = *v;
        let state = self.state_mut(node);
        if !state.in_var_to_addrs(v) {
            state.set(v, IntervalValue::top());
        }
    }

    fn call_args(&self, node: NodeId) -> &[VarId] {
        match &self.ir.icfg.node(node).kind {
            NodeKind::Call { args, .. } => args,
            _ => &[],
        }
    }

    fn handle_ext_api(&mut self, node: NodeId, f: FunId) -> Result<(), AeError> {
        let ir = self.ir;
        let fun = ir.fun(f);
        match self.ext_api.classify(fun) {
            ExtApiKind::Memcpy => {
                let args = self.call_args(node);
                if let [dst, src, n, ..] = *args {
                    let len = self.trace[&node].interval_of(n);
                    self.handle_memcpy(node, dst, src, &len, 0);
                }
            }
            ExtApiKind::Memset => {
                let args = self.call_args(node);
                if let [dst, byte, n, ..] = *args {
                    let state = &self.trace[&node];
                    let elem = state.interval_of(byte);
                    let len = state.interval_of(n);
                    self.handle_memset(node, dst, &elem, &len);
                }
            }
            ExtApiKind::Strcpy => self.handle_strcpy(node),
            ExtApiKind::Strcat => self.handle_strcat(node, f),
            ExtApiKind::Unclassified => {
                if self.handle_modelled_fun(node, f)? {
                    return Ok(());
                }
                if self.ext_api.is_alloc(fun)
                    || self.ext_api.is_arg_alloc(fun)
                    || self.ext_api.is_realloc(fun)
                {
                    // Allocators are materialized as Addr statements on
                    // the callsite, which were already interpreted.
                    return Ok(());
                }
                self.havoc_ret(node);
            }
        }
        Ok(())
    }

    /// The name table of modelled pure functions. Returns true when the
    /// call was handled.
    fn handle_modelled_fun(&mut self, node: NodeId, f: FunId) -> Result<bool, AeError> {
        let ir = self.ir;
        let name = ir.fun(f).name.clone();
        let args = self.call_args(node).to_vec();
        match name.as_str() {
            "svf_assert" => {
                self.checkpoints.swap_remove(&node);
                let Some(&arg0) = args.first() else {
                    return Ok(true);
                };
                let state = self.state_mut(node);
                state.meet_interval(arg0, &IntervalValue::singleton(1));
                if state.interval_of(arg0) == IntervalValue::singleton(1) {
                    ae_info!("node {}: the assertion is successfully verified", node);
                } else {
                    let found = state.interval_of(arg0).to_string();
                    ae_error!("node {}: assertion failed, argument is {}", node, found);
                    return Err(AeError::AssertionFailed { node, found });
                }
                Ok(true)
            }
            "svf_print" => {
                if let [num, text, ..] = *args {
                    let text = self.str_read(node, text);
                    let itv = self.trace[&node].interval_of(num);
                    ae_info!("Text: {}, Value: var {}, PrintVal: {}", text, num, itv);
                }
                Ok(true)
            }
            _ => {
                if !super::ext_api::is_modelled_name(&name) {
                    return Ok(false);
                }
                let Some(&arg0) = args.first() else {
                    return Ok(true);
                };
                let state = &self.trace[&node];
                if !state.in_var_to_val(arg0) {
                    return Ok(true);
                }
                let x = state.interval_of(arg0).lb().num();
                if let Some(r) = classifier_value(&name, x).or_else(|| math_value(&name, x)) {
                    if let NodeKind::Call { ret_var: Some(v), .. } = self.ir.icfg.node(node).kind {
                        self.state_mut(node).set(v, IntervalValue::singleton(r));
                    }
                }
                Ok(true)
            }
        }
    }

    /// Element size of the region `dst` writes to, from its static type:
    /// the array element for arrays, the pointee (or its element) for
    /// pointers, one byte otherwise.
    fn copy_elem_size(&self, node: NodeId, dst: VarId) -> u32 {
        let ir = self.ir;
        match ir.var_ty(dst) {
            ValType::Array { elem, .. } => elem.byte_size(),
            ValType::Ptr(_) => match self.pointee_elem_ty(node, dst) {
                Some(ValType::Array { elem, .. }) => elem.byte_size(),
                Some(ty) => ty.byte_size(),
                None => 1,
            },
            _ => 1,
        }
    }

    /// Type of the first real object `v` points to in the current state.
    fn pointee_elem_ty(&self, node: NodeId, v: VarId) -> Option<&ValType> {
        let state = self.trace.get(&node)?;
        let addrs = state.addrs_of(v)?;
        let addr = addrs.iter().find(|a| !a.is_null())?;
        Some(&self.ir.obj(addr.object()).ty)
    }

    /// Copy `len` bytes (capped at the field limit) from `src` to `dst`,
    /// element by element, starting `start_idx` elements into `dst`.
    /// Stores are weak, as everywhere else.
    pub(crate) fn handle_memcpy(
        &mut self,
        node: NodeId,
        dst: VarId,
        src: VarId,
        len: &IntervalValue,
        start_idx: i64,
    ) {
        let max_field = self.opts.max_field_limit;
        let elem_size = self.copy_elem_size(node, dst).max(1) as i64;
        let size = len.lb().num().clamp(0, max_field as i64);
        let count = size / elem_size;
        let state = self.state_mut(node);
        if !state.in_var_to_addrs(src) || !state.in_var_to_addrs(dst) {
            return;
        }
        for index in 0..count {
            let src_addrs = state.gep_obj_addrs(src, &IntervalValue::singleton(index), max_field);
            let dst_addrs =
                state.gep_obj_addrs(dst, &IntervalValue::singleton(index + start_idx), max_field);
            for d in dst_addrs.iter() {
                for s in src_addrs.iter() {
                    if state.in_addr_to_val(s) {
                        let v = state.load(s);
                        state.store(d, v);
                    }
                }
            }
        }
    }

    /// Store `elem` to the first `len` bytes of `dst`, element by element.
    pub(crate) fn handle_memset(
        &mut self,
        node: NodeId,
        dst: VarId,
        elem: &IntervalValue,
        len: &IntervalValue,
    ) {
        let max_field = self.opts.max_field_limit;
        let elem_size = self.copy_elem_size(node, dst).max(1) as i64;
        let size = len.lb().num().clamp(0, max_field as i64);
        let count = size / elem_size;
        let state = self.state_mut(node);
        if !state.in_var_to_addrs(dst) {
            return;
        }
        for index in 0..count {
            let addrs = state.gep_obj_addrs(dst, &IntervalValue::singleton(index), max_field);
            for addr in addrs.iter() {
                state.store(addr, AbstractValue::from(*elem));
            }
        }
    }

    /// `strcpy(dst, src)`: copy `strlen(src)` plus the terminator.
    fn handle_strcpy(&mut self, node: NodeId) {
        let args = self.call_args(node);
        let [dst, src, ..] = *args else {
            return;
        };
        let len = self.get_strlen(node, src);
        let with_term = if len.is_numeral() { len + IntervalValue::singleton(1) } else { len };
        self.handle_memcpy(node, dst, src, &with_term, 0);
    }

    /// `strcat`/`strncat`: append after `dst`'s current contents.
    fn handle_strcat(&mut self, node: NodeId, f: FunId) {
        let name = self.ir.fun(f).name.clone();
        let args = self.call_args(node).to_vec();
        if STRCAT_GROUP.contains(&name.as_str()) {
            let [dst, src, ..] = *args else {
                return;
            };
            let dst_len = self.get_strlen(node, dst);
            let src_len = self.get_strlen(node, src);
            let with_term =
                if src_len.is_numeral() { src_len + IntervalValue::singleton(1) } else { src_len };
            let start = dst_len.lb().num().max(0);
            self.handle_memcpy(node, dst, src, &with_term, start);
        } else if STRNCAT_GROUP.contains(&name.as_str()) {
            let [dst, src, n, ..] = *args else {
                return;
            };
            let count = self.trace[&node].interval_of(n);
            let dst_len = self.get_strlen(node, dst);
            let start = dst_len.lb().num().max(0);
            self.handle_memcpy(node, dst, src, &count, start);
        } else {
            ae_warn!("unknown strcat-family function `{}`", name);
        }
    }

    /// Abstract `strlen`: scan the string's addresses until a concrete
    /// zero byte. Returns the byte length as a singleton, or
    /// `[0, MaxFieldLimit]` when no terminator is found.
    pub(crate) fn get_strlen(&mut self, node: NodeId, s: VarId) -> IntervalValue {
        let max_field = self.opts.max_field_limit;
        let alloc = self.trace_allocation_size(node, s);
        let elem_size = self.copy_elem_size(node, s).max(1) as i64;
        let state = &self.trace[&node];
        let mut len = 0i64;
        let mut terminated = false;
        if state.in_var_to_addrs(s) {
            let bound = alloc.lb().num().clamp(0, max_field as i64);
            for index in 0..bound {
                let addrs = state.gep_obj_addrs(s, &IntervalValue::singleton(index), max_field);
                let mut val = AbstractValue::bottom();
                for addr in addrs.iter() {
                    val.join_with(&state.load(addr));
                }
                let itv = val.interval();
                if itv.is_numeral() && itv.num() == 0 {
                    terminated = true;
                    break;
                }
                len += 1;
            }
        }
        if !terminated {
            return IntervalValue::of(0, max_field as i64);
        }
        IntervalValue::singleton(len * elem_size)
    }

    /// Bytes left in the allocation `v` points into: walk the value flow
    /// backwards through copies, loads, geps (accumulating byte offsets)
    /// and parameter bindings until an allocation site is reached, then
    /// return its byte size minus the accumulated offset. Unknown sources
    /// yield zero.
    pub(crate) fn trace_allocation_size(&mut self, node: NodeId, v: VarId) -> IntervalValue {
        let ir = self.ir;
        let max_field = self.opts.max_field_limit;
        let mut worklist: Vec<VarId> = vec![v];
        let mut visited: FxHashSet<VarId> = FxHashSet::default();
        visited.insert(v);
        let mut total_bytes = IntervalValue::singleton(0);
        fn push(worklist: &mut Vec<VarId>, visited: &mut FxHashSet<VarId>, v: VarId) {
            if visited.insert(v) {
                worklist.push(v);
            }
        }
        while let Some(cur) = worklist.pop() {
            match ir.def_of(cur) {
                Some(Stmt::Addr(a)) => {
                    let byte_size = self.alloc_byte_size(node, a);
                    return IntervalValue::singleton(byte_size as i64) - total_bytes;
                }
                Some(Stmt::Copy(c)) => push(&mut worklist, &mut visited, c.rhs),
                Some(Stmt::Ret(pe)) => push(&mut worklist, &mut visited, pe.rhs),
                Some(Stmt::Gep(g)) => {
                    let off = self.trace[&node].byte_offset(g, max_field);
                    total_bytes = total_bytes + off;
                    push(&mut worklist, &mut visited, g.rhs);
                }
                Some(Stmt::Load(_)) => {
                    // Continue at the defining variables of whatever the
                    // loaded pointer refers to.
                    let objs: Vec<VarId> = self.trace[&node]
                        .addrs_of(cur)
                        .map(|addrs| {
                            addrs
                                .iter()
                                .filter(|a| !a.is_null())
                                .map(|a| ir.obj(a.object()).obj_var)
                                .collect()
                        })
                        .unwrap_or_default();
                    for obj_var in objs {
                        push(&mut worklist, &mut visited, obj_var);
                    }
                }
                Some(Stmt::Call(_)) => {
                    // A formal parameter: find the matching actual at the
                    // innermost callsite that binds it.
                    for &call_node in self.call_stack.iter().rev() {
                        let mut bound = false;
                        for stmt in &ir.icfg.node(call_node).stmts {
                            if let Stmt::Call(pe) = stmt {
                                if pe.lhs == cur {
                                    push(&mut worklist, &mut visited, pe.rhs);
                                    bound = true;
                                    break;
                                }
                            }
                        }
                        if bound {
                            break;
                        }
                    }
                }
                Some(Stmt::Phi(phi)) => {
                    let ops: Vec<VarId> = phi.ops.iter().map(|(op, _)| *op).collect();
                    for op in ops {
                        push(&mut worklist, &mut visited, op);
                    }
                }
                _ => return IntervalValue::singleton(0),
            }
        }
        IntervalValue::singleton(0)
    }

    /// Byte size of an allocation site: the object's static size, or the
    /// product of its dynamic size operands capped at the field limit.
    fn alloc_byte_size(&mut self, node: NodeId, addr: &AddrStmt) -> u32 {
        let ir = self.ir;
        let info = ir.obj(addr.obj);
        if addr.size_vars.is_empty() {
            return info.byte_size;
        }
        let max_field = self.opts.max_field_limit as u64;
        let mut res: u64 = 1;
        for &sv in &addr.size_vars {
            let state = self.state_mut(node);
            if !state.in_var_to_val(sv) {
                state.set(sv, IntervalValue::singleton(max_field as i64));
            }
            let ub = state.interval_of(sv).ub().num().max(0) as u64;
            res = if res.saturating_mul(ub) > max_field { max_field } else { res * ub };
        }
        res as u32
    }

    /// Concrete string contents at `s`, as far as the state knows them.
    pub(crate) fn str_read(&mut self, node: NodeId, s: VarId) -> String {
        let max_field = self.opts.max_field_limit;
        let state = &self.trace[&node];
        let mut out = String::new();
        if !state.in_var_to_addrs(s) {
            return out;
        }
        for index in 0..max_field as i64 {
            let addrs = state.gep_obj_addrs(s, &IntervalValue::singleton(index), max_field);
            let mut val = AbstractValue::bottom();
            for addr in addrs.iter() {
                val.join_with(&state.load(addr));
            }
            let itv = val.interval();
            if !itv.is_numeral() || itv.num() == 0 {
                break;
            }
            out.push((itv.num() as u8) as char);
        }
        out
    }
}
