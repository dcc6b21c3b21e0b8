//! The abstract state: a variable store plus an abstract heap.

use rustc_hash::FxHashMap;

use crate::ir::{GepIdx, GepStmt, ObjInfo, ObjKind, VarId};

use super::address::{Address, AddressValue};
use super::interval::IntervalValue;
use super::value::AbstractValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbstractState {
    vars: FxHashMap<VarId, AbstractValue>,
    mem: FxHashMap<Address, AbstractValue>,
}

impl AbstractState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, v: VarId) -> Option<&AbstractValue> {
        self.vars.get(&v)
    }

    pub fn set(&mut self, v: VarId, val: impl Into<AbstractValue>) {
        self.vars.insert(v, val.into());
    }

    /// Interval view of a variable. An unset variable reads as top (the
    /// engine knows nothing about it); an address-valued variable reads as
    /// the bottom interval.
    pub fn interval_of(&self, v: VarId) -> IntervalValue {
        match self.vars.get(&v) {
            Some(val) => val.interval(),
            None => IntervalValue::top(),
        }
    }

    pub fn addrs_of(&self, v: VarId) -> Option<&AddressValue> {
        self.vars.get(&v)?.addrs()
    }

    /// Is `v` bound to a numeric value?
    pub fn in_var_to_val(&self, v: VarId) -> bool {
        matches!(self.vars.get(&v), Some(AbstractValue::Interval(_)))
    }

    /// Is `v` bound to a non-empty address set?
    pub fn in_var_to_addrs(&self, v: VarId) -> bool {
        matches!(self.vars.get(&v), Some(AbstractValue::Addr(a)) if !a.is_empty())
    }

    pub fn in_addr_to_val(&self, addr: Address) -> bool {
        self.mem.contains_key(&addr)
    }

    /// Meet the numeric value of `v` with `iv`. Address-valued variables
    /// are left untouched.
    pub fn meet_interval(&mut self, v: VarId, iv: &IntervalValue) {
        if matches!(self.vars.get(&v), Some(AbstractValue::Addr(_))) {
            return;
        }
        let mut cur = self.interval_of(v);
        cur.meet_with(iv);
        self.vars.insert(v, cur.into());
    }

    /// Meet the numeric value stored at `addr` with `iv`, if one exists.
    pub fn meet_mem_interval(&mut self, addr: Address, iv: &IntervalValue) {
        if let Some(AbstractValue::Interval(cur)) = self.mem.get_mut(&addr) {
            cur.meet_with(iv);
        }
    }

    /// Bind the object variable for `obj`: constant-integer objects get
    /// their singleton interval, everything else its base address.
    pub fn init_obj(&mut self, obj_var: VarId, obj: crate::ir::ObjId, info: &ObjInfo) {
        match info.kind {
            ObjKind::ConstInt(k) => {
                self.set(obj_var, IntervalValue::singleton(k));
            }
            _ => {
                self.set(obj_var, AddressValue::singleton(Address::new(obj, 0)));
            }
        }
    }

    /// Read the abstract heap. The null object never holds a value.
    pub fn load(&self, addr: Address) -> AbstractValue {
        if addr.is_null() {
            return AbstractValue::bottom();
        }
        self.mem.get(&addr).cloned().unwrap_or_default()
    }

    /// Weak update: the stored value joins whatever is already there.
    /// Callers that want a strong update must clear the slot first.
    pub fn store(&mut self, addr: Address, val: AbstractValue) {
        if addr.is_null() {
            return;
        }
        self.mem
            .entry(addr)
            .and_modify(|cur| cur.join_with(&val))
            .or_insert(val);
    }

    /// Dereference `v` and join the loads over all its addresses.
    pub fn load_value(&self, v: VarId) -> AbstractValue {
        let mut out = AbstractValue::bottom();
        if let Some(addrs) = self.addrs_of(v) {
            for addr in addrs.iter() {
                out.join_with(&self.load(addr));
            }
        }
        out
    }

    /// Dereference `v` and weakly update every address it may point to.
    pub fn store_value(&mut self, v: VarId, val: &AbstractValue) {
        let addrs: Vec<Address> = match self.addrs_of(v) {
            Some(a) => a.iter().collect(),
            None => return,
        };
        for addr in addrs {
            self.store(addr, val.clone());
        }
    }

    /// Addresses reached by stepping `offset` fields from every address
    /// held by `base`. Offsets are clamped to `[0, max_field]`.
    pub fn gep_obj_addrs(
        &self,
        base: VarId,
        offset: &IntervalValue,
        max_field: u32,
    ) -> AddressValue {
        let mut out = AddressValue::new();
        let Some(addrs) = self.addrs_of(base) else {
            return out;
        };
        if offset.is_bottom() {
            return out;
        }
        let lo = offset.lb().num().clamp(0, max_field as i64);
        let hi = offset.ub().num().clamp(0, max_field as i64);
        for addr in addrs.iter() {
            for k in lo..=hi {
                out.insert(addr.with_field_offset(k, max_field));
            }
        }
        out
    }

    /// Array-element index of a `Gep` as an interval, clamped to the field
    /// limit.
    pub fn element_index(&self, gep: &GepStmt, max_field: u32) -> IntervalValue {
        let mut acc = IntervalValue::singleton(0);
        for (idx, _) in &gep.offsets {
            acc = acc + self.gep_idx_interval(*idx);
        }
        Self::clamp_to_limit(acc, max_field)
    }

    /// Byte offset of a `Gep` as an interval, clamped to the field limit.
    pub fn byte_offset(&self, gep: &GepStmt, max_field: u32) -> IntervalValue {
        let mut acc = IntervalValue::singleton(0);
        for (idx, elem_bytes) in &gep.offsets {
            let scaled = self.gep_idx_interval(*idx) * IntervalValue::singleton(*elem_bytes as i64);
            acc = acc + scaled;
        }
        Self::clamp_to_limit(acc, max_field)
    }

    fn gep_idx_interval(&self, idx: GepIdx) -> IntervalValue {
        match idx {
            GepIdx::Const(k) => IntervalValue::singleton(k),
            GepIdx::Var(v) => self.interval_of(v),
        }
    }

    fn clamp_to_limit(iv: IntervalValue, max_field: u32) -> IntervalValue {
        if iv.is_bottom() {
            return iv;
        }
        let lo = iv.lb().num().min(max_field as i64);
        let hi = iv.ub().num().min(max_field as i64);
        IntervalValue::of(lo, hi)
    }

    /// Pointwise join; a key missing on one side is bottom there, so the
    /// other side's value carries over unchanged.
    pub fn join_with(&mut self, other: &AbstractState) {
        for (k, v) in &other.vars {
            self.vars
                .entry(*k)
                .and_modify(|cur| cur.join_with(v))
                .or_insert_with(|| v.clone());
        }
        for (k, v) in &other.mem {
            self.mem
                .entry(*k)
                .and_modify(|cur| cur.join_with(v))
                .or_insert_with(|| v.clone());
        }
    }

    /// Pointwise widening of `cur` against `self` (the previous state).
    pub fn widening(&self, cur: &AbstractState) -> AbstractState {
        let mut out = self.clone();
        for (k, c) in &cur.vars {
            match out.vars.get_mut(k) {
                Some(p) => *p = p.widening(c),
                None => {
                    out.vars.insert(*k, c.clone());
                }
            }
        }
        for (k, c) in &cur.mem {
            match out.mem.get_mut(k) {
                Some(p) => *p = p.widening(c),
                None => {
                    out.mem.insert(*k, c.clone());
                }
            }
        }
        out
    }

    /// Pointwise narrowing of `cur` against `self` (the widened state).
    pub fn narrowing(&self, cur: &AbstractState) -> AbstractState {
        let mut out = self.clone();
        for (k, c) in &cur.vars {
            match out.vars.get_mut(k) {
                Some(p) => *p = p.narrowing(c),
                None => {
                    out.vars.insert(*k, c.clone());
                }
            }
        }
        for (k, c) in &cur.mem {
            match out.mem.get_mut(k) {
                Some(p) => *p = p.narrowing(c),
                None => {
                    out.mem.insert(*k, c.clone());
                }
            }
        }
        out
    }
}
