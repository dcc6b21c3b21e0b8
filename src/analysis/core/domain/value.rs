//! The abstract value: an interval or a set of addresses.

use super::address::AddressValue;
use super::interval::IntervalValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbstractValue {
    Interval(IntervalValue),
    Addr(AddressValue),
}

impl AbstractValue {
    /// The join identity: the bottom interval.
    pub fn bottom() -> Self {
        AbstractValue::Interval(IntervalValue::bottom())
    }

    pub fn is_interval(&self) -> bool {
        matches!(self, AbstractValue::Interval(_))
    }

    pub fn is_addr(&self) -> bool {
        matches!(self, AbstractValue::Addr(_))
    }

    pub fn is_bottom(&self) -> bool {
        match self {
            AbstractValue::Interval(i) => i.is_bottom(),
            AbstractValue::Addr(a) => a.is_empty(),
        }
    }

    /// The interval view; an address set reads as the bottom interval.
    pub fn interval(&self) -> IntervalValue {
        match self {
            AbstractValue::Interval(i) => *i,
            AbstractValue::Addr(_) => IntervalValue::bottom(),
        }
    }

    pub fn addrs(&self) -> Option<&AddressValue> {
        match self {
            AbstractValue::Addr(a) => Some(a),
            AbstractValue::Interval(_) => None,
        }
    }

    /// Lattice join. Joining an interval with an address set is a caller
    /// error unless one side is bottom; the non-bottom side wins so the
    /// result stays sound for the surviving kind.
    pub fn join_with(&mut self, other: &AbstractValue) {
        match (&mut *self, other) {
            (AbstractValue::Interval(a), AbstractValue::Interval(b)) => a.join_with(b),
            (AbstractValue::Addr(a), AbstractValue::Addr(b)) => a.join_with(b),
            (a, b) => {
                if a.is_bottom() {
                    *a = b.clone();
                } else if !b.is_bottom() {
                    ae_warn!("joining an interval with an address set; keeping {:?}", a);
                }
            }
        }
    }

    /// Pointwise widening: intervals widen, address sets join (the set
    /// lattice is finite per program, so joining terminates).
    pub fn widening(&self, cur: &AbstractValue) -> AbstractValue {
        match (self, cur) {
            (AbstractValue::Interval(p), AbstractValue::Interval(c)) => {
                AbstractValue::Interval(p.widening(c))
            }
            (AbstractValue::Addr(p), AbstractValue::Addr(c)) => {
                let mut out = p.clone();
                out.join_with(c);
                AbstractValue::Addr(out)
            }
            _ => cur.clone(),
        }
    }

    pub fn narrowing(&self, cur: &AbstractValue) -> AbstractValue {
        match (self, cur) {
            (AbstractValue::Interval(p), AbstractValue::Interval(c)) => {
                AbstractValue::Interval(p.narrowing(c))
            }
            (AbstractValue::Addr(p), AbstractValue::Addr(c)) => {
                let mut out = p.clone();
                out.join_with(c);
                AbstractValue::Addr(out)
            }
            _ => cur.clone(),
        }
    }
}

impl Default for AbstractValue {
    fn default() -> Self {
        Self::bottom()
    }
}

impl From<IntervalValue> for AbstractValue {
    fn from(i: IntervalValue) -> Self {
        AbstractValue::Interval(i)
    }
}

impl From<AddressValue> for AbstractValue {
    fn from(a: AddressValue) -> Self {
        AbstractValue::Addr(a)
    }
}
