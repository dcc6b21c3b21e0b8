//! Finite sets of abstract addresses.

use std::fmt;

use indexmap::IndexSet;

use crate::ir::{ObjId, NULL_OBJ};

/// An abstract address: an object id paired with a field index, packed
/// into one word. Field indices saturate at the configured field limit
/// when offsets are applied, so the packing never overflows.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(u64);

impl Address {
    pub fn new(obj: ObjId, field: u32) -> Self {
        Address(((obj as u64) << 32) | field as u64)
    }

    pub fn object(self) -> ObjId {
        (self.0 >> 32) as ObjId
    }

    pub fn field(self) -> u32 {
        self.0 as u32
    }

    pub fn is_null(self) -> bool {
        self.object() == NULL_OBJ
    }

    /// The address `offset` fields further into the same object, clamped
    /// to `[0, max_field]`.
    pub fn with_field_offset(self, offset: i64, max_field: u32) -> Address {
        let field = (self.field() as i64 + offset).clamp(0, max_field as i64) as u32;
        Address::new(self.object(), field)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{}.{}", self.object(), self.field())
    }
}

/// Set lattice over addresses: join is union, meet is intersection.
/// Insertion order is preserved, which keeps "first element" choices
/// (indirect-call resolution) deterministic across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressValue(IndexSet<Address>);

impl AddressValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(addr: Address) -> Self {
        let mut set = IndexSet::new();
        set.insert(addr);
        AddressValue(set)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, addr: Address) -> bool {
        self.0.insert(addr)
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.0.contains(&addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = Address> + '_ {
        self.0.iter().copied()
    }

    /// First address in insertion order.
    pub fn first(&self) -> Option<Address> {
        self.0.first().copied()
    }

    /// The only address, if the set is a singleton.
    pub fn single(&self) -> Option<Address> {
        if self.0.len() == 1 {
            return self.first();
        }
        None
    }

    pub fn join_with(&mut self, other: &AddressValue) {
        for addr in other.iter() {
            self.0.insert(addr);
        }
    }

    pub fn meet_with(&mut self, other: &AddressValue) {
        self.0.retain(|a| other.contains(*a));
    }

    pub fn has_intersect(&self, other: &AddressValue) -> bool {
        self.iter().any(|a| other.contains(a))
    }
}

impl FromIterator<Address> for AddressValue {
    fn from_iter<T: IntoIterator<Item = Address>>(iter: T) -> Self {
        AddressValue(iter.into_iter().collect())
    }
}
