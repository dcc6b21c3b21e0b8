//! Abstract domains: intervals, address sets, and the combined state.

pub mod address;
pub mod interval;
pub mod state;
pub mod value;

pub use address::{Address, AddressValue};
pub use interval::{Bound, IntervalValue};
pub use state::AbstractState;
pub use value::AbstractValue;
