mod slot_vec;

pub use slot_vec::{Offset, SlotVec, Width};
