pub mod flagvec;
pub mod slot_table;

pub use flagvec::FlagVec;
pub use slot_table::{SlotError, SlotPolicy, SlotTable};
