use crate::flagvec::FlagVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    /// Every slot in the table has been handed out.
    #[error("slot table exhausted: all {capacity} slots are allocated")]
    Exhausted { capacity: u32 },
}

/// How released slots are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SlotPolicy {
    /// Slots are handed out in order and never reused. Releasing a slot does
    /// nothing. Suited to tables that only grow, like static scene textures.
    Bump,
    /// Released slots are reused, most recently released first.
    #[default]
    FreeList,
}

/// A fixed-capacity table of slot indices.
///
/// Every index in `0..capacity` is either allocated or free. Fresh indices come
/// from a bump cursor; under [`SlotPolicy::FreeList`] released indices are
/// pushed onto a stack and take priority over the cursor.
#[derive(Clone, Debug)]
pub struct SlotTable {
    policy: SlotPolicy,
    capacity: u32,
    cursor: u32,
    free_list: Vec<u32>,
    allocated: FlagVec,
}

impl SlotTable {
    #[must_use]
    pub fn new(capacity: u32, policy: SlotPolicy) -> Self {
        Self {
            policy,
            capacity,
            cursor: 0,
            free_list: Vec::new(),
            allocated: FlagVec::new(capacity as usize),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[must_use]
    pub fn policy(&self) -> SlotPolicy {
        self.policy
    }

    /// The number of slots currently allocated.
    #[must_use]
    pub fn allocated(&self) -> u32 {
        self.allocated.count_set() as u32
    }

    #[must_use]
    pub fn is_allocated(&self, index: u32) -> bool {
        self.allocated.get(index as usize)
    }

    /// Hands out a slot that is not currently allocated.
    pub fn acquire(&mut self) -> Result<u32, SlotError> {
        let index = if let Some(index) = self.free_list.pop() {
            index
        } else if self.cursor < self.capacity {
            self.cursor += 1;
            self.cursor - 1
        } else {
            return Err(SlotError::Exhausted {
                capacity: self.capacity,
            });
        };

        let was_allocated = self.allocated.set(index as usize, true);
        debug_assert!(!was_allocated, "slot {index} handed out twice");

        Ok(index)
    }

    /// Returns a slot to the table. Returns `true` if the slot became
    /// available for reuse.
    ///
    /// Out-of-range and already-free indices are ignored, as is every call
    /// under [`SlotPolicy::Bump`].
    pub fn release(&mut self, index: u32) -> bool {
        if self.policy == SlotPolicy::Bump || !self.is_allocated(index) {
            return false;
        }

        self.allocated.set(index as usize, false);
        self.free_list.push(index);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaust_then_reuse() {
        let mut table = SlotTable::new(4, SlotPolicy::FreeList);

        let indices = (0..4).map(|_| table.acquire().unwrap()).collect::<Vec<_>>();
        assert_eq!(indices, [0, 1, 2, 3]);
        assert_eq!(table.acquire(), Err(SlotError::Exhausted { capacity: 4 }));

        assert!(table.release(1));
        assert_eq!(table.acquire(), Ok(1));
        assert_eq!(table.allocated(), 4);
    }

    #[test]
    fn bump_never_reuses() {
        let mut table = SlotTable::new(4, SlotPolicy::Bump);

        for i in 0..4 {
            assert_eq!(table.acquire(), Ok(i));
        }

        assert!(!table.release(1));
        assert!(table.is_allocated(1));
        assert_eq!(table.acquire(), Err(SlotError::Exhausted { capacity: 4 }));
    }

    #[test]
    fn lifo_reuse() {
        let mut table = SlotTable::new(8, SlotPolicy::FreeList);

        for _ in 0..5 {
            table.acquire().unwrap();
        }

        table.release(0);
        table.release(3);
        table.release(2);

        assert_eq!(table.acquire(), Ok(2));
        assert_eq!(table.acquire(), Ok(3));
        assert_eq!(table.acquire(), Ok(0));
        assert_eq!(table.acquire(), Ok(5));
    }

    #[test]
    fn release_is_idempotent() {
        let mut table = SlotTable::new(4, SlotPolicy::FreeList);

        let a = table.acquire().unwrap();
        let _b = table.acquire().unwrap();

        assert!(table.release(a));
        assert!(!table.release(a));
        assert!(!table.release(17));
        assert!(!table.release(3));

        // One release, one reuse. A double push would hand `a` out twice.
        assert_eq!(table.acquire(), Ok(a));
        assert_eq!(table.acquire(), Ok(2));
        assert_eq!(table.acquire(), Ok(3));
        assert!(table.acquire().is_err());
    }

    #[test]
    fn never_hands_out_allocated_slot() {
        let mut table = SlotTable::new(16, SlotPolicy::FreeList);
        let mut held = Vec::new();

        for round in 0..64u32 {
            if round % 3 == 2 {
                if let Some(index) = held.pop() {
                    table.release(index);
                }
            } else if let Ok(index) = table.acquire() {
                assert!(!held.contains(&index));
                assert!(index < table.capacity());
                held.push(index);
            }

            assert_eq!(table.allocated() as usize, held.len());
        }
    }

    #[test]
    fn zero_capacity() {
        let mut table = SlotTable::new(0, SlotPolicy::FreeList);
        assert_eq!(table.acquire(), Err(SlotError::Exhausted { capacity: 0 }));
        assert!(!table.release(0));
    }
}
