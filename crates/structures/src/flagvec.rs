/// A fixed-length vector of single-bit flags.
///
/// The length is chosen at construction and never changes. Every flag starts
/// cleared. A `Vec<bool>` would waste 7 bits per flag, which adds up for a
/// 64k-entry descriptor table.
#[derive(Clone, Debug, Default)]
pub struct FlagVec {
    data: Vec<u64>,
    length: usize,
    count: usize,
}

impl FlagVec {
    #[must_use]
    pub fn new(length: usize) -> Self {
        Self {
            data: vec![0; length.div_ceil(64)],
            length,
            count: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The number of flags that are currently set.
    #[must_use]
    pub fn count_set(&self) -> usize {
        self.count
    }

    /// Sets the flag at the given index to the given value, and returns the old
    /// value.
    ///
    /// ## Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: bool) -> bool {
        assert!(
            index < self.length,
            "flag index {index} out of bounds (len {})",
            self.length
        );

        let int_index = index / 64;
        let bit_index = index % 64;

        let old_value = self.data[int_index] & (1 << bit_index) != 0;

        self.data[int_index] =
            (self.data[int_index] & !(1 << bit_index)) | u64::from(value) << bit_index;

        match (old_value, value) {
            (false, true) => self.count += 1,
            (true, false) => self.count -= 1,
            _ => {}
        }

        old_value
    }

    /// Returns the value of the flag at the given index, or false if the index
    /// is out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        if index >= self.length {
            return false;
        }

        self.data[index / 64] & (1 << (index % 64)) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanity() {
        let mut vec = FlagVec::new(130);

        assert_eq!(vec.len(), 130);
        assert_eq!(vec.data.len(), 3);
        assert!(!vec.get(0));
        assert!(!vec.get(1_000_000_000));

        assert!(!vec.set(0, true));
        assert!(vec.get(0));
        assert_eq!(vec.count_set(), 1);

        assert!(!vec.set(129, true));
        assert!(vec.set(129, true));
        assert_eq!(vec.count_set(), 2);

        assert!(vec.set(129, false));
        assert!(!vec.get(129));
        assert_eq!(vec.count_set(), 1);
    }

    #[test]
    fn word_boundaries() {
        let mut vec = FlagVec::new(128);

        vec.set(63, true);
        vec.set(64, true);

        assert!(vec.get(63));
        assert!(vec.get(64));
        assert!(!vec.get(62));
        assert!(!vec.get(65));
        assert_eq!(vec.data, vec![1 << 63, 1]);
    }

    #[test]
    fn empty() {
        let vec = FlagVec::new(0);
        assert!(vec.is_empty());
        assert!(!vec.get(0));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn set_out_of_bounds() {
        let mut vec = FlagVec::new(4);
        vec.set(4, true);
    }
}
