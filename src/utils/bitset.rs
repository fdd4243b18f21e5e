//! A growable bit vector for tracking sets of nodes.
//!
//! The lowering pipeline tracks its active-guard set and various visited sets
//! as bits indexed by node id. Because the graph allocates new nodes while a
//! pass is running, the set grows on demand: inserting an index beyond the
//! current capacity extends the backing storage, and membership queries for
//! indices that were never inserted simply answer `false`.
//!
//! # Example
//!
//! ```rust,ignore
//! use seaflow::utils::BitSet;
//!
//! let mut set = BitSet::new();
//! set.insert(3);
//! set.insert(200); // grows automatically
//!
//! assert!(set.contains(3));
//! assert!(!set.contains(4));
//! assert_eq!(set.count(), 2);
//! ```

/// A growable bit vector for efficient set operations over small integers.
///
/// Indices are typically node ids. Unlike a fixed-capacity bit set, inserts
/// beyond the current capacity grow the storage, and `contains` never panics
/// for out-of-range indices.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    /// The bits, stored as a vector of words.
    words: Vec<u64>,
}

impl BitSet {
    /// Creates a new empty bit set.
    #[must_use]
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Creates a new empty bit set with storage pre-allocated for `capacity` bits.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
        }
    }

    /// Returns `true` if no bits are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Sets the bit at the given index, growing the storage if needed.
    pub fn insert(&mut self, index: usize) {
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (index % 64);
    }

    /// Clears the bit at the given index.
    ///
    /// Clearing a bit beyond the current capacity is a no-op.
    pub fn remove(&mut self, index: usize) {
        let word = index / 64;
        if word < self.words.len() {
            self.words[word] &= !(1u64 << (index % 64));
        }
    }

    /// Returns `true` if the bit at the given index is set.
    ///
    /// Indices beyond the current capacity answer `false`.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        let word = index / 64;
        word < self.words.len() && (self.words[word] & (1u64 << (index % 64))) != 0
    }

    /// Returns the number of bits set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clears all bits, retaining the allocated storage.
    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word = 0;
        }
    }

    /// Returns an iterator over the indices of set bits, in increasing order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            set: self,
            word_idx: 0,
            bit_idx: 0,
        }
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for i in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{i}")?;
            first = false;
        }
        write!(f, "}}")
    }
}

/// Iterator over the set bits in a [`BitSet`].
pub struct BitSetIter<'a> {
    set: &'a BitSet,
    word_idx: usize,
    bit_idx: usize,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        while self.word_idx < self.set.words.len() {
            let word = self.set.words[self.word_idx];
            while self.bit_idx < 64 {
                let idx = self.word_idx * 64 + self.bit_idx;
                self.bit_idx += 1;
                if (word & (1u64 << (self.bit_idx - 1))) != 0 {
                    return Some(idx);
                }
            }
            self.word_idx += 1;
            self.bit_idx = 0;
        }
        None
    }
}
