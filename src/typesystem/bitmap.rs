//! Bit sets used for interface identity.
//!
//! [`IdBitSet`] is the plain growable set behind the id allocator. [`CompressedBitmap`] is the
//! read-only form stored on every type: a run-length encoding of zero bytes that keeps the
//! "does this type implement interface N" check a short scan even when ids are sparse.

/// A growable bit set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdBitSet {
    words: Vec<u64>,
    capacity: u32,
}

impl IdBitSet {
    /// Create a set able to hold ids `0..capacity`
    #[must_use]
    pub fn with_capacity(capacity: u32) -> Self {
        IdBitSet {
            words: vec![0; capacity.div_ceil(64) as usize],
            capacity,
        }
    }

    /// Number of ids the set can currently hold
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Grow the set so ids `0..capacity` fit
    pub fn grow(&mut self, capacity: u32) {
        if capacity > self.capacity {
            self.words.resize(capacity.div_ceil(64) as usize, 0);
            self.capacity = capacity;
        }
    }

    /// Insert an id, growing as needed
    pub fn insert(&mut self, id: u32) {
        if id >= self.capacity {
            self.grow(id + 1);
        }
        self.words[(id / 64) as usize] |= 1 << (id % 64);
    }

    /// Remove an id
    pub fn remove(&mut self, id: u32) {
        if id < self.capacity {
            self.words[(id / 64) as usize] &= !(1 << (id % 64));
        }
    }

    /// Check membership
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        id < self.capacity && self.words[(id / 64) as usize] & (1 << (id % 64)) != 0
    }

    /// Lowest id that is not in the set, if any below the capacity
    #[must_use]
    pub fn first_clear(&self) -> Option<u32> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)
            .map(|(index, word)| index as u32 * 64 + word.trailing_ones())
            .filter(|id| *id < self.capacity)
    }

    /// Iterate the ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.capacity).filter(move |id| self.contains(*id))
    }

    /// Number of ids in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// True if no id is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }
}

/// Run-length compressed interface bitmap
///
/// Encoded as `(skip, byte)` pairs: skip `skip` zero bytes, then the byte holding eight ids. A
/// pair is emitted for every non-zero byte, and whenever 255 zero bytes have been skipped.
/// Trailing zero bytes are recorded as a final `(skip, 0)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressedBitmap {
    data: Box<[u8]>,
}

impl CompressedBitmap {
    /// Compress the bitmap of the given ids
    pub fn from_ids(ids: impl IntoIterator<Item = u32>) -> Self {
        let mut raw: Vec<u8> = Vec::new();
        for id in ids {
            let index = (id / 8) as usize;
            if index >= raw.len() {
                raw.resize(index + 1, 0);
            }
            raw[index] |= 1 << (id % 8);
        }
        Self::compress(&raw)
    }

    /// Compress a raw bitmap
    #[must_use]
    pub fn compress(raw: &[u8]) -> Self {
        let mut data = Vec::new();
        let mut zeros: u8 = 0;
        for &byte in raw {
            if byte != 0 || zeros == u8::MAX {
                data.push(zeros);
                data.push(byte);
                zeros = 0;
            } else {
                zeros += 1;
            }
        }
        if zeros != 0 {
            data.push(zeros);
            data.push(0);
        }
        CompressedBitmap {
            data: data.into_boxed_slice(),
        }
    }

    /// Check whether an id is set
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        let mut remaining = i64::from(id);
        for pair in self.data.chunks_exact(2) {
            remaining -= i64::from(pair[0]) * 8;
            if remaining < 8 {
                return remaining >= 0 && pair[1] & (1 << remaining) != 0;
            }
            remaining -= 8;
        }
        false
    }

    /// Size of the encoded form in bytes
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.data.len()
    }

    /// The encoded `(skip, byte)` pairs
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_bitset_allocation() {
        let mut set = IdBitSet::with_capacity(128);
        set.insert(0);
        set.insert(1);
        set.insert(3);
        assert_eq!(set.first_clear(), Some(2));
        set.insert(2);
        assert_eq!(set.first_clear(), Some(4));
        set.remove(1);
        assert_eq!(set.first_clear(), Some(1));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_id_bitset_full() {
        let mut set = IdBitSet::with_capacity(128);
        for id in 0..128 {
            set.insert(id);
        }
        assert_eq!(set.first_clear(), None);
        set.grow(256);
        assert_eq!(set.capacity(), 256);
        assert_eq!(set.first_clear(), Some(128));
    }

    #[test]
    fn test_compressed_bitmap_sparse() {
        let ids = [1u32, 9, 2000, 5000];
        let bitmap = CompressedBitmap::from_ids(ids);
        for id in ids {
            assert!(bitmap.contains(id), "id {id} missing");
        }
        for id in [0u32, 2, 8, 10, 1999, 2001, 4999, 5001, 100_000] {
            assert!(!bitmap.contains(id), "id {id} unexpectedly set");
        }
        assert!(bitmap.encoded_len() < 5001 / 8);
    }

    #[test]
    fn test_compressed_bitmap_long_zero_run() {
        // 255 zero bytes force an explicit (255, 0) pair before the set byte
        let bitmap = CompressedBitmap::from_ids([8 * 300 + 5]);
        assert!(bitmap.contains(8 * 300 + 5));
        assert!(!bitmap.contains(8 * 255 + 5));
        assert!(!bitmap.contains(8 * 300 + 4));
    }

    #[test]
    fn test_compressed_bitmap_trailing_zeros() {
        let bitmap = CompressedBitmap::compress(&[0b10, 0, 0, 0]);
        assert_eq!(bitmap.as_bytes(), &[0, 0b10, 3, 0]);
        assert!(bitmap.contains(1));
        assert!(!bitmap.contains(33));
    }

    #[test]
    fn test_compressed_bitmap_empty() {
        let bitmap = CompressedBitmap::from_ids(std::iter::empty());
        assert_eq!(bitmap.encoded_len(), 0);
        assert!(!bitmap.contains(0));
    }
}
