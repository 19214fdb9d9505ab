/// Multimap from nonzero 31-bit hashes to small integer slots
///
/// Keys are value hashes of pool entries and values are their indices, so several values may
/// share one key. Collisions are resolved by linear probing. Nothing is ever removed, which means
/// every value stored under a hash lives on the probe chain that starts at that hash's home slot
/// and ends at the first empty slot.
#[derive(Clone, Debug)]
pub struct EntryMap {
    /// `(hash, value)` pairs, where a zero hash marks an empty slot
    slots: Vec<(u32, u32)>,
    len: usize,
}

const INITIAL_SLOTS: usize = 16;

impl EntryMap {
    pub fn new() -> EntryMap {
        EntryMap {
            slots: vec![(0, 0); INITIAL_SLOTS],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Squash an arbitrary hash into the nonzero 31-bit key space
    pub fn key(hash: u64) -> u32 {
        let folded = ((hash >> 32) as u32 ^ hash as u32) & 0x7FFF_FFFF;
        if folded == 0 {
            1
        } else {
            folded
        }
    }

    fn home(&self, key: u32) -> usize {
        key as usize & (self.slots.len() - 1)
    }

    /// Add a value under a key (existing values under the same key are kept)
    pub fn insert(&mut self, key: u32, value: u32) {
        debug_assert!(key != 0, "zero is reserved for empty slots");

        // Keep the load factor under 3/4
        if (self.len + 1) * 4 > self.slots.len() * 3 {
            self.grow();
        }
        Self::place(&mut self.slots, key, value);
        self.len += 1;
    }

    fn place(slots: &mut [(u32, u32)], key: u32, value: u32) {
        let mask = slots.len() - 1;
        let mut idx = key as usize & mask;
        while slots[idx].0 != 0 {
            idx = (idx + 1) & mask;
        }
        slots[idx] = (key, value);
    }

    /// Double the table and rehash everything
    fn grow(&mut self) {
        let mut slots = vec![(0, 0); self.slots.len() * 2];
        for &(key, value) in self.slots.iter().filter(|(key, _)| *key != 0) {
            Self::place(&mut slots, key, value);
        }
        self.slots = slots;
    }

    /// Values stored under a key
    pub fn get(&self, key: u32) -> impl Iterator<Item = u32> + '_ {
        let mask = self.slots.len() - 1;
        let home = self.home(key);
        (0..self.slots.len())
            .map(move |step| self.slots[(home + step) & mask])
            .take_while(|(slot_key, _)| *slot_key != 0)
            .filter(move |(slot_key, _)| *slot_key == key)
            .map(|(_, value)| value)
    }
}

impl Default for EntryMap {
    fn default() -> Self {
        EntryMap::new()
    }
}
