use std::rc::Rc;

use super::{LoxString, Value};

const INITIAL_CAPACITY: usize = 8;

/// An open-addressed hash map keyed by interned strings. Probing is
/// linear with a `capacity - 1` mask over power-of-two capacities, and
/// deletions leave tombstones so probe chains stay intact. Keys compare
/// by pointer: the string pool guarantees one allocation per distinct
/// character sequence.
#[derive(Debug, Clone, Default)]
pub struct Table {
    // Full entries plus tombstones; the load factor counts both.
    count: usize,
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, Default)]
enum Entry {
    #[default]
    Empty,
    Tombstone,
    Full(Rc<LoxString>, Value),
}

impl Table {
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, Entry::Full(..)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &Rc<LoxString>) -> Option<&Value> {
        if self.entries.is_empty() {
            return None;
        }

        match &self.entries[self.find_slot(key)] {
            Entry::Full(_, value) => Some(value),
            _ => None,
        }
    }

    /// Inserts or overwrites; returns whether the key was new.
    pub fn set(&mut self, key: Rc<LoxString>, value: Value) -> bool {
        if (self.count + 1) * 4 > self.entries.len() * 3 {
            self.grow();
        }

        let slot = self.find_slot(&key);
        match std::mem::replace(&mut self.entries[slot], Entry::Full(key, value)) {
            Entry::Empty => {
                self.count += 1;
                true
            }
            // A reused tombstone is already counted against the load factor.
            Entry::Tombstone => true,
            Entry::Full(..) => false,
        }
    }

    /// Removes the key, leaving a tombstone; returns whether it was present.
    pub fn delete(&mut self, key: &Rc<LoxString>) -> bool {
        if self.entries.is_empty() {
            return false;
        }

        let slot = self.find_slot(key);
        if matches!(self.entries[slot], Entry::Full(..)) {
            self.entries[slot] = Entry::Tombstone;
            true
        } else {
            false
        }
    }

    /// Copies every entry of `other` into this table; used to seed a
    /// subclass's method table from its superclass.
    pub fn add_all(&mut self, other: &Table) {
        for (key, value) in other.iter() {
            self.set(Rc::clone(key), value.clone());
        }
    }

    /// The interning fast path: locates a key with these characters by
    /// probing on the precomputed hash, comparing characters only when
    /// hashes collide. The only lookup that does not rely on pointer
    /// equality.
    pub fn find_string(&self, chars: &str, hash: u32) -> Option<Rc<LoxString>> {
        if self.entries.is_empty() {
            return None;
        }

        let mask = self.entries.len() - 1;
        let mut slot = hash as usize & mask;
        loop {
            match &self.entries[slot] {
                Entry::Empty => return None,
                Entry::Tombstone => {}
                Entry::Full(key, _) => {
                    if key.hash == hash && key.chars == chars {
                        return Some(Rc::clone(key));
                    }
                }
            }

            slot = (slot + 1) & mask;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rc<LoxString>, &Value)> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Full(key, value) => Some((key, value)),
            _ => None,
        })
    }

    /// The slot this key lives in, or the slot an insert should use: the
    /// first tombstone on the probe chain when there is one, otherwise
    /// the trailing empty slot.
    fn find_slot(&self, key: &Rc<LoxString>) -> usize {
        let mask = self.entries.len() - 1;
        let mut slot = key.hash as usize & mask;
        let mut tombstone = None;

        loop {
            match &self.entries[slot] {
                Entry::Empty => return tombstone.unwrap_or(slot),
                Entry::Tombstone => {
                    tombstone.get_or_insert(slot);
                }
                Entry::Full(existing, _) => {
                    if Rc::ptr_eq(existing, key) {
                        return slot;
                    }
                }
            }

            slot = (slot + 1) & mask;
        }
    }

    fn grow(&mut self) {
        let capacity = if self.entries.is_empty() {
            INITIAL_CAPACITY
        } else {
            self.entries.len() * 2
        };

        let old = std::mem::replace(&mut self.entries, vec![Entry::Empty; capacity]);

        // Tombstones are dropped on rebuild, so the count starts over.
        self.count = 0;
        for entry in old {
            if let Entry::Full(key, value) = entry {
                let slot = self.find_slot(&key);
                self.entries[slot] = Entry::Full(key, value);
                self.count += 1;
            }
        }
    }
}
