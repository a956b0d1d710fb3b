use bitvec::prelude::*;
use std::ops::{Index, IndexMut};

/// Slot-based arena with stable indices.
///
/// Indices handed out by [`push`] stay valid until [`release`]d, so they can
/// be stored as cross-references between elements. Released slots are reused
/// by later pushes.
///
/// [`push`]: SlotStorage::push
/// [`release`]: SlotStorage::release
#[derive(Debug, Clone)]
pub struct SlotStorage<T: Default + Clone + std::fmt::Debug> {
    storage: Vec<T>,
    active: BitVec,
    empty_slots: Vec<u32>,
}

impl<T: Default + Clone + std::fmt::Debug> Default for SlotStorage<T> {
    fn default() -> Self {
        Self {
            storage: Vec::new(),
            active: BitVec::new(),
            empty_slots: Vec::new(),
        }
    }
}

impl<T: Default + Clone + std::fmt::Debug> SlotStorage<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Number of active slots.
    pub fn len(&self) -> usize {
        self.storage.len() - self.empty_slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, val: T) -> usize {
        if let Some(index) = self.empty_slots.pop() {
            let index = index as usize;
            self.active.set(index, true);
            self.storage[index] = val;
            return index;
        }

        let index = self.storage.len();
        self.storage.push(val);
        self.active.push(true);
        index
    }

    /// Releases a slot and resets its memory; the index may be reused.
    pub fn release(&mut self, index: usize) -> Result<(), ()> {
        // Copy the bit out; its proxy reference may not live across set().
        let active = match self.active.get(index) {
            Some(bit) => *bit,
            None => return Err(()),
        };
        if !active {
            return Err(());
        }

        self.active.set(index, false);
        self.storage[index] = T::default();
        self.empty_slots.push(index as u32);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        match self.active.get(index) {
            Some(active) if *active => Some(&self.storage[index]),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        match self.active.get(index) {
            Some(active) if *active => Some(&mut self.storage[index]),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        let active = &self.active;
        self.storage
            .iter()
            .enumerate()
            .filter(move |(i, _)| *unsafe { active.get_unchecked(*i) })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        let active = &self.active;
        self.storage
            .iter_mut()
            .enumerate()
            .filter(move |(i, _)| *unsafe { active.get_unchecked(*i) })
    }
}

impl<T: Default + Clone + std::fmt::Debug> Index<usize> for SlotStorage<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        match self.get(index) {
            Some(val) => val,
            None => panic!("index {} was not active", index),
        }
    }
}

impl<T: Default + Clone + std::fmt::Debug> IndexMut<usize> for SlotStorage<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        match self.get_mut(index) {
            Some(val) => val,
            None => panic!("index {} was not active", index),
        }
    }
}

impl<T: Default + Clone + std::fmt::Debug> From<Vec<T>> for SlotStorage<T> {
    fn from(v: Vec<T>) -> Self {
        let mut active = BitVec::with_capacity(v.len());
        active.resize(v.len(), true);

        Self {
            storage: v,
            active,
            empty_slots: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_get_works() {
        let mut storage: SlotStorage<u32> = SlotStorage::new();
        assert_eq!(storage.push(10), 0);
        assert_eq!(storage.push(20), 1);
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.get(0), Some(&10));
        assert_eq!(storage.get(1), Some(&20));
        assert_eq!(storage.get(2), None);
        assert_eq!(storage[1], 20);
    }

    #[test]
    fn release_reuses_slots() {
        let mut storage: SlotStorage<u32> = SlotStorage::new();
        storage.push(1);
        storage.push(2);
        storage.push(3);

        assert!(storage.release(1).is_ok());
        assert!(storage.release(1).is_err());
        assert!(storage.release(10).is_err());
        assert_eq!(storage.get(1), None);
        assert_eq!(storage.len(), 2);

        assert_eq!(storage.push(4), 1);
        assert_eq!(storage[1], 4);
    }

    #[test]
    fn iterator_skips_released() {
        let mut storage = SlotStorage::from(vec![0u32, 1, 2, 3]);
        storage.release(2).unwrap();

        let collected: Vec<(usize, u32)> = storage.iter().map(|(i, v)| (i, *v)).collect();
        assert_eq!(collected, vec![(0, 0), (1, 1), (3, 3)]);
    }
}
