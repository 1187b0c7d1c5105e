//! Arena of block descriptors.
//!
//! Block lists supporting individual deallocation need to find, from a user pointer, the descriptor of the block to
//! return upstream. Rather than threading back-pointers through the blocks themselves, each block records the index
//! of its descriptor in a `Slots` arena, and the arena keeps vacant slots on a free list for reuse.

use alloc::vec::Vec;
use core::mem;

/// Slots
///
/// A growable array of values, addressed by index, with O(1) insertion and removal.
pub(crate) struct Slots<T> {
    slots: Vec<Slot<T>>,
    //  Head of the free list, threaded through the vacant slots.
    free: Option<usize>,
    length: usize,
}

impl<T> Slots<T> {
    /// Creates an empty instance.
    pub(crate) const fn new() -> Self { Self { slots: Vec::new(), free: None, length: 0 } }

    /// Returns the number of occupied slots.
    pub(crate) fn len(&self) -> usize { self.length }

    /// Returns whether there are no occupied slots.
    pub(crate) fn is_empty(&self) -> bool { self.length == 0 }

    /// Stores `value`, returning the index at which it is stored.
    pub(crate) fn insert(&mut self, value: T) -> usize {
        self.length += 1;

        if let Some(index) = self.free {
            let next = match self.slots[index] {
                Slot::Vacant(next) => next,
                Slot::Occupied(_) => unreachable!("Free list points to occupied slot {}", index),
            };

            self.free = next;
            self.slots[index] = Slot::Occupied(value);

            return index;
        }

        self.slots.push(Slot::Occupied(value));
        self.slots.len() - 1
    }

    /// Returns a reference to the value stored at `index`, if any.
    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        match self.slots.get(index)? {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant(_) => None,
        }
    }

    /// Removes the value stored at `index`, if any.
    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        let slot = self.slots.get_mut(index)?;

        if let Slot::Vacant(_) = slot {
            return None;
        }

        let previous = mem::replace(slot, Slot::Vacant(self.free));

        self.free = Some(index);
        self.length -= 1;

        match previous {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant(_) => None,
        }
    }

    /// Iterates over the stored values, in no particular order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant(_) => None,
        })
    }

    /// Removes all the values, returning them; the instance is empty afterwards.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = T> {
        let slots = mem::take(&mut self.slots);

        self.free = None;
        self.length = 0;

        slots.into_iter().filter_map(|slot| match slot {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant(_) => None,
        })
    }
}

impl<T> Default for Slots<T> {
    fn default() -> Self { Self::new() }
}

enum Slot<T> {
    Occupied(T),
    //  Index of the next vacant slot, if any.
    Vacant(Option<usize>),
}

#[cfg(test)]
mod tests {

use alloc::vec;

use super::*;

#[test]
fn slots_new() {
    let slots = Slots::<u32>::new();

    assert!(slots.is_empty());
    assert_eq!(0, slots.len());
    assert_eq!(None, slots.get(0));
}

#[test]
fn slots_insert_get_remove() {
    let mut slots = Slots::new();

    let (a, b, c) = (slots.insert('a'), slots.insert('b'), slots.insert('c'));
    assert_eq!((0, 1, 2), (a, b, c));
    assert_eq!(3, slots.len());

    assert_eq!(Some(&'b'), slots.get(b));
    assert_eq!(Some('b'), slots.remove(b));
    assert_eq!(None, slots.get(b));
    assert_eq!(None, slots.remove(b));
    assert_eq!(2, slots.len());

    assert_eq!(Some(&'a'), slots.get(a));
    assert_eq!(Some(&'c'), slots.get(c));
}

#[test]
fn slots_reuse_vacant() {
    let mut slots = Slots::new();

    let a = slots.insert(1);
    let b = slots.insert(2);
    let c = slots.insert(3);

    slots.remove(a);
    slots.remove(c);

    //  Most recently vacated first.
    assert_eq!(c, slots.insert(4));
    assert_eq!(a, slots.insert(5));
    assert_eq!(3, slots.insert(6));

    assert_eq!(Some(&2), slots.get(b));
    assert_eq!(4, slots.len());
}

#[test]
fn slots_drain() {
    let mut slots = Slots::new();

    for i in 0..5 {
        slots.insert(i);
    }

    slots.remove(1);
    slots.remove(3);

    let mut values: Vec<_> = slots.drain().collect();
    values.sort();

    assert_eq!(vec!(0, 2, 4), values);
    assert!(slots.is_empty());
    assert_eq!(0, slots.insert(7));
}

#[test]
fn slots_iter() {
    let mut slots = Slots::new();

    slots.insert(1);
    let two = slots.insert(2);
    slots.insert(3);

    slots.remove(two);

    let sum: i32 = slots.iter().sum();
    assert_eq!(4, sum);
}

} // mod tests
