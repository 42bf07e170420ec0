//! # Object Tables
//!
//! Fixed-capacity storage for kernel objects. Each object lives in one
//! slot for the lifetime of the kernel and is named by a [`Handle`] that
//! carries the slot index and the object type, so a semaphore handle can
//! never be passed where a queue is expected.

use core::fmt;
use core::marker::PhantomData;

use crate::error::{Error, Result};

/// Stable, copyable reference to a kernel object of type `T`.
pub struct Handle<T> {
    index: u8,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub(crate) const fn new(index: usize) -> Self {
        Self {
            index: index as u8,
            _kind: PhantomData,
        }
    }

    /// Slot index of the object in its table.
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Slot array holding up to `N` objects of type `T`.
pub struct Table<T, const N: usize> {
    slots: [Option<T>; N],
}

impl<T, const N: usize> Table<T, N> {
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; N],
        }
    }

    /// Store `object` in the first free slot.
    pub fn insert(&mut self, object: T) -> Result<Handle<T>> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::NoFreeSlot)?;
        self.slots[index] = Some(object);
        Ok(Handle::new(index))
    }

    pub fn get(&self, handle: Handle<T>) -> Result<&T> {
        self.slots
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidParameter)
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Result<&mut T> {
        self.slots
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidParameter)
    }

    /// Occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|obj| (Handle::new(i), obj)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|obj| (Handle::new(i), obj)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, const N: usize> Default for Table<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_fills_lowest_free_slot() {
        let mut table: Table<u32, 3> = Table::new();
        let a = table.insert(10).unwrap();
        let b = table.insert(20).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(*table.get(b).unwrap(), 20);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_full_table_rejects_insert() {
        let mut table: Table<u8, 1> = Table::new();
        table.insert(1).unwrap();
        assert_eq!(table.insert(2), Err(Error::NoFreeSlot));
    }

    #[test]
    fn test_unknown_handle_is_invalid() {
        let table: Table<u8, 2> = Table::new();
        assert_eq!(table.get(Handle::new(0)), Err(Error::InvalidParameter));
        assert_eq!(table.get(Handle::new(7)), Err(Error::InvalidParameter));
    }
}
