//! Slot storage: one allocation holding the control bytes and an array of
//! uninitialized slots.
//!
//! This is the only module that reads or writes slot memory. Every accessor
//! checks the slot's control byte first, so a value is touched only while its
//! control byte says it is occupied.

use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::control::DELETED;
use crate::control::EMPTY;
use crate::control::is_full;
use crate::error::Error;

#[derive(Clone, Copy, Debug)]
struct DataLayout {
    layout: Layout,
    ctrl_offset: usize,
    slots_offset: usize,
}

impl DataLayout {
    fn new<V>(capacity: usize) -> Result<Self, Error> {
        let ctrl_layout = Layout::array::<u8>(capacity).map_err(|_| Error::CapacityOverflow)?;
        let slots_layout =
            Layout::array::<MaybeUninit<V>>(capacity).map_err(|_| Error::CapacityOverflow)?;

        let (layout, ctrl_offset) = Layout::new::<()>()
            .extend(ctrl_layout)
            .map_err(|_| Error::CapacityOverflow)?;
        let (layout, slots_offset) = layout
            .extend(slots_layout)
            .map_err(|_| Error::CapacityOverflow)?;

        Ok(DataLayout {
            layout: layout.pad_to_align(),
            ctrl_offset,
            slots_offset,
        })
    }
}

pub(crate) struct Storage<V> {
    layout: DataLayout,
    alloc: NonNull<u8>,
    capacity: usize,
    _phantom: PhantomData<V>,
}

// SAFETY: `Storage` owns its values like a `Vec<V>` does, so it can move
// between threads whenever `V` can.
unsafe impl<V: Send> Send for Storage<V> {}

// SAFETY: Shared references only hand out `&V`.
unsafe impl<V: Sync> Sync for Storage<V> {}

impl<V> Storage<V> {
    /// Allocates `capacity` slots, all marked empty.
    ///
    /// `capacity` must be non-zero. Allocation failure aborts through
    /// [`handle_alloc_error`].
    pub(crate) fn try_new(capacity: usize) -> Result<Self, Error> {
        debug_assert!(capacity > 0);

        let layout = DataLayout::new::<V>(capacity)?;
        // SAFETY: The layout holds at least `capacity` control bytes, so its size
        // is non-zero. A null return is handled right away.
        let alloc = unsafe {
            let raw_alloc = alloc::alloc::alloc(layout.layout);
            if raw_alloc.is_null() {
                handle_alloc_error(layout.layout);
            }

            core::ptr::write_bytes(raw_alloc.add(layout.ctrl_offset), EMPTY, capacity);
            NonNull::new_unchecked(raw_alloc)
        };

        Ok(Storage {
            layout,
            alloc,
            capacity,
            _phantom: PhantomData,
        })
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(feature = "stats")]
    #[inline(always)]
    pub(crate) fn allocated_bytes(&self) -> usize {
        self.layout.layout.size()
    }

    #[inline(always)]
    pub(crate) fn ctrl(&self) -> &[u8] {
        // SAFETY: The control array lives at `ctrl_offset`, holds `capacity`
        // bytes and is initialized at allocation time.
        unsafe {
            core::slice::from_raw_parts(
                self.alloc.as_ptr().add(self.layout.ctrl_offset),
                self.capacity,
            )
        }
    }

    #[inline(always)]
    fn ctrl_mut(&mut self) -> &mut [u8] {
        // SAFETY: As in `ctrl`, and `&mut self` guarantees exclusive access.
        unsafe {
            core::slice::from_raw_parts_mut(
                self.alloc.as_ptr().add(self.layout.ctrl_offset),
                self.capacity,
            )
        }
    }

    #[inline(always)]
    fn slot_ptr(&self, index: usize) -> *mut MaybeUninit<V> {
        debug_assert!(index < self.capacity);
        // SAFETY: `index < capacity`, so the offset stays inside the slots
        // array.
        unsafe {
            self.alloc
                .as_ptr()
                .add(self.layout.slots_offset)
                .cast::<MaybeUninit<V>>()
                .add(index)
        }
    }

    /// Returns the value at `index` if the slot is occupied.
    #[inline]
    pub(crate) fn get(&self, index: usize) -> Option<&V> {
        if !is_full(*self.ctrl().get(index)?) {
            return None;
        }
        // SAFETY: An occupied control byte means the slot holds an initialized
        // value.
        Some(unsafe { (*self.slot_ptr(index)).assume_init_ref() })
    }

    /// Returns the value at `index` mutably if the slot is occupied.
    #[inline]
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut V> {
        if !is_full(*self.ctrl().get(index)?) {
            return None;
        }
        // SAFETY: As in `get`, and `&mut self` guarantees exclusive access.
        Some(unsafe { (*self.slot_ptr(index)).assume_init_mut() })
    }

    /// Constructs `value` in the empty or deleted slot at `index` and marks it
    /// occupied with `tag`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds or the slot is already occupied.
    #[inline]
    pub(crate) fn construct_at(&mut self, index: usize, tag: u8, value: V) -> &mut V {
        assert!(
            !is_full(self.ctrl()[index]),
            "slot {index} is already occupied"
        );
        debug_assert!(is_full(tag));

        self.ctrl_mut()[index] = tag;
        // SAFETY: `index` was bounds checked above and the slot held no value, so
        // writing does not overwrite a live value.
        unsafe { (*self.slot_ptr(index)).write(value) }
    }

    /// Moves the value out of the slot at `index` and leaves a tombstone.
    #[inline]
    pub(crate) fn take_at(&mut self, index: usize) -> Option<V> {
        if !is_full(*self.ctrl().get(index)?) {
            return None;
        }
        self.ctrl_mut()[index] = DELETED;
        // SAFETY: The slot was occupied, and it is now marked deleted so the value
        // is read exactly once.
        Some(unsafe { (*self.slot_ptr(index)).assume_init_read() })
    }

    /// Drops the value in the slot at `index` in place and leaves a tombstone.
    ///
    /// Returns `false` if the slot was not occupied.
    #[inline]
    pub(crate) fn destroy_at(&mut self, index: usize) -> bool {
        match self.ctrl().get(index) {
            Some(&ctrl) if is_full(ctrl) => {}
            _ => return false,
        }
        // The control byte is updated first so a panicking destructor cannot
        // lead to a second drop.
        self.ctrl_mut()[index] = DELETED;
        // SAFETY: The slot was occupied and is no longer reachable through its
        // control byte.
        unsafe { (*self.slot_ptr(index)).assume_init_drop() };
        true
    }

    /// Drops every value and marks every slot empty, tombstones included.
    pub(crate) fn reset(&mut self) {
        if core::mem::needs_drop::<V>() {
            for index in 0..self.capacity {
                self.destroy_at(index);
            }
        }
        self.ctrl_mut().fill(EMPTY);
    }

    /// Index of the first occupied slot at or after `from`.
    #[inline]
    pub(crate) fn next_full(&self, from: usize) -> Option<usize> {
        self.ctrl()
            .get(from..)?
            .iter()
            .position(|&ctrl| is_full(ctrl))
            .map(|offset| from + offset)
    }

    /// Iterates over `(index, &mut V)` for every occupied slot, in ascending
    /// index order.
    pub(crate) fn slots_mut(&mut self) -> SlotsMut<'_, V> {
        SlotsMut {
            storage: NonNull::from(&mut *self),
            index: 0,
            _phantom: PhantomData,
        }
    }
}

impl<V: Clone> Storage<V> {
    /// Copies the slot layout of `self`, cloning every value into the same
    /// index and keeping tombstones so probe sequences stay intact.
    pub(crate) fn clone_slots(&self) -> Self {
        let mut storage = match Storage::try_new(self.capacity) {
            Ok(storage) => storage,
            Err(err) => panic!("{err}"),
        };

        for (index, &ctrl) in self.ctrl().iter().enumerate() {
            if ctrl == DELETED {
                storage.ctrl_mut()[index] = DELETED;
            } else if let Some(value) = self.get(index) {
                storage.construct_at(index, ctrl, value.clone());
            }
        }

        storage
    }
}

impl<V> Drop for Storage<V> {
    fn drop(&mut self) {
        if core::mem::needs_drop::<V>() {
            for index in 0..self.capacity {
                self.destroy_at(index);
            }
        }

        // SAFETY: `alloc` was returned by `alloc::alloc::alloc` with this exact
        // layout, and no value is left to drop.
        unsafe {
            alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout);
        }
    }
}

pub(crate) struct SlotsMut<'a, V> {
    storage: NonNull<Storage<V>>,
    index: usize,
    _phantom: PhantomData<&'a mut V>,
}

impl<'a, V> Iterator for SlotsMut<'a, V> {
    type Item = (usize, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: The iterator was built from a `&'a mut Storage`, and only shared
        // access is needed to find the next occupied slot.
        let storage = unsafe { self.storage.as_ref() };
        let index = storage.next_full(self.index)?;
        self.index = index + 1;

        // SAFETY: The slot is occupied, and every index is yielded at most once,
        // so no two returned references alias.
        let value = unsafe { (*storage.slot_ptr(index)).assume_init_mut() };
        Some((index, value))
    }
}
