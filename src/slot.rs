//! Slot - the raw memory-location handle threaded through a traversal -
//! and the typed leaf wrapper handed to scalar handlers.

use std::marker::PhantomData;
use std::ptr::NonNull;

/// A non-owning handle to one value's storage during a traversal.
///
/// `can_addr` records whether the storage was reached through an
/// exclusive chain from a `&mut` walk root; only then may the value be
/// written in place.
#[derive(Clone, Copy)]
pub struct Slot {
    ptr: NonNull<u8>,
    can_addr: bool,
}

impl Slot {
    pub(crate) fn new(ptr: NonNull<u8>, can_addr: bool) -> Self {
        Slot { ptr, can_addr }
    }

    pub(crate) fn ptr(self) -> NonNull<u8> {
        self.ptr
    }

    /// Whether the value may be mutated in place.
    pub fn can_addr(self) -> bool {
        self.can_addr
    }

    /// A slot `bytes` past this one, same addressability.
    pub(crate) fn offset(self, bytes: usize) -> Slot {
        // SAFETY: callers only offset within the bounds of the value the
        // slot points into, per the shape's layout claims.
        let ptr = unsafe { self.ptr.add(bytes) };
        Slot { ptr, can_addr: self.can_addr }
    }

    /// A slot at `ptr` whose addressability also requires `exclusive`.
    pub(crate) fn derived(self, ptr: NonNull<u8>, exclusive: bool) -> Slot {
        Slot {
            ptr,
            can_addr: self.can_addr && exclusive,
        }
    }
}

/// Typed access to one leaf value, handed to leaf handlers.
pub struct Leaf<'w, T> {
    slot: Slot,
    _marker: PhantomData<&'w mut T>,
}

impl<'w, T> Leaf<'w, T> {
    /// # Safety
    /// `slot` must point to a live, initialized `T` valid for `'w`, and
    /// exclusively reachable whenever `slot.can_addr()` is set.
    pub(crate) unsafe fn new(slot: Slot) -> Self {
        Leaf {
            slot,
            _marker: PhantomData,
        }
    }

    /// Reads the value.
    pub fn get(&self) -> &T {
        // SAFETY: guaranteed by the constructor contract.
        unsafe { self.slot.ptr().cast::<T>().as_ref() }
    }

    /// Whether [`set`](Self::set) and [`get_mut`](Self::get_mut) may be
    /// used on this leaf.
    pub fn can_set(&self) -> bool {
        self.slot.can_addr()
    }

    /// Mutable access to the value.
    ///
    /// # Panics
    /// Panics if the leaf is not addressable.
    pub fn get_mut(&mut self) -> &mut T {
        assert!(self.can_set(), "leaf is not addressable");
        // SAFETY: the slot is addressable, so the storage is exclusively
        // reachable per the constructor contract.
        unsafe { self.slot.ptr().cast::<T>().as_mut() }
    }

    /// Replaces the value, dropping the old one.
    ///
    /// # Panics
    /// Panics if the leaf is not addressable.
    pub fn set(&mut self, value: T) {
        *self.get_mut() = value;
    }
}
