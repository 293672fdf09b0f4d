//! Typed views over aggregate values, handed to aggregate walk
//! functions. Each view pairs the current slot with the metadata its
//! walker precompiled (field plans, element sizes, child walkers).

use std::any::TypeId;
use std::ptr::NonNull;

use crate::compile::{Compiled, FieldPlan, Resolver};
use crate::errors::WalkError;
use crate::reflect::Reflect;
use crate::registry::WalkResult;
use crate::shape::{ListVTable, MapVTable, Shape};
use crate::slot::Slot;

// ============================================================================
// Structs
// ============================================================================

pub(crate) struct FieldMeta<C> {
    pub(crate) shape: &'static Shape,
    pub(crate) plan: FieldPlan,
    pub(crate) f: Compiled<C>,
}

pub(crate) struct StructMeta<C> {
    pub(crate) shape: &'static Shape,
    pub(crate) fields: Vec<FieldMeta<C>>,
}

/// A struct value and its registered fields, in registration order.
pub struct StructView<'w, C> {
    meta: &'w StructMeta<C>,
    slot: Slot,
    env: &'w dyn Resolver<C>,
}

impl<'w, C> StructView<'w, C> {
    pub(crate) fn new(meta: &'w StructMeta<C>, slot: Slot, env: &'w dyn Resolver<C>) -> Self {
        StructView { meta, slot, env }
    }

    pub fn shape(&self) -> &'static Shape {
        self.meta.shape
    }

    /// Number of registered fields.
    pub fn num_fields(&self) -> usize {
        self.meta.fields.len()
    }

    /// The `i`-th registered field of this instance.
    ///
    /// # Panics
    /// Panics if `i` is not a registration slot.
    pub fn field(&self, i: usize) -> FieldView<'w, C> {
        let meta = &self.meta.fields[i];
        FieldView {
            meta,
            slot: meta.plan.locate(self.slot),
            env: self.env,
        }
    }

    /// Walks the `i`-th registered field.
    ///
    /// # Panics
    /// Panics if `i` is not a registration slot or the field is invalid
    /// for this instance.
    pub fn walk_field(&self, ctx: &mut C, i: usize) -> WalkResult {
        self.field(i).walk(ctx)
    }

    /// The whole struct value, when `T` is its exact type.
    pub fn get<T: Reflect>(&self) -> Option<&'w T> {
        if self.meta.shape.id != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: shape identity was just checked against T.
        Some(unsafe { self.slot.ptr().cast::<T>().as_ref() })
    }
}

/// One registered field of one struct instance.
pub struct FieldView<'w, C> {
    meta: &'w FieldMeta<C>,
    slot: Option<Slot>,
    env: &'w dyn Resolver<C>,
}

impl<'w, C> FieldView<'w, C> {
    /// False when a pointer crossed on the field's path was nil in this
    /// instance.
    pub fn is_valid(&self) -> bool {
        self.slot.is_some()
    }

    pub fn shape(&self) -> &'static Shape {
        self.meta.shape
    }

    /// The field's value, when it is valid and `T` is its exact type.
    pub fn get<T: Reflect>(&self) -> Option<&'w T> {
        let slot = self.slot?;
        if self.meta.shape.id != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: shape identity was just checked against T.
        Some(unsafe { slot.ptr().cast::<T>().as_ref() })
    }

    /// Walks the field's value.
    ///
    /// # Panics
    /// Panics if the field is invalid for this instance.
    pub fn walk(&self, ctx: &mut C) -> WalkResult {
        let slot = self
            .slot
            .expect("walked an invalid struct field (nil intermediate pointer)");
        self.meta.f.call(ctx, slot, self.env)
    }
}

// ============================================================================
// Arrays
// ============================================================================

pub(crate) struct ArrayMeta<C> {
    pub(crate) shape: &'static Shape,
    pub(crate) elem_shape: &'static Shape,
    pub(crate) elem_size: usize,
    pub(crate) len: usize,
    pub(crate) elem: Compiled<C>,
}

/// A fixed-length array value.
pub struct ArrayView<'w, C> {
    meta: &'w ArrayMeta<C>,
    slot: Slot,
    env: &'w dyn Resolver<C>,
}

impl<'w, C> ArrayView<'w, C> {
    pub(crate) fn new(meta: &'w ArrayMeta<C>, slot: Slot, env: &'w dyn Resolver<C>) -> Self {
        ArrayView { meta, slot, env }
    }

    pub fn shape(&self) -> &'static Shape {
        self.meta.shape
    }

    pub fn len(&self) -> usize {
        self.meta.len
    }

    pub fn is_empty(&self) -> bool {
        self.meta.len == 0
    }

    /// The `i`-th element. Elements inherit the array's addressability.
    ///
    /// # Panics
    /// Panics if `i` is out of range.
    pub fn elem(&self, i: usize) -> ElemView<'w, C> {
        assert!(i < self.meta.len, "array index {i} out of range");
        ElemView {
            shape: self.meta.elem_shape,
            slot: self.slot.offset(i * self.meta.elem_size),
            f: &self.meta.elem,
            env: self.env,
        }
    }

    pub fn walk_elem(&self, ctx: &mut C, i: usize) -> WalkResult {
        self.elem(i).walk(ctx)
    }

    /// The whole array value, when `T` is its exact type.
    pub fn get<T: Reflect>(&self) -> Option<&'w T> {
        if self.meta.shape.id != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: shape identity was just checked against T.
        Some(unsafe { self.slot.ptr().cast::<T>().as_ref() })
    }
}

/// One element of an array or list.
pub struct ElemView<'w, C> {
    shape: &'static Shape,
    slot: Slot,
    f: &'w Compiled<C>,
    env: &'w dyn Resolver<C>,
}

impl<'w, C> ElemView<'w, C> {
    pub fn shape(&self) -> &'static Shape {
        self.shape
    }

    pub fn can_addr(&self) -> bool {
        self.slot.can_addr()
    }

    pub fn walk(&self, ctx: &mut C) -> WalkResult {
        self.f.call(ctx, self.slot, self.env)
    }

    /// The element's value, when `T` is its exact type.
    pub fn get<T: Reflect>(&self) -> Option<&'w T> {
        if self.shape.id != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: shape identity was just checked against T.
        Some(unsafe { self.slot.ptr().cast::<T>().as_ref() })
    }
}

// ============================================================================
// Lists
// ============================================================================

pub(crate) struct ListMeta<C> {
    pub(crate) shape: &'static Shape,
    pub(crate) elem_shape: &'static Shape,
    pub(crate) elem_size: usize,
    pub(crate) vtable: &'static ListVTable,
    pub(crate) elem: Compiled<C>,
}

/// A growable list value. Length and base pointer are read once, when
/// the view is built; the handler must not resize the list underneath
/// its own view.
pub struct ListView<'w, C> {
    meta: &'w ListMeta<C>,
    slot: Slot,
    base: *const u8,
    len: usize,
    env: &'w dyn Resolver<C>,
}

impl<'w, C> ListView<'w, C> {
    pub(crate) fn new(meta: &'w ListMeta<C>, slot: Slot, env: &'w dyn Resolver<C>) -> Self {
        // SAFETY: the slot points at a live value of the list shape.
        let (base, len) = unsafe { (meta.vtable.as_raw_parts)(slot.ptr().as_ptr()) };
        ListView {
            meta,
            slot,
            base,
            len,
            env,
        }
    }

    pub fn shape(&self) -> &'static Shape {
        self.meta.shape
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total capacity of the backing buffer.
    pub fn capacity(&self) -> usize {
        // SAFETY: the slot points at a live value of the list shape.
        unsafe { (self.meta.vtable.capacity)(self.slot.ptr().as_ptr()) }
    }

    /// The whole list value, when `T` is its exact type.
    pub fn get<T: Reflect>(&self) -> Option<&'w T> {
        if self.meta.shape.id != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: shape identity was just checked against T.
        Some(unsafe { self.slot.ptr().cast::<T>().as_ref() })
    }

    /// The `i`-th element. Elements inherit the list's addressability.
    ///
    /// # Panics
    /// Panics if `i` is out of range.
    pub fn elem(&self, i: usize) -> ElemView<'w, C> {
        assert!(i < self.len, "list index {i} out of range");
        // SAFETY: i is in range, so the offset stays inside the backing
        // buffer reported by the vtable.
        let ptr = unsafe { NonNull::new_unchecked(self.base.add(i * self.meta.elem_size) as *mut u8) };
        ElemView {
            shape: self.meta.elem_shape,
            slot: Slot::new(ptr, self.slot.can_addr()),
            f: &self.meta.elem,
            env: self.env,
        }
    }

    pub fn walk_elem(&self, ctx: &mut C, i: usize) -> WalkResult {
        self.elem(i).walk(ctx)
    }
}

// ============================================================================
// Pointers
// ============================================================================

pub(crate) struct PtrMeta<C> {
    pub(crate) shape: &'static Shape,
    pub(crate) pointee_shape: &'static Shape,
    pub(crate) shared: bool,
    pub(crate) deref: unsafe fn(*const u8) -> Option<NonNull<u8>>,
    pub(crate) target: Compiled<C>,
}

/// A pointer value.
pub struct PtrView<'w, C> {
    meta: &'w PtrMeta<C>,
    slot: Slot,
    target: Option<NonNull<u8>>,
    env: &'w dyn Resolver<C>,
}

impl<'w, C> PtrView<'w, C> {
    pub(crate) fn new(meta: &'w PtrMeta<C>, slot: Slot, env: &'w dyn Resolver<C>) -> Self {
        // SAFETY: the slot points at a live value of the pointer shape.
        let target = unsafe { (meta.deref)(slot.ptr().as_ptr()) };
        PtrView {
            meta,
            slot,
            target,
            env,
        }
    }

    pub fn shape(&self) -> &'static Shape {
        self.meta.shape
    }

    pub fn pointee_shape(&self) -> &'static Shape {
        self.meta.pointee_shape
    }

    pub fn is_nil(&self) -> bool {
        self.target.is_none()
    }

    /// Walks the pointed-to value. Shared targets (`Rc`, `Arc`) are
    /// never addressable; owned targets inherit the pointer's bit.
    ///
    /// # Panics
    /// Panics if the pointer is nil.
    pub fn walk(&self, ctx: &mut C) -> WalkResult {
        let target = self.target.expect("walked a nil pointer");
        let slot = self.slot.derived(target, !self.meta.shared);
        self.meta.target.call(ctx, slot, self.env)
    }

    /// The whole pointer value, when `T` is its exact type.
    pub fn get<T: Reflect>(&self) -> Option<&'w T> {
        if self.meta.shape.id != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: shape identity was just checked against T.
        Some(unsafe { self.slot.ptr().cast::<T>().as_ref() })
    }
}

// ============================================================================
// Maps
// ============================================================================

pub(crate) struct MapMeta<C> {
    pub(crate) shape: &'static Shape,
    pub(crate) key_shape: &'static Shape,
    pub(crate) value_shape: &'static Shape,
    pub(crate) vtable: &'static MapVTable,
    pub(crate) key_f: Compiled<C>,
    pub(crate) value_f: Compiled<C>,
}

/// A map value. Keys and values are never addressable.
pub struct MapView<'w, C> {
    meta: &'w MapMeta<C>,
    slot: Slot,
    env: &'w dyn Resolver<C>,
}

impl<'w, C> MapView<'w, C> {
    pub(crate) fn new(meta: &'w MapMeta<C>, slot: Slot, env: &'w dyn Resolver<C>) -> Self {
        MapView { meta, slot, env }
    }

    pub fn shape(&self) -> &'static Shape {
        self.meta.shape
    }

    pub fn key_shape(&self) -> &'static Shape {
        self.meta.key_shape
    }

    pub fn value_shape(&self) -> &'static Shape {
        self.meta.value_shape
    }

    pub fn len(&self) -> usize {
        // SAFETY: the slot points at a live value of the map shape.
        unsafe { (self.meta.vtable.len)(self.slot.ptr().as_ptr()) }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates the map's entries. The iteration order is whatever the
    /// underlying map yields.
    pub fn entries(&self) -> MapEntries<'w, C> {
        // SAFETY: the slot points at a live map that outlives the
        // iterator, whose lifetime is bounded by the handler call.
        let state = unsafe { (self.meta.vtable.iter_init)(self.slot.ptr().as_ptr()) };
        MapEntries {
            meta: self.meta,
            state,
            env: self.env,
        }
    }

    /// The whole map value, when `T` is its exact type.
    pub fn get<T: Reflect>(&self) -> Option<&'w T> {
        if self.meta.shape.id != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: shape identity was just checked against T.
        Some(unsafe { self.slot.ptr().cast::<T>().as_ref() })
    }
}

/// Iterator over a map's entries.
pub struct MapEntries<'w, C> {
    meta: &'w MapMeta<C>,
    state: *mut u8,
    env: &'w dyn Resolver<C>,
}

impl<'w, C> Iterator for MapEntries<'w, C> {
    type Item = MapEntryView<'w, C>;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: state comes from iter_init on a map that is still live.
        let (key, value) = unsafe { (self.meta.vtable.iter_next)(self.state) }?;
        Some(MapEntryView {
            meta: self.meta,
            key,
            value,
            env: self.env,
        })
    }
}

impl<C> Drop for MapEntries<'_, C> {
    fn drop(&mut self) {
        // SAFETY: state comes from iter_init and is not used again.
        unsafe { (self.meta.vtable.iter_drop)(self.state) }
    }
}

/// One map entry. Neither side is addressable.
pub struct MapEntryView<'w, C> {
    meta: &'w MapMeta<C>,
    key: NonNull<u8>,
    value: NonNull<u8>,
    env: &'w dyn Resolver<C>,
}

impl<'w, C> MapEntryView<'w, C> {
    pub fn key_shape(&self) -> &'static Shape {
        self.meta.key_shape
    }

    pub fn value_shape(&self) -> &'static Shape {
        self.meta.value_shape
    }

    /// The entry's key, when `T` is its exact type.
    pub fn key<T: Reflect>(&self) -> Option<&'w T> {
        if self.meta.key_shape.id != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: shape identity was just checked against T.
        Some(unsafe { self.key.cast::<T>().as_ref() })
    }

    /// The entry's value, when `T` is its exact type.
    pub fn value<T: Reflect>(&self) -> Option<&'w T> {
        if self.meta.value_shape.id != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: shape identity was just checked against T.
        Some(unsafe { self.value.cast::<T>().as_ref() })
    }

    pub fn walk_key(&self, ctx: &mut C) -> WalkResult {
        self.meta.key_f.call(ctx, Slot::new(self.key, false), self.env)
    }

    pub fn walk_value(&self, ctx: &mut C) -> WalkResult {
        self.meta
            .value_f
            .call(ctx, Slot::new(self.value, false), self.env)
    }
}

// ============================================================================
// Dynamics
// ============================================================================

pub(crate) struct DynMeta {
    pub(crate) shape: &'static Shape,
    pub(crate) unwrap: unsafe fn(*const u8) -> Option<(&'static Shape, NonNull<u8>)>,
}

/// A dynamic (shape-erased) value. Its walker is looked up by the
/// stored value's concrete shape at traversal time.
pub struct DynView<'w, C> {
    meta: &'w DynMeta,
    slot: Slot,
    target: Option<(&'static Shape, NonNull<u8>)>,
    env: &'w dyn Resolver<C>,
}

impl<'w, C> DynView<'w, C> {
    pub(crate) fn new(meta: &'w DynMeta, slot: Slot, env: &'w dyn Resolver<C>) -> Self {
        // SAFETY: the slot points at a live value of the dynamic shape.
        let target = unsafe { (meta.unwrap)(slot.ptr().as_ptr()) };
        DynView {
            meta,
            slot,
            target,
            env,
        }
    }

    pub fn shape(&self) -> &'static Shape {
        self.meta.shape
    }

    pub fn is_nil(&self) -> bool {
        self.target.is_none()
    }

    /// Shape of the stored value, if any.
    pub fn concrete_shape(&self) -> Option<&'static Shape> {
        self.target.map(|(shape, _)| shape)
    }

    /// The stored value, when one is present and `T` is its exact type.
    pub fn get<T: Reflect>(&self) -> Option<&'w T> {
        let (shape, ptr) = self.target?;
        if shape.id != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: shape identity was just checked against T.
        Some(unsafe { ptr.cast::<T>().as_ref() })
    }

    /// Resolves the stored value's walker and runs it. The payload
    /// inherits the dynamic slot's addressability.
    ///
    /// Returns [`WalkError::NilDynamic`] when the slot is empty.
    pub fn walk(&self, ctx: &mut C) -> WalkResult {
        let (shape, ptr) = self.target.ok_or(WalkError::NilDynamic {
            shape: self.meta.shape,
        })?;
        let f = self.env.resolve_fn(shape)?;
        f.call(ctx, self.slot.derived(ptr, true), self.env)
    }
}
