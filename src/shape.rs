//! Shape - the runtime type descriptor walkers are compiled against.
//!
//! Shapes are interned once per Rust type and leaked, so every shape is a
//! comparable `&'static Shape` and `TypeId` serves as the cache key.
//! Shapes referenced from aggregate definitions (struct fields, list
//! elements, map keys/values, pointer targets) are stored as
//! `fn() -> &'static Shape` thunks rather than direct references; the
//! indirection is what lets self-referential types terminate.

use std::alloc::Layout;
use std::any::TypeId;
use std::fmt;
use std::ptr::NonNull;
use std::sync::{LazyLock, Mutex};

use rustc_hash::FxHashMap;

use crate::kind::Kind;

/// A deferred shape reference. Called lazily during walker compilation,
/// never while the intern lock is held.
pub type ShapeFn = fn() -> &'static Shape;

/// Runtime descriptor for one exact type.
///
/// Built by [`Reflect`](crate::Reflect) implementations and interned via
/// [`Shape::intern`]. The `kind` and `def` fields must agree; that
/// consistency is part of the `Reflect` safety contract.
pub struct Shape {
    /// Type identity; equal iff the same Rust type.
    pub id: TypeId,
    /// Diagnostic name, as produced by `core::any::type_name`.
    pub type_name: &'static str,
    /// Size and alignment of a value of this type.
    pub layout: Layout,
    /// Structural category, the handler-table index.
    pub kind: Kind,
    /// Kind-specific structure.
    pub def: Def,
}

/// Kind-specific structure of a shape.
pub enum Def {
    /// A leaf with no internal structure visible to the engine.
    Scalar,
    Struct(StructDef),
    Array(ArrayDef),
    List(ListDef),
    Pointer(PointerDef),
    Map(MapDef),
    Dynamic(DynamicDef),
}

/// One declared struct field.
pub struct FieldDef {
    pub name: &'static str,
    /// Byte offset within the struct.
    pub offset: usize,
    pub shape: ShapeFn,
}

pub struct StructDef {
    /// Declared fields, in declaration order.
    pub fields: &'static [FieldDef],
}

pub struct ArrayDef {
    pub elem: ShapeFn,
    pub len: usize,
}

pub struct ListDef {
    pub elem: ShapeFn,
    pub vtable: &'static ListVTable,
}

pub struct ListVTable {
    /// Returns the base pointer and length of the backing buffer.
    ///
    /// # Safety
    /// `value` must point to a live, initialized value of the list type.
    pub as_raw_parts: unsafe fn(value: *const u8) -> (*const u8, usize),
    /// Returns the total capacity of the backing buffer.
    ///
    /// # Safety
    /// `value` must point to a live, initialized value of the list type.
    pub capacity: unsafe fn(value: *const u8) -> usize,
}

/// Storage discipline of a pointer-kinded type, which determines how
/// addressability propagates through a dereference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indirection {
    /// Exclusively owned target (`Box`): inherits the parent's bit.
    Owned,
    /// Payload stored inline (`Option`): inherits the parent's bit.
    Inline,
    /// Shared target (`Rc`, `Arc`): never addressable.
    Shared,
}

pub struct PointerDef {
    pub pointee: ShapeFn,
    pub indirection: Indirection,
    pub vtable: &'static PointerVTable,
}

pub struct PointerVTable {
    /// Returns the target address, or `None` when the pointer is nil.
    ///
    /// # Safety
    /// `value` must point to a live, initialized value of the pointer type.
    pub deref: unsafe fn(value: *const u8) -> Option<NonNull<u8>>,
}

pub struct MapDef {
    pub key: ShapeFn,
    pub value: ShapeFn,
    pub vtable: &'static MapVTable,
}

pub struct MapVTable {
    /// # Safety
    /// `value` must point to a live, initialized value of the map type.
    pub len: unsafe fn(value: *const u8) -> usize,
    /// Allocates iteration state over the map's entries.
    ///
    /// # Safety
    /// `value` must point to a live map that outlives the state; the state
    /// must be released with `iter_drop`.
    pub iter_init: unsafe fn(value: *const u8) -> *mut u8,
    /// Advances the iteration, yielding (key, value) addresses.
    ///
    /// # Safety
    /// `state` must come from `iter_init` on a map that is still live.
    pub iter_next: unsafe fn(state: *mut u8) -> Option<(NonNull<u8>, NonNull<u8>)>,
    /// # Safety
    /// `state` must come from `iter_init` and not be used afterwards.
    pub iter_drop: unsafe fn(state: *mut u8),
}

pub struct DynamicDef {
    pub vtable: &'static DynamicVTable,
}

pub struct DynamicVTable {
    /// Reads the erased slot, yielding the concrete shape and the address
    /// of the concrete value, or `None` when the slot is empty.
    ///
    /// # Safety
    /// `value` must point to a live, initialized value of the dynamic type.
    pub unwrap: unsafe fn(value: *const u8) -> Option<(&'static Shape, NonNull<u8>)>,
}

/// Global intern table: one leaked shape per Rust type.
static SHAPES: LazyLock<Mutex<FxHashMap<TypeId, &'static Shape>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

impl Shape {
    /// Get or create the interned shape for the type identified by `id`.
    ///
    /// The build closure runs at most once per type for the lifetime of the
    /// process and its result is leaked. It is called with the intern lock
    /// held, so it must not intern other shapes — dependent shapes are
    /// recorded as [`ShapeFn`] thunks and resolved lazily instead.
    #[allow(clippy::disallowed_methods)] // one leak per type, cached forever
    pub fn intern(id: TypeId, build: impl FnOnce() -> Shape) -> &'static Shape {
        let mut shapes = SHAPES.lock().unwrap();
        if let Some(&shape) = shapes.get(&id) {
            return shape;
        }
        let shape: &'static Shape = Box::leak(Box::new(build()));
        debug_assert_eq!(shape.id, id);
        shapes.insert(id, shape);
        shape
    }

    /// Declared struct fields, if this is a struct shape.
    pub fn struct_fields(&self) -> Option<&'static [FieldDef]> {
        match &self.def {
            Def::Struct(sd) => Some(sd.fields),
            _ => None,
        }
    }
}

impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Shape {}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({}, {})", self.type_name, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use crate::reflect::Reflect;

    #[test]
    fn interning_returns_the_same_shape() {
        let a = <i64 as Reflect>::shape();
        let b = <i64 as Reflect>::shape();
        assert!(std::ptr::eq(a, b));

        let c = <u64 as Reflect>::shape();
        assert!(!std::ptr::eq(a, c));
        assert_ne!(a, c);
    }

    #[test]
    fn generic_instantiations_are_distinct() {
        let a = <Vec<i64> as Reflect>::shape();
        let b = <Vec<u8> as Reflect>::shape();
        assert!(!std::ptr::eq(a, b));
        assert!(std::ptr::eq(a, <Vec<i64> as Reflect>::shape()));
    }

    #[test]
    fn display_names() {
        assert!(<String as Reflect>::shape().to_string().contains("String"));
        assert!(<Vec<bool> as Reflect>::shape().to_string().contains("Vec"));
    }
}
