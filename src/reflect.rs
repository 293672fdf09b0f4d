//! The `Reflect` trait - how Rust types expose their shape - plus the
//! implementations for scalars and the standard containers, and the
//! macros that let user types opt in.

use std::alloc::Layout;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;

use crate::kind::Kind;
use crate::shape::{
    Def, Indirection, ListDef, ListVTable, MapDef, MapVTable, PointerDef, PointerVTable, Shape,
};

/// A type with a runtime shape descriptor.
///
/// # Safety
///
/// The returned shape must describe this exact type truthfully: the
/// layout, kind, field offsets, and every vtable function must match the
/// type's actual representation, and `kind` must agree with `def`. The
/// engine reads and writes raw memory based on these claims.
pub unsafe trait Reflect: Sized + 'static {
    /// The interned shape for this type.
    fn shape() -> &'static Shape;
}

/// Shorthand for `<T as Reflect>::shape()`.
pub fn shape_of<T: Reflect>() -> &'static Shape {
    T::shape()
}

macro_rules! leaf_reflect {
    ($($t:ty => $kind:expr),* $(,)?) => {$(
        unsafe impl Reflect for $t {
            fn shape() -> &'static Shape {
                Shape::intern(TypeId::of::<$t>(), || Shape {
                    id: TypeId::of::<$t>(),
                    type_name: std::any::type_name::<$t>(),
                    layout: Layout::new::<$t>(),
                    kind: $kind,
                    def: Def::Scalar,
                })
            }
        }
    )*};
}

leaf_reflect! {
    bool => Kind::Bool,
    i8 => Kind::I8,
    i16 => Kind::I16,
    i32 => Kind::I32,
    i64 => Kind::I64,
    i128 => Kind::I128,
    isize => Kind::Isize,
    u8 => Kind::U8,
    u16 => Kind::U16,
    u32 => Kind::U32,
    u64 => Kind::U64,
    u128 => Kind::U128,
    usize => Kind::Usize,
    f32 => Kind::F32,
    f64 => Kind::F64,
    char => Kind::Char,
    String => Kind::String,
    () => Kind::Unit,
}

// ============================================================================
// Arrays
// ============================================================================

unsafe impl<T: Reflect, const N: usize> Reflect for [T; N] {
    fn shape() -> &'static Shape {
        Shape::intern(TypeId::of::<Self>(), || Shape {
            id: TypeId::of::<Self>(),
            type_name: std::any::type_name::<Self>(),
            layout: Layout::new::<Self>(),
            kind: Kind::Array,
            def: Def::Array(crate::shape::ArrayDef { elem: T::shape, len: N }),
        })
    }
}

// ============================================================================
// Lists
// ============================================================================

/// # Safety
/// `value` must point to a live `Vec<T>`.
unsafe fn vec_raw_parts<T>(value: *const u8) -> (*const u8, usize) {
    // SAFETY: per the vtable contract.
    let v = unsafe { &*value.cast::<Vec<T>>() };
    (v.as_ptr().cast(), v.len())
}

/// # Safety
/// `value` must point to a live `Vec<T>`.
unsafe fn vec_capacity<T>(value: *const u8) -> usize {
    // SAFETY: per the vtable contract.
    unsafe { &*value.cast::<Vec<T>>() }.capacity()
}

#[allow(clippy::disallowed_methods)] // one vtable leak per instantiation
unsafe impl<T: Reflect> Reflect for Vec<T> {
    fn shape() -> &'static Shape {
        Shape::intern(TypeId::of::<Self>(), || Shape {
            id: TypeId::of::<Self>(),
            type_name: std::any::type_name::<Self>(),
            layout: Layout::new::<Self>(),
            kind: Kind::List,
            def: Def::List(ListDef {
                elem: T::shape,
                vtable: Box::leak(Box::new(ListVTable {
                    as_raw_parts: vec_raw_parts::<T>,
                    capacity: vec_capacity::<T>,
                })),
            }),
        })
    }
}

// ============================================================================
// Pointers
// ============================================================================

/// # Safety
/// `value` must point to a live `Box<T>`.
unsafe fn box_deref<T>(value: *const u8) -> Option<NonNull<u8>> {
    // SAFETY: per the vtable contract.
    let b = unsafe { &*value.cast::<Box<T>>() };
    Some(NonNull::from(&**b).cast())
}

/// # Safety
/// `value` must point to a live `Option<T>`.
unsafe fn option_deref<T>(value: *const u8) -> Option<NonNull<u8>> {
    // SAFETY: per the vtable contract.
    let o = unsafe { &*value.cast::<Option<T>>() };
    o.as_ref().map(|v| NonNull::from(v).cast())
}

/// # Safety
/// `value` must point to a live `Rc<T>`.
unsafe fn rc_deref<T>(value: *const u8) -> Option<NonNull<u8>> {
    // SAFETY: per the vtable contract.
    let r = unsafe { &*value.cast::<Rc<T>>() };
    Some(NonNull::from(&**r).cast())
}

/// # Safety
/// `value` must point to a live `Arc<T>`.
unsafe fn arc_deref<T>(value: *const u8) -> Option<NonNull<u8>> {
    // SAFETY: per the vtable contract.
    let a = unsafe { &*value.cast::<Arc<T>>() };
    Some(NonNull::from(&**a).cast())
}

macro_rules! pointer_reflect {
    ($($outer:ident<$t:ident> => $indirection:expr, $deref:ident),* $(,)?) => {$(
        #[allow(clippy::disallowed_methods)] // one vtable leak per instantiation
        unsafe impl<$t: Reflect> Reflect for $outer<$t> {
            fn shape() -> &'static Shape {
                Shape::intern(TypeId::of::<Self>(), || Shape {
                    id: TypeId::of::<Self>(),
                    type_name: std::any::type_name::<Self>(),
                    layout: Layout::new::<Self>(),
                    kind: Kind::Pointer,
                    def: Def::Pointer(PointerDef {
                        pointee: $t::shape,
                        indirection: $indirection,
                        vtable: Box::leak(Box::new(PointerVTable { deref: $deref::<$t> })),
                    }),
                })
            }
        }
    )*};
}

pointer_reflect! {
    Box<T> => Indirection::Owned, box_deref,
    Option<T> => Indirection::Inline, option_deref,
    Rc<T> => Indirection::Shared, rc_deref,
    Arc<T> => Indirection::Shared, arc_deref,
}

// ============================================================================
// Maps
// ============================================================================

/// # Safety
/// `value` must point to a live `HashMap<K, V>`.
unsafe fn hash_map_len<K, V>(value: *const u8) -> usize {
    // SAFETY: per the vtable contract.
    unsafe { &*value.cast::<HashMap<K, V>>() }.len()
}

/// # Safety
/// `value` must point to a live `HashMap<K, V>` that outlives the state.
unsafe fn hash_map_iter_init<K: 'static, V: 'static>(value: *const u8) -> *mut u8 {
    // SAFETY: per the vtable contract.
    let map = unsafe { &*value.cast::<HashMap<K, V>>() };
    let iter = map.iter();
    // SAFETY: lifetime-only transmute; the state never outlives the map,
    // since the map view that owns it lives within one traversal call.
    let iter: std::collections::hash_map::Iter<'static, K, V> =
        unsafe { std::mem::transmute(iter) };
    Box::into_raw(Box::new(iter)).cast()
}

/// # Safety
/// `state` must come from `hash_map_iter_init` on a live map.
unsafe fn hash_map_iter_next<K: 'static, V: 'static>(
    state: *mut u8,
) -> Option<(NonNull<u8>, NonNull<u8>)> {
    // SAFETY: per the vtable contract.
    let iter = unsafe { &mut *state.cast::<std::collections::hash_map::Iter<'static, K, V>>() };
    iter.next()
        .map(|(k, v)| (NonNull::from(k).cast(), NonNull::from(v).cast()))
}

/// # Safety
/// `state` must come from `hash_map_iter_init` and not be used afterwards.
unsafe fn hash_map_iter_drop<K: 'static, V: 'static>(state: *mut u8) {
    // SAFETY: per the vtable contract.
    drop(unsafe {
        Box::from_raw(state.cast::<std::collections::hash_map::Iter<'static, K, V>>())
    });
}

/// # Safety
/// `value` must point to a live `BTreeMap<K, V>`.
unsafe fn btree_map_len<K, V>(value: *const u8) -> usize {
    // SAFETY: per the vtable contract.
    unsafe { &*value.cast::<BTreeMap<K, V>>() }.len()
}

/// # Safety
/// `value` must point to a live `BTreeMap<K, V>` that outlives the state.
unsafe fn btree_map_iter_init<K: 'static, V: 'static>(value: *const u8) -> *mut u8 {
    // SAFETY: per the vtable contract.
    let map = unsafe { &*value.cast::<BTreeMap<K, V>>() };
    let iter = map.iter();
    // SAFETY: lifetime-only transmute, same argument as the hash map.
    let iter: std::collections::btree_map::Iter<'static, K, V> =
        unsafe { std::mem::transmute(iter) };
    Box::into_raw(Box::new(iter)).cast()
}

/// # Safety
/// `state` must come from `btree_map_iter_init` on a live map.
unsafe fn btree_map_iter_next<K: 'static, V: 'static>(
    state: *mut u8,
) -> Option<(NonNull<u8>, NonNull<u8>)> {
    // SAFETY: per the vtable contract.
    let iter = unsafe { &mut *state.cast::<std::collections::btree_map::Iter<'static, K, V>>() };
    iter.next()
        .map(|(k, v)| (NonNull::from(k).cast(), NonNull::from(v).cast()))
}

/// # Safety
/// `state` must come from `btree_map_iter_init` and not be used afterwards.
unsafe fn btree_map_iter_drop<K: 'static, V: 'static>(state: *mut u8) {
    // SAFETY: per the vtable contract.
    drop(unsafe {
        Box::from_raw(state.cast::<std::collections::btree_map::Iter<'static, K, V>>())
    });
}

macro_rules! map_reflect {
    ($($outer:ident, $len:ident, $init:ident, $next:ident, $drop:ident);* $(;)?) => {$(
        #[allow(clippy::disallowed_methods)] // one vtable leak per instantiation
        unsafe impl<K: Reflect, V: Reflect> Reflect for $outer<K, V> {
            fn shape() -> &'static Shape {
                Shape::intern(TypeId::of::<Self>(), || Shape {
                    id: TypeId::of::<Self>(),
                    type_name: std::any::type_name::<Self>(),
                    layout: Layout::new::<Self>(),
                    kind: Kind::Map,
                    def: Def::Map(MapDef {
                        key: K::shape,
                        value: V::shape,
                        vtable: Box::leak(Box::new(MapVTable {
                            len: $len::<K, V>,
                            iter_init: $init::<K, V>,
                            iter_next: $next::<K, V>,
                            iter_drop: $drop::<K, V>,
                        })),
                    }),
                })
            }
        }
    )*};
}

map_reflect! {
    HashMap, hash_map_len, hash_map_iter_init, hash_map_iter_next, hash_map_iter_drop;
    BTreeMap, btree_map_len, btree_map_iter_init, btree_map_iter_next, btree_map_iter_drop;
}

// ============================================================================
// User-type macros
// ============================================================================

/// Implements [`Reflect`] for a struct, declaring its walkable fields.
///
/// Field types are repeated so the macro can record their shape thunks;
/// offsets are taken with `core::mem::offset_of!`, so the declaration is
/// checked against the real field names.
///
/// ```
/// use shapewalk::reflect_struct;
///
/// struct Point {
///     x: i64,
///     y: i64,
/// }
/// reflect_struct!(Point { x: i64, y: i64 });
/// ```
#[macro_export]
macro_rules! reflect_struct {
    ($t:ty { $($field:ident : $ft:ty),+ $(,)? }) => {
        unsafe impl $crate::Reflect for $t {
            fn shape() -> &'static $crate::Shape {
                const FIELDS: &[$crate::FieldDef] = &[$(
                    $crate::FieldDef {
                        name: stringify!($field),
                        offset: ::core::mem::offset_of!($t, $field),
                        shape: <$ft as $crate::Reflect>::shape,
                    },
                )+];
                $crate::Shape::intern(::core::any::TypeId::of::<$t>(), || $crate::Shape {
                    id: ::core::any::TypeId::of::<$t>(),
                    type_name: ::core::any::type_name::<$t>(),
                    layout: ::core::alloc::Layout::new::<$t>(),
                    kind: $crate::Kind::Struct,
                    def: $crate::Def::Struct($crate::StructDef { fields: FIELDS }),
                })
            }
        }
    };
}

/// Implements [`Reflect`] for a `#[repr(transparent)]` newtype over a
/// scalar, keeping the representation's kind while remaining a distinct
/// type. This is how two types can share one kind handler yet compile to
/// two walkers.
///
/// The newtype must really be `#[repr(transparent)]` over the named
/// representation; the kind handler will read and write the value through
/// the representation type.
#[macro_export]
macro_rules! reflect_transparent {
    ($t:ty => $repr:ty) => {
        unsafe impl $crate::Reflect for $t {
            fn shape() -> &'static $crate::Shape {
                let repr = <$repr as $crate::Reflect>::shape();
                assert!(
                    !repr.kind.is_aggregate(),
                    "transparent reflection requires a scalar representation"
                );
                $crate::Shape::intern(::core::any::TypeId::of::<$t>(), || $crate::Shape {
                    id: ::core::any::TypeId::of::<$t>(),
                    type_name: ::core::any::type_name::<$t>(),
                    layout: ::core::alloc::Layout::new::<$t>(),
                    kind: repr.kind,
                    def: $crate::Def::Scalar,
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_shapes_have_matching_defs() {
        assert!(matches!(<Vec<i64>>::shape().def, Def::List(_)));
        assert!(matches!(<[u8; 4]>::shape().def, Def::Array(_)));
        assert!(matches!(<Box<i64>>::shape().def, Def::Pointer(_)));
        assert!(matches!(<Option<i64>>::shape().def, Def::Pointer(_)));
        assert!(matches!(<HashMap<String, i64>>::shape().def, Def::Map(_)));
    }

    #[test]
    fn pointer_indirection() {
        let Def::Pointer(pd) = &<Arc<i64>>::shape().def else {
            panic!("expected pointer def");
        };
        assert_eq!(pd.indirection, Indirection::Shared);

        let Def::Pointer(pd) = &<Box<i64>>::shape().def else {
            panic!("expected pointer def");
        };
        assert_eq!(pd.indirection, Indirection::Owned);
    }

    #[test]
    fn option_deref_reports_nil() {
        let some: Option<i64> = Some(7);
        let none: Option<i64> = None;
        let Def::Pointer(pd) = &<Option<i64>>::shape().def else {
            panic!("expected pointer def");
        };
        // SAFETY: pointers to live Option<i64> values.
        unsafe {
            assert!((pd.vtable.deref)((&some as *const Option<i64>).cast()).is_some());
            assert!((pd.vtable.deref)((&none as *const Option<i64>).cast()).is_none());
        }
    }
}
