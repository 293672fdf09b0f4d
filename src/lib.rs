//! # shapewalk
//!
//! Compiled per-type value traversal over runtime shape descriptors.
//!
//! A [`Registry`] records compile callbacks per structural [`Kind`]
//! (plus exact-type overrides); a [`Walker`] or [`SharedWalker`] built
//! from it compiles one specialized walk function per distinct type,
//! memoized by type identity, and hands handlers typed views over the
//! values they visit. Types opt in through [`Reflect`], either via the
//! built-in implementations (scalars, arrays, `Vec`, `Box`, `Option`,
//! `Rc`/`Arc`, maps, [`Dynamic`]) or the [`reflect_struct!`] and
//! [`reflect_transparent!`] macros.
//!
//! ```
//! use shapewalk::{Registry, Walker, reflect_struct};
//!
//! struct Point {
//!     x: i64,
//!     y: i64,
//! }
//! reflect_struct!(Point { x: i64, y: i64 });
//!
//! let mut registry = Registry::<i64>::new();
//! registry.compile_i64(|_shape| {
//!     Box::new(|sum, leaf| {
//!         *sum += *leaf.get();
//!         Ok(())
//!     })
//! });
//! registry.compile_struct(|_shape, fields| {
//!     fields.register(0);
//!     fields.register(1);
//!     Ok(Box::new(|sum, view| {
//!         for i in 0..view.num_fields() {
//!             view.walk_field(sum, i)?;
//!         }
//!         Ok(())
//!     }))
//! });
//!
//! let walker = Walker::new(&registry);
//! let mut sum = 0i64;
//! walker.walk(&mut sum, &Point { x: 40, y: 2 }).unwrap();
//! assert_eq!(sum, 42);
//! ```

// --- kinds and shapes ---
mod kind;
pub use kind::Kind;
mod shape;
pub use shape::{
    ArrayDef, Def, DynamicDef, DynamicVTable, FieldDef, Indirection, ListDef, ListVTable, MapDef,
    MapVTable, PointerDef, PointerVTable, Shape, ShapeFn, StructDef,
};

// --- reflection ---
mod reflect;
pub use reflect::{shape_of, Reflect};
mod dynamic;
pub use dynamic::{AnyReflect, Dynamic};

// --- slots ---
mod slot;
pub use slot::{Leaf, Slot};

// --- errors ---
mod errors;
pub use errors::WalkError;

// --- registration ---
mod registry;
pub use registry::{
    ArrayWalkFn, DynamicWalkFn, FieldRegistry, LeafWalkFn, ListWalkFn, MapWalkFn, PointerWalkFn,
    Registry, StructWalkFn, WalkResult,
};

// --- compilation ---
mod compile;

// --- views ---
mod views;
pub use views::{
    ArrayView, DynView, ElemView, FieldView, ListView, MapEntries, MapEntryView, MapView, PtrView,
    StructView,
};

// --- walkers ---
mod walker;
pub use walker::{SharedWalker, TypedWalker, Walker};
