//! Registry - the configuration object where compile callbacks and
//! exact-type overrides are recorded before a walker is built.

use std::any::TypeId;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::compile::Resolver;
use crate::errors::WalkError;
use crate::kind::Kind;
use crate::reflect::Reflect;
use crate::shape::Shape;
use crate::slot::{Leaf, Slot};
use crate::views::{ArrayView, DynView, ListView, MapView, PtrView, StructView};

/// Result of one walk step or one whole traversal.
pub type WalkResult = Result<(), WalkError>;

/// A compiled, type-specialized walker. The resolver argument is how
/// dynamic values reach back into the cache at traversal time.
pub(crate) type WalkFn<C> =
    Arc<dyn Fn(&mut C, Slot, &dyn Resolver<C>) -> WalkResult + Send + Sync>;

/// Walk function for one leaf value, produced by a leaf compile callback.
pub type LeafWalkFn<C, T> = Box<dyn Fn(&mut C, Leaf<'_, T>) -> WalkResult + Send + Sync>;
/// Walk function over a struct's registered fields.
pub type StructWalkFn<C> = Box<dyn Fn(&mut C, StructView<'_, C>) -> WalkResult + Send + Sync>;
/// Walk function over a fixed-length array.
pub type ArrayWalkFn<C> = Box<dyn Fn(&mut C, ArrayView<'_, C>) -> WalkResult + Send + Sync>;
/// Walk function over a growable list.
pub type ListWalkFn<C> = Box<dyn Fn(&mut C, ListView<'_, C>) -> WalkResult + Send + Sync>;
/// Walk function over a pointer value.
pub type PointerWalkFn<C> = Box<dyn Fn(&mut C, PtrView<'_, C>) -> WalkResult + Send + Sync>;
/// Walk function over a map's entries.
pub type MapWalkFn<C> = Box<dyn Fn(&mut C, MapView<'_, C>) -> WalkResult + Send + Sync>;
/// Walk function over a dynamic (shape-erased) value.
pub type DynamicWalkFn<C> = Box<dyn Fn(&mut C, DynView<'_, C>) -> WalkResult + Send + Sync>;

type LeafCompile<C> = Arc<dyn Fn(&'static Shape) -> WalkFn<C> + Send + Sync>;
type StructCompile<C> = Arc<
    dyn Fn(&'static Shape, &mut FieldRegistry) -> Result<StructWalkFn<C>, WalkError>
        + Send
        + Sync,
>;
type AggregateCompile<F> = Arc<dyn Fn(&'static Shape) -> Result<F, WalkError> + Send + Sync>;

/// One registered compile callback, indexed by kind.
pub(crate) enum KindEntry<C> {
    Leaf(LeafCompile<C>),
    Struct(StructCompile<C>),
    Array(AggregateCompile<ArrayWalkFn<C>>),
    List(AggregateCompile<ListWalkFn<C>>),
    Pointer(AggregateCompile<PointerWalkFn<C>>),
    Map(AggregateCompile<MapWalkFn<C>>),
    Dynamic(AggregateCompile<DynamicWalkFn<C>>),
}

impl<C> Clone for KindEntry<C> {
    fn clone(&self) -> Self {
        match self {
            KindEntry::Leaf(f) => KindEntry::Leaf(Arc::clone(f)),
            KindEntry::Struct(f) => KindEntry::Struct(Arc::clone(f)),
            KindEntry::Array(f) => KindEntry::Array(Arc::clone(f)),
            KindEntry::List(f) => KindEntry::List(Arc::clone(f)),
            KindEntry::Pointer(f) => KindEntry::Pointer(Arc::clone(f)),
            KindEntry::Map(f) => KindEntry::Map(Arc::clone(f)),
            KindEntry::Dynamic(f) => KindEntry::Dynamic(Arc::clone(f)),
        }
    }
}

fn erase_leaf<C: 'static, T: 'static>(f: LeafWalkFn<C, T>) -> WalkFn<C> {
    Arc::new(move |ctx, slot, _env| {
        // SAFETY: the compiler dispatches this walker only to slots whose
        // shape declares this leaf representation, and an addressable slot
        // is exclusively reachable by the traversal contract.
        let leaf = unsafe { Leaf::new(slot) };
        f(ctx, leaf)
    })
}

/// Compile callbacks and exact-type overrides for building walkers.
///
/// A walker snapshots the registry when it is constructed; registrations
/// made afterwards do not affect it. Nothing is validated at
/// registration time - a kind with no callback surfaces as
/// [`WalkError::UnregisteredKind`] when a walker for it is first needed.
pub struct Registry<C> {
    pub(crate) overrides: FxHashMap<TypeId, WalkFn<C>>,
    pub(crate) kind_fns: [Option<KindEntry<C>>; Kind::COUNT],
}

impl<C: 'static> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! leaf_compile_methods {
    ($($(#[$meta:meta])* $method:ident: $t:ty => $kind:expr;)*) => {$(
        $(#[$meta])*
        pub fn $method(
            &mut self,
            compile: impl Fn(&'static Shape) -> LeafWalkFn<C, $t> + Send + Sync + 'static,
        ) {
            self.kind_fns[$kind.index()] =
                Some(KindEntry::Leaf(Arc::new(move |shape| erase_leaf(compile(shape)))));
        }
    )*};
}

impl<C: 'static> Registry<C> {
    pub fn new() -> Self {
        Registry {
            overrides: FxHashMap::default(),
            kind_fns: std::array::from_fn(|_| None),
        }
    }

    /// Registers a finished walk function for one exact type, bypassing
    /// kind dispatch. The last registration for a type wins.
    pub fn walk_type<T: Reflect>(
        &mut self,
        f: impl Fn(&mut C, Leaf<'_, T>) -> WalkResult + Send + Sync + 'static,
    ) {
        self.overrides
            .insert(TypeId::of::<T>(), erase_leaf::<C, T>(Box::new(f)));
    }

    leaf_compile_methods! {
        /// Registers the compile callback for `bool`-kinded types.
        compile_bool: bool => Kind::Bool;
        compile_i8: i8 => Kind::I8;
        compile_i16: i16 => Kind::I16;
        compile_i32: i32 => Kind::I32;
        compile_i64: i64 => Kind::I64;
        compile_i128: i128 => Kind::I128;
        compile_isize: isize => Kind::Isize;
        compile_u8: u8 => Kind::U8;
        compile_u16: u16 => Kind::U16;
        compile_u32: u32 => Kind::U32;
        compile_u64: u64 => Kind::U64;
        compile_u128: u128 => Kind::U128;
        compile_usize: usize => Kind::Usize;
        compile_f32: f32 => Kind::F32;
        compile_f64: f64 => Kind::F64;
        compile_char: char => Kind::Char;
        /// Registers the compile callback for string-kinded types.
        compile_string: String => Kind::String;
        compile_unit: () => Kind::Unit;
    }

    /// Registers the compile callback for struct-kinded types. The
    /// callback declares the fields it wants through the
    /// [`FieldRegistry`]; unregistered fields are never visited.
    pub fn compile_struct(
        &mut self,
        compile: impl Fn(&'static Shape, &mut FieldRegistry) -> Result<StructWalkFn<C>, WalkError>
            + Send
            + Sync
            + 'static,
    ) {
        self.kind_fns[Kind::Struct.index()] = Some(KindEntry::Struct(Arc::new(compile)));
    }

    pub fn compile_array(
        &mut self,
        compile: impl Fn(&'static Shape) -> Result<ArrayWalkFn<C>, WalkError> + Send + Sync + 'static,
    ) {
        self.kind_fns[Kind::Array.index()] = Some(KindEntry::Array(Arc::new(compile)));
    }

    pub fn compile_list(
        &mut self,
        compile: impl Fn(&'static Shape) -> Result<ListWalkFn<C>, WalkError> + Send + Sync + 'static,
    ) {
        self.kind_fns[Kind::List.index()] = Some(KindEntry::List(Arc::new(compile)));
    }

    pub fn compile_pointer(
        &mut self,
        compile: impl Fn(&'static Shape) -> Result<PointerWalkFn<C>, WalkError>
            + Send
            + Sync
            + 'static,
    ) {
        self.kind_fns[Kind::Pointer.index()] = Some(KindEntry::Pointer(Arc::new(compile)));
    }

    pub fn compile_map(
        &mut self,
        compile: impl Fn(&'static Shape) -> Result<MapWalkFn<C>, WalkError> + Send + Sync + 'static,
    ) {
        self.kind_fns[Kind::Map.index()] = Some(KindEntry::Map(Arc::new(compile)));
    }

    pub fn compile_dynamic(
        &mut self,
        compile: impl Fn(&'static Shape) -> Result<DynamicWalkFn<C>, WalkError>
            + Send
            + Sync
            + 'static,
    ) {
        self.kind_fns[Kind::Dynamic.index()] = Some(KindEntry::Dynamic(Arc::new(compile)));
    }
}

/// Hands a struct compile callback the means to declare which fields its
/// walker visits, by declared index or by nested-index path.
///
/// Returned slots are positional: `field(i)` on the resulting
/// [`StructView`] refers to the `i`-th registration, in registration
/// order, not declaration order.
pub struct FieldRegistry {
    shape: &'static Shape,
    paths: Vec<SmallVec<[usize; 2]>>,
}

impl FieldRegistry {
    pub(crate) fn new(shape: &'static Shape) -> Self {
        FieldRegistry {
            shape,
            paths: Vec::new(),
        }
    }

    /// The struct shape being compiled.
    pub fn shape(&self) -> &'static Shape {
        self.shape
    }

    /// Registers a top-level field by declared index.
    pub fn register(&mut self, field: usize) -> usize {
        self.register_path(&[field])
    }

    /// Registers a nested field by index path. Pointers crossed on the
    /// way to an inner struct are dereferenced at walk time; a nil one
    /// makes the field invalid for that instance.
    ///
    /// Indices are validated when the walker is compiled, not here.
    ///
    /// # Panics
    /// Panics if `path` is empty.
    pub fn register_path(&mut self, path: &[usize]) -> usize {
        assert!(!path.is_empty(), "field path must not be empty");
        let slot = self.paths.len();
        self.paths.push(SmallVec::from_slice(path));
        slot
    }

    pub(crate) fn into_paths(self) -> Vec<SmallVec<[usize; 2]>> {
        self.paths
    }
}
