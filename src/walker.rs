//! Walker entry points: the single-owner [`Walker`], the thread-safe
//! [`SharedWalker`], and the statically resolved [`TypedWalker`].

use std::any::TypeId;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::ptr::NonNull;

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;

use crate::compile::{Compiled, Compiler, Resolver};
use crate::dynamic::AnyReflect;
use crate::errors::WalkError;
use crate::reflect::Reflect;
use crate::registry::{Registry, WalkResult};
use crate::shape::Shape;
use crate::slot::Slot;

/// A single-owner walker.
///
/// Compiles walkers lazily, memoized by type identity, from a snapshot
/// of the registry taken at construction. Not `Sync`; use
/// [`SharedWalker`] to share one cache across threads.
pub struct Walker<C> {
    compiler: RefCell<Compiler<C>>,
}

impl<C: 'static> Walker<C> {
    pub fn new(registry: &Registry<C>) -> Self {
        Walker {
            compiler: RefCell::new(Compiler::new(registry)),
        }
    }

    /// Walks a value read-only: no slot reached from this root is
    /// addressable.
    pub fn walk<T: Reflect>(&self, ctx: &mut C, value: &T) -> WalkResult {
        self.walk_slot(ctx, T::shape(), NonNull::from(value).cast(), false)
    }

    /// Walks a value for mutation: the root is addressable, and slots
    /// reached through exclusive steps stay so.
    pub fn walk_mut<T: Reflect>(&self, ctx: &mut C, value: &mut T) -> WalkResult {
        self.walk_slot(ctx, T::shape(), NonNull::from(value).cast(), true)
    }

    /// Walks a shape-erased value read-only.
    pub fn walk_any(&self, ctx: &mut C, value: &dyn AnyReflect) -> WalkResult {
        self.walk_slot(ctx, value.reflect_shape(), NonNull::from(value).cast(), false)
    }

    /// Walks a shape-erased value for mutation.
    pub fn walk_any_mut(&self, ctx: &mut C, value: &mut dyn AnyReflect) -> WalkResult {
        self.walk_slot(ctx, value.reflect_shape(), NonNull::from(value).cast(), true)
    }

    /// Resolves the walker for `T` once, for repeated traversals
    /// without the per-walk cache lookup.
    pub fn for_type<T: Reflect>(&self) -> Result<TypedWalker<'_, C, T>, WalkError> {
        Ok(TypedWalker {
            f: self.resolve_fn(T::shape())?,
            env: self,
            _marker: PhantomData,
        })
    }

    fn walk_slot(
        &self,
        ctx: &mut C,
        shape: &'static Shape,
        ptr: NonNull<u8>,
        can_addr: bool,
    ) -> WalkResult {
        let f = self.resolve_fn(shape)?;
        f.call(ctx, Slot::new(ptr, can_addr), self)
    }
}

impl<C: 'static> Resolver<C> for Walker<C> {
    fn resolve_fn(&self, shape: &'static Shape) -> Result<Compiled<C>, WalkError> {
        // The borrow is released before any handler runs, so dynamic
        // resolution during a walk re-enters without conflict.
        self.compiler.borrow_mut().resolve(shape)
    }
}

/// A thread-safe walker sharing one compiled-walker cache.
///
/// Reads go through a lock-free published map; a miss takes the compile
/// lock, re-checks, compiles through the inner compiler, and publishes
/// everything it compiled. Each type is compiled at most once, and all
/// callers observe the identical walker.
pub struct SharedWalker<C> {
    published: DashMap<TypeId, Compiled<C>, FxBuildHasher>,
    inner: Mutex<Compiler<C>>,
}

impl<C: 'static> SharedWalker<C> {
    pub fn new(registry: &Registry<C>) -> Self {
        let inner = Compiler::new(registry);
        let published = DashMap::default();
        // Exact-type overrides are ready immediately.
        for (id, f) in inner.compiled_entries() {
            published.insert(id, f.clone());
        }
        SharedWalker {
            published,
            inner: Mutex::new(inner),
        }
    }

    /// Walks a value read-only.
    pub fn walk<T: Reflect>(&self, ctx: &mut C, value: &T) -> WalkResult {
        self.walk_slot(ctx, T::shape(), NonNull::from(value).cast(), false)
    }

    /// Walks a value for mutation.
    pub fn walk_mut<T: Reflect>(&self, ctx: &mut C, value: &mut T) -> WalkResult {
        self.walk_slot(ctx, T::shape(), NonNull::from(value).cast(), true)
    }

    /// Walks a shape-erased value read-only.
    pub fn walk_any(&self, ctx: &mut C, value: &dyn AnyReflect) -> WalkResult {
        self.walk_slot(ctx, value.reflect_shape(), NonNull::from(value).cast(), false)
    }

    /// Walks a shape-erased value for mutation.
    pub fn walk_any_mut(&self, ctx: &mut C, value: &mut dyn AnyReflect) -> WalkResult {
        self.walk_slot(ctx, value.reflect_shape(), NonNull::from(value).cast(), true)
    }

    /// Resolves the walker for `T` once.
    pub fn for_type<T: Reflect>(&self) -> Result<TypedWalker<'_, C, T>, WalkError> {
        Ok(TypedWalker {
            f: self.resolve_fn(T::shape())?,
            env: self,
            _marker: PhantomData,
        })
    }

    fn walk_slot(
        &self,
        ctx: &mut C,
        shape: &'static Shape,
        ptr: NonNull<u8>,
        can_addr: bool,
    ) -> WalkResult {
        let f = self.resolve_fn(shape)?;
        f.call(ctx, Slot::new(ptr, can_addr), self)
    }
}

impl<C: 'static> Resolver<C> for SharedWalker<C> {
    fn resolve_fn(&self, shape: &'static Shape) -> Result<Compiled<C>, WalkError> {
        if let Some(f) = self.published.get(&shape.id) {
            return Ok(f.clone());
        }
        let mut inner = self.inner.lock();
        // Another thread may have compiled it while we waited.
        if let Some(f) = self.published.get(&shape.id) {
            return Ok(f.clone());
        }
        let compiled = inner.resolve(shape)?;
        for (id, f) in inner.compiled_entries() {
            self.published.entry(id).or_insert_with(|| f.clone());
        }
        Ok(compiled)
    }
}

/// A walker resolved once for one static type.
pub struct TypedWalker<'w, C, T> {
    f: Compiled<C>,
    env: &'w dyn Resolver<C>,
    _marker: PhantomData<fn(&mut T)>,
}

impl<C: 'static, T: Reflect> TypedWalker<'_, C, T> {
    /// Walks the value for mutation; the root is addressable.
    pub fn walk(&self, ctx: &mut C, value: &mut T) -> WalkResult {
        self.f
            .call(ctx, Slot::new(NonNull::from(value).cast(), true), self.env)
    }

    /// Walks the value read-only.
    pub fn walk_ref(&self, ctx: &mut C, value: &T) -> WalkResult {
        self.f
            .call(ctx, Slot::new(NonNull::from(value).cast(), false), self.env)
    }
}
