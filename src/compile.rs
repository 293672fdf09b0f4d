//! The walker compiler: resolves shapes to compiled walk functions,
//! memoized by type identity, with cycle-breaking cache reservation.

use std::any::TypeId;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::WalkError;
use crate::kind::Kind;
use crate::registry::{KindEntry, Registry, WalkFn, WalkResult};
use crate::shape::{Def, Indirection, Shape};
use crate::slot::Slot;
use crate::views::{
    ArrayMeta, ArrayView, DynMeta, DynView, FieldMeta, ListMeta, ListView, MapMeta, MapView,
    PtrMeta, PtrView, StructMeta, StructView,
};

/// Walk-time access back into the walker's cache, used by dynamic
/// values to reach the walker for their concrete shape.
pub(crate) trait Resolver<C> {
    fn resolve_fn(&self, shape: &'static Shape) -> Result<Compiled<C>, WalkError>;
}

/// A cache cell holding a walker that may still be under construction.
///
/// Cells are reserved before their walker is built, so recursive types
/// find the cell for an enclosing resolve and terminate; the cell is
/// filled once the whole closure tree below it is assembled.
pub(crate) struct Compiled<C> {
    cell: Arc<OnceLock<WalkFn<C>>>,
}

impl<C> Clone for Compiled<C> {
    fn clone(&self) -> Self {
        Compiled {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<C> Compiled<C> {
    fn unfilled() -> Self {
        Compiled {
            cell: Arc::new(OnceLock::new()),
        }
    }

    fn filled(f: WalkFn<C>) -> Self {
        let this = Self::unfilled();
        this.fill(f);
        this
    }

    fn fill(&self, f: WalkFn<C>) {
        if self.cell.set(f).is_err() {
            panic!("walker cell filled twice");
        }
    }

    pub(crate) fn call(&self, ctx: &mut C, slot: Slot, env: &dyn Resolver<C>) -> WalkResult {
        let f = self
            .cell
            .get()
            .expect("walker invoked before its compilation finished");
        f(ctx, slot, env)
    }
}

/// The compile algorithm shared by both walker types. Holds the
/// registry snapshot and the per-type cache.
pub(crate) struct Compiler<C> {
    cache: FxHashMap<TypeId, Compiled<C>>,
    kind_fns: [Option<KindEntry<C>>; Kind::COUNT],
    /// Cells reserved by the resolve currently on the stack, removed
    /// again if it fails.
    in_flight: Vec<TypeId>,
    depth: usize,
}

impl<C: 'static> Compiler<C> {
    pub(crate) fn new(registry: &Registry<C>) -> Self {
        let mut cache = FxHashMap::default();
        for (&id, f) in &registry.overrides {
            cache.insert(id, Compiled::filled(f.clone()));
        }
        Compiler {
            cache,
            kind_fns: registry.kind_fns.clone(),
            in_flight: Vec::new(),
            depth: 0,
        }
    }

    /// All cached walkers. Only meaningful between top-level resolves,
    /// when every cached cell is filled.
    pub(crate) fn compiled_entries(&self) -> impl Iterator<Item = (TypeId, &Compiled<C>)> {
        self.cache.iter().map(|(&id, c)| (id, c))
    }

    /// Resolves the compiled walker for a shape, compiling it and its
    /// dependents on first use.
    ///
    /// Failures are not cached: every cell reserved under a failed
    /// top-level resolve is rolled back, so a later resolve retries
    /// from scratch.
    pub(crate) fn resolve(&mut self, shape: &'static Shape) -> Result<Compiled<C>, WalkError> {
        if let Some(compiled) = self.cache.get(&shape.id) {
            return Ok(compiled.clone());
        }
        log::trace!("compiling walker for {shape} (kind {})", shape.kind);
        let cell = Compiled::unfilled();
        self.cache.insert(shape.id, cell.clone());
        self.in_flight.push(shape.id);
        self.depth += 1;
        let built = self.build(shape);
        self.depth -= 1;
        match built {
            Ok(f) => {
                cell.fill(f);
                if self.depth == 0 {
                    self.in_flight.clear();
                }
                Ok(cell)
            }
            Err(err) => {
                if self.depth == 0 {
                    log::debug!("compilation of {shape} failed, rolling back: {err}");
                    for id in self.in_flight.drain(..) {
                        self.cache.remove(&id);
                    }
                }
                Err(err)
            }
        }
    }

    fn build(&mut self, shape: &'static Shape) -> Result<WalkFn<C>, WalkError> {
        let entry = self.kind_fns[shape.kind.index()]
            .clone()
            .ok_or(WalkError::UnregisteredKind {
                kind: shape.kind,
                shape,
            })?;
        match entry {
            KindEntry::Leaf(compile) => Ok(compile(shape)),
            KindEntry::Struct(compile) => {
                let mut reg = crate::registry::FieldRegistry::new(shape);
                let handler = compile(shape, &mut reg)?;
                let paths = reg.into_paths();
                let mut fields = Vec::with_capacity(paths.len());
                for path in &paths {
                    let (plan, target) = FieldPlan::compute(shape, path)?;
                    let f = self.resolve(target)?;
                    fields.push(FieldMeta {
                        shape: target,
                        plan,
                        f,
                    });
                }
                let meta = Arc::new(StructMeta { shape, fields });
                let f: WalkFn<C> = Arc::new(move |ctx, slot, env| {
                    handler(ctx, StructView::new(&meta, slot, env))
                });
                Ok(f)
            }
            KindEntry::Array(compile) => {
                let Def::Array(ad) = &shape.def else {
                    panic!("array kind with non-array def on {shape}");
                };
                let handler = compile(shape)?;
                let elem_shape = (ad.elem)();
                let elem = self.resolve(elem_shape)?;
                let meta = Arc::new(ArrayMeta {
                    shape,
                    elem_shape,
                    elem_size: elem_shape.layout.size(),
                    len: ad.len,
                    elem,
                });
                let f: WalkFn<C> = Arc::new(move |ctx, slot, env| {
                    handler(ctx, ArrayView::new(&meta, slot, env))
                });
                Ok(f)
            }
            KindEntry::List(compile) => {
                let Def::List(ld) = &shape.def else {
                    panic!("list kind with non-list def on {shape}");
                };
                let handler = compile(shape)?;
                let elem_shape = (ld.elem)();
                let elem = self.resolve(elem_shape)?;
                let meta = Arc::new(ListMeta {
                    shape,
                    elem_shape,
                    elem_size: elem_shape.layout.size(),
                    vtable: ld.vtable,
                    elem,
                });
                let f: WalkFn<C> = Arc::new(move |ctx, slot, env| {
                    handler(ctx, ListView::new(&meta, slot, env))
                });
                Ok(f)
            }
            KindEntry::Pointer(compile) => {
                let Def::Pointer(pd) = &shape.def else {
                    panic!("pointer kind with non-pointer def on {shape}");
                };
                let handler = compile(shape)?;
                let pointee_shape = (pd.pointee)();
                let target = self.resolve(pointee_shape)?;
                let meta = Arc::new(PtrMeta {
                    shape,
                    pointee_shape,
                    shared: pd.indirection == Indirection::Shared,
                    deref: pd.vtable.deref,
                    target,
                });
                let f: WalkFn<C> = Arc::new(move |ctx, slot, env| {
                    handler(ctx, PtrView::new(&meta, slot, env))
                });
                Ok(f)
            }
            KindEntry::Map(compile) => {
                let Def::Map(md) = &shape.def else {
                    panic!("map kind with non-map def on {shape}");
                };
                let handler = compile(shape)?;
                let key_shape = (md.key)();
                let value_shape = (md.value)();
                let key_f = self.resolve(key_shape)?;
                let value_f = self.resolve(value_shape)?;
                let meta = Arc::new(MapMeta {
                    shape,
                    key_shape,
                    value_shape,
                    vtable: md.vtable,
                    key_f,
                    value_f,
                });
                let f: WalkFn<C> = Arc::new(move |ctx, slot, env| {
                    handler(ctx, MapView::new(&meta, slot, env))
                });
                Ok(f)
            }
            KindEntry::Dynamic(compile) => {
                let Def::Dynamic(dd) = &shape.def else {
                    panic!("dynamic kind with non-dynamic def on {shape}");
                };
                let handler = compile(shape)?;
                let meta = Arc::new(DynMeta {
                    shape,
                    unwrap: dd.vtable.unwrap,
                });
                let f: WalkFn<C> = Arc::new(move |ctx, slot, env| {
                    handler(ctx, DynView::new(&meta, slot, env))
                });
                Ok(f)
            }
        }
    }
}

/// One pointer crossing on a field's path.
#[derive(Debug)]
struct PlanHop {
    deref: unsafe fn(*const u8) -> Option<NonNull<u8>>,
    shared: bool,
    /// Offset applied after the dereference.
    offset: usize,
}

/// Precompiled route from a struct's base address to one registered
/// field: a head offset, then one hop per pointer crossed on the way to
/// a nested struct.
#[derive(Debug)]
pub(crate) struct FieldPlan {
    head: usize,
    hops: SmallVec<[PlanHop; 2]>,
}

impl FieldPlan {
    /// Computes the plan for a nested-index path rooted at `root`,
    /// returning it with the field's shape.
    pub(crate) fn compute(
        root: &'static Shape,
        path: &[usize],
    ) -> Result<(FieldPlan, &'static Shape), WalkError> {
        assert!(!path.is_empty(), "field path must not be empty");
        let mut plan = FieldPlan {
            head: 0,
            hops: SmallVec::new(),
        };
        let mut shape = root;
        for (depth, &index) in path.iter().enumerate() {
            if depth > 0 {
                // Step into nested structs through any pointers in the way.
                while let Def::Pointer(pd) = &shape.def {
                    let pointee = (pd.pointee)();
                    if !leads_to_struct(pointee) {
                        break;
                    }
                    plan.hops.push(PlanHop {
                        deref: pd.vtable.deref,
                        shared: pd.indirection == Indirection::Shared,
                        offset: 0,
                    });
                    shape = pointee;
                }
            }
            let fields = shape.struct_fields().ok_or(WalkError::NotAStruct { shape })?;
            let field = fields.get(index).ok_or(WalkError::FieldIndexOutOfBounds {
                index,
                field_count: fields.len(),
                shape,
            })?;
            plan.add_offset(field.offset);
            shape = (field.shape)();
        }
        Ok((plan, shape))
    }

    fn add_offset(&mut self, offset: usize) {
        match self.hops.last_mut() {
            Some(hop) => hop.offset += offset,
            None => self.head += offset,
        }
    }

    /// The field's slot within one instance, or `None` when a crossed
    /// pointer is nil. Shared crossings clear addressability.
    pub(crate) fn locate(&self, base: Slot) -> Option<Slot> {
        let mut slot = base.offset(self.head);
        for hop in &self.hops {
            // SAFETY: the slot holds a live value of the pointer type
            // recorded when the plan was computed.
            let target = unsafe { (hop.deref)(slot.ptr().as_ptr()) }?;
            slot = slot.derived(target, !hop.shared).offset(hop.offset);
        }
        Some(slot)
    }
}

fn leads_to_struct(mut shape: &'static Shape) -> bool {
    loop {
        match &shape.def {
            Def::Struct(_) => return true,
            Def::Pointer(pd) => shape = (pd.pointee)(),
            _ => return false,
        }
    }
}
