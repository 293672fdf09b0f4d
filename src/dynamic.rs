//! Dynamic - a nilable, shape-erased value slot - and the object-safe
//! `AnyReflect` capability it stores.

use std::alloc::Layout;
use std::any::{Any, TypeId};
use std::fmt;
use std::ptr::NonNull;

use crate::kind::Kind;
use crate::reflect::Reflect;
use crate::shape::{Def, DynamicDef, DynamicVTable, Shape};

/// Object-safe access to a reflectable value: its shape plus `Any`
/// downcasting. Blanket-implemented for every [`Reflect`] type.
pub trait AnyReflect: Any {
    fn reflect_shape(&self) -> &'static Shape;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Reflect> AnyReflect for T {
    fn reflect_shape(&self) -> &'static Shape {
        T::shape()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A nilable box holding any reflectable value, walked by dispatching to
/// the stored value's concrete walker at traversal time.
#[derive(Default)]
pub struct Dynamic {
    value: Option<Box<dyn AnyReflect>>,
}

impl Dynamic {
    /// Wraps a concrete value.
    pub fn new<T: Reflect>(value: T) -> Self {
        Dynamic {
            value: Some(Box::new(value)),
        }
    }

    /// The empty slot.
    pub fn none() -> Self {
        Dynamic { value: None }
    }

    pub fn is_none(&self) -> bool {
        self.value.is_none()
    }

    /// Shape of the stored value, if any.
    pub fn value_shape(&self) -> Option<&'static Shape> {
        self.value.as_deref().map(AnyReflect::reflect_shape)
    }

    pub fn downcast_ref<T: Reflect>(&self) -> Option<&T> {
        self.value.as_deref()?.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: Reflect>(&mut self) -> Option<&mut T> {
        self.value.as_deref_mut()?.as_any_mut().downcast_mut()
    }
}

impl fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value_shape() {
            Some(shape) => write!(f, "Dynamic({shape})"),
            None => f.write_str("Dynamic(none)"),
        }
    }
}

/// # Safety
/// `value` must point to a live `Dynamic`.
unsafe fn dynamic_unwrap(value: *const u8) -> Option<(&'static Shape, NonNull<u8>)> {
    // SAFETY: per the vtable contract.
    let d = unsafe { &*value.cast::<Dynamic>() };
    d.value.as_deref().map(|v| {
        let shape = v.reflect_shape();
        // Address of the concrete value behind the trait object.
        let ptr = NonNull::from(v).cast::<u8>();
        (shape, ptr)
    })
}

static DYNAMIC_VTABLE: DynamicVTable = DynamicVTable {
    unwrap: dynamic_unwrap,
};

unsafe impl Reflect for Dynamic {
    fn shape() -> &'static Shape {
        Shape::intern(TypeId::of::<Dynamic>(), || Shape {
            id: TypeId::of::<Dynamic>(),
            type_name: std::any::type_name::<Dynamic>(),
            layout: Layout::new::<Dynamic>(),
            kind: Kind::Dynamic,
            def: Def::Dynamic(DynamicDef {
                vtable: &DYNAMIC_VTABLE,
            }),
        })
    }
}
