//! Structural categories of walkable types.

use std::fmt;

/// The structural category of a type.
///
/// Kind handlers are registered per kind and compile a walker for every
/// type sharing that kind; `#[repr(transparent)]` newtypes declared via
/// [`reflect_transparent!`](crate::reflect_transparent) keep the kind of
/// their representation while remaining distinct types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Kind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    I128,
    Isize,
    U8,
    U16,
    U32,
    U64,
    U128,
    Usize,
    F32,
    F64,
    Char,
    String,
    Unit,
    Struct,
    Array,
    List,
    Pointer,
    Map,
    Dynamic,
}

impl Kind {
    /// Number of kinds, the size of the per-kind handler table.
    pub const COUNT: usize = 24;

    /// Dense index into the handler table.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether walkers of this kind close over dependent walkers
    /// (element, field, key/value) rather than visiting a leaf.
    pub const fn is_aggregate(self) -> bool {
        matches!(
            self,
            Kind::Struct | Kind::Array | Kind::List | Kind::Pointer | Kind::Map | Kind::Dynamic
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Bool => "bool",
            Kind::I8 => "i8",
            Kind::I16 => "i16",
            Kind::I32 => "i32",
            Kind::I64 => "i64",
            Kind::I128 => "i128",
            Kind::Isize => "isize",
            Kind::U8 => "u8",
            Kind::U16 => "u16",
            Kind::U32 => "u32",
            Kind::U64 => "u64",
            Kind::U128 => "u128",
            Kind::Usize => "usize",
            Kind::F32 => "f32",
            Kind::F64 => "f64",
            Kind::Char => "char",
            Kind::String => "string",
            Kind::Unit => "unit",
            Kind::Struct => "struct",
            Kind::Array => "array",
            Kind::List => "list",
            Kind::Pointer => "pointer",
            Kind::Map => "map",
            Kind::Dynamic => "dynamic",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_are_dense() {
        assert_eq!(Kind::Bool.index(), 0);
        assert_eq!(Kind::Dynamic.index(), Kind::COUNT - 1);
    }

    #[test]
    fn aggregates() {
        assert!(Kind::Map.is_aggregate());
        assert!(Kind::Dynamic.is_aggregate());
        assert!(!Kind::I64.is_aggregate());
        assert!(!Kind::String.is_aggregate());
    }
}
