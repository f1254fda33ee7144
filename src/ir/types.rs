//! SSA value types.
//!
//! The backend runs after user types have been decomposed into machine
//! scalars, so a small closed enum is enough: scalar integers and floats,
//! booleans, pointers, plus the two special types that thread ordering
//! through the graph — `Mem` for the memory chain and `Tuple` for
//! multi-result operations.

/// The type of an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// The memory pseudo-type; values of this type form the memory chain.
    Mem,
    /// A multi-result aggregate consumed by `Select0`/`Select1`.
    Tuple,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    /// A pointer into some addressable region.
    Ptr,
}

/// Pointer width in bytes. The backend targets 64-bit machines; the
/// allocator signature table scales its slot offsets by the configured
/// pointer size instead of this constant.
pub const PTR_SIZE: i64 = 8;

impl Type {
    /// Width in bytes of a load or store of this type. Zero for the
    /// pseudo-types, which never reach a width computation.
    pub fn size(self) -> i64 {
        match self {
            Type::Mem | Type::Tuple => 0,
            Type::Bool | Type::Int8 => 1,
            Type::Int16 => 2,
            Type::Int32 | Type::Float32 => 4,
            Type::Int64 | Type::Float64 => 8,
            Type::Ptr => PTR_SIZE,
        }
    }

    pub fn is_memory(self) -> bool {
        self == Type::Mem
    }

    pub fn is_tuple(self) -> bool {
        self == Type::Tuple
    }

    pub fn is_boolean(self) -> bool {
        self == Type::Bool
    }

    pub fn is_ptr_shaped(self) -> bool {
        self == Type::Ptr
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::Float32 | Type::Float64)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Type::Int8 | Type::Int16 | Type::Int32 | Type::Int64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(Type::Int64.size(), 8);
        assert_eq!(Type::Float32.size(), 4);
        assert_eq!(Type::Bool.size(), 1);
        assert_eq!(Type::Ptr.size(), PTR_SIZE);
        assert_eq!(Type::Mem.size(), 0);
    }

    #[test]
    fn categories() {
        assert!(Type::Mem.is_memory());
        assert!(Type::Ptr.is_ptr_shaped());
        assert!(Type::Float64.is_float());
        assert!(!Type::Float64.is_integer());
        assert!(Type::Int8.is_integer());
        assert!(Type::Bool.is_boolean());
    }
}
