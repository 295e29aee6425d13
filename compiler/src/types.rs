//! The type system: canonical [`DataType`]s owned by [`crate::typetable::TypeTable`],
//! and [`QDataType`], a `(TypeId, Qualifiers)` pair used everywhere a typed
//! value is described (spec §3).

use crate::ast::{NodeId, Qualifiers};
use std::collections::HashMap;

/// Handle into `TypeTable::types`. Canonicalized: two structurally equal
/// `DataType`s (same kind/name/members) share one `TypeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Discriminant kind for a [`DataType`] (spec §3's variant list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Bool,
    SByte,
    Byte,
    Short,
    UShort,
    Char,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    Name,
    String,
    Null,
    Enum,
    Struct,
    Class,
    StaticArray,
    DynamicArray,
    ArrayRef,
    StrongPtr,
    WeakPtr,
    RawPtr,
    FuncPtr,
    Delegate,
}

impl TypeKind {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TypeKind::Bool
                | TypeKind::SByte
                | TypeKind::Byte
                | TypeKind::Short
                | TypeKind::UShort
                | TypeKind::Char
                | TypeKind::Int
                | TypeKind::UInt
                | TypeKind::Long
                | TypeKind::ULong
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, TypeKind::Float | TypeKind::Double)
    }

    pub fn is_number(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Small-integer promotion target for ADL fitness checks (spec §4.1.1).
    pub fn promotes_to_int(self) -> bool {
        matches!(
            self,
            TypeKind::Bool
                | TypeKind::Byte
                | TypeKind::SByte
                | TypeKind::Short
                | TypeKind::UShort
        )
    }

    pub fn is_pointer(self) -> bool {
        matches!(self, TypeKind::StrongPtr | TypeKind::WeakPtr | TypeKind::RawPtr)
    }

    pub fn is_array(self) -> bool {
        matches!(
            self,
            TypeKind::StaticArray | TypeKind::DynamicArray | TypeKind::ArrayRef
        )
    }
}

/// One member of a struct/class, in declaration order.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub byte_offset: u32,
    pub qualifiers: Qualifiers,
    /// Back-pointer to the `VarDecl`/`FuncDef` AST node that declared it.
    pub decl: NodeId,
    pub data_type: QDataType,
    /// Packed bit-field metadata: low 16 bits = size in bits, next 16 =
    /// shift (spec §4.4.1). `None` for ordinary members.
    pub bitfield: Option<u32>,
}

/// Complementary type family links (spec §3: "dynamic↔array-ref,
/// strong↔weak↔raw").
#[derive(Debug, Clone, Default)]
pub struct Complementary {
    pub dynamic_or_ref: Option<TypeId>,
    pub strong: Option<TypeId>,
    pub weak: Option<TypeId>,
    pub raw: Option<TypeId>,
}

/// Function-value shape for `FuncPtr`/`Delegate` types.
#[derive(Debug, Clone)]
pub struct FuncRef {
    pub args: Vec<QDataType>,
    pub ret: Option<QDataType>,
}

/// The canonical, immutable-after-finalization type description (spec §3).
#[derive(Debug, Clone)]
pub struct DataType {
    pub id: TypeId,
    pub kind: TypeKind,
    pub size: u32,
    pub align: u32,
    pub name: String,
    pub base_type: Option<TypeId>,
    pub elem_type: Option<TypeId>,
    pub array_dims: Vec<u32>,
    pub members: Vec<Member>,
    pub func_ref: Option<FuncRef>,
    pub complementary: Complementary,

    /// Program offset of the synthesized constructor, or `-1` if none.
    pub fun_ctor: i64,
    pub fun_dtor: i64,
    pub fun_assign: i64,
    pub fun_cmp: i64,
    pub vtbl_offset: i64,
    pub vtbl_size: u32,

    pub has_dtor: bool,
    pub native: bool,
    /// Declares its own `operator=` somewhere in the type/base chain. Known
    /// as soon as TypeGen walks the members, unlike `fun_assign` itself
    /// (that's a PC, only known once CodeGen has compiled every function).
    pub has_custom_assign: bool,
}

impl DataType {
    pub fn new(id: TypeId, kind: TypeKind, name: impl Into<String>) -> DataType {
        DataType {
            id,
            kind,
            size: 0,
            align: 1,
            name: name.into(),
            base_type: None,
            elem_type: None,
            array_dims: Vec::new(),
            members: Vec::new(),
            func_ref: None,
            complementary: Complementary::default(),
            fun_ctor: -1,
            fun_dtor: -1,
            fun_assign: -1,
            fun_cmp: -1,
            vtbl_offset: -1,
            vtbl_size: 0,
            has_dtor: false,
            native: false,
            has_custom_assign: false,
        }
    }

    /// Invariant from spec §3: if a destructor exists anywhere in the
    /// transitive membership or base chain, `has_dtor` must be true and
    /// `fun_dtor >= 0` once TypeGen has run.
    pub fn check_dtor_invariant(&self) -> bool {
        !self.has_dtor || self.fun_dtor >= 0
    }

    pub fn find_member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// A `DataType` reference plus qualifiers (spec §3). This is what every
/// typed AST node, member, and argument actually carries around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QDataType {
    pub type_id: TypeId,
    pub qualifiers: Qualifiers,
}

impl QDataType {
    pub fn new(type_id: TypeId, qualifiers: Qualifiers) -> QDataType {
        QDataType { type_id, qualifiers }
    }

    pub fn is_const(self) -> bool {
        self.qualifiers.contains(Qualifiers::CONST)
    }

    pub fn is_reference(self) -> bool {
        self.qualifiers.contains(Qualifiers::REFERENCE)
    }

    /// A borrow of a read-only location (spec §3 invariant).
    pub fn is_const_reference(self) -> bool {
        self.is_const() && self.is_reference()
    }

    pub fn with_qualifiers(self, add: Qualifiers) -> QDataType {
        QDataType {
            type_id: self.type_id,
            qualifiers: self.qualifiers.union(add),
        }
    }
}

/// Effect (stack-frame accounting) of a type's assign/ctor/dtor dispatch
/// family, shared by TypeGen and CodeGen to pick the right opcode table
/// entry for a given `TypeKind` (see `codegen/expr.rs`'s dispatch tables,
/// and `examples/original_source/.../CodeGenTables.h`).
pub type KindTable<T> = HashMap<TypeKind, T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtor_invariant_holds_for_fresh_type() {
        let dt = DataType::new(TypeId(0), TypeKind::Struct, "Empty");
        assert!(dt.check_dtor_invariant());
    }

    #[test]
    fn dtor_invariant_violated_without_assigned_offset() {
        let mut dt = DataType::new(TypeId(0), TypeKind::Struct, "Leaky");
        dt.has_dtor = true;
        assert!(!dt.check_dtor_invariant());
        dt.fun_dtor = 120;
        assert!(dt.check_dtor_invariant());
    }
}
