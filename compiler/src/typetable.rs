//! `TypeTable`: canonicalizes [`DataType`] values and owns per-type program
//! offsets (ctor/dtor/assign/cmp, vtable slot range) plus the complementary
//! families TypeGen synthesizes (spec §2, §4.2).

use crate::ast::Qualifiers;
use crate::types::{Complementary, DataType, QDataType, TypeId, TypeKind};
use std::collections::HashMap;

pub struct TypeTable {
    types: Vec<DataType>,
    /// Canonicalization index: structurally-identical primitive/array/
    /// pointer types resolve to the same `TypeId` instead of duplicating.
    by_signature: HashMap<String, TypeId>,
}

/// Stable word size for stack-frame accounting (spec glossary: "Word").
pub const WORD_SIZE: u32 = 8;

impl TypeTable {
    pub fn new() -> Self {
        let mut table = TypeTable {
            types: Vec::new(),
            by_signature: HashMap::new(),
        };
        table.register_builtins();
        table
    }

    fn register_builtins(&mut self) {
        use TypeKind::*;
        let builtins: &[(TypeKind, &str, u32, u32)] = &[
            (Void, "void", 0, 1),
            (Bool, "bool", 1, 1),
            (SByte, "sbyte", 1, 1),
            (Byte, "byte", 1, 1),
            (Short, "short", 2, 2),
            (UShort, "ushort", 2, 2),
            (Char, "char", 4, 4),
            (Int, "int", 4, 4),
            (UInt, "uint", 4, 4),
            (Long, "long", 8, 8),
            (ULong, "ulong", 8, 8),
            (Float, "float", 4, 4),
            (Double, "double", 8, 8),
            (Name, "name", 4, 4),
            (String, "string", WORD_SIZE, WORD_SIZE),
            (Null, "null_t", WORD_SIZE, WORD_SIZE),
        ];
        for &(kind, name, size, align) in builtins {
            let id = self.alloc_raw(kind, name);
            let dt = self.get_mut(id);
            dt.size = size;
            dt.align = align;
            self.by_signature.insert(format!("prim:{name}"), id);
        }
    }

    fn alloc_raw(&mut self, kind: TypeKind, name: impl Into<String>) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(DataType::new(id, kind, name));
        id
    }

    pub fn get(&self, id: TypeId) -> &DataType {
        &self.types[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut DataType {
        &mut self.types[id.0 as usize]
    }

    pub fn builtin(&self, name: &str) -> Option<TypeId> {
        self.by_signature.get(&format!("prim:{name}")).copied()
    }

    pub fn void(&self) -> TypeId {
        self.builtin("void").unwrap()
    }

    pub fn bool_(&self) -> TypeId {
        self.builtin("bool").unwrap()
    }

    pub fn int(&self) -> TypeId {
        self.builtin("int").unwrap()
    }

    pub fn float(&self) -> TypeId {
        self.builtin("float").unwrap()
    }

    pub fn double(&self) -> TypeId {
        self.builtin("double").unwrap()
    }

    pub fn string(&self) -> TypeId {
        self.builtin("string").unwrap()
    }

    /// Declare a new, empty struct/class type (members filled in by
    /// TypeGen's layout pass). Returns `None` if the name is taken.
    pub fn declare_aggregate(
        &mut self,
        name: &str,
        kind: TypeKind,
        base: Option<TypeId>,
    ) -> Option<TypeId> {
        let key = format!("agg:{name}");
        if self.by_signature.contains_key(&key) {
            return None;
        }
        let id = self.alloc_raw(kind, name);
        self.get_mut(id).base_type = base;
        self.by_signature.insert(key, id);
        Some(id)
    }

    pub fn find_aggregate(&self, name: &str) -> Option<TypeId> {
        self.by_signature.get(&format!("agg:{name}")).copied()
    }

    /// Canonical static-array type `elem[dim0][dim1]...`.
    pub fn static_array(&mut self, elem: TypeId, dims: Vec<u32>) -> TypeId {
        let key = format!("arr:{}:{:?}", elem.0, dims);
        if let Some(&id) = self.by_signature.get(&key) {
            return id;
        }
        let elem_dt = self.get(elem).clone();
        let count: u32 = dims.iter().product::<u32>().max(1);
        let id = self.alloc_raw(TypeKind::StaticArray, format!("{}[]", elem_dt.name));
        let dt = self.get_mut(id);
        dt.elem_type = Some(elem);
        dt.array_dims = dims;
        dt.size = count * elem_dt.size;
        dt.align = elem_dt.align;
        self.by_signature.insert(key, id);
        id
    }

    /// Canonical dynamic-array type, plus its complementary array-ref
    /// (spec §4.2.4: "synthesize a companion array-ref type").
    pub fn dynamic_array(&mut self, elem: TypeId) -> TypeId {
        let key = format!("dynarr:{}", elem.0);
        if let Some(&id) = self.by_signature.get(&key) {
            return id;
        }
        let id = self.alloc_raw(TypeKind::DynamicArray, "array");
        {
            let dt = self.get_mut(id);
            dt.elem_type = Some(elem);
            dt.size = 3 * WORD_SIZE; // data ptr + size + reserved
            dt.align = WORD_SIZE;
        }
        let ref_id = self.array_ref(elem);
        self.get_mut(id).complementary.dynamic_or_ref = Some(ref_id);
        self.get_mut(ref_id).complementary.dynamic_or_ref = Some(id);
        self.by_signature.insert(key, id);
        id
    }

    pub fn array_ref(&mut self, elem: TypeId) -> TypeId {
        let key = format!("arrref:{}", elem.0);
        if let Some(&id) = self.by_signature.get(&key) {
            return id;
        }
        let id = self.alloc_raw(TypeKind::ArrayRef, "array_ref");
        let dt = self.get_mut(id);
        dt.elem_type = Some(elem);
        dt.size = 2 * WORD_SIZE; // data ptr + length
        dt.align = WORD_SIZE;
        self.by_signature.insert(key, id);
        id
    }

    /// Synthesize the strong/weak/raw pointer family for a class type,
    /// cross-linked via `complementary` (spec §4.2.3).
    pub fn pointer_family(&mut self, class: TypeId) -> (TypeId, TypeId, TypeId) {
        let class_name = self.get(class).name.clone();
        let key = format!("ptrfam:{}", class.0);
        if let Some(&strong) = self.by_signature.get(&key) {
            let c = self.get(strong).complementary.clone();
            return (strong, c.weak.unwrap(), c.raw.unwrap());
        }

        let strong = self.alloc_raw(TypeKind::StrongPtr, format!("{class_name}^"));
        let weak = self.alloc_raw(TypeKind::WeakPtr, format!("{class_name}`"));
        let raw = self.alloc_raw(TypeKind::RawPtr, format!("{class_name}@"));
        for id in [strong, weak, raw] {
            let dt = self.get_mut(id);
            dt.elem_type = Some(class);
            dt.size = WORD_SIZE;
            dt.align = WORD_SIZE;
        }
        let comp = Complementary {
            dynamic_or_ref: None,
            strong: Some(strong),
            weak: Some(weak),
            raw: Some(raw),
        };
        self.get_mut(strong).complementary = comp.clone();
        self.get_mut(weak).complementary = comp.clone();
        self.get_mut(raw).complementary = comp;
        self.by_signature.insert(key, strong);
        (strong, weak, raw)
    }

    pub fn qualified(&self, id: TypeId, qualifiers: Qualifiers) -> QDataType {
        QDataType::new(id, qualifiers)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataType> {
        self.types.iter()
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        TypeTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_preregistered_with_correct_sizes() {
        let table = TypeTable::new();
        assert_eq!(table.get(table.int()).size, 4);
        assert_eq!(table.get(table.double()).size, 8);
    }

    #[test]
    fn dynamic_array_synthesizes_complementary_array_ref() {
        let mut table = TypeTable::new();
        let int = table.int();
        let arr = table.dynamic_array(int);
        let arr_ref = table.get(arr).complementary.dynamic_or_ref.unwrap();
        assert_eq!(table.get(arr_ref).kind, TypeKind::ArrayRef);
        assert_eq!(
            table.get(arr_ref).complementary.dynamic_or_ref,
            Some(arr)
        );
    }

    #[test]
    fn dynamic_array_is_canonicalized() {
        let mut table = TypeTable::new();
        let int = table.int();
        let a = table.dynamic_array(int);
        let b = table.dynamic_array(int);
        assert_eq!(a, b);
    }

    #[test]
    fn pointer_family_cross_links_strong_weak_raw() {
        let mut table = TypeTable::new();
        let class = table.declare_aggregate("Foo", TypeKind::Class, None).unwrap();
        let (strong, weak, raw) = table.pointer_family(class);
        assert_eq!(table.get(strong).complementary.weak, Some(weak));
        assert_eq!(table.get(weak).complementary.raw, Some(raw));
        assert_eq!(table.get(raw).complementary.strong, Some(strong));
    }

    #[test]
    fn forbids_duplicate_aggregate_names() {
        let mut table = TypeTable::new();
        assert!(table.declare_aggregate("Dup", TypeKind::Struct, None).is_some());
        assert!(table.declare_aggregate("Dup", TypeKind::Struct, None).is_none());
    }
}
