//! TypeGen: struct/class layout, vtable synthesis, and type-expression
//! resolution (spec §4.2, §4.4.1).
//!
//! Runs after `resolve`/`fold`. Two jobs live here because they share the
//! same `TypeTable` mutation surface and the teacher's `typegen`-equivalent
//! pass (`codegen/mod.rs` in the teacher) keeps them together too:
//!
//! 1. Walk every `TypeName`/`TypePointer`/`TypeStaticArray`/... node and
//!    resolve it to a canonical [`QDataType`], synthesizing the
//!    complementary array-ref/pointer-family types as needed.
//! 2. Walk every `StructDef`/`ClassDef` and compute member byte offsets,
//!    aggregate size/alignment, `has_dtor` propagation, and vtable slot
//!    assignment (table-driven the way
//!    `examples/original_source/.../CodeGenTables.h` dispatches by kind).

use crate::ast::{Ast, NodeId, NodeKind, Qualifiers};
use crate::diagnostics::{
    kind, DiagnosticSink, MAX_CLASS_ALIGNMENT, MAX_GLOBAL_POOL_BYTES, MAX_STACK_VARIABLE_BYTES,
};
use crate::scope::ScopeTree;
use crate::types::{Member, QDataType, TypeId, TypeKind};
use crate::typetable::TypeTable;

pub struct TypeGen<'a> {
    ast: &'a mut Ast,
    scopes: &'a mut ScopeTree,
    types: &'a mut TypeTable,
    sink: &'a mut DiagnosticSink,
}

impl<'a> TypeGen<'a> {
    pub fn new(
        ast: &'a mut Ast,
        scopes: &'a mut ScopeTree,
        types: &'a mut TypeTable,
        sink: &'a mut DiagnosticSink,
    ) -> Self {
        TypeGen { ast, scopes, types, sink }
    }

    pub fn run(&mut self, root: NodeId) {
        let span = tracing::info_span!("type_gen");
        let _enter = span.enter();
        self.walk(root);
    }

    fn walk(&mut self, node: NodeId) {
        let children = self.ast.children(node).to_vec();
        let kind = self.ast.get(node).kind.clone();

        // Type-expression nodes resolve bottom-up so a wrapping pointer or
        // array node can read its element's already-resolved `QDataType`.
        for &child in &children {
            self.walk(child);
        }

        match kind {
            NodeKind::TypeName { .. }
            | NodeKind::TypeAuto
            | NodeKind::TypePointer { .. }
            | NodeKind::TypeStaticArray
            | NodeKind::TypeDynamicArray
            | NodeKind::TypeArrayRef => {
                if let Some(dt) = self.resolve_type_node(node) {
                    self.ast.get_mut(node).data_type = Some(dt);
                }
            }
            NodeKind::StructDef { .. } | NodeKind::ClassDef { .. } => {
                self.lay_out_aggregate(node);
            }
            NodeKind::Dot { ref member } if member == "size" => {
                self.fold_array_size(node, &children);
            }
            _ => {}
        }
    }

    /// `array.size` on a statically-sized array folds to its element count
    /// (spec §4.3). `ConstFolder` runs before this pass and has no
    /// `TypeTable` access, so it can't tell a static array from any other
    /// `.size` expression; this is the promised place that actually does
    /// the fold, once the base's `QDataType` is resolved.
    fn fold_array_size(&mut self, node: NodeId, children: &[NodeId]) {
        let Some(&base) = children.first() else { return };
        let Some(data_type) = self.ast.get(base).data_type else { return };
        let dt = self.types.get(data_type.type_id);
        if dt.kind != TypeKind::StaticArray {
            return;
        }
        let count: u32 = dt.array_dims.iter().product();
        self.ast.get_mut(node).constant = Some(crate::ast::ConstValue::Int(count as i32));
    }

    /// Converts a type-expression node into a canonical [`QDataType`].
    /// `TypeFuncPtr`/`TypeDelegate` are left to `codegen` since their shape
    /// (arg/return types) is only needed at a call site, not for layout.
    fn resolve_type_node(&mut self, node: NodeId) -> Option<QDataType> {
        let qualifiers = self.ast.get(node).qualifiers;
        match self.ast.get(node).kind.clone() {
            NodeKind::TypeName { name } => {
                let type_id = self
                    .types
                    .builtin(&name)
                    .or_else(|| self.types.find_aggregate(&name))?;
                Some(QDataType::new(type_id, qualifiers))
            }
            NodeKind::TypeAuto => None,
            NodeKind::TypePointer { kind: ptr_kind } => {
                let &elem = self.ast.children(node).first()?;
                let elem_type = self.ast.get(elem).data_type?.type_id;
                let (strong, weak, raw) = self.types.pointer_family(elem_type);
                let chosen = match ptr_kind {
                    crate::ast::PointerKind::Strong => strong,
                    crate::ast::PointerKind::Weak => weak,
                    crate::ast::PointerKind::Raw => raw,
                };
                Some(QDataType::new(chosen, qualifiers))
            }
            NodeKind::TypeStaticArray => {
                let kids = self.ast.children(node).to_vec();
                let &elem = kids.first()?;
                let elem_type = self.ast.get(elem).data_type?.type_id;
                let dims: Vec<u32> = kids[1..]
                    .iter()
                    .filter_map(|&n| self.ast.get(n).constant)
                    .filter_map(|v| v.as_i64())
                    .map(|v| v.max(0) as u32)
                    .collect();
                let type_id = self.types.static_array(elem_type, dims);
                Some(QDataType::new(type_id, qualifiers))
            }
            NodeKind::TypeDynamicArray => {
                let &elem = self.ast.children(node).first()?;
                let elem_type = self.ast.get(elem).data_type?.type_id;
                let type_id = self.types.dynamic_array(elem_type);
                Some(QDataType::new(type_id, qualifiers))
            }
            NodeKind::TypeArrayRef => {
                let &elem = self.ast.children(node).first()?;
                let elem_type = self.ast.get(elem).data_type?.type_id;
                let type_id = self.types.array_ref(elem_type);
                Some(QDataType::new(type_id, qualifiers))
            }
            _ => None,
        }
    }

    /// Computes member offsets, alignment, size, and vtable size for one
    /// `struct`/`class` declaration, then checks spec §7's layout limits.
    fn lay_out_aggregate(&mut self, node: NodeId) {
        let (name, base_name, declared_kind, is_state) = match self.ast.get(node).kind.clone() {
            NodeKind::StructDef { name, base } => (name, base, TypeKind::Struct, false),
            NodeKind::ClassDef { name, base, is_state } => (name, base, TypeKind::Class, is_state),
            _ => return,
        };

        let base_type = base_name
            .as_deref()
            .and_then(|b| self.types.find_aggregate(b));
        if base_name.is_some() && base_type.is_none() {
            self.sink.push_error(
                kind::UNKNOWN_SYMBOL,
                format!("unknown base type `{}`", base_name.unwrap()),
                self.ast.get(node).location.clone(),
            );
            return;
        }

        let type_id = match self.types.find_aggregate(&name) {
            Some(id) => id,
            None => match self.types.declare_aggregate(&name, declared_kind, base_type) {
                Some(id) => id,
                None => return,
            },
        };

        let mut offset: u32 = 0;
        let mut max_align: u32 = 1;
        let mut has_dtor = false;
        let mut has_custom_assign = false;
        // Slot 0 of a class's vtable is always the destructor (spec §4.6);
        // user virtual methods start at slot 1. Structs don't carry a
        // vtable, so they keep the old zero-based counter (unused for
        // dispatch, just tracked for symmetry with the base-inheriting path
        // below).
        let mut vtbl_size: u32 = if matches!(declared_kind, TypeKind::Class) { 1 } else { 0 };
        let mut members: Vec<Member> = Vec::new();

        if let Some(base_id) = base_type {
            let base_dt = self.types.get(base_id);
            offset = base_dt.size;
            max_align = max_align.max(base_dt.align);
            has_dtor = base_dt.has_dtor;
            has_custom_assign = base_dt.has_custom_assign;
            vtbl_size = base_dt.vtbl_size.max(vtbl_size);
            members.extend(base_dt.members.iter().cloned());
        }

        let member_nodes = self.ast.children(node).to_vec();

        for member_node in member_nodes {
            match self.ast.get(member_node).kind.clone() {
                NodeKind::VarDecl { name: member_name, .. } => {
                    let Some(member_type) = self.ast.get(member_node).data_type else {
                        continue;
                    };
                    let member_dt = self.types.get(member_type.type_id);
                    let (size, align) = (member_dt.size, member_dt.align);
                    has_dtor |= member_dt.has_dtor;

                    let qualifiers = self.ast.get(member_node).qualifiers;
                    let aligned_offset = align_up(offset, align.max(1));
                    self.ast.get_mut(member_node).offset = aligned_offset as i64;
                    members.push(Member {
                        name: member_name,
                        byte_offset: aligned_offset,
                        qualifiers,
                        decl: member_node,
                        data_type: member_type,
                        bitfield: None,
                    });
                    offset = aligned_offset + size;
                    max_align = max_align.max(align);
                }
                NodeKind::FuncDef { operator, .. } => {
                    if operator.as_deref() == Some("=") {
                        has_custom_assign = true;
                    }
                    let qualifiers = self.ast.get(member_node).qualifiers;
                    if qualifiers.contains(Qualifiers::DTOR) {
                        has_dtor = true;
                        if matches!(declared_kind, TypeKind::Class) {
                            // Slot 0 is reserved for this class's own dtor.
                            self.ast.get_mut(member_node).offset = 0;
                        }
                    }
                    if qualifiers.contains(Qualifiers::VIRTUAL)
                        && !qualifiers.contains(Qualifiers::OVERRIDE)
                    {
                        let slot = vtbl_size.max(1);
                        self.ast.get_mut(member_node).offset = slot as i64;
                        vtbl_size = slot + 1;
                    } else if qualifiers.contains(Qualifiers::OVERRIDE) {
                        let fn_name = member_fn_name(self.ast, member_node);
                        let base_scope = base_type.and_then(|b| self.find_scope_for_type(b));
                        let base_method = base_scope
                            .and_then(|s| self.scopes.find_symbol(s, &fn_name, true, false));
                        match base_method {
                            // An override reuses the base method's own slot
                            // rather than allocating a new one.
                            Some(base_fn) => {
                                let slot = self.ast.get(base_fn).offset;
                                self.ast.get_mut(member_node).offset = slot;
                            }
                            None => {
                                self.sink.push_error(
                                    kind::OVERRIDE_WITHOUT_BASE,
                                    "`override` method has no matching virtual in base",
                                    self.ast.get(member_node).location.clone(),
                                );
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if is_state && !declared_kind_allows_state(declared_kind) {
            self.sink.push_error(
                kind::INVALID_STATE_CLASS_MODIFICATION,
                "only classes may be declared `state`",
                self.ast.get(node).location.clone(),
            );
        }

        if max_align > MAX_CLASS_ALIGNMENT {
            self.sink.push_error(
                kind::CLASS_ALIGNMENT_EXCEEDED,
                format!("alignment {max_align} exceeds the {MAX_CLASS_ALIGNMENT}-byte limit"),
                self.ast.get(node).location.clone(),
            );
        }
        if (offset as u64) > MAX_STACK_VARIABLE_BYTES && (offset as u64) <= MAX_GLOBAL_POOL_BYTES {
            self.sink.push_warning(
                kind::VARIABLE_TOO_LARGE,
                format!("`{name}` is {offset} bytes; instances on the stack will be rejected"),
                self.ast.get(node).location.clone(),
            );
        }

        let dt = self.types.get_mut(type_id);
        dt.size = align_up(offset, max_align.max(1));
        dt.align = max_align;
        dt.has_dtor = has_dtor;
        dt.has_custom_assign = has_custom_assign;
        dt.vtbl_size = vtbl_size;
        dt.members = members;
        dt.native = false;
        // `fun_dtor` itself isn't known yet: it's the bytecode PC of whatever
        // dtor/synthesized-dtor CodeGen ends up emitting, which doesn't
        // exist until that pass runs. `check_dtor_invariant` is only
        // meaningful once `CodeGen::resolve_special_methods` has run; see
        // that function for the real assertion.
    }

    fn find_scope_for_type(&self, type_id: TypeId) -> Option<crate::scope::ScopeId> {
        let name = &self.types.get(type_id).name;
        self.scopes
            .get(self.scopes.global())
            .named_scopes
            .get(name)
            .copied()
    }
}

fn align_up(offset: u32, align: u32) -> u32 {
    if align <= 1 {
        return offset;
    }
    (offset + align - 1) / align * align
}

fn declared_kind_allows_state(kind: TypeKind) -> bool {
    matches!(kind, TypeKind::Class)
}

fn member_fn_name(ast: &Ast, node: NodeId) -> String {
    match &ast.get(node).kind {
        NodeKind::FuncDef { name, .. } => name.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ConstValue;
    use lethe_host::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::new("t.le", 0, 0)
    }

    #[test]
    fn lays_out_struct_members_with_alignment_padding() {
        let mut ast = Ast::new();
        let mut scopes = ScopeTree::new();
        let mut types = TypeTable::new();
        let mut sink = DiagnosticSink::new();

        let strct = ast.alloc(loc(), NodeKind::StructDef { name: "Vec3".into(), base: None });

        let byte_ty = ast.alloc(loc(), NodeKind::TypeName { name: "byte".into() });
        let byte_member = ast.alloc(loc(), NodeKind::VarDecl { name: "flag".into(), is_auto: false });
        ast.add_child(byte_member, byte_ty);
        ast.add_child(strct, byte_member);

        let int_ty = ast.alloc(loc(), NodeKind::TypeName { name: "int".into() });
        let int_member = ast.alloc(loc(), NodeKind::VarDecl { name: "count".into(), is_auto: false });
        ast.add_child(int_member, int_ty);
        ast.add_child(strct, int_member);

        let mut gen = TypeGen::new(&mut ast, &mut scopes, &mut types, &mut sink);
        gen.walk(strct);

        let id = types.find_aggregate("Vec3").unwrap();
        let dt = types.get(id);
        assert_eq!(dt.members[0].byte_offset, 0);
        // int (align 4) must be padded past the 1-byte `flag` member.
        assert_eq!(dt.members[1].byte_offset, 4);
        assert_eq!(dt.size, 8);
    }

    #[test]
    fn derived_class_inherits_base_layout_and_dtor_flag() {
        let mut ast = Ast::new();
        let mut scopes = ScopeTree::new();
        let mut types = TypeTable::new();
        let mut sink = DiagnosticSink::new();

        let base = ast.alloc(loc(), NodeKind::ClassDef { name: "Base".into(), base: None, is_state: false });
        let dtor = ast.alloc(loc(), NodeKind::FuncDef { name: "~Base".into(), operator: None });
        ast.get_mut(dtor).qualifiers.insert(Qualifiers::DTOR);
        ast.add_child(base, dtor);
        TypeGen::new(&mut ast, &mut scopes, &mut types, &mut sink).walk(base);

        let derived = ast.alloc(loc(), NodeKind::ClassDef { name: "Derived".into(), base: Some("Base".into()), is_state: false });
        TypeGen::new(&mut ast, &mut scopes, &mut types, &mut sink).walk(derived);

        let derived_id = types.find_aggregate("Derived").unwrap();
        assert!(types.get(derived_id).has_dtor);
    }

    #[test]
    fn static_array_type_expression_resolves_with_folded_dims() {
        let mut ast = Ast::new();
        let mut scopes = ScopeTree::new();
        let mut types = TypeTable::new();
        let mut sink = DiagnosticSink::new();

        let elem = ast.alloc(loc(), NodeKind::TypeName { name: "float".into() });
        let dim = ast.alloc(loc(), NodeKind::ConstInt(ConstValue::Int(4)));
        ast.get_mut(dim).constant = Some(ConstValue::Int(4));
        let array = ast.alloc(loc(), NodeKind::TypeStaticArray);
        ast.add_child(array, elem);
        ast.add_child(array, dim);

        TypeGen::new(&mut ast, &mut scopes, &mut types, &mut sink).walk(array);
        let dt_id = ast.get(array).data_type.unwrap().type_id;
        assert_eq!(types.get(dt_id).size, 16);
    }
}
