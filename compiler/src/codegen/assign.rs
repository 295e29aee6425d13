//! Assignment dispatch and local declaration codegen (spec §4.4.3): picks
//! `Assign`/`RefStore`/`ArrayAssign` by the lhs's `TypeKind`, handles
//! constructor/destructor emission for locals with non-trivial lifetime,
//! and applies the NRVO elision decided by `nrvo.rs`.

use super::CodeGen;
use super::expr::{compile_expr, compile_lvalue_address};
use crate::ast::{BinOp, NodeId, NodeKind, Qualifiers};
use crate::types::TypeKind;
use lethe_host::Opcode;

pub(super) fn compile_local_decl(gen: &mut CodeGen, node: NodeId) {
    let Some(data_type) = gen.data_type_of(node) else { return };
    let dt = gen.types.get(data_type.type_id).clone();
    let children = gen.ast.children(node).to_vec();

    if super::nrvo::elides_initializer(gen, node) {
        // NRVO: the initializer already constructs directly into this
        // local's slot; skip the separate ctor + copy-assign sequence.
        if let Some(&init) = children.first() {
            compile_expr(gen, init);
        }
        gen.ast.get_mut(node).flags.insert(crate::ast::NodeFlags::NRVO);
        return;
    }

    if needs_ctor(&dt) {
        gen.emit(Opcode::Ctor, gen.local_offset(node));
    }

    if let Some(&init) = children.first() {
        compile_expr(gen, init);
        emit_store(gen, node, data_type.type_id, false);
    }
}

fn needs_ctor(dt: &crate::types::DataType) -> bool {
    matches!(dt.kind, TypeKind::Struct | TypeKind::Class | TypeKind::DynamicArray | TypeKind::String)
}

/// `lhs = rhs` (spec §4.4.3). Aggregate types dispatch to `Assign` (a
/// member-wise copy written by TypeGen); scalars and pointers use the
/// plain store family. Returns the assigned value's type so the
/// expression can itself be used as a sub-expression (`a = b = c`).
pub(super) fn compile_assign(gen: &mut CodeGen, node: NodeId) {
    let children = gen.ast.children(node).to_vec();
    let (lhs, rhs) = (children[0], children[1]);
    let Some(lhs_type) = gen.data_type_of(lhs) else { return };

    if gen.ast.get(lhs).constant.is_some() {
        gen.push_error(
            crate::diagnostics::kind::CANNOT_MODIFY_CONSTANT,
            "cannot assign to a constant expression",
            node,
        );
        return;
    }

    compile_expr(gen, rhs);
    store_to_lvalue(gen, lhs, lhs_type.type_id);
}

pub(super) fn compile_compound_assign(gen: &mut CodeGen, node: NodeId, op: BinOp) {
    let children = gen.ast.children(node).to_vec();
    let (lhs, rhs) = (children[0], children[1]);
    let Some(lhs_type) = gen.data_type_of(lhs) else { return };

    compile_lvalue_address(gen, lhs);
    gen.emit(Opcode::RefLoad, 0);
    compile_expr(gen, rhs);
    gen.emit(Opcode::BinOp, op as i32);
    store_to_lvalue(gen, lhs, lhs_type.type_id);
}

/// Dispatches `lhs = <value already on stack>` by the lhs's `TypeKind`
/// (spec §4.4.2): a class lvalue is a hard compile error (classes are
/// reference-only, so "assigning" one would silently rebind instead of
/// copy); a struct copies member-wise via its `fun_assign` if it declared
/// one, else a flat byte copy; dynamic arrays, array-refs/delegates,
/// strings, and strong/weak pointers each get their own opcode family.
fn store_to_lvalue(gen: &mut CodeGen, lhs: NodeId, type_id: crate::types::TypeId) {
    let dt_kind = gen.types.get(type_id).kind;
    if matches!(gen.ast.get(lhs).kind, NodeKind::Dot { .. })
        && gen.ast.get(lhs).qualifiers.contains(Qualifiers::PROPERTY)
    {
        super::property::compile_property_set(gen, lhs);
        return;
    }
    if let NodeKind::Ident { .. } = gen.ast.get(lhs).kind.clone() {
        emit_store(gen, lhs, type_id, dt_kind.is_pointer());
        return;
    }

    compile_lvalue_address(gen, lhs);
    match dt_kind {
        TypeKind::Class => {
            gen.push_error(
                crate::diagnostics::kind::INCOMPATIBLE_TYPES,
                "cannot assign to a class-typed lvalue; classes are reference types",
                lhs,
            );
        }
        TypeKind::Struct => {
            // `-1` tells the VM to fall back to a flat byte-wise member copy
            // (spec §4.4.2) — the same sentinel `Ctor` uses for "no
            // constructor" — until/unless a custom `operator=` patches it.
            let pc = gen.emit(Opcode::Assign, -1);
            if gen.types.get(type_id).has_custom_assign {
                gen.patch_method_later(pc, type_id, super::MethodSlot::Assign);
            }
        }
        TypeKind::DynamicArray => {
            let elem_size = gen
                .types
                .get(type_id)
                .elem_type
                .map(|e| gen.types.get(e).size)
                .unwrap_or(0);
            gen.emit(Opcode::ArrayAssign, elem_size as i32);
        }
        TypeKind::ArrayRef | TypeKind::Delegate => {
            // Neither has a user-overridable assignment — always a flat copy.
            gen.emit(Opcode::Assign, -1);
        }
        TypeKind::String => {
            gen.emit(Opcode::StringStore, 0);
        }
        TypeKind::StrongPtr | TypeKind::WeakPtr => {
            gen.emit(Opcode::RefInc, 0);
            gen.emit(Opcode::RefStore, 0);
        }
        _ => {
            gen.emit(Opcode::RefStore, 0);
        }
    }
}

fn emit_store(gen: &mut CodeGen, decl_or_ident: NodeId, type_id: crate::types::TypeId, is_pointer: bool) {
    let target = gen.ast.get(decl_or_ident).target.unwrap_or(decl_or_ident);
    let is_global = gen.ast.get(target).qualifiers.contains(Qualifiers::STATIC)
        || gen.ast.get(target).parent.is_none();
    let offset = gen.local_offset(target);

    if is_pointer {
        gen.emit(Opcode::RefInc, offset);
    }
    let op = if is_global { Opcode::GlobalStore } else { Opcode::LocalStore };
    let _ = type_id;
    gen.emit(op, offset);
}
