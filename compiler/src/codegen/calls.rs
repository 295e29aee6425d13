//! Call-sequencing codegen (spec §4.4.4, §6): arguments push right-to-left
//! per the ABI in `lethe_host::abi`, then the appropriate `Call*` opcode
//! dispatches by callee kind (script/native/virtual/delegate/func-pointer).

use super::CodeGen;
use super::expr::compile_expr;
use crate::ast::{NodeFlags, NodeId, NodeKind, Qualifiers};
use crate::diagnostics::kind;
use lethe_host::Opcode;

pub(super) fn compile_call(gen: &mut CodeGen, node: NodeId) {
    let children = gen.ast.children(node).to_vec();
    let Some(&callee) = children.first() else { return };
    let args = &children[1..];

    if let Some(result) = super::inline::try_inline(gen, node, callee, args) {
        let _ = result;
        return;
    }

    for &arg in args.iter().rev() {
        compile_expr(gen, arg);
    }
    dispatch_call(gen, callee, node);
}

fn dispatch_call(gen: &mut CodeGen, callee: NodeId, call_node: NodeId) {
    let Some(target) = gen.ast.get(callee).target else {
        gen.push_error(kind::UNKNOWN_SYMBOL, "unresolved call target reached codegen", call_node);
        return;
    };
    let qualifiers = gen.ast.get(target).qualifiers;

    if qualifiers.contains(Qualifiers::NATIVE) {
        let name = func_qualified_name(gen, target);
        let index = gen.registry.native_index(&name).unwrap_or(0);
        gen.emit(Opcode::CallNative, index as i32);
        return;
    }
    if qualifiers.contains(Qualifiers::VIRTUAL) && !qualifiers.contains(Qualifiers::NON_VIRT) {
        let slot = gen.ast.get(target).offset as i32;
        gen.emit(Opcode::CallVirtual, slot);
        return;
    }
    // The callee's entry PC isn't known until every function has been
    // compiled (a call can run ahead of its target in source order), so
    // this emits a placeholder and records the site for `resolve_call_patches`
    // to fix up once `image.symbols` is complete (same two-phase scheme as
    // `Goto`/`StateTailJump`).
    let name = func_qualified_name(gen, target);
    let pc = gen.emit(Opcode::CallScript, 0);
    gen.call_patch_sites.push((pc, name, call_node));
}

fn func_qualified_name(gen: &CodeGen, node: NodeId) -> String {
    match &gen.ast.get(node).kind {
        NodeKind::FuncDef { name, .. } => name.clone(),
        _ => String::new(),
    }
}

/// `new T(...)` (spec §4.4): allocates via the class's constructor entry,
/// leaving a strong pointer on the stack.
pub(super) fn compile_new(gen: &mut CodeGen, node: NodeId) {
    let Some(data_type) = gen.data_type_of(node) else { return };
    let elem = gen
        .types
        .get(data_type.type_id)
        .elem_type
        .unwrap_or(data_type.type_id);
    let children = gen.ast.children(node).to_vec();
    for &arg in children.iter().rev() {
        compile_expr(gen, arg);
    }
    // `fun_ctor` isn't resolved to a real PC until every function has been
    // compiled (same reason `CallScript` needs `call_patch_sites`), so this
    // placeholder gets fixed up by `resolve_method_patches`.
    let pc = gen.emit(Opcode::Ctor, 0);
    gen.patch_method_later(pc, elem, super::MethodSlot::Ctor);
    gen.ast.get_mut(node).flags.insert(NodeFlags::RESOLVED);
}
