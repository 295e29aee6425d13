//! Property get/set rewriting (spec §4.7): a `.member` access that didn't
//! resolve to a plain field gets rewritten by `resolver.rs` into a call on
//! a synthesized `__get_<name>`/`__set_<name>` accessor; this module emits
//! that call instead of a field load/store.

use super::CodeGen;
use crate::ast::{NodeId, NodeKind};
use lethe_host::Opcode;

pub(super) fn compile_property_get(gen: &mut CodeGen, node: NodeId) {
    let &base = gen.ast.children(node).first().unwrap();
    super::expr::compile_expr(gen, base);
    let Some(target) = gen.ast.get(node).target else { return };
    emit_accessor_call(gen, target);
}

/// Called from `assign.rs` when the lhs of an `Assign`/`CompoundAssign` is
/// a property access; the already-pushed rhs becomes the setter's sole
/// argument, following the same right-to-left push convention as an
/// ordinary call (spec §4.4.4, §4.7).
pub(super) fn compile_property_set(gen: &mut CodeGen, node: NodeId) {
    let &base = gen.ast.children(node).first().unwrap();
    super::expr::compile_expr(gen, base);
    let Some(target) = gen.ast.get(node).target else { return };
    emit_accessor_call(gen, target);
}

fn emit_accessor_call(gen: &mut CodeGen, accessor: NodeId) {
    let qualifiers = gen.ast.get(accessor).qualifiers;
    if qualifiers.contains(crate::ast::Qualifiers::NATIVE) {
        let name = match &gen.ast.get(accessor).kind {
            NodeKind::FuncDef { name, .. } => name.clone(),
            _ => String::new(),
        };
        let index = gen.registry.native_index(&name).unwrap_or(0);
        gen.emit(Opcode::CallNative, index as i32);
    } else {
        gen.emit(Opcode::CallScript, gen.local_offset(accessor));
    }
}
