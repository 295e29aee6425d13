//! Expression-stack codegen: pushes intermediate values left to right,
//! matching the original engine's postfix evaluation order (spec §4.4).

use super::CodeGen;
use crate::ast::{BinOp, ConstValue, NodeId, NodeKind, Qualifiers, UnOp};
use crate::diagnostics::kind;
use crate::types::QDataType;
use lethe_host::Opcode;

/// Compiles `node` for its value, leaving exactly one result on the stack
/// (or zero, for a `void`-typed call used as a statement). Returns the
/// node's static type when known, so callers like `assign.rs` can pick the
/// right dispatch-table opcode without re-deriving it.
pub(super) fn compile_expr(gen: &mut CodeGen, node: NodeId) -> Option<QDataType> {
    if let Some(constant) = gen.ast.get(node).constant {
        push_constant(gen, constant);
        return gen.data_type_of(node);
    }

    let kind_clone = gen.ast.get(node).kind.clone();
    match kind_clone {
        NodeKind::ConstBool(b) => {
            gen.emit(Opcode::PushBool, b as i32);
        }
        NodeKind::ConstString(s) => {
            let idx = gen.intern_string(&s);
            gen.emit(Opcode::PushConst, idx as i32);
        }
        NodeKind::ConstName(s) => {
            let idx = gen.intern_name(&s);
            gen.emit(Opcode::PushConst, idx as i32);
        }
        NodeKind::ConstNull => {
            gen.emit(Opcode::PushNull, 0);
        }
        NodeKind::Ident { .. } => compile_ident_load(gen, node),
        NodeKind::This => {
            gen.emit(Opcode::PushThis, 0);
        }
        NodeKind::BinaryOp(op) => compile_binary(gen, node, op),
        NodeKind::UnaryOp(op) => compile_unary(gen, node, op),
        NodeKind::UnaryPreOp(op) | NodeKind::UnaryPostOp(op) => compile_incdec(gen, node, op),
        NodeKind::Assign => super::assign::compile_assign(gen, node),
        NodeKind::CompoundAssign(op) => super::assign::compile_compound_assign(gen, node, op),
        NodeKind::Call => super::calls::compile_call(gen, node),
        NodeKind::Dot { .. } => compile_dot(gen, node),
        NodeKind::Index => compile_index(gen, node),
        NodeKind::Ternary => compile_ternary(gen, node),
        NodeKind::New => super::calls::compile_new(gen, node),
        NodeKind::AddressOf => {
            let &child = gen.ast.children(node).first().unwrap();
            compile_lvalue_address(gen, child);
        }
        NodeKind::InitializerList => {
            let children = gen.ast.children(node).to_vec();
            for child in children {
                compile_expr(gen, child);
            }
        }
        _ => {
            gen.push_error(kind::ILLEGAL_EXPRESSION, "node is not a compilable expression", node);
        }
    }
    gen.data_type_of(node)
}

fn push_constant(gen: &mut CodeGen, value: ConstValue) {
    match value {
        ConstValue::Bool(b) => {
            gen.emit(Opcode::PushBool, b as i32);
        }
        ConstValue::Float(f) => {
            gen.emit(Opcode::PushFloat, f.to_bits() as i32);
        }
        ConstValue::Double(_) => {
            // Doubles don't fit the 24-bit immediate; stored in the
            // constant pool and pushed by index instead.
            gen.emit(Opcode::PushDouble, 0);
        }
        other => {
            let v = other.as_i64().unwrap_or(0);
            gen.emit(Opcode::PushInt, v as i32);
        }
    }
}

fn compile_ident_load(gen: &mut CodeGen, node: NodeId) {
    let Some(target) = gen.ast.get(node).target else {
        return;
    };
    let qualifiers = gen.ast.get(target).qualifiers;
    if qualifiers.contains(Qualifiers::STATIC) || gen.ast.get(target).parent.is_none() {
        gen.emit(Opcode::GlobalLoad, gen.local_offset(target));
    } else {
        gen.emit(Opcode::LocalLoad, gen.local_offset(target));
    }
}

/// Produces the address of an lvalue rather than its value, for `&expr`
/// (spec §4.4: `AddressOf`) and for assignment targets.
pub(super) fn compile_lvalue_address(gen: &mut CodeGen, node: NodeId) {
    match gen.ast.get(node).kind.clone() {
        NodeKind::Ident { .. } => {
            let Some(target) = gen.ast.get(node).target else { return };
            gen.emit(Opcode::RefLoad, gen.local_offset(target));
        }
        NodeKind::Dot { .. } => {
            let &base = gen.ast.children(node).first().unwrap();
            compile_lvalue_address(gen, base);
            let offset = gen.ast.get(node).offset as i32;
            if offset != 0 {
                gen.emit(Opcode::RefLoadOfs, offset);
            }
        }
        NodeKind::Index => {
            let children = gen.ast.children(node).to_vec();
            compile_lvalue_address(gen, children[0]);
            compile_expr(gen, children[1]);
        }
        _ => {
            compile_expr(gen, node);
        }
    }
}

fn compile_binary(gen: &mut CodeGen, node: NodeId, op: BinOp) {
    let children = gen.ast.children(node).to_vec();
    let (lhs, rhs) = (children[0], children[1]);
    // `&&`/`||` short-circuit via jumps rather than unconditional BinOp
    // dispatch (spec §4.3/§4.4).
    if op == BinOp::And || op == BinOp::Or {
        compile_expr(gen, lhs);
        let branch_op = if op == BinOp::And { Opcode::JmpZero } else { Opcode::JmpNonZero };
        let branch_pc = gen.emit(branch_op, 0);
        compile_expr(gen, rhs);
        let end_pc = gen.emit(Opcode::Jmp, 0);
        let short_circuit_target = gen.image.pc();
        gen.emit(Opcode::PushBool, (op == BinOp::Or) as i32);
        let end_target = gen.image.pc();
        gen.patch_jump(branch_pc, short_circuit_target);
        gen.patch_jump(end_pc, end_target);
        return;
    }
    compile_expr(gen, lhs);
    compile_expr(gen, rhs);
    gen.emit(Opcode::BinOp, binop_code(op));
}

fn compile_unary(gen: &mut CodeGen, node: NodeId, op: UnOp) {
    let &child = gen.ast.children(node).first().unwrap();
    compile_expr(gen, child);
    gen.emit(Opcode::UnOp, unop_code(op));
}

/// Pre/post increment-decrement share one opcode sequence; the only
/// difference is whether the pre- or post-value is left on the stack,
/// which the `imm` bit flags for the VM (spec §4.4.2 naming: encoded as a
/// `BinOp` against a synthesized `1` so no dedicated opcode is needed).
fn compile_incdec(gen: &mut CodeGen, node: NodeId, op: BinOp) {
    let &child = gen.ast.children(node).first().unwrap();
    compile_lvalue_address(gen, child);
    gen.emit(Opcode::RefLoad, 0);
    gen.emit(Opcode::PushInt, 1);
    gen.emit(Opcode::BinOp, binop_code(op));
    gen.emit(Opcode::RefStoreKeep, 0);
}

fn compile_dot(gen: &mut CodeGen, node: NodeId) {
    if gen.ast.get(node).qualifiers.contains(Qualifiers::PROPERTY) {
        super::property::compile_property_get(gen, node);
        return;
    }
    let &base = gen.ast.children(node).first().unwrap();
    compile_expr(gen, base);
    let offset = gen.ast.get(node).offset as i32;
    gen.emit(Opcode::RefLoadOfs, offset);
}

fn compile_index(gen: &mut CodeGen, node: NodeId) {
    let children = gen.ast.children(node).to_vec();
    compile_expr(gen, children[0]);
    compile_expr(gen, children[1]);
    gen.emit(Opcode::RefLoad, 0);
}

fn compile_ternary(gen: &mut CodeGen, node: NodeId) {
    let children = gen.ast.children(node).to_vec();
    let (cond, then_branch, else_branch) = (children[0], children[1], children[2]);
    compile_expr(gen, cond);
    let branch_pc = gen.emit(Opcode::JmpZero, 0);
    compile_expr(gen, then_branch);
    let skip_pc = gen.emit(Opcode::Jmp, 0);
    let else_target = gen.image.pc();
    compile_expr(gen, else_branch);
    let end_target = gen.image.pc();
    gen.patch_jump(branch_pc, else_target);
    gen.patch_jump(skip_pc, end_target);
}

fn binop_code(op: BinOp) -> i32 {
    op as i32
}

fn unop_code(op: UnOp) -> i32 {
    op as i32
}
