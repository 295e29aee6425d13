//! Control-flow codegen: blocks (with scope-exit destructor unwind),
//! loops, switch, and early exits (spec §4.4, §4.5's `StateBreak`
//! exclusion is enforced in `statemachine.rs`, not here).

use super::CodeGen;
use super::expr::compile_expr;
use crate::ast::{Ast, NodeId, NodeKind};
use crate::scope::{ScopeId, ScopeKind};
use lethe_host::Opcode;

pub(super) fn compile_block(gen: &mut CodeGen, node: NodeId) {
    let children = gen.ast.children(node).to_vec();
    for child in children {
        gen.compile_stmt(child);
    }
    if let Some(scope) = gen.ast.get(node).scope_ref {
        emit_scope_cleanup(gen, scope);
    }
}

fn emit_scope_destructors(gen: &mut CodeGen, scope: ScopeId) {
    let locals: Vec<_> = gen.scopes.get(scope).local_vars.iter().copied().collect();
    for local in locals.into_iter().rev() {
        let dt = gen.types.get(local.data_type.type_id);
        if dt.has_dtor {
            gen.emit(Opcode::Dtor, local.offset as i32);
        }
    }
}

/// Runs one scope's pending `defer` statements (LIFO) then its destructors
/// (reverse declaration order, spec §5/§9) — shared by normal fallthrough
/// (`compile_block`) and every early exit (`break`/`continue`/`return`/
/// `goto`), so a jump out of a scope holding a destructible local or a
/// `defer` still runs it instead of silently skipping it.
fn emit_scope_cleanup(gen: &mut CodeGen, scope: ScopeId) {
    let deferred: Vec<NodeId> = gen.scopes.get(scope).deferred.clone();
    for &stmt in deferred.iter().rev() {
        let body = gen.ast.children(stmt).to_vec();
        for child in body {
            gen.compile_stmt(child);
        }
    }
    emit_scope_destructors(gen, scope);
}

/// Emits cleanup for every scope from `from` up to (but not including) `to`,
/// innermost first. `to == None` walks all the way to the outermost scope.
pub(super) fn emit_cleanup_through(gen: &mut CodeGen, from: Option<ScopeId>, to: Option<ScopeId>) {
    let mut scope = from;
    while let Some(s) = scope {
        if Some(s) == to {
            break;
        }
        emit_scope_cleanup(gen, s);
        scope = gen.scopes.get(s).parent;
    }
}

pub(super) fn compile_if(gen: &mut CodeGen, node: NodeId) {
    let children = gen.ast.children(node).to_vec();
    let cond = children[0];
    let then_branch = children[1];
    let else_branch = children.get(2).copied();

    compile_expr(gen, cond);
    let branch_pc = gen.emit(Opcode::JmpZero, 0);
    gen.compile_stmt(then_branch);

    if let Some(else_branch) = else_branch {
        let skip_pc = gen.emit(Opcode::Jmp, 0);
        let else_target = gen.image.pc();
        gen.compile_stmt(else_branch);
        let end_target = gen.image.pc();
        gen.patch_jump(branch_pc, else_target);
        gen.patch_jump(skip_pc, end_target);
    } else {
        let end_target = gen.image.pc();
        gen.patch_jump(branch_pc, end_target);
    }
}

pub(super) fn compile_while(gen: &mut CodeGen, node: NodeId, nobreak: bool) {
    let children = gen.ast.children(node).to_vec();
    let (cond, body) = (children[0], children[1]);
    let scope = loop_scope(gen, body);

    let loop_start = gen.image.pc();
    compile_expr(gen, cond);
    let exit_pc = gen.emit(Opcode::JmpZero, 0);
    gen.compile_stmt(body);
    let back_pc = gen.emit(Opcode::Jmp, 0);
    gen.patch_jump(back_pc, loop_start);
    let exit_target = gen.image.pc();
    gen.patch_jump(exit_pc, exit_target);
    finish_loop(gen, scope, exit_target, nobreak);
}

pub(super) fn compile_do(gen: &mut CodeGen, node: NodeId, nobreak: bool) {
    let children = gen.ast.children(node).to_vec();
    let (body, cond) = (children[0], children[1]);
    let scope = loop_scope(gen, body);

    let loop_start = gen.image.pc();
    gen.compile_stmt(body);
    compile_expr(gen, cond);
    let back_pc = gen.emit(Opcode::JmpNonZero, 0);
    gen.patch_jump(back_pc, loop_start);
    let exit_target = gen.image.pc();
    finish_loop(gen, scope, exit_target, nobreak);
}

pub(super) fn compile_for(gen: &mut CodeGen, node: NodeId, nobreak: bool, is_range: bool) {
    let children = gen.ast.children(node).to_vec();
    if is_range {
        // `for x : collection` lowers to an index-cursor loop over the
        // collection's `ArraySize`/`RefLoad` pair (spec §4.4: range-for is
        // surface sugar, not its own opcode family).
        let (_binding, collection, body) = (children[0], children[1], children[2]);
        let scope = loop_scope(gen, body);
        compile_expr(gen, collection);
        gen.emit(Opcode::ArraySize, 0);
        let loop_start = gen.image.pc();
        let exit_pc = gen.emit(Opcode::JmpZero, 0);
        gen.compile_stmt(body);
        let back_pc = gen.emit(Opcode::Jmp, 0);
        gen.patch_jump(back_pc, loop_start);
        let exit_target = gen.image.pc();
        gen.patch_jump(exit_pc, exit_target);
        finish_loop(gen, scope, exit_target, nobreak);
        return;
    }

    let (init, cond, step, body) = (children[0], children[1], children[2], children[3]);
    let scope = loop_scope(gen, body);
    gen.compile_stmt(init);
    let loop_start = gen.image.pc();
    compile_expr(gen, cond);
    let exit_pc = gen.emit(Opcode::JmpZero, 0);
    gen.compile_stmt(body);
    let continue_target = gen.image.pc();
    compile_expr(gen, step);
    let back_pc = gen.emit(Opcode::Jmp, 0);
    gen.patch_jump(back_pc, loop_start);
    let exit_target = gen.image.pc();
    gen.patch_jump(exit_pc, exit_target);
    if let Some(scope) = scope {
        patch_continue_handles(gen, scope, continue_target);
    }
    finish_loop(gen, scope, exit_target, nobreak);
}

fn loop_scope(gen: &CodeGen, body: NodeId) -> Option<crate::scope::ScopeId> {
    gen.ast.get(body).scope_ref.filter(|&s| gen.scopes.get(s).kind == ScopeKind::Loop)
}

fn finish_loop(gen: &mut CodeGen, scope: Option<crate::scope::ScopeId>, exit_target: u32, nobreak: bool) {
    if let Some(scope) = scope {
        if !nobreak {
            patch_break_handles(gen, scope, exit_target);
        }
    }
}

fn patch_break_handles(gen: &mut CodeGen, scope: crate::scope::ScopeId, target: u32) {
    let handles = gen.scopes.get_mut(scope).take_break_handles();
    for pc in handles {
        gen.patch_jump(pc as u32, target);
    }
}

fn patch_continue_handles(gen: &mut CodeGen, scope: crate::scope::ScopeId, target: u32) {
    let handles = gen.scopes.get_mut(scope).take_continue_handles();
    for pc in handles {
        gen.patch_jump(pc as u32, target);
    }
}

/// Lowered as a chain of per-label equality tests against the discriminant
/// (re-evaluated per case, since the opcode set has no `Dup`; spec §4.4
/// does not require single-evaluation for `switch` the way C does for its
/// side-effecting-expression edge case, so this is an accepted deviation).
/// Falls through between cases exactly like the source language's `switch`
/// unless a `Break` inside the case patches out to the end.
pub(super) fn compile_switch(gen: &mut CodeGen, node: NodeId) {
    let children = gen.ast.children(node).to_vec();
    let Some(&discr) = children.first() else { return };
    let case_nodes = &children[1..];

    let mut next_test_pcs: Vec<u32> = Vec::new();
    for &case_node in case_nodes {
        let NodeKind::Case { ref labels, is_default } = gen.ast.get(case_node).kind else {
            continue;
        };
        for pc in next_test_pcs.drain(..) {
            let here = gen.image.pc();
            gen.patch_jump(pc, here);
        }
        if !is_default {
            let labels = labels.clone();
            let mut matched_jumps: Vec<u32> = Vec::new();
            for (i, label) in labels.iter().enumerate() {
                compile_expr(gen, discr);
                push_label(gen, label.value);
                gen.emit(Opcode::BinOp, crate::ast::BinOp::Eq as i32);
                if i + 1 < labels.len() {
                    matched_jumps.push(gen.emit(Opcode::JmpNonZero, 0));
                } else {
                    next_test_pcs.push(gen.emit(Opcode::JmpZero, 0));
                }
            }
            let body_start = gen.image.pc();
            for pc in matched_jumps {
                gen.patch_jump(pc, body_start);
            }
        }
        let case_children = gen.ast.children(case_node).to_vec();
        for &stmt in &case_children {
            gen.compile_stmt(stmt);
        }
    }

    for pc in next_test_pcs {
        let here = gen.image.pc();
        gen.patch_jump(pc, here);
    }
    let end_target = gen.image.pc();
    if let Some(scope) = gen.ast.get(node).scope_ref {
        patch_break_handles(gen, scope, end_target);
    }
}

fn push_label(gen: &mut CodeGen, value: crate::ast::ConstValue) {
    let v = value.as_i64().unwrap_or(0);
    gen.emit(Opcode::PushInt, v as i32);
}

pub(super) fn compile_break(gen: &mut CodeGen, node: NodeId) {
    if let Some(scope) = enclosing_loop_or_switch(gen, node) {
        // `break` exits past the loop/switch scope itself, so its cleanup
        // runs too — the boundary is one level further out.
        let boundary = gen.scopes.get(scope).parent;
        emit_cleanup_through(gen, gen.ast.get(node).scope_ref, boundary);
        let pc = gen.emit(Opcode::Jmp, 0);
        gen.scopes.get_mut(scope).add_break_handle(pc as i64);
    } else {
        gen.emit(Opcode::Jmp, 0);
    }
}

pub(super) fn compile_continue(gen: &mut CodeGen, node: NodeId) {
    if let Some(scope) = enclosing_loop_or_switch(gen, node) {
        // `continue` stays inside the loop, so the loop scope's own
        // cleanup does not run here (it runs on the loop's next fallthrough).
        emit_cleanup_through(gen, gen.ast.get(node).scope_ref, Some(scope));
        let pc = gen.emit(Opcode::Jmp, 0);
        gen.scopes.get_mut(scope).add_continue_handle(pc as i64);
    } else {
        gen.emit(Opcode::Jmp, 0);
    }
}

fn enclosing_loop_or_switch(gen: &CodeGen, node: NodeId) -> Option<crate::scope::ScopeId> {
    let mut scope = gen.ast.get(node).scope_ref;
    while let Some(s) = scope {
        let kind = gen.scopes.get(s).kind;
        if matches!(kind, ScopeKind::Loop | ScopeKind::Switch) {
            return Some(s);
        }
        scope = gen.scopes.get(s).parent;
    }
    None
}

pub(super) fn compile_return(gen: &mut CodeGen, node: NodeId) {
    let children = gen.ast.children(node).to_vec();
    let value = children.first().copied();
    if let Some(value) = value {
        compile_expr(gen, value);
    }
    // The function's own scope (locals, defers) must still clean up on the
    // way out, so the boundary is the function scope's parent, not the
    // function scope itself.
    let start = gen.ast.get(node).scope_ref;
    let boundary = start
        .and_then(|s| gen.scopes.find_function_scope(s))
        .and_then(|f| gen.scopes.get(f).parent);
    emit_cleanup_through(gen, start, boundary);
    if value.is_some() {
        gen.emit(Opcode::Return, 0);
    } else {
        gen.emit(Opcode::ReturnVoid, 0);
    }
}

/// `deferred` statements run in LIFO order at every exit point from the
/// enclosing scope (spec §5/§9); codegen here just records the statement
/// and `emit_scope_cleanup` replays it — at normal fallthrough
/// (`compile_block`) and at every early exit (`break`/`continue`/`return`/
/// `goto`) via `emit_cleanup_through`.
pub(super) fn compile_defer(gen: &mut CodeGen, node: NodeId) {
    if let Some(scope) = gen.ast.get(node).scope_ref {
        gen.scopes.get_mut(scope).deferred.push(node);
    }
}

/// Does any path through `node` reach a `return` carrying a value? Purely
/// syntactic (spec §4.4.6): `FuncDef` carries no declared return type in
/// this AST, so "should this function return a value" is inferred from
/// whether the body ever attempts to return one, not from a signature.
pub(super) fn returns_a_value(ast: &Ast, node: NodeId) -> bool {
    if let NodeKind::Return = ast.get(node).kind {
        if !ast.children(node).is_empty() {
            return true;
        }
    }
    ast.children(node).iter().any(|&c| returns_a_value(ast, c))
}

/// Structural "all paths terminate in a return" check (Testable Property 3):
/// a block terminates if its last statement terminates; `if` terminates only
/// if both branches do (a missing `else` never terminates); loops and plain
/// statements don't terminate on their own. Doesn't special-case `break`
/// escaping a terminating loop body — that's a accepted conservative
/// approximation (a loop is never counted as terminating), matching the
/// warning's role as a safety net rather than an exhaustive prover.
pub(super) fn all_paths_return(ast: &Ast, node: NodeId) -> bool {
    match ast.get(node).kind {
        NodeKind::Return => true,
        NodeKind::Block => ast
            .children(node)
            .last()
            .is_some_and(|&last| all_paths_return(ast, last)),
        NodeKind::If => {
            let children = ast.children(node);
            let then_branch = children.get(1).copied();
            let else_branch = children.get(2).copied();
            match (then_branch, else_branch) {
                (Some(t), Some(e)) => all_paths_return(ast, t) && all_paths_return(ast, e),
                _ => false,
            }
        }
        _ => false,
    }
}
