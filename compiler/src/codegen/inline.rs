//! Inline expansion (spec §4.4.5, §9): small, non-virtual, non-recursive
//! calls get their body spliced into the call site instead of emitted as a
//! `CallScript`. Gated by [`crate::config::InlineLimits`] (depth and a
//! per-expansion opcode budget spec §9 explicitly flags as "should stay
//! configurable, not hard-coded").

use super::CodeGen;
use crate::ast::{NodeId, NodeKind, Qualifiers};

/// Attempts to replace `call_node` with an inlined copy of its callee's
/// body. Returns `Some(())` (and has already emitted code) on success, or
/// `None` if the call doesn't qualify — the caller then falls back to an
/// ordinary `CallScript`/`CallNative` emission.
pub(super) fn try_inline(
    gen: &mut CodeGen,
    _call_node: NodeId,
    callee: NodeId,
    args: &[NodeId],
) -> Option<()> {
    if !gen.config.optimizations.inline_expansion {
        return None;
    }
    if gen.inline_depth >= gen.config.inline_limits.max_depth {
        return None;
    }
    let target = gen.ast.get(callee).target?;
    let qualifiers = gen.ast.get(target).qualifiers;
    if qualifiers.contains(Qualifiers::VIRTUAL) || !qualifiers.contains(Qualifiers::INLINE) {
        return None;
    }

    let body = gen
        .ast
        .children(target)
        .iter()
        .copied()
        .find(|&c| matches!(gen.ast.get(c).kind, NodeKind::Block))?;
    if estimate_opcode_count(gen, body) > gen.config.inline_limits.max_expansion_opcodes {
        return None;
    }

    let params: Vec<NodeId> = gen
        .ast
        .children(target)
        .iter()
        .copied()
        .filter(|&c| matches!(gen.ast.get(c).kind, NodeKind::VarDecl { .. }))
        .collect();
    if params.len() != args.len() {
        return None;
    }

    gen.inline_depth += 1;
    // Bind each argument by evaluating it and storing into a fresh local
    // slot that shadows the parameter's declared offset for the duration
    // of the spliced body (a deep-cloned body still carries the original
    // parameter `NodeId`s as `target`s, so rewriting `offset` here is
    // enough without rewriting every reference node).
    let cloned_body = gen.ast.clone_subtree(body);
    for (&param, &arg) in params.iter().zip(args.iter()) {
        super::expr::compile_expr(gen, arg);
        let offset = gen.local_offset(param);
        gen.emit(lethe_host::Opcode::LocalStore, offset);
    }
    gen.compile_stmt(cloned_body);
    gen.inline_depth -= 1;
    Some(())
}

fn estimate_opcode_count(gen: &CodeGen, node: NodeId) -> u32 {
    let mut count = 1;
    for &child in gen.ast.children(node) {
        count += estimate_opcode_count(gen, child);
    }
    count
}
