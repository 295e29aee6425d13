//! Scope binding: the pass that walks a freshly built AST and creates the
//! [`ScopeTree`] structure `resolver.rs` depends on.
//!
//! In the original engine this bookkeeping happens inline during parsing —
//! a `NamedScope` is pushed the moment the parser enters a `{`. Since
//! `lethe-compiler` never parses source text (spec §1: tokenizer/parser
//! are a host concern), an AST arriving through [`crate::builder`] has no
//! scopes yet; this pass is the one place that gap is closed, run once
//! right after the AST is built and before `resolve`.

use crate::ast::{Ast, NodeId, NodeKind};
use crate::scope::{ScopeId, ScopeKind, ScopeTree};

pub struct Binder<'a> {
    ast: &'a mut Ast,
    scopes: &'a mut ScopeTree,
}

impl<'a> Binder<'a> {
    pub fn new(ast: &'a mut Ast, scopes: &'a mut ScopeTree) -> Self {
        Binder { ast, scopes }
    }

    pub fn run(&mut self, root: NodeId) {
        let span = tracing::info_span!("bind_scopes");
        let _enter = span.enter();
        let global = self.scopes.global();
        self.bind(root, global);
        self.link_bases(root);
    }

    fn bind(&mut self, node: NodeId, enclosing: ScopeId) {
        self.ast.get_mut(node).scope_ref = Some(enclosing);

        let global = self.scopes.global();
        let own_scope = match self.ast.get(node).kind.clone() {
            NodeKind::Namespace { name } => Some(self.scopes.alloc_named(ScopeKind::Namespace, enclosing, &name)),
            // Registered at global scope regardless of lexical nesting:
            // `resolver.rs`'s `find_composite_scope_for_type` and
            // `typegen.rs`'s `find_scope_for_type` both look a type's
            // composite scope up by name under `scopes.global()`.
            NodeKind::StructDef { name, .. } => Some(self.scopes.alloc_named(ScopeKind::Struct, global, &name)),
            NodeKind::ClassDef { name, .. } => Some(self.scopes.alloc_named(ScopeKind::Class, global, &name)),
            NodeKind::FuncDef { name, .. } => {
                self.scopes.declare_member(enclosing, &name, node);
                Some(self.scopes.alloc(ScopeKind::Function, Some(enclosing)))
            }
            NodeKind::Block => Some(self.scopes.alloc(ScopeKind::Local, Some(enclosing))),
            NodeKind::While { .. } | NodeKind::Do { .. } | NodeKind::For { .. } => {
                Some(self.scopes.alloc(ScopeKind::Loop, Some(enclosing)))
            }
            NodeKind::Switch => Some(self.scopes.alloc(ScopeKind::Switch, Some(enclosing))),
            _ => None,
        };

        let scope_for_children = own_scope.unwrap_or(enclosing);
        if let Some(scope) = own_scope {
            self.ast.get_mut(node).scope_ref = Some(scope);
            self.ast.get_mut(node).sym_scope_ref = Some(scope);
            // `nrvo.rs`'s `is_sole_returned_local` walks back from a local's
            // scope to its enclosing Function scope, then to this node.
            self.scopes.get_mut(scope).node = Some(node);
        }

        if let NodeKind::VarDecl { name, .. } = self.ast.get(node).kind.clone() {
            self.scopes.declare_member(enclosing, &name, node);
        }
        if let NodeKind::EnumItem { name } = self.ast.get(node).kind.clone() {
            self.scopes.declare_member(enclosing, &name, node);
        }
        if let NodeKind::Label { name } = self.ast.get(node).kind.clone() {
            self.scopes.get_mut(enclosing).labels.insert(name, node);
        }

        // A method's Function scope is parented directly off its
        // `StructDef`/`ClassDef` scope, so `find_this` finds the composite
        // without any extra wiring here.
        for &child in self.ast.children(node).to_vec().iter() {
            self.bind(child, scope_for_children);
        }
    }

    /// Second pass: now that every `StructDef`/`ClassDef` has a named
    /// scope, link `base: Option<String>` to the base's scope id (spec §3
    /// invariant: base is non-null only for struct/class scopes).
    fn link_bases(&mut self, node: NodeId) {
        let base_name = match self.ast.get(node).kind.clone() {
            NodeKind::StructDef { base, .. } => base,
            NodeKind::ClassDef { base, .. } => base,
            _ => None,
        };
        if let (Some(base), Some(scope)) = (base_name, self.ast.get(node).sym_scope_ref) {
            let global = self.scopes.global();
            if let Some(&base_scope) = self.scopes.get(global).named_scopes.get(&base) {
                self.scopes.set_base(scope, base_scope);
            }
        }
        for &child in self.ast.children(node).to_vec().iter() {
            self.link_bases(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lethe_host::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::new("t.le", 0, 0)
    }

    #[test]
    fn function_body_gets_its_own_local_scope_chained_to_global() {
        let mut ast = Ast::new();
        let mut scopes = ScopeTree::new();

        let body = ast.alloc(loc(), NodeKind::Block);
        let func = ast.alloc(loc(), NodeKind::FuncDef { name: "main".into(), operator: None });
        ast.add_child(func, body);
        let program = ast.alloc(loc(), NodeKind::Program);
        ast.add_child(program, func);

        Binder::new(&mut ast, &mut scopes).run(program);

        let body_scope = ast.get(body).scope_ref.unwrap();
        assert_eq!(scopes.get(body_scope).kind, ScopeKind::Local);
        assert!(scopes.find_symbol(body_scope, "main", false, true).is_some());
    }

    #[test]
    fn struct_base_name_links_to_base_scope() {
        let mut ast = Ast::new();
        let mut scopes = ScopeTree::new();

        let base = ast.alloc(loc(), NodeKind::StructDef { name: "Base".into(), base: None });
        let derived = ast.alloc(loc(), NodeKind::StructDef { name: "Derived".into(), base: Some("Base".into()) });
        let program = ast.alloc(loc(), NodeKind::Program);
        ast.add_child(program, base);
        ast.add_child(program, derived);

        Binder::new(&mut ast, &mut scopes).run(program);

        let base_scope = ast.get(base).sym_scope_ref.unwrap();
        let derived_scope = ast.get(derived).sym_scope_ref.unwrap();
        assert_eq!(scopes.get(derived_scope).base, Some(base_scope));
    }
}
