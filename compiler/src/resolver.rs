//! Fixed-point name resolution driver (spec §4.1).
//!
//! Each pass is a DFS over the program root; a node's resolution routine is
//! invoked, and if it reports [`ResolveStatus::More`] the driver repeats
//! until a full pass produces no more progress. `resolve` is required to be
//! idempotent and monotonic: once a node's `RESOLVED` flag is set, nothing
//! but the scope-resolution-chain collapse clears it (and that collapse
//! replaces the node's identity rather than "un-resolving" it).

use crate::ast::{Ast, ConstValue, NodeFlags, NodeId, NodeKind};
use crate::config::CompilerConfig;
use crate::diagnostics::{kind, DiagnosticSink};
use crate::scope::{ScopeId, ScopeTree};
use crate::types::{QDataType, TypeKind};
use crate::typetable::TypeTable;
use lethe_host::NativeRegistry;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStatus {
    Done,
    More,
}

/// Synthetic per-primitive ADL scopes (spec §4.1: `__int`, `__uint`, ...).
pub const PRIMITIVE_ADL_SCOPES: &[(&str, TypeKind)] = &[
    ("__int", TypeKind::Int),
    ("__uint", TypeKind::UInt),
    ("__long", TypeKind::Long),
    ("__ulong", TypeKind::ULong),
    ("__float", TypeKind::Float),
    ("__double", TypeKind::Double),
    ("__name", TypeKind::Name),
    ("__string", TypeKind::String),
];

pub struct Resolver<'a> {
    ast: &'a mut Ast,
    scopes: &'a mut ScopeTree,
    types: &'a mut TypeTable,
    registry: &'a NativeRegistry,
    sink: &'a mut DiagnosticSink,
    config: &'a CompilerConfig,
    /// Per-node recursive-auto lock counters (spec §4.1: "capped at 100").
    auto_locks: HashMap<NodeId, u32>,
    /// Synthetic primitive scopes, created lazily under global scope.
    primitive_scopes: HashMap<TypeKind, ScopeId>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        ast: &'a mut Ast,
        scopes: &'a mut ScopeTree,
        types: &'a mut TypeTable,
        registry: &'a NativeRegistry,
        sink: &'a mut DiagnosticSink,
        config: &'a CompilerConfig,
    ) -> Self {
        let global = scopes.global();
        let mut primitive_scopes = HashMap::new();
        for &(name, kind) in PRIMITIVE_ADL_SCOPES {
            let scope = match scopes.get(global).named_scopes.get(name) {
                Some(&existing) => existing,
                None => scopes.alloc_named(crate::scope::ScopeKind::Namespace, global, name),
            };
            primitive_scopes.insert(kind, scope);
        }
        Resolver {
            ast,
            scopes,
            types,
            registry,
            sink,
            config,
            auto_locks: HashMap::new(),
            primitive_scopes,
        }
    }

    /// Runs the fixed-point loop over `root`. Returns `true` if resolution
    /// converged (every node resolved or a hard error was recorded) within
    /// `config.max_resolve_passes`.
    pub fn run(&mut self, root: NodeId) -> bool {
        let span = tracing::info_span!("resolve");
        let _enter = span.enter();

        for pass in 0..self.config.max_resolve_passes {
            let status = self.pass(root);
            tracing::debug!(pass, ?status, "resolve pass complete");
            if status == ResolveStatus::Done {
                return true;
            }
            if self.sink.has_errors() {
                return false;
            }
        }
        false
    }

    fn pass(&mut self, node: NodeId) -> ResolveStatus {
        // Post-order DFS: children first, so a parent's resolution can rely
        // on child `target`/`data_type` already being populated this pass.
        let children = self.ast.children(node).to_vec();
        let mut status = ResolveStatus::Done;
        for child in children {
            if self.pass(child) == ResolveStatus::More {
                status = ResolveStatus::More;
            }
        }

        if self.ast.get(node).is_resolved() {
            return status;
        }

        match self.resolve_node(node) {
            ResolveStatus::Done => {
                self.ast.get_mut(node).flags.insert(NodeFlags::RESOLVED);
            }
            ResolveStatus::More => status = ResolveStatus::More,
        }
        status
    }

    fn resolve_node(&mut self, node: NodeId) -> ResolveStatus {
        let kind = self.ast.get(node).kind.clone();
        match kind {
            NodeKind::Ident { name } => self.resolve_ident(node, &name),
            NodeKind::ScopeRes { path } => self.resolve_scope_res(node, &path),
            NodeKind::Dot { member } => self.resolve_dot(node, &member),
            NodeKind::Call => self.resolve_call(node),
            NodeKind::VarDecl { is_auto, .. } if is_auto => self.resolve_auto_decl(node),
            NodeKind::ConstBool(_)
            | NodeKind::ConstInt(_)
            | NodeKind::ConstString(_)
            | NodeKind::ConstName(_)
            | NodeKind::ConstNull
            | NodeKind::This
            | NodeKind::TypeName { .. }
            | NodeKind::TypeAuto
            | NodeKind::Program
            | NodeKind::Namespace { .. }
            | NodeKind::StructDef { .. }
            | NodeKind::ClassDef { .. }
            | NodeKind::EnumDef { .. }
            | NodeKind::EnumItem { .. }
            | NodeKind::FuncDef { .. }
            | NodeKind::ArgList
            | NodeKind::VarDeclList
            | NodeKind::VarDecl { .. }
            | NodeKind::TypePointer { .. }
            | NodeKind::TypeStaticArray
            | NodeKind::TypeDynamicArray
            | NodeKind::TypeArrayRef
            | NodeKind::TypeFuncPtr
            | NodeKind::TypeDelegate
            | NodeKind::Block
            | NodeKind::If
            | NodeKind::While { .. }
            | NodeKind::Do { .. }
            | NodeKind::For { .. }
            | NodeKind::Switch
            | NodeKind::Case { .. }
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Return
            | NodeKind::Goto { .. }
            | NodeKind::Label { .. }
            | NodeKind::Defer
            | NodeKind::ExprStatement
            | NodeKind::Index
            | NodeKind::BinaryOp(_)
            | NodeKind::UnaryOp(_)
            | NodeKind::UnaryPreOp(_)
            | NodeKind::UnaryPostOp(_)
            | NodeKind::Assign
            | NodeKind::CompoundAssign(_)
            | NodeKind::Ternary
            | NodeKind::InitializerList
            | NodeKind::New
            | NodeKind::AddressOf => ResolveStatus::Done,
        }
    }

    fn current_scope_chain_lookup(&self, node: NodeId, name: &str) -> Option<NodeId> {
        let scope = self.ast.get(node).scope_ref?;
        self.scopes.find_symbol(scope, name, true, true)
    }

    fn resolve_ident(&mut self, node: NodeId, name: &str) -> ResolveStatus {
        if let Some(target) = self.current_scope_chain_lookup(node, name) {
            self.ast.get_mut(node).target = Some(target);
            if let Some(dt) = self.ast.get(target).data_type {
                self.ast.get_mut(node).data_type = Some(dt);
            }
            return ResolveStatus::Done;
        }
        self.sink.push_error(
            kind::UNKNOWN_SYMBOL,
            format!("unknown symbol `{name}`"),
            self.ast.get(node).location.clone(),
        );
        ResolveStatus::Done
    }

    /// Collapses `a::b::c` once the rightmost symbol resolves: the node's
    /// kind is mutated to an `Ident`-shaped target reference in place and
    /// the temporary path children are discarded (spec §4.1: "destructive,
    /// must not recurse into itself").
    fn resolve_scope_res(&mut self, node: NodeId, path: &[String]) -> ResolveStatus {
        let Some(last) = path.last() else {
            return ResolveStatus::Done;
        };
        // Walk the path left to right through named sub-scopes starting at
        // the node's lexical scope, falling back to global on a miss.
        let mut scope = self.ast.get(node).scope_ref.unwrap_or(self.scopes.global());
        for segment in &path[..path.len() - 1] {
            match self.scopes.get(scope).named_scopes.get(segment) {
                Some(&next) => scope = next,
                None => {
                    self.sink.push_error(
                        kind::UNKNOWN_SYMBOL,
                        format!("unknown scope `{segment}`"),
                        self.ast.get(node).location.clone(),
                    );
                    return ResolveStatus::Done;
                }
            }
        }
        match self.scopes.find_symbol(scope, last, true, false) {
            Some(target) => {
                let data_type = self.ast.get(target).data_type;
                self.ast.rewrite(node, NodeKind::Ident { name: last.clone() }, Vec::new());
                self.ast.get_mut(node).target = Some(target);
                self.ast.get_mut(node).data_type = data_type;
                ResolveStatus::Done
            }
            None => {
                self.sink.push_error(
                    kind::UNKNOWN_SYMBOL,
                    format!("unknown symbol `{last}`"),
                    self.ast.get(node).location.clone(),
                );
                ResolveStatus::Done
            }
        }
    }

    /// Dot-operator rhs resolution consults only the base chain of the lhs's
    /// static type (spec §4.1). Property members are cached by rewriting
    /// the target to the `__get_<name>`/`__set_<name>` accessor per spec
    /// §4.7, deferred to `codegen` which performs the actual call rewrite.
    fn resolve_dot(&mut self, node: NodeId, member: &str) -> ResolveStatus {
        let Some(&lhs) = self.ast.children(node).first() else {
            return ResolveStatus::Done;
        };
        let Some(lhs_type) = self.ast.get(lhs).data_type else {
            return ResolveStatus::More;
        };
        let Some(scope) = self.find_composite_scope_for_type(lhs_type.type_id) else {
            self.sink.push_error(
                kind::INCOMPATIBLE_TYPES,
                format!("type has no member `{member}`"),
                self.ast.get(node).location.clone(),
            );
            return ResolveStatus::Done;
        };
        if member == "size" {
            // spec §4.3: `array.size` on a static array folds to a constant
            // int; for dynamic/array-ref it resolves to the runtime member.
            self.ast.get_mut(node).data_type = Some(QDataType::new(
                self.types.int(),
                crate::ast::Qualifiers::EMPTY,
            ));
            return ResolveStatus::Done;
        }
        match self.scopes.find_symbol(scope, member, true, false) {
            Some(target) => {
                self.ast.get_mut(node).target = Some(target);
                if let Some(dt) = self.ast.get(target).data_type {
                    self.ast.get_mut(node).data_type = Some(dt);
                }
                ResolveStatus::Done
            }
            None => {
                // property getter fallback, spec §4.7.
                let getter = format!("__get_{member}");
                if let Some(target) = self.scopes.find_symbol(scope, &getter, true, false) {
                    self.ast
                        .get_mut(node)
                        .qualifiers
                        .insert(crate::ast::Qualifiers::PROPERTY);
                    self.ast.get_mut(node).target = Some(target);
                    ResolveStatus::Done
                } else {
                    self.sink.push_error(
                        kind::INCOMPATIBLE_TYPES,
                        format!("no member or property `{member}`"),
                        self.ast.get(node).location.clone(),
                    );
                    ResolveStatus::Done
                }
            }
        }
    }

    fn find_composite_scope_for_type(&self, type_id: crate::types::TypeId) -> Option<ScopeId> {
        let name = &self.types.get(type_id).name;
        // Composite scopes are registered by name at global scope during
        // ScopeTree construction (see `builder.rs`).
        self.scopes
            .get(self.scopes.global())
            .named_scopes
            .get(name)
            .copied()
    }

    /// Resolves a call's arguments, then if the callee identifier hasn't
    /// already bound to an unambiguous symbol, performs ADL over argument
    /// types (spec §4.1/§4.1.1).
    fn resolve_call(&mut self, node: NodeId) -> ResolveStatus {
        let children = self.ast.children(node).to_vec();
        let Some(&callee) = children.first() else {
            return ResolveStatus::Done;
        };
        let args = &children[1..];

        let NodeKind::Ident { name } = self.ast.get(callee).kind.clone() else {
            // scope-resolved / dot-resolved callee: nothing further to do
            // here, already handled by `resolve_dot`/`resolve_scope_res`.
            return ResolveStatus::Done;
        };

        if self.ast.get(callee).target.is_some() {
            return ResolveStatus::Done;
        }

        // Ordinary (non-ADL) lookup first.
        if let Some(scope) = self.ast.get(node).scope_ref {
            if let Some(target) = self.scopes.find_symbol(scope, &name, true, true) {
                self.ast.get_mut(callee).target = Some(target);
                self.ast.get_mut(callee).flags.insert(NodeFlags::RESOLVED);
                return ResolveStatus::Done;
            }
        }

        // ADL: for each argument whose type is known, search the type's own
        // scope and the matching synthetic primitive scope.
        let mut candidates: Vec<NodeId> = Vec::new();
        for &arg in args {
            let Some(arg_type) = self.ast.get(arg).data_type else {
                return ResolveStatus::More;
            };
            if let Some(scope) = self.find_composite_scope_for_type(arg_type.type_id) {
                if let Some(c) = self.scopes.find_symbol(scope, &name, true, false) {
                    if !candidates.contains(&c) {
                        candidates.push(c);
                    }
                }
            }
            if let Some(prim_scope) = self.primitive_scope_for(arg_type.type_id) {
                if let Some(c) = self.scopes.get(prim_scope).members.get(&name).copied() {
                    if !candidates.contains(&c) {
                        candidates.push(c);
                    }
                }
            }
        }

        let fit: Vec<NodeId> = candidates
            .into_iter()
            .filter(|&c| self.adl_fitness(c, args))
            .collect();

        match fit.len() {
            0 => {
                self.sink.push_error(
                    kind::UNKNOWN_SYMBOL,
                    format!("unknown function `{name}`"),
                    self.ast.get(node).location.clone(),
                );
                ResolveStatus::Done
            }
            1 => {
                self.ast.get_mut(callee).target = Some(fit[0]);
                self.ast.get_mut(callee).flags.insert(NodeFlags::RESOLVED);
                ResolveStatus::Done
            }
            _ => {
                self.sink.push_error(
                    kind::AMBIGUOUS_CALL,
                    format!("ambiguous call to `{name}`"),
                    self.ast.get(node).location.clone(),
                );
                ResolveStatus::Done
            }
        }
    }

    fn primitive_scope_for(&self, type_id: crate::types::TypeId) -> Option<ScopeId> {
        let kind = self.types.get(type_id).kind;
        self.primitive_scopes.get(&kind).copied()
    }

    /// Spec §4.1.1 candidate fitness check.
    fn adl_fitness(&self, candidate: NodeId, call_args: &[NodeId]) -> bool {
        let param_types: Vec<QDataType> = self
            .ast
            .children(candidate)
            .iter()
            .filter_map(|&p| self.ast.get(p).data_type)
            .collect();

        if call_args.len() > param_types.len() {
            return false;
        }

        for (i, &arg) in call_args.iter().enumerate() {
            let Some(arg_type) = self.ast.get(arg).data_type else {
                return false;
            };
            let Some(&param_type) = param_types.get(i) else {
                return false;
            };
            if !self.types_fit(param_type, arg_type) {
                return false;
            }
        }
        true
    }

    fn types_fit(&self, param: QDataType, arg: QDataType) -> bool {
        if param.type_id == arg.type_id {
            return true;
        }
        let param_kind = self.types.get(param.type_id).kind;
        let arg_kind = self.types.get(arg.type_id).kind;

        if param.is_reference() {
            // reference parameters require exact type-node match, spec §4.1.1.
            return param.type_id == arg.type_id;
        }
        if param_kind.is_number() && arg_kind.is_number() {
            let promoted_arg = if arg_kind.promotes_to_int() { TypeKind::Int } else { arg_kind };
            let promoted_param = if param_kind.promotes_to_int() { TypeKind::Int } else { param_kind };
            return promoted_arg == promoted_param;
        }
        matches!(
            (param_kind, arg_kind),
            (TypeKind::ArrayRef, TypeKind::DynamicArray) | (TypeKind::DynamicArray, TypeKind::ArrayRef)
        )
    }

    /// Spec §4.1: "Recursive auto (`auto x = x`) is detected via a per-node
    /// lock counter capped at 100." An auto decl resolves only once its
    /// initializer is itself resolved.
    fn resolve_auto_decl(&mut self, node: NodeId) -> ResolveStatus {
        let Some(&init) = self.ast.children(node).first() else {
            return ResolveStatus::Done;
        };
        if !self.ast.get(init).is_resolved() {
            let count = self.auto_locks.entry(node).or_insert(0);
            *count += 1;
            if *count > self.config.max_auto_resolution_locks {
                self.sink.push_error(
                    kind::RECURSIVE_AUTO,
                    "recursive `auto` initializer",
                    self.ast.get(node).location.clone(),
                );
                return ResolveStatus::Done;
            }
            return ResolveStatus::More;
        }
        if let Some(dt) = self.ast.get(init).data_type {
            self.ast.get_mut(node).data_type = Some(dt);
        }
        ResolveStatus::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Qualifiers;
    use crate::scope::ScopeKind;
    use lethe_host::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::new("t.le", 0, 0)
    }

    #[test]
    fn ident_resolves_against_enclosing_scope() {
        let mut ast = Ast::new();
        let mut scopes = ScopeTree::new();
        let mut types = TypeTable::new();
        let registry = NativeRegistry::new();
        let mut sink = DiagnosticSink::new();
        let config = CompilerConfig::new();

        let func_scope = scopes.alloc(ScopeKind::Function, Some(scopes.global()));
        let int_ty = types.int();

        let decl = ast.alloc(loc(), NodeKind::VarDecl { name: "x".into(), is_auto: false });
        ast.get_mut(decl).data_type = Some(QDataType::new(int_ty, Qualifiers::EMPTY));
        ast.get_mut(decl).flags.insert(NodeFlags::RESOLVED);
        scopes.declare_member(func_scope, "x", decl);

        let ident = ast.alloc(loc(), NodeKind::Ident { name: "x".into() });
        ast.get_mut(ident).scope_ref = Some(func_scope);

        let root = ast.alloc(loc(), NodeKind::Block);
        ast.add_child(root, ident);

        let mut resolver = Resolver::new(&mut ast, &mut scopes, &mut types, &registry, &mut sink, &config);
        assert!(resolver.run(root));
        assert_eq!(ast.get(ident).target, Some(decl));
    }

    #[test]
    fn unknown_symbol_reports_error_and_terminates() {
        let mut ast = Ast::new();
        let mut scopes = ScopeTree::new();
        let mut types = TypeTable::new();
        let registry = NativeRegistry::new();
        let mut sink = DiagnosticSink::new();
        let config = CompilerConfig::new();

        let ident = ast.alloc(loc(), NodeKind::Ident { name: "nope".into() });
        ast.get_mut(ident).scope_ref = Some(scopes.global());
        let root = ast.alloc(loc(), NodeKind::Block);
        ast.add_child(root, ident);

        let mut resolver = Resolver::new(&mut ast, &mut scopes, &mut types, &registry, &mut sink, &config);
        resolver.run(root);
        assert!(sink.has_errors());
    }

    #[test]
    fn recursive_auto_is_rejected_after_lock_cap() {
        let mut ast = Ast::new();
        let mut scopes = ScopeTree::new();
        let mut types = TypeTable::new();
        let registry = NativeRegistry::new();
        let mut sink = DiagnosticSink::new();
        let mut config = CompilerConfig::new();
        config.max_auto_resolution_locks = 3;
        config.max_resolve_passes = 10;

        // auto x = x; — initializer is an unresolved ident referring to `x`
        // itself, so it can never resolve: this should hit the lock cap.
        let decl = ast.alloc(loc(), NodeKind::VarDecl { name: "x".into(), is_auto: true });
        let self_ref = ast.alloc(loc(), NodeKind::Ident { name: "x".into() });
        ast.add_child(decl, self_ref);
        scopes.declare_member(scopes.global(), "x", decl);
        ast.get_mut(self_ref).scope_ref = Some(scopes.global());

        let root = ast.alloc(loc(), NodeKind::Block);
        ast.add_child(root, decl);

        let mut resolver = Resolver::new(&mut ast, &mut scopes, &mut types, &registry, &mut sink, &config);
        resolver.run(root);
        assert!(sink.has_errors());
    }
}
