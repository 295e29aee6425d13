//! Named Return Value Optimization (spec §4.4.5, testable property 5):
//! when a local's only use is being the direct argument of the enclosing
//! function's sole `return`, its constructor can target the caller's
//! result slot directly instead of constructing-then-copying.
//!
//! Disabled entirely by [`crate::config::OptimizationFlags::nrvo`] so the
//! equivalence test in spec §8 can compile the same program both ways and
//! diff the `Image`s (modulo the `Ctor`/`Assign` vs. direct-construct
//! opcode sequence NRVO elides).

use super::CodeGen;
use crate::ast::{NodeId, NodeKind};

/// Returns `true` when `decl`'s initializer can be constructed directly
/// into the caller's result slot rather than into a local temporary that
/// is later copied out.
pub(super) fn elides_initializer(gen: &CodeGen, decl: NodeId) -> bool {
    if !gen.config.optimizations.nrvo {
        return false;
    }
    let Some(data_type) = gen.data_type_of(decl) else { return false };
    let dt_kind = gen.types.get(data_type.type_id).kind;
    if !matches!(dt_kind, crate::types::TypeKind::Struct | crate::types::TypeKind::Class) {
        return false;
    }
    let Some(&init) = gen.ast.children(decl).first() else { return false };
    // Only a bare aggregate-constructing call qualifies; anything else
    // (a field access, a binary expression) can't be redirected in place.
    if !matches!(gen.ast.get(init).kind, NodeKind::Call | NodeKind::New) {
        return false;
    }
    is_sole_returned_local(gen, decl)
}

/// Walks up to the enclosing function body and checks that `decl` is
/// returned, alone, on every path that returns (spec §4.4.5's NRVO
/// eligibility: a single, unconditional identity return of the local).
fn is_sole_returned_local(gen: &CodeGen, decl: NodeId) -> bool {
    let Some(func_scope) = gen
        .ast
        .get(decl)
        .scope_ref
        .and_then(|s| gen.scopes.find_function_scope(s))
    else {
        return false;
    };
    let Some(func_node) = gen.scopes.get(func_scope).node else {
        return false;
    };
    let mut returns = Vec::new();
    collect_returns(gen, func_node, &mut returns);
    if returns.is_empty() {
        return false;
    }
    returns.iter().all(|&ret| {
        gen.ast
            .children(ret)
            .first()
            .map(|&v| matches!(gen.ast.get(v).kind, NodeKind::Ident { .. }) && gen.ast.get(v).target == Some(decl))
            .unwrap_or(false)
    })
}

fn collect_returns(gen: &CodeGen, node: NodeId, out: &mut Vec<NodeId>) {
    if matches!(gen.ast.get(node).kind, NodeKind::Return) {
        out.push(node);
    }
    for &child in gen.ast.children(node) {
        collect_returns(gen, child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ast;
    use crate::config::CompilerConfig;
    use crate::diagnostics::DiagnosticSink;
    use crate::scope::{ScopeKind, ScopeTree};
    use crate::types::QDataType;
    use crate::typetable::TypeTable;
    use lethe_host::{NativeRegistry, SourceLocation};

    fn loc() -> SourceLocation {
        SourceLocation::new("t.le", 0, 0)
    }

    #[test]
    fn recognizes_sole_identity_return_as_nrvo_eligible() {
        let mut ast = Ast::new();
        let mut scopes = ScopeTree::new();
        let mut types = TypeTable::new();
        let registry = NativeRegistry::new();
        let mut sink = DiagnosticSink::new();
        let config = CompilerConfig::new();

        let class = types.declare_aggregate("Vec3", crate::types::TypeKind::Class, None).unwrap();
        let func_scope = scopes.alloc(ScopeKind::Function, Some(scopes.global()));

        let call = ast.alloc(loc(), NodeKind::Call);
        let decl = ast.alloc(loc(), NodeKind::VarDecl { name: "v".into(), is_auto: false });
        ast.add_child(decl, call);
        ast.get_mut(decl).data_type = Some(QDataType::new(class, crate::ast::Qualifiers::EMPTY));
        ast.get_mut(decl).scope_ref = Some(func_scope);

        let ident = ast.alloc(loc(), NodeKind::Ident { name: "v".into() });
        ast.get_mut(ident).target = Some(decl);
        let ret = ast.alloc(loc(), NodeKind::Return);
        ast.add_child(ret, ident);

        let body = ast.alloc(loc(), NodeKind::Block);
        ast.add_child(body, decl);
        ast.add_child(body, ret);
        let func = ast.alloc(loc(), NodeKind::FuncDef { name: "make".into(), operator: None });
        ast.add_child(func, body);
        scopes.get_mut(func_scope).node = Some(func);

        let gen = CodeGen::new(&mut ast, &mut scopes, &mut types, &registry, &mut sink, &config);
        assert!(elides_initializer(&gen, decl));
    }
}
