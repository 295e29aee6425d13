//! Programmatic AST construction — the host-facing entry point that stands
//! in for a parser (spec §1: tokenizer/parser are a host concern). A host
//! that already has its own front end walks its own parse tree and calls
//! these constructors instead of shelling out to one here.
//!
//! Every constructor returns a freshly allocated, unparented [`NodeId`];
//! callers wire children together with [`Builder::add_child`] the same way
//! a hand-written parser would build a tree bottom-up.

use crate::ast::{Ast, BinOp, CaseLabel, ConstValue, NodeId, NodeKind, PointerKind, Qualifiers, UnOp};
use lethe_host::SourceLocation;

pub struct Builder {
    ast: Ast,
}

impl Builder {
    pub fn new() -> Self {
        Builder { ast: Ast::new() }
    }

    /// Consumes the builder, handing back the finished arena for
    /// `Engine::compile` to bind/resolve/codegen.
    pub fn finish(self) -> Ast {
        self.ast
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn ast_mut(&mut self) -> &mut Ast {
        &mut self.ast
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.ast.add_child(parent, child);
    }

    pub fn add_children(&mut self, parent: NodeId, children: impl IntoIterator<Item = NodeId>) {
        for child in children {
            self.ast.add_child(parent, child);
        }
    }

    pub fn qualify(&mut self, node: NodeId, qualifiers: Qualifiers) {
        self.ast.get_mut(node).qualifiers.insert(qualifiers);
    }

    fn alloc(&mut self, loc: SourceLocation, kind: NodeKind) -> NodeId {
        self.ast.alloc(loc, kind)
    }

    pub fn program(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::Program)
    }

    pub fn namespace(&mut self, loc: SourceLocation, name: impl Into<String>) -> NodeId {
        self.alloc(loc, NodeKind::Namespace { name: name.into() })
    }

    pub fn struct_def(&mut self, loc: SourceLocation, name: impl Into<String>, base: Option<String>) -> NodeId {
        self.alloc(loc, NodeKind::StructDef { name: name.into(), base })
    }

    pub fn class_def(
        &mut self,
        loc: SourceLocation,
        name: impl Into<String>,
        base: Option<String>,
        is_state: bool,
    ) -> NodeId {
        self.alloc(loc, NodeKind::ClassDef { name: name.into(), base, is_state })
    }

    pub fn func_def(&mut self, loc: SourceLocation, name: impl Into<String>, operator: Option<String>) -> NodeId {
        self.alloc(loc, NodeKind::FuncDef { name: name.into(), operator })
    }

    pub fn arg_list(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::ArgList)
    }

    pub fn var_decl(&mut self, loc: SourceLocation, name: impl Into<String>, is_auto: bool) -> NodeId {
        self.alloc(loc, NodeKind::VarDecl { name: name.into(), is_auto })
    }

    pub fn type_name(&mut self, loc: SourceLocation, name: impl Into<String>) -> NodeId {
        self.alloc(loc, NodeKind::TypeName { name: name.into() })
    }

    pub fn type_auto(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::TypeAuto)
    }

    pub fn type_pointer(&mut self, loc: SourceLocation, kind: PointerKind) -> NodeId {
        self.alloc(loc, NodeKind::TypePointer { kind })
    }

    pub fn type_static_array(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::TypeStaticArray)
    }

    pub fn type_dynamic_array(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::TypeDynamicArray)
    }

    pub fn block(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::Block)
    }

    pub fn if_stmt(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::If)
    }

    pub fn while_stmt(&mut self, loc: SourceLocation, nobreak: bool) -> NodeId {
        self.alloc(loc, NodeKind::While { nobreak })
    }

    pub fn do_stmt(&mut self, loc: SourceLocation, nobreak: bool) -> NodeId {
        self.alloc(loc, NodeKind::Do { nobreak })
    }

    pub fn for_stmt(&mut self, loc: SourceLocation, nobreak: bool, is_range: bool) -> NodeId {
        self.alloc(loc, NodeKind::For { nobreak, is_range })
    }

    pub fn switch_stmt(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::Switch)
    }

    pub fn case_stmt(&mut self, loc: SourceLocation, labels: Vec<CaseLabel>, is_default: bool) -> NodeId {
        self.alloc(loc, NodeKind::Case { labels, is_default })
    }

    pub fn break_stmt(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::Break)
    }

    pub fn continue_stmt(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::Continue)
    }

    pub fn return_stmt(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::Return)
    }

    pub fn goto_stmt(&mut self, loc: SourceLocation, label: impl Into<String>) -> NodeId {
        self.alloc(loc, NodeKind::Goto { label: label.into() })
    }

    pub fn label(&mut self, loc: SourceLocation, name: impl Into<String>) -> NodeId {
        self.alloc(loc, NodeKind::Label { name: name.into() })
    }

    pub fn defer_stmt(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::Defer)
    }

    pub fn expr_stmt(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::ExprStatement)
    }

    pub fn ident(&mut self, loc: SourceLocation, name: impl Into<String>) -> NodeId {
        self.alloc(loc, NodeKind::Ident { name: name.into() })
    }

    pub fn dot(&mut self, loc: SourceLocation, member: impl Into<String>) -> NodeId {
        self.alloc(loc, NodeKind::Dot { member: member.into() })
    }

    pub fn call(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::Call)
    }

    pub fn index(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::Index)
    }

    pub fn binary_op(&mut self, loc: SourceLocation, op: BinOp) -> NodeId {
        self.alloc(loc, NodeKind::BinaryOp(op))
    }

    pub fn unary_op(&mut self, loc: SourceLocation, op: UnOp) -> NodeId {
        self.alloc(loc, NodeKind::UnaryOp(op))
    }

    pub fn assign(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::Assign)
    }

    pub fn compound_assign(&mut self, loc: SourceLocation, op: BinOp) -> NodeId {
        self.alloc(loc, NodeKind::CompoundAssign(op))
    }

    pub fn ternary(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::Ternary)
    }

    pub fn this_expr(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::This)
    }

    pub fn new_expr(&mut self, loc: SourceLocation) -> NodeId {
        self.alloc(loc, NodeKind::New)
    }

    pub fn const_bool(&mut self, loc: SourceLocation, value: bool) -> NodeId {
        self.alloc(loc, NodeKind::ConstBool(value))
    }

    pub fn const_int(&mut self, loc: SourceLocation, value: ConstValue) -> NodeId {
        self.alloc(loc, NodeKind::ConstInt(value))
    }

    pub fn const_string(&mut self, loc: SourceLocation, value: impl Into<String>) -> NodeId {
        self.alloc(loc, NodeKind::ConstString(value.into()))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::new("t.le", 0, 0)
    }

    #[test]
    fn builds_a_function_returning_a_constant() {
        let mut b = Builder::new();
        let program = b.program(loc());
        let func = b.func_def(loc(), "answer", None);
        let body = b.block(loc());
        let ret = b.return_stmt(loc());
        let forty_two = b.const_int(loc(), ConstValue::Int(42));
        b.add_child(ret, forty_two);
        b.add_child(body, ret);
        b.add_child(func, body);
        b.add_child(program, func);

        let ast = b.finish();
        assert_eq!(ast.children(program), &[func]);
        assert_eq!(ast.children(body), &[ret]);
    }
}
