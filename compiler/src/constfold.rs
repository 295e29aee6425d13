//! Constant folding (spec §4.3).
//!
//! Runs after `resolve` and before `type_gen`/`codegen`. Folding is a single
//! bottom-up pass: a node's constant is only ever computed from its already-
//! folded children, so one traversal suffices (unlike `resolve`, this pass
//! has no fixed-point loop). `fold` mutates `Node::constant` in place and
//! never rewrites `kind`/`children` — downstream passes still see the full
//! expression tree, just annotated with folded values where known.

use crate::ast::{Ast, BinOp, ConstValue, NodeId, NodeKind, UnOp};
use crate::diagnostics::{kind, DiagnosticSink};

pub struct ConstFolder<'a> {
    ast: &'a mut Ast,
    sink: &'a mut DiagnosticSink,
}

impl<'a> ConstFolder<'a> {
    pub fn new(ast: &'a mut Ast, sink: &'a mut DiagnosticSink) -> Self {
        ConstFolder { ast, sink }
    }

    pub fn run(&mut self, root: NodeId) {
        let span = tracing::info_span!("const_fold");
        let _enter = span.enter();
        self.fold(root);
    }

    fn fold(&mut self, node: NodeId) {
        let children = self.ast.children(node).to_vec();
        for &child in &children {
            self.fold(child);
        }

        let kind = self.ast.get(node).kind.clone();
        let value = match kind {
            NodeKind::ConstBool(b) => Some(ConstValue::Bool(b)),
            NodeKind::ConstInt(v) => Some(v),
            NodeKind::UnaryOp(op) => self.fold_unary(op, children.first().copied()),
            NodeKind::BinaryOp(op) => {
                self.fold_binary(op, children.first().copied(), children.get(1).copied())
            }
            NodeKind::Ternary => self.fold_ternary(&children),
            _ => None,
        };
        if let Some(v) = value {
            self.ast.get_mut(node).constant = Some(v);
        }
    }

    fn operand(&self, node: Option<NodeId>) -> Option<ConstValue> {
        node.and_then(|n| self.ast.get(n).constant)
    }

    /// Spec §4.3: unary identities (`+x` is a no-op, `-(-x)` cancels,
    /// `!!x` cancels, `~~x` cancels) fold eagerly even without a full
    /// constant operand by inspecting the operand's own `UnaryOp` shape;
    /// here we only need the fully-constant case since identity collapse
    /// on non-constant operands is a `codegen` peephole, not folding.
    fn fold_unary(&mut self, op: UnOp, operand: Option<NodeId>) -> Option<ConstValue> {
        let value = self.operand(operand)?;
        match op {
            UnOp::Plus => Some(value),
            UnOp::Minus => negate(value),
            UnOp::LogNot => Some(ConstValue::Bool(value.is_zero())),
            UnOp::BitNot => value.as_i64().map(|v| ConstValue::Int(!(v as i32))),
        }
    }

    fn fold_binary(
        &mut self,
        op: BinOp,
        lhs: Option<NodeId>,
        rhs: Option<NodeId>,
    ) -> Option<ConstValue> {
        let lv = self.operand(lhs);
        let rv = self.operand(rhs);

        // Short-circuit identities fold even with only one side constant
        // (spec §4.3: "&&/|| short-circuit collapse").
        if op == BinOp::And {
            if let Some(l) = lv {
                if l.is_zero() {
                    return Some(ConstValue::Bool(false));
                }
            }
        }
        if op == BinOp::Or {
            if let Some(l) = lv {
                if !l.is_zero() {
                    return Some(ConstValue::Bool(true));
                }
            }
        }

        let (l, r) = (lv?, rv?);
        if matches!(op, BinOp::Div | BinOp::Mod) && r.is_zero() {
            // division by a constant zero is a hard compile error, not a
            // runtime trap, per spec §4.3's "no folding across a would-be
            // division by zero" edge case.
            self.sink.push_error(
                kind::ILLEGAL_EXPRESSION,
                "division by constant zero",
                lethe_host::SourceLocation::synthetic(),
            );
            return None;
        }

        if matches!(l, ConstValue::Float(_) | ConstValue::Double(_))
            || matches!(r, ConstValue::Float(_) | ConstValue::Double(_))
        {
            return fold_float_binary(op, l.as_f64()?, r.as_f64()?);
        }
        fold_int_binary(op, l.as_i64()?, r.as_i64()?)
    }

    /// `cond ? a : b` folds when `cond` is constant, regardless of whether
    /// the untaken branch is itself constant (spec §4.3).
    fn fold_ternary(&mut self, children: &[NodeId]) -> Option<ConstValue> {
        let &[cond, then_branch, else_branch] = children else {
            return None;
        };
        let cond_value = self.ast.get(cond).constant?;
        let taken = if cond_value.is_zero() { else_branch } else { then_branch };
        self.ast.get(taken).constant
    }
}

fn negate(value: ConstValue) -> Option<ConstValue> {
    Some(match value {
        ConstValue::Int(v) => ConstValue::Int(-v),
        ConstValue::Long(v) => ConstValue::Long(-v),
        ConstValue::Float(v) => ConstValue::Float(-v),
        ConstValue::Double(v) => ConstValue::Double(-v),
        ConstValue::Short(v) => ConstValue::Short(-v),
        ConstValue::Byte(v) => ConstValue::Byte(-v),
        _ => return None,
    })
}

fn fold_int_binary(op: BinOp, l: i64, r: i64) -> Option<ConstValue> {
    let result = match op {
        BinOp::Add => l.wrapping_add(r),
        BinOp::Sub => l.wrapping_sub(r),
        BinOp::Mul => l.wrapping_mul(r),
        BinOp::Div => l.wrapping_div(r),
        BinOp::Mod => l.wrapping_rem(r),
        BinOp::Shl => l.wrapping_shl(r as u32),
        BinOp::Shr => l.wrapping_shr(r as u32),
        BinOp::BitAnd => l & r,
        BinOp::BitOr => l | r,
        BinOp::BitXor => l ^ r,
        BinOp::And => return Some(ConstValue::Bool(l != 0 && r != 0)),
        BinOp::Or => return Some(ConstValue::Bool(l != 0 || r != 0)),
        BinOp::Eq => return Some(ConstValue::Bool(l == r)),
        BinOp::Ne => return Some(ConstValue::Bool(l != r)),
        BinOp::Lt => return Some(ConstValue::Bool(l < r)),
        BinOp::Le => return Some(ConstValue::Bool(l <= r)),
        BinOp::Gt => return Some(ConstValue::Bool(l > r)),
        BinOp::Ge => return Some(ConstValue::Bool(l >= r)),
    };
    Some(ConstValue::Long(result))
}

fn fold_float_binary(op: BinOp, l: f64, r: f64) -> Option<ConstValue> {
    let result = match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => l / r,
        BinOp::Eq => return Some(ConstValue::Bool(l == r)),
        BinOp::Ne => return Some(ConstValue::Bool(l != r)),
        BinOp::Lt => return Some(ConstValue::Bool(l < r)),
        BinOp::Le => return Some(ConstValue::Bool(l <= r)),
        BinOp::Gt => return Some(ConstValue::Bool(l > r)),
        BinOp::Ge => return Some(ConstValue::Bool(l >= r)),
        BinOp::Mod | BinOp::Shl | BinOp::Shr | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
            return None
        }
        BinOp::And => return Some(ConstValue::Bool(l != 0.0 && r != 0.0)),
        BinOp::Or => return Some(ConstValue::Bool(l != 0.0 || r != 0.0)),
    };
    Some(ConstValue::Double(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lethe_host::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::new("t.le", 0, 0)
    }

    fn int(ast: &mut Ast, v: i32) -> NodeId {
        ast.alloc(loc(), NodeKind::ConstInt(ConstValue::Int(v)))
    }

    #[test]
    fn folds_arithmetic_identity() {
        let mut ast = Ast::new();
        let mut sink = DiagnosticSink::new();
        let a = int(&mut ast, 2);
        let b = int(&mut ast, 3);
        let add = ast.alloc(loc(), NodeKind::BinaryOp(BinOp::Add));
        ast.add_child(add, a);
        ast.add_child(add, b);

        ConstFolder::new(&mut ast, &mut sink).run(add);
        assert_eq!(ast.get(add).constant, Some(ConstValue::Long(5)));
    }

    #[test]
    fn short_circuits_and_with_false_lhs() {
        let mut ast = Ast::new();
        let mut sink = DiagnosticSink::new();
        let zero = int(&mut ast, 0);
        let ident = ast.alloc(loc(), NodeKind::Ident { name: "x".into() });
        let and = ast.alloc(loc(), NodeKind::BinaryOp(BinOp::And));
        ast.add_child(and, zero);
        ast.add_child(and, ident);

        ConstFolder::new(&mut ast, &mut sink).run(and);
        assert_eq!(ast.get(and).constant, Some(ConstValue::Bool(false)));
    }

    #[test]
    fn division_by_constant_zero_is_an_error_not_a_fold() {
        let mut ast = Ast::new();
        let mut sink = DiagnosticSink::new();
        let a = int(&mut ast, 1);
        let zero = int(&mut ast, 0);
        let div = ast.alloc(loc(), NodeKind::BinaryOp(BinOp::Div));
        ast.add_child(div, a);
        ast.add_child(div, zero);

        ConstFolder::new(&mut ast, &mut sink).run(div);
        assert!(ast.get(div).constant.is_none());
        assert!(sink.has_errors());
    }

    #[test]
    fn ternary_folds_to_taken_branch_only() {
        let mut ast = Ast::new();
        let mut sink = DiagnosticSink::new();
        let cond = int(&mut ast, 1);
        let then_v = int(&mut ast, 10);
        let else_v = int(&mut ast, 20);
        let ternary = ast.alloc(loc(), NodeKind::Ternary);
        ast.add_child(ternary, cond);
        ast.add_child(ternary, then_v);
        ast.add_child(ternary, else_v);

        ConstFolder::new(&mut ast, &mut sink).run(ternary);
        assert_eq!(ast.get(ternary).constant, Some(ConstValue::Int(10)));
    }
}
