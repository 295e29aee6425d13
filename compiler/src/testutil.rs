//! Test-only source reader.
//!
//! `lethe-compiler` has no parser (spec §1 puts tokenizing/parsing outside
//! its scope) — but the scenario tests in spec §8 read more naturally as
//! short snippets of Lethe-like source than as a pile of `Builder` calls.
//! This module is a small recursive-descent reader over a **deliberately
//! narrow** grammar subset (enough for the scenarios below, not a general
//! front end) that a test can call to get an [`Ast`] + root `NodeId`
//! straight from text. It is `#[cfg(test)]`-only and is not, and must not
//! become, the language's real entry point.
//!
//! Supported: `native`/`struct`/`class` declarations with typed fields,
//! function definitions with a typed parameter list and a block body,
//! `var`/typed-name declarations with an optional initializer, `if`/
//! `while`/`return`/expression statements, and expressions with the usual
//! arithmetic/comparison/assignment precedence, calls, and member access.

use crate::ast::{Ast, BinOp, ConstValue, NodeId, PointerKind};
use crate::builder::Builder;
use lethe_host::SourceLocation;

pub struct Reader<'s> {
    builder: Builder,
    tokens: Vec<Token<'s>>,
    pos: usize,
    file: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Token<'s> {
    Ident(&'s str),
    Int(i64),
    Float(f64),
    Str(String),
    Punct(&'s str),
    Eof,
}

/// Reads `source` as a single translation unit and returns the finished
/// [`Ast`] along with the `Program` node's id.
pub fn read(file: impl Into<String>, source: &str) -> (Ast, NodeId) {
    let mut reader = Reader::new(file.into(), source);
    let root = reader.parse_program();
    (reader.builder.finish(), root)
}

impl<'s> Reader<'s> {
    fn new(file: String, source: &'s str) -> Self {
        Reader {
            builder: Builder::new(),
            tokens: tokenize(source),
            pos: 0,
            file,
        }
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.file.clone(), 0, self.pos as u32)
    }

    fn peek(&self) -> &Token<'s> {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token<'s> {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        tok
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if matches!(self.peek(), Token::Punct(s) if *s == p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) {
        if !self.eat_punct(p) {
            panic!("expected `{p}` at token {}", self.pos);
        }
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Token::Ident(s) if *s == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> String {
        match self.advance() {
            Token::Ident(s) => s.to_string(),
            other => panic!("expected identifier, got {other:?}"),
        }
    }

    fn is_type_keyword(word: &str) -> bool {
        matches!(
            word,
            "void" | "bool" | "int" | "uint" | "short" | "ushort" | "byte" | "sbyte" | "long" | "ulong"
                | "float" | "double" | "string" | "name" | "auto"
        )
    }

    /// `program := decl*`
    fn parse_program(&mut self) -> NodeId {
        let program = self.builder.program(self.loc());
        while !matches!(self.peek(), Token::Eof) {
            let decl = self.parse_decl();
            self.builder.add_child(program, decl);
        }
        program
    }

    fn parse_decl(&mut self) -> NodeId {
        let is_native = self.eat_ident("native");
        if matches!(self.peek(), Token::Ident("struct")) {
            return self.parse_aggregate(false);
        }
        if matches!(self.peek(), Token::Ident("class")) {
            return self.parse_aggregate(true);
        }
        self.parse_func_or_var(is_native)
    }

    fn parse_aggregate(&mut self, is_class: bool) -> NodeId {
        self.advance(); // consume the `struct`/`class` keyword
        let name = self.expect_ident();
        let base = if self.eat_punct(":") { Some(self.expect_ident()) } else { None };
        let loc = self.loc();
        let node = if is_class {
            self.builder.class_def(loc, name, base, false)
        } else {
            self.builder.struct_def(loc, name, base)
        };
        self.expect_punct("{");
        while !self.eat_punct("}") {
            let member = self.parse_func_or_var(false);
            self.builder.add_child(node, member);
        }
        self.eat_punct(";");
        node
    }

    /// `type name (args) block` or `type name (= expr)? ;`
    fn parse_func_or_var(&mut self, is_native: bool) -> NodeId {
        self.eat_ident("const");
        let type_node = self.parse_type();
        let name = self.expect_ident();

        if self.eat_punct("(") {
            let loc = self.loc();
            let func = self.builder.func_def(loc, name, None);
            if is_native {
                self.builder.qualify(func, crate::ast::Qualifiers::NATIVE);
            }
            self.builder.add_child(func, type_node);
            let args = self.builder.arg_list(self.loc());
            while !self.eat_punct(")") {
                let param_type = self.parse_type();
                let param_name = self.expect_ident();
                let param = self.builder.var_decl(self.loc(), param_name, false);
                self.builder.add_child(param, param_type);
                self.builder.add_child(args, param);
                if !self.eat_punct(",") {
                    self.expect_punct(")");
                    break;
                }
            }
            self.builder.add_child(func, args);
            self.eat_ident("const");
            if self.eat_punct("{") {
                let body = self.parse_block_stmts();
                self.builder.add_child(func, body);
            } else {
                self.expect_punct(";");
            }
            return func;
        }

        let is_auto = false;
        let decl = self.builder.var_decl(self.loc(), name, is_auto);
        self.builder.add_child(decl, type_node);
        if self.eat_punct("=") {
            let init = self.parse_initializer();
            self.builder.add_child(decl, init);
        }
        self.expect_punct(";");
        decl
    }

    fn parse_initializer(&mut self) -> NodeId {
        if self.eat_punct("{") {
            let list = self.builder.ast_mut().alloc(self.loc(), crate::ast::NodeKind::InitializerList);
            while !self.eat_punct("}") {
                let item = self.parse_expr();
                self.builder.add_child(list, item);
                if !self.eat_punct(",") {
                    self.expect_punct("}");
                    break;
                }
            }
            list
        } else {
            self.parse_expr()
        }
    }

    fn parse_type(&mut self) -> NodeId {
        let loc = self.loc();
        let base = if matches!(self.peek(), Token::Ident(w) if *w == "auto") {
            self.advance();
            self.builder.type_auto(loc)
        } else {
            let name = self.expect_ident();
            self.builder.type_name(loc, name)
        };
        if self.eat_punct("*") {
            let ptr = self.builder.type_pointer(self.loc(), PointerKind::Strong);
            self.builder.add_child(ptr, base);
            return ptr;
        }
        if self.eat_punct("[") {
            self.expect_punct("]");
            let arr = self.builder.type_dynamic_array(self.loc());
            self.builder.add_child(arr, base);
            return arr;
        }
        base
    }

    fn parse_block_stmts(&mut self) -> NodeId {
        let block = self.builder.block(self.loc());
        while !self.eat_punct("}") {
            let stmt = self.parse_stmt();
            self.builder.add_child(block, stmt);
        }
        block
    }

    fn starts_type(&self) -> bool {
        matches!(self.peek(), Token::Ident(w) if Self::is_type_keyword(w))
    }

    fn parse_stmt(&mut self) -> NodeId {
        if self.eat_punct("{") {
            return self.parse_block_stmts();
        }
        if self.eat_ident("return") {
            let loc = self.loc();
            let ret = self.builder.return_stmt(loc);
            if !self.eat_punct(";") {
                let value = self.parse_expr();
                self.builder.add_child(ret, value);
                self.expect_punct(";");
            }
            return ret;
        }
        if self.eat_ident("if") {
            let loc = self.loc();
            let node = self.builder.if_stmt(loc);
            self.expect_punct("(");
            let cond = self.parse_expr();
            self.expect_punct(")");
            let then_branch = self.parse_stmt();
            self.builder.add_child(node, cond);
            self.builder.add_child(node, then_branch);
            if self.eat_ident("else") {
                let else_branch = self.parse_stmt();
                self.builder.add_child(node, else_branch);
            }
            return node;
        }
        if self.eat_ident("while") {
            let loc = self.loc();
            let node = self.builder.while_stmt(loc, false);
            self.expect_punct("(");
            let cond = self.parse_expr();
            self.expect_punct(")");
            let body = self.parse_stmt();
            self.builder.add_child(node, cond);
            self.builder.add_child(node, body);
            return node;
        }
        if self.eat_ident("break") {
            let node = self.builder.break_stmt(self.loc());
            self.expect_punct(";");
            return node;
        }
        if self.eat_ident("continue") {
            let node = self.builder.continue_stmt(self.loc());
            self.expect_punct(";");
            return node;
        }
        if self.starts_type() {
            return self.parse_func_or_var(false);
        }
        let loc = self.loc();
        let expr = self.parse_expr();
        let stmt = self.builder.expr_stmt(loc);
        self.builder.add_child(stmt, expr);
        self.expect_punct(";");
        stmt
    }

    fn parse_expr(&mut self) -> NodeId {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> NodeId {
        let lhs = self.parse_binary(0);
        if self.eat_punct("=") {
            let loc = self.loc();
            let rhs = self.parse_assignment();
            let node = self.builder.assign(loc);
            self.builder.add_child(node, lhs);
            self.builder.add_child(node, rhs);
            return node;
        }
        lhs
    }

    fn binop_for(tok: &str) -> Option<(BinOp, u8)> {
        Some(match tok {
            "||" => (BinOp::Or, 1),
            "&&" => (BinOp::And, 2),
            "==" => (BinOp::Eq, 3),
            "!=" => (BinOp::Ne, 3),
            "<" => (BinOp::Lt, 4),
            "<=" => (BinOp::Le, 4),
            ">" => (BinOp::Gt, 4),
            ">=" => (BinOp::Ge, 4),
            "+" => (BinOp::Add, 5),
            "-" => (BinOp::Sub, 5),
            "*" => (BinOp::Mul, 6),
            "/" => (BinOp::Div, 6),
            "%" => (BinOp::Mod, 6),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> NodeId {
        let mut lhs = self.parse_unary();
        loop {
            let Token::Punct(p) = self.peek().clone() else { break };
            let Some((op, prec)) = Self::binop_for(p) else { break };
            if prec < min_prec {
                break;
            }
            self.advance();
            let loc = self.loc();
            let rhs = self.parse_binary(prec + 1);
            let node = self.builder.binary_op(loc, op);
            self.builder.add_child(node, lhs);
            self.builder.add_child(node, rhs);
            lhs = node;
        }
        lhs
    }

    fn parse_unary(&mut self) -> NodeId {
        if self.eat_punct("-") {
            let loc = self.loc();
            let operand = self.parse_unary();
            let node = self.builder.unary_op(loc, crate::ast::UnOp::Minus);
            self.builder.add_child(node, operand);
            return node;
        }
        if self.eat_punct("!") {
            let loc = self.loc();
            let operand = self.parse_unary();
            let node = self.builder.unary_op(loc, crate::ast::UnOp::LogNot);
            self.builder.add_child(node, operand);
            return node;
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> NodeId {
        let mut node = self.parse_primary();
        loop {
            if self.eat_punct(".") {
                let member = self.expect_ident();
                let loc = self.loc();
                let dot = self.builder.dot(loc, member);
                self.builder.add_child(dot, node);
                node = dot;
            } else if self.eat_punct("(") {
                let loc = self.loc();
                let call = self.builder.call(loc);
                self.builder.add_child(call, node);
                while !self.eat_punct(")") {
                    let arg = self.parse_expr();
                    self.builder.add_child(call, arg);
                    if !self.eat_punct(",") {
                        self.expect_punct(")");
                        break;
                    }
                }
                node = call;
            } else if self.eat_punct("[") {
                let loc = self.loc();
                let index = self.builder.index(loc);
                self.builder.add_child(index, node);
                let idx = self.parse_expr();
                self.builder.add_child(index, idx);
                self.expect_punct("]");
                node = index;
            } else {
                break;
            }
        }
        node
    }

    fn parse_primary(&mut self) -> NodeId {
        let loc = self.loc();
        match self.advance() {
            Token::Int(v) => self.builder.const_int(loc, ConstValue::Int(v as i32)),
            Token::Float(v) => self.builder.const_int(loc, ConstValue::Float(v as f32)),
            Token::Str(s) => self.builder.const_string(loc, s),
            Token::Ident(name) if name == "true" => self.builder.const_bool(loc, true),
            Token::Ident(name) if name == "false" => self.builder.const_bool(loc, false),
            Token::Ident(name) => self.builder.ident(loc, name),
            Token::Punct("(") => {
                let inner = self.parse_expr();
                self.expect_punct(")");
                inner
            }
            other => panic!("unexpected token in expression: {other:?}"),
        }
    }
}

fn tokenize(source: &str) -> Vec<Token<'_>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            let mut is_float = false;
            while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b'.' {
                is_float = true;
                i += 1;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
            }
            let text = &source[start..i];
            tokens.push(if is_float {
                Token::Float(text.parse().unwrap())
            } else {
                Token::Int(text.parse().unwrap())
            });
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Ident(&source[start..i]));
            continue;
        }
        if c == '"' {
            let start = i + 1;
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' {
                i += 1;
            }
            tokens.push(Token::Str(source[start..i].to_string()));
            i += 1;
            continue;
        }
        let multi = ["==", "!=", "<=", ">=", "&&", "||"]
            .iter()
            .find(|m| source[i..].starts_with(*m));
        if let Some(&m) = multi {
            tokens.push(Token::Punct(m));
            i += m.len();
            continue;
        }
        let single = &source[i..i + 1];
        tokens.push(Token::Punct(single));
        i += 1;
    }
    tokens.push(Token::Eof);
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_a_trivial_function() {
        let (ast, root) = read("t.le", "int answer() { return 42; }");
        assert_eq!(ast.children(root).len(), 1);
    }

    #[test]
    fn reads_native_decl_and_call_expression() {
        let (ast, root) = read(
            "t.le",
            "native int div(int a, int b); void main() { div(125, 3); }",
        );
        assert_eq!(ast.children(root).len(), 2);
    }
}
