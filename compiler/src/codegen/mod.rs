//! CodeGen: lowers a resolved, folded, type-gen'd AST into a
//! [`lethe_host::Image`] (spec §4.4).
//!
//! Split across files the way the dispatch concerns split in the original
//! engine's `CodeGenTables.h`: this file holds the statement driver and
//! shared emission helpers; `expr.rs`/`assign.rs`/`calls.rs` hold the
//! expression-stack, assignment, and call-sequencing dispatch tables;
//! `nrvo.rs`/`inline.rs`/`property.rs` hold the three spec §4.4/§4.7
//! rewrites that run as part of call/return codegen rather than as their
//! own AST passes.

mod assign;
mod calls;
mod expr;
mod flow;
mod inline;
mod nrvo;
mod property;

use crate::ast::{Ast, NodeFlags, NodeId, NodeKind};
use crate::config::CompilerConfig;
use crate::diagnostics::{kind, DiagnosticSink};
use crate::scope::{ScopeId, ScopeTree};
use crate::statemachine::emit_resume_dispatch;
use crate::types::QDataType;
use crate::typetable::TypeTable;
use lethe_host::{ClassDescriptor, Image, Instruction, NativeEntry, NativeRegistry, Opcode};
use std::collections::HashMap;

pub struct CodeGen<'a> {
    ast: &'a mut Ast,
    scopes: &'a mut ScopeTree,
    types: &'a mut TypeTable,
    registry: &'a NativeRegistry,
    sink: &'a mut DiagnosticSink,
    config: &'a CompilerConfig,
    image: Image,
    /// Unresolved forward jump PCs per open break/continue target, keyed by
    /// the enclosing loop/switch scope.
    break_targets: Vec<(ScopeId, Vec<u32>)>,
    continue_targets: Vec<(ScopeId, Vec<u32>)>,
    inline_depth: u32,
    /// `StateTailJump` PCs emitted by the current function's resume-dispatch
    /// preamble (spec §4.5), indexed by label number; empty outside a
    /// `state`/`latent` function. Patched one at a time as `compile_stmt`
    /// reaches each `Label` node.
    state_patch_sites: Vec<u32>,
    /// `CallScript` placeholders awaiting their callee's entry PC, which
    /// isn't known until every function has been compiled (spec §4.4.3).
    /// Resolved in one pass by `resolve_call_patches` at the end of
    /// `compile_program`.
    call_patch_sites: Vec<(u32, String, NodeId)>,
    /// `Ctor`/`Assign` placeholders whose immediate is a *type's* special
    /// method PC (`fun_ctor`/`fun_assign`) rather than a named function's —
    /// same timing problem as `call_patch_sites`: `resolve_special_methods`
    /// only knows these PCs once every function is compiled, but
    /// `compile_new`/`store_to_lvalue` run during that same pass.
    method_patch_sites: Vec<(u32, crate::types::TypeId, MethodSlot)>,
}

#[derive(Clone, Copy)]
pub(super) enum MethodSlot {
    Ctor,
    Assign,
}

impl<'a> CodeGen<'a> {
    pub fn new(
        ast: &'a mut Ast,
        scopes: &'a mut ScopeTree,
        types: &'a mut TypeTable,
        registry: &'a NativeRegistry,
        sink: &'a mut DiagnosticSink,
        config: &'a CompilerConfig,
    ) -> Self {
        CodeGen {
            ast,
            scopes,
            types,
            registry,
            sink,
            config,
            image: Image::new(),
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            inline_depth: 0,
            state_patch_sites: Vec::new(),
            call_patch_sites: Vec::new(),
            method_patch_sites: Vec::new(),
        }
    }

    /// Records an instruction whose immediate must become `type_id`'s
    /// `fun_ctor`/`fun_assign` PC once `resolve_special_methods` has run.
    pub(super) fn patch_method_later(&mut self, pc: u32, type_id: crate::types::TypeId, slot: MethodSlot) {
        self.method_patch_sites.push((pc, type_id, slot));
    }

    /// Compiles every top-level `FuncDef` reachable from `root` and returns
    /// the finished image. Native bindings declared on `config` are copied
    /// into the image's native table up front so `CallNative` immediates
    /// are stable regardless of call order.
    pub fn compile_program(mut self, root: NodeId) -> Image {
        let span = tracing::info_span!("codegen");
        let _enter = span.enter();

        for name in self.registry.function_order() {
            self.image.natives.push(NativeEntry {
                qualified_name: name.clone(),
            });
        }
        self.emit_class_descriptors();

        let children = self.ast.children(root).to_vec();
        for &child in &children {
            if matches!(self.ast.get(child).kind, NodeKind::FuncDef { .. }) {
                self.compile_function(child);
            } else if matches!(
                self.ast.get(child).kind,
                NodeKind::StructDef { .. } | NodeKind::ClassDef { .. }
            ) {
                self.compile_aggregate_methods(child);
            }
        }

        // Every `FuncDef` is compiled and `image.symbols` is complete by
        // this point, so the forward references that couldn't be resolved
        // inline can be fixed up in one pass each, the same way
        // `emit_resume_dispatch`'s `StateTailJump` sites are patched once
        // their `Label` is reached.
        self.resolve_call_patches();
        for &child in &children {
            self.resolve_special_methods(child);
            self.populate_vtable_for_node(child);
        }
        self.resolve_method_patches();

        self.image
    }

    /// Patches every `Ctor`/`Assign` placeholder recorded via
    /// `patch_method_later` now that `resolve_special_methods` has filled in
    /// every type's `fun_ctor`/`fun_assign`.
    fn resolve_method_patches(&mut self) {
        let sites = std::mem::take(&mut self.method_patch_sites);
        for (pc, type_id, slot) in sites {
            let dt = self.types.get(type_id);
            let pc_value = match slot {
                MethodSlot::Ctor => dt.fun_ctor,
                MethodSlot::Assign => dt.fun_assign,
            };
            self.patch_immediate(pc, pc_value as i32);
        }
    }

    fn emit_class_descriptors(&mut self) {
        let class_ids: Vec<_> = self
            .types
            .iter()
            .filter(|dt| matches!(dt.kind, crate::types::TypeKind::Class))
            .map(|dt| dt.id)
            .collect();
        for type_id in class_ids {
            // Three header words (engine refptr, script-instance deleter,
            // class-type pointer) precede the method slots; `vtbl_offset`
            // itself points past them, directly at slot 0 (the dtor).
            let header_base = self.image.globals.len() as u32;
            let vtbl_size = self.types.get(type_id).vtbl_size.max(1);
            let vtbl_offset = header_base + 3 * crate::typetable::WORD_SIZE;
            self.image.classes.push(ClassDescriptor {
                name: self.types.get(type_id).name.clone(),
                vtbl_offset,
                vtbl_size,
            });
            let reserved = (3 + vtbl_size) as usize * crate::typetable::WORD_SIZE as usize;
            self.image.globals.resize(self.image.globals.len() + reserved, 0);
            self.types.get_mut(type_id).vtbl_offset = vtbl_offset as i64;
        }
    }

    /// Patches every `CallScript` placeholder recorded by `calls.rs` with
    /// its callee's real entry PC (spec §4.4.3, "direct script call").
    fn resolve_call_patches(&mut self) {
        let sites = std::mem::take(&mut self.call_patch_sites);
        for (pc, name, call_node) in sites {
            match self.image.symbols.get(&name).copied() {
                Some(target) => self.patch_immediate(pc, target as i32),
                None => self.push_error(
                    kind::UNKNOWN_SYMBOL,
                    format!("call target `{name}` never compiled to a script function"),
                    call_node,
                ),
            }
        }
    }

    /// Resolves `fun_ctor`/`fun_dtor`/`fun_assign`/`fun_cmp` to real
    /// bytecode PCs for one `StructDef`/`ClassDef` (spec §3's invariant
    /// that `fun_dtor >= 0` once a type `has_dtor`). Runs after every
    /// function is compiled, since these fields hold PCs rather than AST
    /// references.
    fn resolve_special_methods(&mut self, node: NodeId) {
        let name = match self.ast.get(node).kind.clone() {
            NodeKind::StructDef { name, .. } => name,
            NodeKind::ClassDef { name, .. } => name,
            _ => return,
        };
        let Some(type_id) = self.types.find_aggregate(&name) else { return };

        let (mut fun_ctor, mut fun_dtor, mut fun_assign, mut fun_cmp) = (-1i64, -1i64, -1i64, -1i64);
        for member in self.ast.children(node).to_vec() {
            let NodeKind::FuncDef { name: fn_name, operator } = self.ast.get(member).kind.clone() else {
                continue;
            };
            let qualifiers = self.ast.get(member).qualifiers;
            let pc = self.image.symbols.get(&fn_name).map(|&p| p as i64);
            if qualifiers.contains(crate::ast::Qualifiers::CTOR) {
                fun_ctor = pc.unwrap_or(-1);
            } else if qualifiers.contains(crate::ast::Qualifiers::DTOR) {
                fun_dtor = pc.unwrap_or(-1);
            } else if operator.as_deref() == Some("=") {
                fun_assign = pc.unwrap_or(-1);
            } else if operator.as_deref() == Some("==") {
                fun_cmp = pc.unwrap_or(-1);
            }
        }

        if let Some(base_id) = self.types.get(type_id).base_type {
            let base = self.types.get(base_id).clone();
            if fun_ctor < 0 {
                fun_ctor = base.fun_ctor;
            }
            if fun_dtor < 0 {
                fun_dtor = base.fun_dtor;
            }
            if fun_assign < 0 {
                fun_assign = base.fun_assign;
            }
            if fun_cmp < 0 {
                fun_cmp = base.fun_cmp;
            }
        }

        let has_dtor = self.types.get(type_id).has_dtor;
        if has_dtor && fun_dtor < 0 {
            // `has_dtor` can be set purely by a member's dtor propagating
            // up, with no dtor of its own declared anywhere in the chain;
            // synthesize a trivial one that destructs each such member in
            // declared order, the same opcode `emit_scope_destructors` uses
            // for locals, just addressed off `this` instead of the frame.
            fun_dtor = self.synthesize_default_dtor(type_id) as i64;
        }

        let dt = self.types.get_mut(type_id);
        dt.fun_ctor = fun_ctor;
        dt.fun_dtor = fun_dtor;
        dt.fun_assign = fun_assign;
        dt.fun_cmp = fun_cmp;
        debug_assert!(dt.check_dtor_invariant());
    }

    /// Emits `~Type(this) { for each member with a dtor: Dtor(this+offset) }`
    /// directly into the image (no `FuncDef` backs it), for an aggregate
    /// whose `has_dtor` is true but which never declared or inherited an
    /// explicit destructor.
    fn synthesize_default_dtor(&mut self, type_id: crate::types::TypeId) -> u32 {
        let entry = self.image.pc();
        let members = self.types.get(type_id).members.clone();
        for member in members.iter().rev() {
            if self.types.get(member.data_type.type_id).has_dtor {
                self.emit(Opcode::Dtor, member.byte_offset as i32);
            }
        }
        self.emit(Opcode::ReturnVoid, 0);
        entry
    }

    /// Writes one class's resolved method PCs into its vtable slots in
    /// `image.globals` (spec §4.6: "slot 0 is always the dtor, indices 1+
    /// are user methods"), now that `resolve_special_methods` has run for
    /// `node`. A no-op for `StructDef`s (no vtable) and non-aggregate nodes.
    fn populate_vtable_for_node(&mut self, node: NodeId) {
        let name = match self.ast.get(node).kind.clone() {
            NodeKind::ClassDef { name, .. } => name,
            _ => return,
        };
        let Some(type_id) = self.types.find_aggregate(&name) else { return };
        let dt = self.types.get(type_id);
        if dt.vtbl_offset < 0 {
            return;
        }
        let vtable_base = dt.vtbl_offset as usize;
        let fun_dtor = dt.fun_dtor;
        self.write_vtable_slot(vtable_base, 0, fun_dtor);

        for member in self.ast.children(node).to_vec() {
            let NodeKind::FuncDef { name: fn_name, .. } = self.ast.get(member).kind.clone() else {
                continue;
            };
            let qualifiers = self.ast.get(member).qualifiers;
            let is_virtual_slot = qualifiers.contains(crate::ast::Qualifiers::VIRTUAL)
                || qualifiers.contains(crate::ast::Qualifiers::OVERRIDE);
            if !is_virtual_slot {
                continue;
            }
            let slot = self.ast.get(member).offset;
            if slot <= 0 {
                continue;
            }
            let pc = self.image.symbols.get(&fn_name).copied().map(|p| p as i64).unwrap_or(-1);
            self.write_vtable_slot(vtable_base, slot as usize, pc);
        }
    }

    fn write_vtable_slot(&mut self, vtable_base: usize, slot: usize, pc: i64) {
        let byte_offset = vtable_base + slot * crate::typetable::WORD_SIZE as usize;
        let bytes = (pc as i32).to_le_bytes();
        if byte_offset + bytes.len() <= self.image.globals.len() {
            self.image.globals[byte_offset..byte_offset + bytes.len()].copy_from_slice(&bytes);
        }
    }

    fn compile_aggregate_methods(&mut self, node: NodeId) {
        let children = self.ast.children(node).to_vec();
        for child in children {
            if matches!(self.ast.get(child).kind, NodeKind::FuncDef { .. }) {
                self.compile_function(child);
            }
        }
    }

    fn compile_function(&mut self, func: NodeId) {
        let name = match &self.ast.get(func).kind {
            NodeKind::FuncDef { name, .. } => name.clone(),
            _ => return,
        };
        let entry = self.image.pc();
        self.image.symbols.insert(name, entry);

        let children = self.ast.children(func).to_vec();
        self.state_patch_sites = if self.ast.get(func).flags.contains(NodeFlags::TYPE_GEN) {
            let body = children.iter().copied().find(|&c| matches!(self.ast.get(c).kind, NodeKind::Block));
            let label_count = body
                .map(|b| {
                    self.ast
                        .children(b)
                        .iter()
                        .filter(|&&s| matches!(self.ast.get(s).kind, NodeKind::Label { .. }))
                        .count() as u32
                })
                .unwrap_or(0);
            emit_resume_dispatch(&mut |opcode, imm| self.emit(opcode, imm), label_count)
        } else {
            Vec::new()
        };

        let body = children.iter().copied().find(|&c| matches!(self.ast.get(c).kind, NodeKind::Block));
        for &child in &children {
            if matches!(self.ast.get(child).kind, NodeKind::Block) {
                self.compile_stmt(child);
            }
        }
        if let Some(body) = body {
            if flow::returns_a_value(self.ast, body) && !flow::all_paths_return(self.ast, body) {
                self.push_warning(
                    kind::NOT_ALL_PATHS_RETURN,
                    "not every path through this function returns a value",
                    func,
                );
            }
        }
        // Every function falls through to an implicit `ReturnVoid` if the
        // body doesn't already end in `Return` on every path (spec §7 warns
        // "not all paths return a value" but still emits a safe fallback).
        self.emit(Opcode::ReturnVoid, 0);
    }

    // ---- shared emission helpers (used by expr/assign/calls/flow) ----

    fn emit(&mut self, opcode: Opcode, imm: i32) -> u32 {
        self.image.push_instruction(Instruction::new(opcode, imm))
    }

    fn patch_jump(&mut self, pc: u32, target: u32) {
        let delta = target as i64 - pc as i64;
        let word = Instruction::new(Opcode::Jmp, 0).encode();
        let _ = word;
        let existing = Instruction::decode(self.image.instructions[pc as usize]).unwrap();
        self.image.instructions[pc as usize] =
            Instruction::new(existing.opcode, delta as i32).encode();
    }

    /// Like `patch_jump`, but overwrites with an absolute value (a PC to
    /// call, not a relative branch target) — used for `CallScript` callee
    /// fixups and user-`operator=` resolution, where the immediate isn't a
    /// jump delta.
    fn patch_immediate(&mut self, pc: u32, imm: i32) {
        let existing = Instruction::decode(self.image.instructions[pc as usize]).unwrap();
        self.image.instructions[pc as usize] = Instruction::new(existing.opcode, imm).encode();
    }

    fn intern_string(&mut self, s: &str) -> u32 {
        if let Some(idx) = self.image.interned_strings.iter().position(|x| x == s) {
            return idx as u32;
        }
        self.image.interned_strings.push(s.to_string());
        (self.image.interned_strings.len() - 1) as u32
    }

    fn intern_name(&mut self, s: &str) -> u32 {
        if let Some(idx) = self.image.interned_names.iter().position(|x| x == s) {
            return idx as u32;
        }
        self.image.interned_names.push(s.to_string());
        (self.image.interned_names.len() - 1) as u32
    }

    fn local_offset(&self, decl_node: NodeId) -> i32 {
        self.ast.get(decl_node).offset as i32
    }

    fn data_type_of(&self, node: NodeId) -> Option<QDataType> {
        self.ast.get(node).data_type
    }

    fn push_error(&mut self, k: &'static str, msg: impl Into<String>, node: NodeId) {
        let loc = self.ast.get(node).location.clone();
        self.sink.push_error(k, msg, loc);
    }

    fn push_warning(&mut self, k: &'static str, msg: impl Into<String>, node: NodeId) {
        let loc = self.ast.get(node).location.clone();
        self.sink.push_warning(k, msg, loc);
    }
}

/// Statement dispatch table keyed by `NodeKind` discriminant, mirroring the
/// teacher's match-per-pass style rather than a virtual `Stmt::codegen`.
impl<'a> CodeGen<'a> {
    fn compile_stmt(&mut self, node: NodeId) {
        let kind = self.ast.get(node).kind.clone();
        match kind {
            NodeKind::Block => flow::compile_block(self, node),
            NodeKind::If => flow::compile_if(self, node),
            NodeKind::While { nobreak } => flow::compile_while(self, node, nobreak),
            NodeKind::Do { nobreak } => flow::compile_do(self, node, nobreak),
            NodeKind::For { nobreak, is_range } => flow::compile_for(self, node, nobreak, is_range),
            NodeKind::Switch => flow::compile_switch(self, node),
            NodeKind::Break => flow::compile_break(self, node),
            NodeKind::Continue => flow::compile_continue(self, node),
            NodeKind::Return => flow::compile_return(self, node),
            NodeKind::Defer => flow::compile_defer(self, node),
            NodeKind::VarDecl { .. } => assign::compile_local_decl(self, node),
            NodeKind::VarDeclList => {
                let children = self.ast.children(node).to_vec();
                for child in children {
                    self.compile_stmt(child);
                }
            }
            NodeKind::ExprStatement => {
                let children = self.ast.children(node).to_vec();
                if let Some(&expr) = children.first() {
                    expr::compile_expr(self, expr);
                }
            }
            NodeKind::Label { name } => {
                let pc = self.image.pc();
                self.image.symbols.insert(format!("@label:{name}"), pc);
                // Resume-dispatch preamble patch-up (spec §4.5): the label's
                // index was assigned by `StateMachine::transform`.
                let index = self.ast.get(node).offset;
                if index >= 0 {
                    if let Some(&site) = self.state_patch_sites.get(index as usize) {
                        self.patch_jump(site, pc);
                    }
                    self.emit(Opcode::StateSetLabel, index as i32);
                }
            }
            NodeKind::Goto { label } => {
                // Run the cleanup for every scope between here and the
                // label's scope before jumping, same as `break`/`continue`/
                // `return` (spec §5/§9) — this only handles forward/backward
                // jumps within a resolvable label; a label that can't be
                // found at all is still reported below without cleanup.
                let start = self.ast.get(node).scope_ref;
                let label_scope = start
                    .and_then(|s| self.scopes.find_label(s, &label))
                    .and_then(|label_node| self.ast.get(label_node).scope_ref);
                flow::emit_cleanup_through(self, start, label_scope);
                let pc = self.emit(Opcode::Jmp, 0);
                if let Some(&target) = self.image.symbols.get(&format!("@label:{label}")) {
                    self.patch_jump(pc, target);
                } else {
                    self.push_error(kind::UNRESOLVED_FORWARD_REF, format!("label `{label}` not yet defined"), node);
                }
            }
            _ => {
                expr::compile_expr(self, node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, ConstValue};
    use crate::config::CompilerConfig;
    use lethe_host::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::new("t.le", 0, 0)
    }

    #[test]
    fn compiles_empty_function_with_implicit_return() {
        let mut ast = Ast::new();
        let mut scopes = ScopeTree::new();
        let mut types = TypeTable::new();
        let registry = NativeRegistry::new();
        let mut sink = DiagnosticSink::new();
        let config = CompilerConfig::new();

        let body = ast.alloc(loc(), NodeKind::Block);
        let func = ast.alloc(loc(), NodeKind::FuncDef { name: "main".into(), operator: None });
        ast.add_child(func, body);
        let program = ast.alloc(loc(), NodeKind::Program);
        ast.add_child(program, func);

        let image = CodeGen::new(&mut ast, &mut scopes, &mut types, &registry, &mut sink, &config)
            .compile_program(program);

        assert_eq!(image.symbols.get("main"), Some(&0));
        assert_eq!(Instruction::decode(image.instructions[0]).unwrap().opcode, Opcode::ReturnVoid);
    }

    #[test]
    fn compiles_return_of_folded_constant_expression() {
        let mut ast = Ast::new();
        let mut scopes = ScopeTree::new();
        let mut types = TypeTable::new();
        let registry = NativeRegistry::new();
        let mut sink = DiagnosticSink::new();
        let config = CompilerConfig::new();

        let a = ast.alloc(loc(), NodeKind::ConstInt(ConstValue::Int(2)));
        let b = ast.alloc(loc(), NodeKind::ConstInt(ConstValue::Int(3)));
        ast.get_mut(a).constant = Some(ConstValue::Int(2));
        ast.get_mut(b).constant = Some(ConstValue::Int(3));
        let add = ast.alloc(loc(), NodeKind::BinaryOp(BinOp::Add));
        ast.add_child(add, a);
        ast.add_child(add, b);
        ast.get_mut(add).constant = Some(ConstValue::Long(5));
        ast.get_mut(add).data_type = Some(QDataType::new(types.int(), crate::ast::Qualifiers::EMPTY));

        let ret = ast.alloc(loc(), NodeKind::Return);
        ast.add_child(ret, add);
        let body = ast.alloc(loc(), NodeKind::Block);
        ast.add_child(body, ret);
        let func = ast.alloc(loc(), NodeKind::FuncDef { name: "f".into(), operator: None });
        ast.add_child(func, body);
        let program = ast.alloc(loc(), NodeKind::Program);
        ast.add_child(program, func);

        let image = CodeGen::new(&mut ast, &mut scopes, &mut types, &registry, &mut sink, &config)
            .compile_program(program);

        let ops: Vec<Opcode> = image
            .instructions
            .iter()
            .map(|&w| Instruction::decode(w).unwrap().opcode)
            .collect();
        assert!(ops.contains(&Opcode::PushInt));
        assert!(ops.contains(&Opcode::Return));
    }
}
