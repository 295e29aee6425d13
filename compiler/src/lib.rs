//! `lethe-compiler`: the in-scope half of the Lethe front end (spec §1, §2).
//!
//! This crate owns everything between "an AST exists" and "an
//! [`lethe_host::Image`] is ready to hand to a VM": name resolution,
//! constant folding, struct/class layout and vtable synthesis, the
//! state/latent coroutine transform, and stack-bytecode codegen. The
//! tokenizer, parser, VM executor and native-function plumbing are a host
//! concern (spec §1) — [`builder`] is the programmatic AST entry point a
//! host uses in their place.

pub mod ast;
pub mod binder;
pub mod builder;
pub mod codegen;
pub mod config;
pub mod constfold;
pub mod diagnostics;
pub mod resolver;
pub mod scope;
pub mod statemachine;
pub mod typegen;
pub mod typetable;
pub mod types;

#[cfg(test)]
pub mod testutil;

use ast::{Ast, NodeId};
use binder::Binder;
use codegen::CodeGen;
use config::CompilerConfig;
use constfold::ConstFolder;
use diagnostics::DiagnosticSink;
use resolver::Resolver;
use scope::ScopeTree;
use statemachine::StateMachine;
use typegen::TypeGen;
use typetable::TypeTable;

pub use lethe_host::{Diagnostic, Image, NativeFunctionDescriptor, NativeRegistry, NativeStructDescriptor};

/// A hand-rolled bitset, modeled after the teacher's own `bitflags`-free
/// flag types — named flags over a plain integer, no external crate.
///
/// ```ignore
/// bitset! {
///     pub struct Flags: u32 {
///         const A = 1 << 0;
///         const B = 1 << 1;
///     }
/// }
/// ```
#[macro_export]
macro_rules! bitset {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $repr:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        $vis struct $name($repr);

        impl $name {
            pub const EMPTY: $name = $name(0);
            $(pub const $flag: $name = $name($value);)*

            /// True if every bit set in `other` is also set in `self`.
            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: $name) {
                self.0 &= !other.0;
            }

            pub fn union(self, other: $name) -> $name {
                $name(self.0 | other.0)
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;

            fn bitor(self, other: $name) -> $name {
                $name(self.0 | other.0)
            }
        }
    };
}

/// Drives the whole pipeline over one AST: bind scopes, resolve names,
/// fold constants, generate layout/vtables, transform state machines, then
/// emit bytecode (spec §2's component table, in the order spec §4 runs
/// them). Owns the `ScopeTree`/`TypeTable` so repeated compiles within one
/// process (e.g. the CLI compiling several `--ast` files against the same
/// native bindings) share canonicalized types across calls.
pub struct Engine {
    pub types: TypeTable,
    pub scopes: ScopeTree,
    pub registry: NativeRegistry,
    pub config: CompilerConfig,
}

impl Engine {
    pub fn new(config: CompilerConfig) -> Self {
        let mut registry = NativeRegistry::new();
        for descriptor in &config.native_structs {
            registry.bind_struct(descriptor.clone());
        }
        for descriptor in &config.native_functions {
            registry.bind_function(descriptor.clone());
        }
        Engine {
            types: TypeTable::new(),
            scopes: ScopeTree::new(),
            registry,
            config,
        }
    }

    /// Registers one more native function after construction (spec §6:
    /// a host may bind natives incrementally rather than all up front
    /// through [`CompilerConfig`]).
    pub fn bind_native_function(&mut self, descriptor: NativeFunctionDescriptor) {
        self.registry.bind_function(descriptor);
    }

    pub fn bind_native_struct(&mut self, descriptor: NativeStructDescriptor) {
        self.registry.bind_struct(descriptor);
    }

    /// Runs the full pipeline over `ast` rooted at `root` and returns the
    /// emitted image, or every diagnostic collected across whichever pass
    /// first failed (spec §7: a pass batches its own errors before the
    /// driver aborts).
    pub fn compile(&mut self, ast: &mut Ast, root: NodeId) -> Result<Image, Vec<Diagnostic>> {
        let span = tracing::info_span!("compile");
        let _enter = span.enter();

        Binder::new(ast, &mut self.scopes).run(root);

        let mut sink = DiagnosticSink::new();
        Resolver::new(ast, &mut self.scopes, &mut self.types, &self.registry, &mut sink, &self.config)
            .run(root);
        if sink.has_errors() {
            return Err(sink.into_diagnostics());
        }

        if self.config.optimizations.const_folding {
            ConstFolder::new(ast, &mut sink).run(root);
            if sink.has_errors() {
                return Err(sink.into_diagnostics());
            }
        }

        TypeGen::new(ast, &mut self.scopes, &mut self.types, &mut sink).run(root);
        if sink.has_errors() {
            return Err(sink.into_diagnostics());
        }

        StateMachine::new(ast, &mut sink).run(root);
        if sink.has_errors() {
            return Err(sink.into_diagnostics());
        }

        let image = CodeGen::new(ast, &mut self.scopes, &mut self.types, &self.registry, &mut sink, &self.config)
            .compile_program(root);
        if sink.has_errors() {
            Err(sink.into_diagnostics())
        } else {
            Ok(image)
        }
    }
}
