//! Lethe host boundary
//!
//! This crate is deliberately thin: it is the contract between the
//! compiler (`lethe-compiler`) and whatever embeds it (a sample host
//! harness, a VM executor, a JIT backend). None of those consumers are
//! implemented here — this crate only defines the shapes they agree on:
//!
//! - [`image`]: the bytecode `Image` the compiler emits (instructions,
//!   constant pool, symbol table, native-function table, class
//!   descriptors).
//! - [`opcode`]: the 32-bit instruction encoding (`Opcode` + immediate).
//! - [`registry`]: `Engine::bind_native_*`-style descriptors a host
//!   registers before linking.
//! - [`abi`]: the `Stack`/`ArgParser`/`ArgParserMethod` calling-convention
//!   types emitted calls are shaped around (caller-cleanup, right-to-left
//!   argument push, result pushed first).
//! - [`diagnostic`]: the `(message, token_location)` error/warning
//!   callback shape used across the compiler/host boundary.
//!
//! Executing an `Image` (the VM/JIT) is explicitly out of scope.

pub mod abi;
pub mod context;
pub mod diagnostic;
pub mod image;
pub mod opcode;
pub mod registry;

pub use abi::{ArgParser, ArgParserMethod, Stack};
pub use context::{Context, ContextError};
pub use diagnostic::{Diagnostic, Severity, SourceLocation};
pub use image::{ClassDescriptor, Image};
pub use opcode::{Instruction, Opcode};
pub use registry::{NativeFunctionDescriptor, NativeRegistry, NativeStructDescriptor};
