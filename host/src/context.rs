//! `Context` is the compiler's documented entry point for running compiled
//! code (spec §6: `Context::call`, `.stack`, `run_constructors`/
//! `run_destructors`). The VM executor itself is out of scope (spec §1), so
//! this type only defines the shape of that interface: symbol lookup
//! against the [`Image`] and the calling-convention [`Stack`]. Actually
//! dispatching an opcode is left to the host's VM/JIT.

use crate::abi::Stack;
use crate::image::Image;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    UnknownFunction(String),
    /// Raised by every operation that would require executing bytecode;
    /// this crate defines the interface, not an interpreter.
    ExecutionNotProvided,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::UnknownFunction(name) => write!(f, "unknown function '{name}'"),
            ContextError::ExecutionNotProvided => {
                write!(f, "bytecode execution is provided by the host VM, not lethe-host")
            }
        }
    }
}

impl std::error::Error for ContextError {}

pub struct Context<'img> {
    image: &'img Image,
    pub stack: Stack,
    entry_pc: Option<u32>,
}

impl<'img> Context<'img> {
    pub fn new(image: &'img Image) -> Self {
        Context {
            image,
            stack: Stack::new(),
            entry_pc: None,
        }
    }

    /// Resolve `function_name` against the image's symbol table and record
    /// it as the pending entry point. Returns an error if the function does
    /// not exist in the image; otherwise defers to the host VM to actually
    /// dispatch instructions starting at that PC.
    pub fn call(&mut self, function_name: &str) -> Result<u32, ContextError> {
        let pc = self
            .image
            .symbols
            .get(function_name)
            .copied()
            .ok_or_else(|| ContextError::UnknownFunction(function_name.to_string()))?;
        self.entry_pc = Some(pc);
        Ok(pc)
    }

    pub fn run_constructors(&mut self) -> Result<(), ContextError> {
        if self.image.symbols.contains_key("__init") {
            Err(ContextError::ExecutionNotProvided)
        } else {
            Ok(())
        }
    }

    pub fn run_destructors(&mut self) -> Result<(), ContextError> {
        if self.image.symbols.contains_key("__exit") {
            Err(ContextError::ExecutionNotProvided)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_resolves_symbol_table_entries() {
        let mut image = Image::new();
        image.symbols.insert("main".into(), 3);
        let mut ctx = Context::new(&image);
        assert_eq!(ctx.call("main"), Ok(3));
        assert!(matches!(ctx.call("missing"), Err(ContextError::UnknownFunction(_))));
    }
}
