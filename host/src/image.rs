//! The bytecode image: the compiler's output, and the VM/JIT's input.
//!
//! Spec §6: "a sequence of 32-bit instructions, a constant pool (byte blob
//! with interned string and name tables), a symbol table mapping function
//! names to PCs, a native-function index table, and a set of class-type
//! descriptors each containing a vtable offset."

use crate::opcode::Instruction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A class's vtable descriptor in the global pool.
///
/// Spec §4.6: each class reserves three words before the method slots
/// (engine refptr, script-instance deleter, class-type pointer); the
/// `vtbl_offset` stored on `DataType` points at slot 0, the destructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    /// Byte offset into `globals` of the three header words, slot 0 onward.
    pub vtbl_offset: u32,
    /// Number of method slots, including slot 0 (the destructor).
    pub vtbl_size: u32,
}

/// A native function entry, indexed by call sites via `CallNative`'s immediate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeEntry {
    pub qualified_name: String,
}

/// The full compiled program image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub instructions: Vec<u32>,
    /// Append-only global byte blob (globals, vtables, baked string headers).
    pub globals: Vec<u8>,
    pub interned_strings: Vec<String>,
    pub interned_names: Vec<String>,
    /// Byte offsets into `globals` of baked string globals, so the host can
    /// relocate/destruct them at program exit (spec §4.6).
    pub string_global_offsets: Vec<u32>,
    pub symbols: HashMap<String, u32>,
    pub natives: Vec<NativeEntry>,
    pub classes: Vec<ClassDescriptor>,
}

impl Image {
    pub fn new() -> Self {
        Image::default()
    }

    pub fn push_instruction(&mut self, inst: Instruction) -> u32 {
        let pc = self.instructions.len() as u32;
        self.instructions.push(inst.encode());
        pc
    }

    pub fn decode_at(&self, pc: u32) -> Option<Instruction> {
        self.instructions
            .get(pc as usize)
            .and_then(|w| Instruction::decode(*w))
    }

    pub fn pc(&self) -> u32 {
        self.instructions.len() as u32
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Image, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    #[test]
    fn serializes_round_trip() {
        let mut img = Image::new();
        img.push_instruction(Instruction::new(Opcode::PushInt, 7));
        img.symbols.insert("main".into(), 0);
        let bytes = img.to_bytes().unwrap();
        let back = Image::from_bytes(&bytes).unwrap();
        assert_eq!(img, back);
    }
}
