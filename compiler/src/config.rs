//! Compiler configuration for extensibility.
//!
//! Lets an embedding host register additional native bindings and tune the
//! limits spec §9 calls out as configurable ("keep configurable" for inline
//! depth/expansion size) without editing the compiler itself. Modeled on the
//! teacher repo's `CompilerConfig`/`ExternalBuiltin` builder pattern.
//!
//! # Example
//!
//! ```rust,ignore
//! use lethe_compiler::config::CompilerConfig;
//! use lethe_host::NativeFunctionDescriptor;
//!
//! let config = CompilerConfig::new()
//!     .with_native_function(NativeFunctionDescriptor::new("div", 2, false))
//!     .with_max_inline_depth(4);
//! ```

use lethe_host::{NativeFunctionDescriptor, NativeStructDescriptor};
use serde::{Deserialize, Serialize};

/// Spec §4.4.5 / §9: inline expansion depth and per-expansion opcode budget.
/// Spec explicitly flags these as unjustified hard limits that should stay
/// configurable rather than be hard-coded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InlineLimits {
    pub max_depth: u32,
    pub max_expansion_opcodes: u32,
}

impl Default for InlineLimits {
    fn default() -> Self {
        InlineLimits {
            max_depth: 10,
            max_expansion_opcodes: 256,
        }
    }
}

/// Independently toggle-able optimization passes, mainly for the NRVO
/// equivalence test in spec §8 property 5 (must be able to run the same
/// program with NRVO disabled and compare results).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OptimizationFlags {
    pub nrvo: bool,
    pub inline_expansion: bool,
    pub const_folding: bool,
}

impl Default for OptimizationFlags {
    fn default() -> Self {
        OptimizationFlags {
            nrvo: true,
            inline_expansion: true,
            const_folding: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub inline_limits: InlineLimits,
    pub optimizations: OptimizationFlags,
    #[serde(skip)]
    pub native_functions: Vec<NativeFunctionDescriptor>,
    #[serde(skip)]
    pub native_structs: Vec<NativeStructDescriptor>,
    /// Maximum fixed-point resolver passes before giving up (spec §4.1
    /// doesn't bound this explicitly; kept finite so a buggy node that
    /// oscillates `resolved` can't hang the compiler).
    pub max_resolve_passes: u32,
    /// Cap for the `auto x = x` recursion-lock counter (spec §4.1).
    pub max_auto_resolution_locks: u32,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig {
            inline_limits: InlineLimits::default(),
            optimizations: OptimizationFlags::default(),
            native_functions: Vec::new(),
            native_structs: Vec::new(),
            max_resolve_passes: 1000,
            max_auto_resolution_locks: 100,
        }
    }

    pub fn with_native_function(mut self, descriptor: NativeFunctionDescriptor) -> Self {
        self.native_functions.push(descriptor);
        self
    }

    pub fn with_native_struct(mut self, descriptor: NativeStructDescriptor) -> Self {
        self.native_structs.push(descriptor);
        self
    }

    pub fn with_max_inline_depth(mut self, depth: u32) -> Self {
        self.inline_limits.max_depth = depth;
        self
    }

    pub fn without_nrvo(mut self) -> Self {
        self.optimizations.nrvo = false;
        self
    }

    pub fn from_toml_str(s: &str) -> Result<CompilerConfig, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let config = CompilerConfig::new().with_max_inline_depth(3);
        let text = config.to_toml_string().unwrap();
        let back = CompilerConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.inline_limits.max_depth, 3);
    }

    #[test]
    fn builder_methods_compose() {
        let config = CompilerConfig::new()
            .with_native_function(NativeFunctionDescriptor::new("div", 2, false))
            .without_nrvo();
        assert_eq!(config.native_functions.len(), 1);
        assert!(!config.optimizations.nrvo);
    }

    #[test]
    fn round_trips_through_a_config_file_on_disk() {
        use std::fs;
        use tempfile::tempdir;

        let temp = tempdir().unwrap();
        let path = temp.path().join("lethe.toml");

        let config = CompilerConfig::new()
            .with_max_inline_depth(7)
            .without_nrvo();
        fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let back = CompilerConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.inline_limits.max_depth, 7);
        assert!(!back.optimizations.nrvo);
    }
}
