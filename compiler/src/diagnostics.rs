//! Diagnostic kinds for every pass (spec §7). Each pass collects a batch of
//! [`Diagnostic`]s and the driver aborts at the end of the pass, not mid
//! expression, so one pass can report multiple independent errors.

use lethe_host::{Diagnostic, SourceLocation, Severity};

/// A per-pass diagnostic sink. Mirrors spec §7's propagation rule: every
/// codegen/typegen function returns success/failure, and on failure calls
/// into a sink like this one instead of aborting immediately.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn push_error(&mut self, kind: &'static str, message: impl Into<String>, loc: SourceLocation) {
        let message = message.into();
        tracing::debug!(kind, %message, "error diagnostic");
        self.diagnostics.push(Diagnostic::error(kind, message, loc));
    }

    pub fn push_warning(&mut self, kind: &'static str, message: impl Into<String>, loc: SourceLocation) {
        let message = message.into();
        tracing::debug!(kind, %message, "warning diagnostic");
        self.diagnostics.push(Diagnostic::warning(kind, message, loc));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn extend(&mut self, other: DiagnosticSink) {
        self.diagnostics.extend(other.diagnostics);
    }
}

/// Well-known diagnostic kind tags, named directly after spec §7's Kinds so
/// call sites and tests can match on a stable string instead of duplicating
/// message text.
pub mod kind {
    pub const UNKNOWN_SYMBOL: &str = "unknown-symbol";
    pub const AMBIGUOUS_CALL: &str = "ambiguous-call";
    pub const RECURSIVE_TYPE: &str = "recursive-type";
    pub const RECURSIVE_AUTO: &str = "recursive-auto";
    pub const ARG_COUNT_MISMATCH: &str = "argument-count-mismatch";
    pub const FORMAT_MISMATCH: &str = "format-string-mismatch";
    pub const UNRESOLVED_FORWARD_REF: &str = "unresolved-forward-reference";

    pub const INCOMPATIBLE_TYPES: &str = "incompatible-types";
    pub const CANNOT_CONVERT_CONSTANT: &str = "cannot-convert-constant";
    pub const CANNOT_MODIFY_CONSTANT: &str = "cannot-modify-constant";
    pub const CANNOT_PASS_NON_CONST_REF: &str = "cannot-pass-by-non-const-reference";
    pub const REFERENCE_TYPE_MISMATCH: &str = "reference-type-mismatch";
    pub const VIRTUAL_SIGNATURE_MISMATCH: &str = "virtual-signature-mismatch";
    pub const OVERRIDE_WITHOUT_BASE: &str = "override-without-base";
    pub const CONST_STATIC_MUTUAL_EXCLUSION: &str = "const-static-mutual-exclusion";
    pub const INVALID_STATE_CLASS_MODIFICATION: &str = "invalid-state-class-modification";
    pub const INVALID_LATENT_SIGNATURE: &str = "invalid-latent-signature";

    pub const INVALID_TYPE_SIZE: &str = "invalid-type-size";
    pub const VARIABLE_TOO_LARGE: &str = "variable-too-large";
    pub const TOO_MANY_GLOBALS: &str = "too-many-globals";
    pub const NATIVE_LAYOUT_MISMATCH: &str = "native-layout-mismatch";
    pub const CLASS_ALIGNMENT_EXCEEDED: &str = "class-alignment-exceeded";

    pub const NOT_ALL_PATHS_RETURN: &str = "not-all-paths-return-a-value";
    pub const STATE_BREAK_IN_DEFERRED: &str = "state-break-in-deferred-code";
    pub const ILLEGAL_EXPRESSION: &str = "illegal-expression-construct";

    pub const UNREACHABLE_CODE: &str = "unreachable-code";
    pub const UNREFERENCED_LOCAL: &str = "unreferenced-local";
    pub const PRECISION_LOSS: &str = "precision-loss";
    pub const MISSING_OVERRIDE: &str = "missing-override";
    pub const DEPRECATED_CALL: &str = "deprecated-call";
    pub const NOCOPY_NOINIT_MISUSE: &str = "nocopy-noinit-misuse";
    pub const NOINIT_IGNORED_SMALL_TYPE: &str = "noinit-ignored-for-small-type";
    pub const INLINE_IGNORED_VIRTUAL: &str = "inline-ignored-for-virtual";
    pub const PRIVATE_PROTECTED_INHERITANCE: &str = "private-protected-inheritance";
}

/// Spec §7: "Layout errors: ... variable too large (> 512 KB on stack),
/// too many globals (> 256 MB)".
pub const MAX_STACK_VARIABLE_BYTES: u64 = 512 * 1024;
pub const MAX_GLOBAL_POOL_BYTES: u64 = 256 * 1024 * 1024;
pub const MAX_CLASS_ALIGNMENT: u32 = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_batches_errors_without_aborting_the_pass() {
        let mut sink = DiagnosticSink::new();
        sink.push_error(kind::UNKNOWN_SYMBOL, "`foo` is undefined", SourceLocation::synthetic());
        sink.push_error(kind::ARG_COUNT_MISMATCH, "expected 2 args", SourceLocation::synthetic());
        assert_eq!(sink.diagnostics().len(), 2);
        assert!(sink.has_errors());
    }

    #[test]
    fn warnings_do_not_count_as_errors() {
        let mut sink = DiagnosticSink::new();
        sink.push_warning(kind::PRECISION_LOSS, "narrowing int to short", SourceLocation::synthetic());
        assert!(!sink.has_errors());
    }
}
