//! Error types for qx-core

use thiserror::Error;

/// Compilation error type
///
/// Every failure aborts the compilation of the query that raised it: there is
/// no partial SQL emission. Codes use the `Q` prefix; configuration errors live
/// in [`ConfigError`] with the `C` prefix.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Q001: A tree reached a phase that assumed a prior phase's postcondition
    #[error("[Q001] Invariant violated in {phase}: {message}\n  in: {tree}")]
    InvariantViolation {
        phase: String,
        message: String,
        tree: String,
    },

    /// Q002: Construct with no rendering for the selected dialect
    #[error("[Q002] Unsupported construct '{construct}' for {dialect}\n  in: {context}")]
    Unsupported {
        dialect: String,
        construct: String,
        context: String,
    },

    /// Q003: Substitution whose replacement has no least-upper-bound with the original
    #[error("[Q003] Cannot substitute '{ident}': declared type {declared} has no common type with replacement type {replacement}")]
    TypeMismatch {
        ident: String,
        declared: String,
        replacement: String,
    },

    /// Q004: A pipeline phase failed; wraps the underlying cause
    #[error("[Q004] Phase '{phase}' failed: {source}")]
    PhaseFailed {
        phase: String,
        #[source]
        source: Box<CompileError>,
    },

    /// Q005: `build()` reached a list or batch placeholder that was never realized
    #[error("[Q005] Cannot build SQL: {kind} placeholder '{bid}' has not been realized")]
    UnrealizedParam { bid: String, kind: String },

    /// Q006: A front-end tag was never spliced with its sub-tree
    #[error("[Q006] No splice provided for tag '{bid}'")]
    MissingSplice { bid: String },

    /// Q007: Rendered SQL failed to re-parse with the dialect's parser
    #[error("[Q007] Generated {dialect} SQL is invalid at line {line}, column {column}: {message}")]
    SqlSyntax {
        dialect: String,
        message: String,
        line: usize,
        column: usize,
    },
}

impl CompileError {
    /// Build an invariant violation carrying the offending tree's textual form
    pub fn invariant(
        phase: impl Into<String>,
        message: impl Into<String>,
        tree: impl std::fmt::Display,
    ) -> Self {
        CompileError::InvariantViolation {
            phase: phase.into(),
            message: message.into(),
            tree: tree.to_string(),
        }
    }

    /// Build an unsupported-construct error for a dialect
    pub fn unsupported(
        dialect: impl Into<String>,
        construct: impl Into<String>,
        context: impl std::fmt::Display,
    ) -> Self {
        CompileError::Unsupported {
            dialect: dialect.into(),
            construct: construct.into(),
            context: context.to_string(),
        }
    }

    /// Tag this error with the phase it escaped from
    pub fn in_phase(self, phase: &str) -> Self {
        CompileError::PhaseFailed {
            phase: phase.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error once all phase tags are peeled off
    pub fn root_cause(&self) -> &CompileError {
        match self {
            CompileError::PhaseFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Phase names from outermost to innermost
    pub fn phases(&self) -> Vec<&str> {
        let mut phases = Vec::new();
        let mut current = self;
        while let CompileError::PhaseFailed { phase, source } = current {
            phases.push(phase.as_str());
            current = source;
        }
        phases
    }
}

/// Result type alias for CompileError
pub type CompileResult<T> = Result<T, CompileError>;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// C001: Configuration file not found
    #[error("[C001] Config file not found: {path}")]
    NotFound { path: String },

    /// C002: Failed to parse configuration file
    #[error("[C002] Failed to parse config: {message}")]
    Parse { message: String },

    /// C003: Invalid configuration value
    #[error("[C003] Invalid config: {message}")]
    Invalid { message: String },

    /// C004: IO error while reading configuration
    #[error("[C004] IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ConfigError
pub type ConfigResult<T> = Result<T, ConfigError>;
