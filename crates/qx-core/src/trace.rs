//! Diagnostic trace side channel.
//!
//! A [`Tracer`] lives for one top-level compilation. Enabled events are
//! logged under the `qx::trace` target as they happen and buffered so the
//! caller can inspect them; [`Tracer::flush`] completes the channel.

use crate::config::TraceConfig;
use serde::{Deserialize, Serialize};

/// Log target used for trace events
pub const TRACE_TARGET: &str = "qx::trace";

/// Kinds of trace events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceType {
    /// Compilation start/end
    Standard,
    /// Each normalization phase, `before -> after`
    Normalizations,
    /// Individual rule firings inside normalization
    SqlNormalizations,
    /// Substitution engine renames and reductions
    BetaReduction,
    /// Map fusion decisions
    ApplyMap,
    /// Alias renames in de-aliasing and alias pushing
    AvoidAliasConflict,
    /// Nest-vs-merge decisions while flattening
    Flattening,
    /// Select list expansion after flattening
    ExpandDistinct,
    /// Boolean vendorization
    Vendorization,
    /// Recoverable oddities
    Warning,
}

/// A buffered trace event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub kind: TraceType,
    pub message: String,
}

/// Per-compilation tracer
#[derive(Debug, Default)]
pub struct Tracer {
    enabled: bool,
    types: Vec<TraceType>,
    events: Vec<TraceEvent>,
}

impl Tracer {
    /// Tracer configured from compiler settings
    pub fn new(config: &TraceConfig) -> Self {
        Self {
            enabled: config.enabled,
            types: config.types.clone(),
            events: Vec::new(),
        }
    }

    /// Tracer that records nothing
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns true if events of this kind are recorded
    pub fn is_enabled(&self, kind: TraceType) -> bool {
        self.enabled && (self.types.is_empty() || self.types.contains(&kind))
    }

    /// Record an event. The message is only built when the kind is enabled.
    pub fn trace<F: FnOnce() -> String>(&mut self, kind: TraceType, message: F) {
        if !self.is_enabled(kind) {
            return;
        }
        let message = message();
        log::debug!(target: TRACE_TARGET, "[{kind:?}] {message}");
        self.events.push(TraceEvent { kind, message });
    }

    /// Events recorded so far, in order
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Complete the channel: flush the logger and hand back the buffered events
    pub fn flush(&mut self) -> Vec<TraceEvent> {
        if self.enabled {
            log::logger().flush();
        }
        std::mem::take(&mut self.events)
    }
}
