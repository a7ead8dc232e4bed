//! Compile entry point
//!
//! `splice -> normalize -> vendorize -> flatten -> post -> tokenize`, then an
//! optional re-parse of the output. Each phase re-raises failures tagged with
//! its name; nothing is emitted for a query whose compilation failed.

use crate::dialect::{dialect_for, SqlDialect};
use crate::flatten::Flattener;
use crate::post;
use crate::splice::SpliceMap;
use crate::token::{BoundParam, ParamSet, Token};
use crate::tokenize::Tokenizer;
use crate::vendorize::{vendorize_action, vendorize_expr, vendorize_query};
use qx_core::config::{CompilerConfig, DialectKind, ParamStyle};
use qx_core::error::{CompileError, CompileResult};
use qx_core::trace::{TraceEvent, TraceType, Tracer};
use qx_core::xr::{Action, Expr, Query};
use qx_norm::{FreshNames, Normalizer, PassContext};
use serde::Serialize;

/// Compiles XR trees to SQL for one dialect
pub struct SqlCompiler {
    config: CompilerConfig,
    dialect: Box<dyn SqlDialect>,
    normalizer: Normalizer,
}

impl SqlCompiler {
    /// Create a compiler for the configured dialect
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            dialect: dialect_for(config.dialect),
            normalizer: Normalizer::from_config(&config),
            config,
        }
    }

    /// Replace the dialect implementation
    pub fn with_dialect(mut self, dialect: Box<dyn SqlDialect>) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile a query
    pub fn compile_query(&self, q: &Query, label: Option<&str>) -> CompileResult<CompiledQuery> {
        self.compile_query_with(q, &SpliceMap::new(), label)
    }

    /// Compile a query, resolving front-end tags from `splices` first
    pub fn compile_query_with(
        &self,
        q: &Query,
        splices: &SpliceMap,
        label: Option<&str>,
    ) -> CompileResult<CompiledQuery> {
        self.run(label, |tracer| {
            let spliced = splices
                .splice_query(q)
                .map_err(|e| e.in_phase("splice"))?;
            let mut ctx = PassContext::new(tracer);
            let normalized = self
                .normalizer
                .normalize(&spliced, &mut ctx)
                .map_err(|e| e.in_phase("normalize"))?;
            let PassContext { fresh, tracer } = ctx;
            let token = self.relational(&normalized, fresh, tracer)?;
            Ok((token, Vec::new()))
        })
    }

    /// Compile a free-standing expression as a single-row SELECT
    pub fn compile_expr(&self, e: &Expr, label: Option<&str>) -> CompileResult<CompiledQuery> {
        self.run(label, |tracer| {
            let spliced = SpliceMap::new()
                .splice_expr(e)
                .map_err(|e| e.in_phase("splice"))?;
            let mut ctx = PassContext::new(tracer);
            let normalized = self
                .normalizer
                .normalize_expr(&spliced, &mut ctx)
                .map_err(|e| e.in_phase("normalize"))?;
            let PassContext { fresh, tracer } = ctx;
            let value = if self.dialect.native_booleans() {
                normalized
            } else {
                vendorize_expr(&normalized, tracer).map_err(|e| e.in_phase("vendorize"))?
            };
            let token = self.render(&Query::of_expr(value), fresh, tracer)?;
            Ok((token, Vec::new()))
        })
    }

    /// Compile an action
    pub fn compile_action(&self, a: &Action, label: Option<&str>) -> CompileResult<CompiledQuery> {
        self.compile_action_with(a, &SpliceMap::new(), label)
    }

    /// Compile an action, resolving front-end tags from `splices` first
    pub fn compile_action_with(
        &self,
        a: &Action,
        splices: &SpliceMap,
        label: Option<&str>,
    ) -> CompileResult<CompiledQuery> {
        self.run(label, |tracer| {
            let spliced = splices
                .splice_action(a)
                .map_err(|e| e.in_phase("splice"))?;
            let mut ctx = PassContext::new(tracer);
            let normalized = self
                .normalizer
                .normalize_action(&spliced, &mut ctx)
                .map_err(|e| e.in_phase("normalize"))?;
            let PassContext { fresh, tracer } = ctx;
            let action = if self.dialect.native_booleans() {
                normalized
            } else {
                vendorize_action(&normalized, tracer).map_err(|e| e.in_phase("vendorize"))?
            };
            let tokens = Tokenizer::new(self.dialect.as_ref(), tracer)
                .with_names(fresh)
                .tokenize_action(&action)
                .map_err(|e| e.in_phase("tokenize"))?;
            Ok((tokens.token, tokens.returning))
        })
    }

    /// Vendorize when needed, then flatten and render a normalized query
    fn relational(&self, q: &Query, fresh: FreshNames, tracer: &mut Tracer) -> CompileResult<Token> {
        if self.dialect.native_booleans() {
            return self.render(q, fresh, tracer);
        }
        let vendorized = vendorize_query(q, tracer).map_err(|e| e.in_phase("vendorize"))?;
        self.render(&vendorized, fresh, tracer)
    }

    /// Flatten and render, minting any further names from `fresh`
    fn render(&self, q: &Query, fresh: FreshNames, tracer: &mut Tracer) -> CompileResult<Token> {
        let mut flattener = Flattener::new(tracer).with_names(fresh);
        let flat = flattener.apply(q).map_err(|e| e.in_phase("flatten"))?;
        let fresh = flattener.into_names();
        let prepared = post::prepare(flat, true, tracer).map_err(|e| e.in_phase("post"))?;
        Tokenizer::new(self.dialect.as_ref(), tracer)
            .with_names(fresh)
            .tokenize_query(&prepared)
            .map_err(|e| e.in_phase("tokenize"))
    }

    /// One top-level compilation with its own tracer
    fn run(
        &self,
        label: Option<&str>,
        pipeline: impl FnOnce(&mut Tracer) -> CompileResult<(Token, Vec<String>)>,
    ) -> CompileResult<CompiledQuery> {
        let label = label
            .map(str::to_string)
            .or_else(|| self.config.label.clone());
        let mut tracer = Tracer::new(&self.config.trace);
        let name = label.as_deref().unwrap_or("<unlabeled>");
        tracer.trace(TraceType::Standard, || {
            format!("compiling {name} for {}", self.dialect.name())
        });

        let result = pipeline(&mut tracer).and_then(|(token, returning)| {
            self.validate(&token)?;
            Ok(CompiledQuery {
                label: label.clone(),
                dialect: self.dialect.kind(),
                token,
                returning_columns: returning,
                trace: Vec::new(),
                style: self.config.param_style,
            })
        });

        match &result {
            Ok(compiled) => tracer.trace(TraceType::Standard, || {
                format!("compiled {name}: {}", compiled.debug_sql(false))
            }),
            Err(e) => log::debug!("Compilation of {name} failed: {e}"),
        }
        let events = tracer.flush();
        result.map(|compiled| CompiledQuery {
            trace: events,
            ..compiled
        })
    }

    /// Re-parse the output when configured to
    fn validate(&self, token: &Token) -> CompileResult<()> {
        if !self.config.validate_output {
            return Ok(());
        }
        let sql = match token.build(self.dialect.validation_param_style()) {
            Ok(sql) => sql,
            Err(CompileError::UnrealizedParam { bid, .. }) => {
                log::debug!("Skipping validation: placeholder {bid} is not realized yet");
                return Ok(());
            }
            Err(e) => return Err(e.in_phase("validate")),
        };
        self.dialect
            .parse(&sql)
            .map(|_| ())
            .map_err(|e| e.in_phase("validate"))
    }
}

/// Result of a compilation, before parameters are bound
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub label: Option<String>,
    pub dialect: DialectKind,
    pub token: Token,
    /// Values handed back by a returning action, in order
    pub returning_columns: Vec<String>,
    /// Trace events recorded while compiling
    pub trace: Vec<TraceEvent>,
    style: ParamStyle,
}

impl CompiledQuery {
    /// Final SQL text; fails while list or batch placeholders are unrealized
    pub fn sql(&self) -> CompileResult<String> {
        self.token.build(self.style)
    }

    /// SQL for logs and error messages, never fails
    pub fn debug_sql(&self, inline: bool) -> String {
        self.token.render(inline)
    }

    /// Positional parameters in binding order
    pub fn params(&self) -> Vec<BoundParam> {
        self.token.extract_params()
    }

    /// Substitute known values into the placeholders
    pub fn realize(&self, params: &ParamSet) -> CompiledQuery {
        CompiledQuery {
            token: self.token.realize(params),
            ..self.clone()
        }
    }

    pub fn to_statement(&self) -> CompileResult<CompiledStatement> {
        Ok(CompiledStatement {
            sql: self.sql()?,
            params: self.params(),
            label: self.label.clone(),
            dialect: self.dialect,
            returning_columns: self.returning_columns.clone(),
        })
    }
}

/// Serializable compile output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<BoundParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub dialect: DialectKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub returning_columns: Vec<String>,
}

impl CompiledStatement {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
#[path = "compile_test.rs"]
mod tests;
