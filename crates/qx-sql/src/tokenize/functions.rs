//! Function and method calls

use super::expr::ATOM;
use super::Tokenizer;
use crate::dialect::{call, CastTarget, ConcatStyle};
use crate::token::Token;
use qx_core::error::{CompileError, CompileResult};
use qx_core::xr::{CallKind, Expr, ParamKind, Query};

fn cast_target(name: &str) -> Option<CastTarget> {
    match name {
        "toString" => Some(CastTarget::String),
        "toInt" => Some(CastTarget::Int),
        "toLong" => Some(CastTarget::Long),
        "toDouble" => Some(CastTarget::Double),
        _ => None,
    }
}

fn simple_function(name: &str) -> Option<&'static str> {
    match name {
        "upper" => Some("UPPER"),
        "lower" => Some("LOWER"),
        "trim" => Some("TRIM"),
        "sum" => Some("SUM"),
        "avg" => Some("AVG"),
        "min" => Some("MIN"),
        "max" => Some("MAX"),
        _ => None,
    }
}

/// `count(x)` counts rows when `x` is a whole row
fn counts_rows(arg: Option<&Expr>) -> bool {
    match arg {
        None => true,
        Some(Expr::Ident(_)) | Some(Expr::Product { .. }) => true,
        Some(e) => e.tpe().is_product(),
    }
}

impl Tokenizer<'_, '_> {
    /// Render a `GlobalCall` or `MethodCall`; a method's receiver is its
    /// first argument
    pub(super) fn call(&mut self, e: &Expr) -> CompileResult<Token> {
        let (name, args, kind) = match e {
            Expr::GlobalCall {
                name, args, kind, ..
            } => (name.as_str(), args.iter().collect::<Vec<_>>(), *kind),
            Expr::MethodCall {
                head,
                name,
                args,
                kind,
                ..
            } => {
                let mut all = vec![head.as_ref()];
                all.extend(args.iter());
                (name.as_str(), all, *kind)
            }
            _ => {
                return Err(CompileError::invariant(
                    "tokenize",
                    "expected a function call",
                    e,
                ))
            }
        };

        if kind == CallKind::QueryAggregator {
            let sub = self.subquery(&Query::of_expr(e.clone()))?;
            return Ok(Token::parens(sub));
        }

        if let Some(function) = simple_function(name) {
            let [arg] = self.arity::<1>(e, name, &args)?;
            return Ok(call(function, vec![self.tokenize_expr(arg)?]));
        }
        if let Some(target) = cast_target(name) {
            let [arg] = self.arity::<1>(e, name, &args)?;
            let value = self.tokenize_expr(arg)?;
            return Ok(Token::seq(vec![
                Token::lit("CAST("),
                value,
                Token::lit(format!(" AS {})", self.dialect.cast_type(target))),
            ]));
        }

        match name {
            "length" => {
                let [arg] = self.arity::<1>(e, name, &args)?;
                let function = self.dialect.length_function();
                Ok(call(function, vec![self.tokenize_expr(arg)?]))
            }
            "substring" => {
                if !(2..=3).contains(&args.len()) {
                    return Err(self.unsupported_call(e, name, args.len()));
                }
                let items = self.tokens(&args)?;
                Ok(call(self.dialect.substring_function(), items))
            }
            "like" => {
                let [a, pattern] = self.arity::<2>(e, name, &args)?;
                let pattern = self.operand(pattern, 5)?;
                self.like(a, pattern)
            }
            "startsWith" => {
                let [a, prefix] = self.arity::<2>(e, name, &args)?;
                let prefix = self.operand(prefix, 6)?;
                let pattern = self.concat_tokens(vec![prefix, Token::lit("'%'")]);
                self.like(a, pattern)
            }
            "contains" => {
                let [head, item] = self.arity::<2>(e, name, &args)?;
                match head {
                    Expr::QueryAsExpr(_)
                    | Expr::Param {
                        kind: ParamKind::List,
                        ..
                    }
                    | Expr::Product { .. } => self.membership(item, head),
                    _ => {
                        let item = self.operand(item, 6)?;
                        let pattern =
                            self.concat_tokens(vec![Token::lit("'%'"), item, Token::lit("'%'")]);
                        self.like(head, pattern)
                    }
                }
            }
            "count" => {
                if args.len() > 1 {
                    return Err(self.unsupported_call(e, name, args.len()));
                }
                if counts_rows(args.first().copied()) {
                    return Ok(Token::lit("COUNT(*)"));
                }
                let items = self.tokens(&args)?;
                Ok(call("COUNT", items))
            }
            "countDistinct" => {
                if args.is_empty() {
                    return Err(self.unsupported_call(e, name, 0));
                }
                let items = self.tokens(&args)?;
                Ok(Token::seq(vec![
                    Token::lit("COUNT(DISTINCT "),
                    Token::join(items, ", "),
                    Token::lit(")"),
                ]))
            }
            "coalesce" => {
                if args.is_empty() {
                    return Err(self.unsupported_call(e, name, 0));
                }
                let items = self.tokens(&args)?;
                Ok(call("COALESCE", items))
            }
            "nullif" => {
                let [a, b] = self.arity::<2>(e, name, &args)?;
                let items = vec![self.tokenize_expr(a)?, self.tokenize_expr(b)?];
                Ok(call("NULLIF", items))
            }
            "concat" => {
                if args.is_empty() {
                    return Err(self.unsupported_call(e, name, 0));
                }
                let mut items = Vec::with_capacity(args.len());
                for arg in &args {
                    items.push(self.operand(arg, 6)?);
                }
                Ok(self.concat_tokens(items))
            }
            "jsonExtract" => {
                let [target, path] = self.arity::<2>(e, name, &args)?;
                let target = self.operand(target, ATOM)?;
                let path = self.tokenize_expr(path)?;
                self.dialect
                    .json_extract(target, path)
                    .ok_or_else(|| CompileError::unsupported(self.dialect.name(), "jsonExtract", e))
            }
            _ => match e {
                Expr::GlobalCall {
                    kind: CallKind::PureFunction | CallKind::ImpureFunction,
                    ..
                } => {
                    let items = self.tokens(&args)?;
                    Ok(call(name, items))
                }
                _ => Err(CompileError::unsupported(
                    self.dialect.name(),
                    format!("function {name}"),
                    e,
                )),
            },
        }
    }

    fn arity<'a, const N: usize>(
        &self,
        e: &Expr,
        name: &str,
        args: &[&'a Expr],
    ) -> CompileResult<[&'a Expr; N]> {
        <[&Expr; N]>::try_from(args).map_err(|_| self.unsupported_call(e, name, args.len()))
    }

    fn unsupported_call(&self, e: &Expr, name: &str, count: usize) -> CompileError {
        CompileError::unsupported(
            self.dialect.name(),
            format!("function {name} with {count} arguments"),
            e,
        )
    }

    fn tokens(&mut self, args: &[&Expr]) -> CompileResult<Vec<Token>> {
        args.iter().map(|a| self.tokenize_expr(a)).collect()
    }

    fn like(&mut self, a: &Expr, pattern: Token) -> CompileResult<Token> {
        Ok(Token::spaced(vec![
            self.operand(a, 5)?,
            Token::lit("LIKE"),
            pattern,
        ]))
    }

    /// Join already rendered operands with the dialect's concatenation
    fn concat_tokens(&self, items: Vec<Token>) -> Token {
        match self.dialect.concat() {
            ConcatStyle::Operator(sym) => Token::join(items, &format!(" {sym} ")),
            ConcatStyle::Function => call("CONCAT", items),
        }
    }
}
