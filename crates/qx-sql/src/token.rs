//! Token model of rendered SQL
//!
//! The tokenizer produces a [`Token`] tree rather than a string so that
//! variable-arity placeholders can be realized once parameter values are
//! known. `build()` produces the final text; `render()` is the infallible
//! debug form.

use qx_core::config::ParamStyle;
use qx_core::error::{CompileError, CompileResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A concrete parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl ParamValue {
    /// SQL literal form, used when rendering with values inlined
    pub fn literal(&self) -> String {
        match self {
            ParamValue::Null => "NULL".to_string(),
            ParamValue::Bool(true) => "TRUE".to_string(),
            ParamValue::Bool(false) => "FALSE".to_string(),
            ParamValue::Int(v) => v.to_string(),
            ParamValue::Double(v) => v.to_string(),
            ParamValue::String(v) => format!("'{}'", v.replace('\'', "''")),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Double(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// Values available for realizing placeholders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    /// Single values by binding id
    #[serde(default)]
    pub values: HashMap<String, ParamValue>,
    /// `IN (...)` lists by binding id
    #[serde(default)]
    pub lists: HashMap<String, Vec<ParamValue>>,
    /// One map per batch row
    #[serde(default)]
    pub rows: Vec<HashMap<String, ParamValue>>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, bid: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.values.insert(bid.into(), value.into());
        self
    }

    pub fn list<V: Into<ParamValue>>(
        mut self,
        bid: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.lists
            .insert(bid.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn row<K: Into<String>, V: Into<ParamValue>>(
        mut self,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.rows.push(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

/// One positional parameter, in binding order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundParam {
    pub bid: String,
    /// Known value, `None` when the placeholder is bound by the caller
    pub value: Option<ParamValue>,
}

/// Lazily built SQL output
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Raw SQL text
    Literal(String),
    /// Concatenation without separators
    Sequence(Vec<Token>),
    /// A single-value placeholder
    Param { bid: String },
    /// A single-value placeholder with its value
    ParamRealized { bid: String, value: ParamValue },
    /// A variable-arity `IN (...)` placeholder
    ParamList { bid: String },
    /// A list placeholder resolved to its values
    ParamListRealized { bid: String, values: Vec<ParamValue> },
    /// A per-row value of a batch action
    BatchParam { bid: String },
    /// A batch value resolved for one row
    BatchParamRealized {
        bid: String,
        row: usize,
        value: ParamValue,
    },
    /// A block repeated once per batch row, such as a VALUES tuple
    Context(Box<Token>),
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::Literal(s.to_string())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token::Literal(s)
    }
}

impl Token {
    pub fn lit(s: impl Into<String>) -> Token {
        Token::Literal(s.into())
    }

    pub fn seq(items: Vec<Token>) -> Token {
        Token::Sequence(items)
    }

    /// Items separated by `sep`
    pub fn join(items: impl IntoIterator<Item = Token>, sep: &str) -> Token {
        let mut out = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                out.push(Token::lit(sep));
            }
            out.push(item);
        }
        Token::Sequence(out)
    }

    /// Items separated by single spaces
    pub fn spaced(items: impl IntoIterator<Item = Token>) -> Token {
        Token::join(items, " ")
    }

    /// `(token)`
    pub fn parens(inner: Token) -> Token {
        Token::Sequence(vec![Token::lit("("), inner, Token::lit(")")])
    }

    /// True when the tree holds a batch placeholder outside any realized row
    pub fn has_batch_params(&self) -> bool {
        match self {
            Token::BatchParam { .. } => true,
            Token::Sequence(items) => items.iter().any(Token::has_batch_params),
            Token::Context(inner) => inner.has_batch_params(),
            _ => false,
        }
    }

    /// Final SQL text.
    ///
    /// Fails on list or batch placeholders that were never realized.
    pub fn build(&self, style: ParamStyle) -> CompileResult<String> {
        let mut out = String::new();
        let mut position = 0;
        self.build_into(style, &mut out, &mut position)?;
        Ok(out)
    }

    fn build_into(&self, style: ParamStyle, out: &mut String, position: &mut usize) -> CompileResult<()> {
        match self {
            Token::Literal(s) => out.push_str(s),
            Token::Sequence(items) => {
                for item in items {
                    item.build_into(style, out, position)?;
                }
            }
            Token::Param { .. } | Token::ParamRealized { .. } | Token::BatchParamRealized { .. } => {
                placeholder(style, out, position)
            }
            Token::ParamListRealized { values, .. } => {
                if values.is_empty() {
                    out.push_str("NULL");
                }
                for i in 0..values.len() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    placeholder(style, out, position);
                }
            }
            Token::ParamList { bid } => {
                return Err(CompileError::UnrealizedParam {
                    bid: bid.clone(),
                    kind: "list".to_string(),
                })
            }
            Token::BatchParam { bid } => {
                return Err(CompileError::UnrealizedParam {
                    bid: bid.clone(),
                    kind: "batch".to_string(),
                })
            }
            Token::Context(inner) => inner.build_into(style, out, position)?,
        }
        Ok(())
    }

    /// Debug text that never fails.
    ///
    /// With `inline`, known values are written as literals and unknown ones
    /// as `:bid`; otherwise placeholders render as `?`. Unrealized lists and
    /// batch values always show their binding id.
    pub fn render(&self, inline: bool) -> String {
        let mut out = String::new();
        self.render_into(inline, &mut out);
        out
    }

    fn render_into(&self, inline: bool, out: &mut String) {
        match self {
            Token::Literal(s) => out.push_str(s),
            Token::Sequence(items) => items.iter().for_each(|t| t.render_into(inline, out)),
            Token::Param { bid } => {
                if inline {
                    out.push(':');
                    out.push_str(bid);
                } else {
                    out.push('?');
                }
            }
            Token::ParamRealized { value, .. } | Token::BatchParamRealized { value, .. } => {
                if inline {
                    out.push_str(&value.literal());
                } else {
                    out.push('?');
                }
            }
            Token::ParamListRealized { values, .. } => {
                if values.is_empty() {
                    out.push_str("NULL");
                }
                let items: Vec<String> = values
                    .iter()
                    .map(|v| if inline { v.literal() } else { "?".to_string() })
                    .collect();
                out.push_str(&items.join(", "));
            }
            Token::ParamList { bid } => out.push_str(&format!(":{bid}[list]")),
            Token::BatchParam { bid } => out.push_str(&format!(":{bid}[batch]")),
            Token::Context(inner) => inner.render_into(inline, out),
        }
    }

    /// Parameters in the order their placeholders appear.
    ///
    /// Drivers bind positionally, so this is a depth-first, left-to-right
    /// walk; a realized list contributes one entry per value.
    pub fn extract_params(&self) -> Vec<BoundParam> {
        let mut out = Vec::new();
        self.extract_into(&mut out);
        out
    }

    fn extract_into(&self, out: &mut Vec<BoundParam>) {
        match self {
            Token::Literal(_) => {}
            Token::Sequence(items) => items.iter().for_each(|t| t.extract_into(out)),
            Token::Param { bid } | Token::ParamList { bid } | Token::BatchParam { bid } => {
                out.push(BoundParam {
                    bid: bid.clone(),
                    value: None,
                })
            }
            Token::ParamRealized { bid, value } | Token::BatchParamRealized { bid, value, .. } => {
                out.push(BoundParam {
                    bid: bid.clone(),
                    value: Some(value.clone()),
                })
            }
            Token::ParamListRealized { bid, values } => {
                out.extend(values.iter().map(|v| BoundParam {
                    bid: bid.clone(),
                    value: Some(v.clone()),
                }))
            }
            Token::Context(inner) => inner.extract_into(out),
        }
    }

    /// Resolve placeholders against a parameter set.
    ///
    /// A context holding batch placeholders is repeated once per row,
    /// separated by commas. Batch placeholders outside a context are
    /// realized only for a single-row set. Placeholders without a value
    /// are left as they are.
    pub fn realize(&self, params: &ParamSet) -> Token {
        self.realize_row(params, None)
    }

    fn realize_row(&self, params: &ParamSet, row: Option<usize>) -> Token {
        match self {
            Token::Sequence(items) => {
                Token::Sequence(items.iter().map(|t| t.realize_row(params, row)).collect())
            }
            Token::Param { bid } => match params.values.get(bid) {
                Some(value) => Token::ParamRealized {
                    bid: bid.clone(),
                    value: value.clone(),
                },
                None => self.clone(),
            },
            Token::ParamList { bid } => match params.lists.get(bid) {
                Some(values) => Token::ParamListRealized {
                    bid: bid.clone(),
                    values: values.clone(),
                },
                None => self.clone(),
            },
            Token::BatchParam { bid } => {
                let row = match row {
                    Some(row) => row,
                    None if params.rows.len() == 1 => 0,
                    None => return self.clone(),
                };
                match params.rows.get(row).and_then(|r| r.get(bid)) {
                    Some(value) => Token::BatchParamRealized {
                        bid: bid.clone(),
                        row,
                        value: value.clone(),
                    },
                    None => self.clone(),
                }
            }
            Token::Context(inner) if row.is_none() && inner.has_batch_params() && !params.rows.is_empty() => {
                let copies = (0..params.rows.len()).map(|i| inner.realize_row(params, Some(i)));
                Token::Context(Box::new(Token::join(copies, ", ")))
            }
            Token::Context(inner) => Token::Context(Box::new(inner.realize_row(params, row))),
            other => other.clone(),
        }
    }
}

fn placeholder(style: ParamStyle, out: &mut String, position: &mut usize) {
    *position += 1;
    match style {
        ParamStyle::Question => out.push('?'),
        ParamStyle::Numbered => {
            out.push('$');
            out.push_str(&position.to_string());
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(false))
    }
}

#[cfg(test)]
#[path = "token_test.rs"]
mod tests;
