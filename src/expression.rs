//! Expression parsing for global references.
//!
//! A reference is a key optionally followed by a call suffix `(parameter?)` or an
//! index suffix `[index]`. It can be written in three forms:
//! - plain: `key`, `key()`, `key[2]`, anchored to the whole string
//! - replace: `{{{key}}}`, anchored, substitutes the whole value keeping its type
//! - inline replace: `{{key}}`, unanchored, may appear many times inside a string

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Pattern of global keys
pub const PATTERN_KEY: &str = r"[a-zA-Z][a-zA-Z0-9\-_]*";

/// Pattern of a single function parameter
pub const PATTERN_FUNCTION_PARAMETER: &str =
    r#""[^"(){}\[\]]*"|'[^'(){}\[\]]*'|-?[0-9]+(?:\.[0-9]+)?|[a-zA-Z0-9\-_]+"#;

/// Pattern of array indices
pub const PATTERN_ARRAY_INDEX: &str = r"0|[1-9][0-9]*";

lazy_static! {
    static ref PLAIN: Regex = ExpressionForm::Plain.build_regex();
    static ref REPLACE: Regex = ExpressionForm::Replace.build_regex();
    static ref INLINE_REPLACE: Regex = ExpressionForm::InlineReplace.build_regex();
    static ref KEY: Regex = Regex::new(&format!("^(?:{})$", PATTERN_KEY))
        .expect("key pattern is a valid regular expression");
    static ref NUMBER: Regex = Regex::new(r"^-?[0-9]+(?:\.[0-9]+)?$")
        .expect("number pattern is a valid regular expression");
}

/// Syntactic form an expression is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionForm {
    Plain,
    Replace,
    InlineReplace,
}

impl ExpressionForm {
    /// Delimiters wrapping the expression in this form
    pub fn affixes(&self) -> (&'static str, &'static str) {
        match self {
            ExpressionForm::Plain => ("", ""),
            ExpressionForm::Replace => ("{{{", "}}}"),
            ExpressionForm::InlineReplace => ("{{", "}}"),
        }
    }

    fn is_anchored(&self) -> bool {
        !matches!(self, ExpressionForm::InlineReplace)
    }

    fn build_regex(&self) -> Regex {
        let (prefix, suffix) = self.affixes();
        let (anchor_start, anchor_end) = if self.is_anchored() { ("^", "$") } else { ("", "") };

        let pattern = format!(
            r"{}{}(?P<value>(?P<key>{})(?:(?P<function>\((?P<parameters>{})?\))|(?P<array>\[(?P<index>{})\]))?){}{}",
            anchor_start,
            regex::escape(prefix),
            PATTERN_KEY,
            PATTERN_FUNCTION_PARAMETER,
            PATTERN_ARRAY_INDEX,
            regex::escape(suffix),
            anchor_end,
        );

        Regex::new(&pattern).expect("expression pattern is a valid regular expression")
    }

    fn regex(&self) -> &'static Regex {
        match self {
            ExpressionForm::Plain => &PLAIN,
            ExpressionForm::Replace => &REPLACE,
            ExpressionForm::InlineReplace => &INLINE_REPLACE,
        }
    }
}

/// How the referenced global is accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionMode {
    Variable,
    Function,
    Array,
}

/// Parsed reference to a global
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expression {
    pub key: String,
    pub mode: ExpressionMode,
    /// Raw parameter text, at most one entry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

/// One inline occurrence found inside a larger string
#[derive(Debug, Clone, PartialEq)]
pub struct InlineMatch {
    /// Byte range of the delimited occurrence, delimiters included
    pub range: Range<usize>,
    /// Text between the delimiters, e.g. `rand-integer(10)`
    pub value: String,
    pub expression: Expression,
}

/// Function argument after classification of the raw parameter text
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Number(serde_json::Number),
    Bool(bool),
    /// Quoted literal with the quotes stripped, or an unclassifiable token
    Literal(String),
    /// Bare identifier, resolved as another global
    Reference(String),
}

impl Argument {
    pub fn classify(raw: &str) -> Argument {
        let trimmed = raw.trim();

        if trimmed.len() >= 2 {
            let first = trimmed.as_bytes()[0];
            let last = trimmed.as_bytes()[trimmed.len() - 1];
            if (first == b'"' || first == b'\'') && first == last {
                return Argument::Literal(trimmed[1..trimmed.len() - 1].to_string());
            }
        }

        match trimmed {
            "true" => return Argument::Bool(true),
            "false" => return Argument::Bool(false),
            _ => {}
        }

        if NUMBER.is_match(trimmed) {
            if let Ok(integer) = trimmed.parse::<i64>() {
                return Argument::Number(integer.into());
            }
            if let Some(number) = trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                return Argument::Number(number);
            }
        }

        if is_valid_key(trimmed) {
            Argument::Reference(trimmed.to_string())
        } else {
            Argument::Literal(trimmed.to_string())
        }
    }
}

impl Expression {
    /// Parse `raw` in the given form, `None` when it is not an expression.
    ///
    /// For the inline form the first occurrence is returned.
    pub fn parse(raw: &str, form: ExpressionForm) -> Option<Expression> {
        let captures = form.regex().captures(raw)?;
        Self::from_captures(&captures)
    }

    /// Find every inline occurrence in `raw`, in order of appearance
    pub fn scan(raw: &str) -> Vec<InlineMatch> {
        INLINE_REPLACE
            .captures_iter(raw)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let value = captures.name("value")?.as_str().to_string();
                let expression = Self::from_captures(&captures)?;
                Some(InlineMatch {
                    range: whole.range(),
                    value,
                    expression,
                })
            })
            .collect()
    }

    /// The single argument of a function expression, classified
    pub fn argument(&self) -> Option<Argument> {
        self.parameters.first().map(|raw| Argument::classify(raw))
    }

    fn from_captures(captures: &regex::Captures<'_>) -> Option<Expression> {
        let key = captures.name("key")?.as_str().to_string();

        if captures.name("function").is_some() {
            let parameters = captures
                .name("parameters")
                .map(|p| p.as_str())
                .filter(|p| !p.is_empty())
                .map(|p| vec![p.to_string()])
                .unwrap_or_default();

            return Some(Expression {
                key,
                mode: ExpressionMode::Function,
                parameters,
                index: None,
            });
        }

        if captures.name("array").is_some() {
            let index = captures.name("index")?.as_str().parse::<usize>().ok()?;
            return Some(Expression {
                key,
                mode: ExpressionMode::Array,
                parameters: Vec::new(),
                index: Some(index),
            });
        }

        Some(Expression {
            key,
            mode: ExpressionMode::Variable,
            parameters: Vec::new(),
            index: None,
        })
    }
}

/// Check a bare key, without call or index suffix
pub fn is_valid_key(key: &str) -> bool {
    KEY.is_match(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variable() {
        let parsed = Expression::parse("key", ExpressionForm::Plain).unwrap();
        assert_eq!(parsed.key, "key");
        assert_eq!(parsed.mode, ExpressionMode::Variable);
        assert!(parsed.parameters.is_empty());
        assert_eq!(parsed.index, None);
    }

    #[test]
    fn test_parse_function_with_quoted_parameter() {
        let parsed = Expression::parse("func(\"abc\")", ExpressionForm::Plain).unwrap();
        assert_eq!(parsed.mode, ExpressionMode::Function);
        assert_eq!(parsed.parameters, vec!["\"abc\"".to_string()]);
        assert_eq!(parsed.argument(), Some(Argument::Literal("abc".to_string())));

        let parsed = Expression::parse("func('abc')", ExpressionForm::Plain).unwrap();
        assert_eq!(parsed.parameters, vec!["'abc'".to_string()]);
    }

    #[test]
    fn test_replace_form_is_anchored() {
        assert!(Expression::parse("{{{key}}}", ExpressionForm::Replace).is_some());
        assert!(Expression::parse("x {{{key}}}", ExpressionForm::Replace).is_none());
        assert!(Expression::parse("{{key}}", ExpressionForm::Replace).is_none());
    }

    #[test]
    fn test_multi_digit_index() {
        let parsed = Expression::parse("arr[100]", ExpressionForm::Plain).unwrap();
        assert_eq!(parsed.index, Some(100));
        assert!(Expression::parse("arr[01]", ExpressionForm::Plain).is_none());
    }

    #[test]
    fn test_argument_classification() {
        assert_eq!(Argument::classify("10"), Argument::Number(10.into()));
        assert_eq!(Argument::classify("-3"), Argument::Number((-3).into()));
        assert_eq!(Argument::classify("true"), Argument::Bool(true));
        assert_eq!(Argument::classify("size"), Argument::Reference("size".to_string()));
        assert_eq!(Argument::classify("'size'"), Argument::Literal("size".to_string()));
        assert_eq!(Argument::classify("1abc"), Argument::Literal("1abc".to_string()));
    }
}
