//! SCIM filter parsing and evaluation (RFC 7644 Section 3.4.2.2).
//!
//! Supports the operators provisioning IdPs actually send: `eq`, `co`,
//! and `sw` comparisons combined with `and`, `or`, and parentheses.
//! Expressions are evaluated in memory against an attribute lookup, so
//! the same filter works over any [`trellis_directory::Directory`]
//! implementation.

use crate::error::{ScimError, ScimResult};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Co,
    Sw,
}

impl CompareOp {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "eq" => Some(CompareOp::Eq),
            "co" => Some(CompareOp::Co),
            "sw" => Some(CompareOp::Sw),
            _ => None,
        }
    }
}

/// A parsed filter expression.
#[derive(Debug, Clone)]
pub enum FilterExpr {
    Compare {
        attribute: String,
        op: CompareOp,
        value: String,
    },
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl FilterExpr {
    /// Parse a filter string.
    pub fn parse(input: &str) -> ScimResult<Self> {
        let mut parser = Parser::new(input);
        parser.skip_whitespace();
        let expr = parser.parse_or()?;
        parser.skip_whitespace();
        if parser.pos < parser.input.len() {
            return Err(ScimError::InvalidFilter(format!(
                "Unexpected characters at position {}: '{}'",
                parser.pos,
                &parser.input[parser.pos..]
            )));
        }
        Ok(expr)
    }

    /// Evaluate against an attribute lookup. Attribute names compare
    /// case-insensitively; `eq` compares values case-insensitively as
    /// SCIM attributes are caseExact=false by default.
    pub fn matches<F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            FilterExpr::Compare {
                attribute,
                op,
                value,
            } => match lookup(attribute) {
                Some(actual) => {
                    let actual = actual.to_lowercase();
                    let expected = value.to_lowercase();
                    match op {
                        CompareOp::Eq => actual == expected,
                        CompareOp::Co => actual.contains(&expected),
                        CompareOp::Sw => actual.starts_with(&expected),
                    }
                }
                None => false,
            },
            FilterExpr::And(left, right) => left.matches(lookup) && right.matches(lookup),
            FilterExpr::Or(left, right) => left.matches(lookup) || right.matches(lookup),
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_or(&mut self) -> ScimResult<FilterExpr> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_whitespace();
            if self.try_consume_keyword("or") {
                self.skip_whitespace();
                let right = self.parse_and()?;
                left = FilterExpr::Or(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ScimResult<FilterExpr> {
        let mut left = self.parse_primary()?;
        loop {
            self.skip_whitespace();
            if self.try_consume_keyword("and") {
                self.skip_whitespace();
                let right = self.parse_primary()?;
                left = FilterExpr::And(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> ScimResult<FilterExpr> {
        self.skip_whitespace();
        if self.try_consume_char('(') {
            let expr = self.parse_or()?;
            self.skip_whitespace();
            if !self.try_consume_char(')') {
                return Err(ScimError::InvalidFilter(
                    "Expected ')' to close grouped expression".to_string(),
                ));
            }
            return Ok(expr);
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> ScimResult<FilterExpr> {
        let attribute = self.parse_attribute()?;
        self.skip_whitespace();
        let op_token = self.parse_word();
        let op = CompareOp::parse(&op_token).ok_or_else(|| {
            ScimError::InvalidFilter(format!("Unsupported operator '{op_token}'"))
        })?;
        self.skip_whitespace();
        let value = self.parse_value()?;
        Ok(FilterExpr::Compare {
            attribute,
            op,
            value,
        })
    }

    fn parse_attribute(&mut self) -> ScimResult<String> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '.' || ch == '_' || ch == '-' || ch == ':' {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(ScimError::InvalidFilter(format!(
                "Expected attribute name at position {start}"
            )));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_word(&mut self) -> String {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_value(&mut self) -> ScimResult<String> {
        if self.try_consume_char('"') {
            let mut value = String::new();
            loop {
                match self.peek() {
                    Some('"') => {
                        self.pos += 1;
                        return Ok(value);
                    }
                    Some('\\') => {
                        self.pos += 1;
                        match self.peek() {
                            Some(escaped) => {
                                value.push(escaped);
                                self.pos += escaped.len_utf8();
                            }
                            None => break,
                        }
                    }
                    Some(ch) => {
                        value.push(ch);
                        self.pos += ch.len_utf8();
                    }
                    None => break,
                }
            }
            return Err(ScimError::InvalidFilter("Unterminated string value".to_string()));
        }

        // Unquoted literal: boolean, number, or bare word.
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || ch == ')' {
                break;
            }
            self.pos += ch.len_utf8();
        }
        if self.pos == start {
            return Err(ScimError::InvalidFilter(format!(
                "Expected value at position {start}"
            )));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn try_consume_keyword(&mut self, keyword: &str) -> bool {
        let remaining = &self.input[self.pos..];
        if remaining.len() >= keyword.len()
            && remaining[..keyword.len()].eq_ignore_ascii_case(keyword)
        {
            let after = remaining[keyword.len()..].chars().next();
            if after.is_none() || after.is_some_and(|c| c.is_whitespace() || c == '(') {
                self.pos += keyword.len();
                return true;
            }
        }
        false
    }

    fn try_consume_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
    }
}
