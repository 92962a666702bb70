//
// expression.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

//! Turns source text and a cursor position into the expression a completion
//! or inspection request is about.

use std::sync::OnceLock;

use regex::Regex;

/// An expression at a cursor position, e.g. for `foo.bar["ba` the scope is
/// `foo.bar`, the operators are `["` and `"]`, and the selector is `ba`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expression {
    /// The full text being completed or inspected, up to the cursor
    pub matched_text: String,

    /// The object expression to the left of the selector operator; empty in
    /// a bare identifier or global context
    pub scope: String,

    /// The opening selector syntax: `.`, `["` or `['`
    pub left_op: String,

    /// The closing selector syntax: empty, `"]` or `']`
    pub right_op: String,

    /// The partial property name being completed
    pub selector: String,
}

impl Expression {
    /// Whether there is nothing at the cursor to complete or inspect
    pub fn is_empty(&self) -> bool {
        self.matched_text.is_empty()
    }
}

fn identifier() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER.get_or_init(|| {
        Regex::new(r"[_$a-zA-Z][_$a-zA-Z0-9]*$").expect("identifier pattern is valid")
    })
}

fn complex_identifier() -> &'static Regex {
    static COMPLEX_IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    COMPLEX_IDENTIFIER.get_or_init(|| {
        Regex::new(
            r#"[_$a-zA-Z][_$a-zA-Z0-9]*(?:\.[_$a-zA-Z][_$a-zA-Z0-9]*|\["[^"]*"\]|\['[^']*'\])*$"#,
        )
        .expect("complex identifier pattern is valid")
    })
}

/// The byte offset of the `chars`-th character of `text`, clamped to its end.
pub fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

/// Resolve the expression ending at `cursor_pos` (in characters) in `code`.
///
/// Returns an empty expression if there is nothing before the cursor or the
/// cursor follows whitespace. Returns `None` when a selector operator is
/// present but no object expression precedes it (e.g. `1.5.to`), since such
/// shapes aren't supported.
pub fn resolve(code: &str, cursor_pos: usize) -> Option<Expression> {
    let prefix = &code[..byte_offset(code, cursor_pos)];
    if prefix.is_empty() || prefix.ends_with(char::is_whitespace) {
        return Some(Expression::default());
    }

    let selector = identifier().find(prefix).map(|m| m.as_str()).unwrap_or("");
    let rest = &prefix[..prefix.len() - selector.len()];

    let (left_op, right_op) = if rest.ends_with('.') {
        (".", "")
    } else if rest.ends_with("[\"") {
        ("[\"", "\"]")
    } else if rest.ends_with("['") {
        ("['", "']")
    } else {
        return Some(Expression {
            matched_text: selector.to_string(),
            selector: selector.to_string(),
            ..Default::default()
        });
    };

    let rest = &rest[..rest.len() - left_op.len()];
    let scope = match complex_identifier().find(rest) {
        Some(scope) => scope.as_str(),
        None => {
            log::debug!("Unsupported expression before '{}{}'", left_op, selector);
            return None;
        }
    };

    Some(Expression {
        matched_text: format!("{}{}{}", scope, left_op, selector),
        scope: scope.to_string(),
        left_op: left_op.to_string(),
        right_op: right_op.to_string(),
        selector: selector.to_string(),
    })
}
