//
// builtin_docs.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

//! Reference documentation for the language's builtin objects, keyed by
//! qualified name (e.g. `Array.prototype.push`).

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

const BUILTIN_DOCS_JSON: &str = include_str!("../data/builtin_docs.json");

/// Documentation for a single builtin.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BuiltinDoc {
    /// A prose description
    pub description: String,

    /// Where the full documentation lives
    pub url: String,

    /// Call syntax and parameters, if documented
    pub usage: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BuiltinDocs {
    entries: HashMap<String, BuiltinDoc>,
}

fn error_subclass() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z]+Error\.").expect("error pattern is valid"))
}

fn typed_array() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z]+Array\.").expect("array pattern is valid"))
}

impl BuiltinDocs {
    /// Load the documentation bundled with the kernel.
    pub fn bundled() -> Result<Self, serde_json::Error> {
        Self::from_json(BUILTIN_DOCS_JSON)
    }

    /// Load documentation from a JSON object of `name => {description, url, usage?}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            entries: serde_json::from_str(json)?,
        })
    }

    /// Look up a builtin by name. Names of `Error` and typed array subclasses
    /// (e.g. `TypeError.prototype.name`, `Int8Array.from`) fall back to the
    /// documentation of `Error` and `TypedArray` respectively.
    pub fn lookup(&self, name: &str) -> Option<&BuiltinDoc> {
        if let Some(doc) = self.entries.get(name) {
            return Some(doc);
        }

        for (pattern, replacement) in [(error_subclass(), "Error."), (typed_array(), "TypedArray.")] {
            if pattern.is_match(name) {
                let normalized = pattern.replace(name, replacement);
                if let Some(doc) = self.entries.get(normalized.as_ref()) {
                    return Some(doc);
                }
            }
        }

        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
