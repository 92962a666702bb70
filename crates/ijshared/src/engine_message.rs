//
// engine_message.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

//! The request/response contract between the kernel and its execution engine.
//!
//! Requests are JSON arrays of the form `[action, code]`. The engine answers
//! each request with exactly one JSON object, in request order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The operations an execution engine performs.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineAction {
    /// Evaluate code and return its MIME bundle
    #[serde(rename = "run")]
    Run,

    /// List every property name reachable from the value of an expression
    #[serde(rename = "getAllPropertyNames")]
    ListProperties,

    /// Describe the value of an expression
    #[serde(rename = "inspect")]
    Inspect,
}

impl fmt::Display for EngineAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EngineAction::Run => "run",
            EngineAction::ListProperties => "getAllPropertyNames",
            EngineAction::Inspect => "inspect",
        };
        write!(f, "{}", name)
    }
}

/// A request sent to the engine; serialized as `[action, code]`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(from = "(EngineAction, String)", into = "(EngineAction, String)")]
pub struct EngineRequest {
    pub action: EngineAction,
    pub code: String,
}

impl EngineRequest {
    pub fn new(action: EngineAction, code: impl Into<String>) -> Self {
        Self {
            action,
            code: code.into(),
        }
    }
}

impl From<(EngineAction, String)> for EngineRequest {
    fn from((action, code): (EngineAction, String)) -> Self {
        Self { action, code }
    }
}

impl From<EngineRequest> for (EngineAction, String) {
    fn from(request: EngineRequest) -> Self {
        (request.action, request.code)
    }
}

/// The engine's answer to a single request. Exactly one of the fields is
/// expected to be present; `error` takes precedence over the others.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct EngineResponse {
    /// MIME bundle produced by `run`
    pub mime: Option<serde_json::Map<String, serde_json::Value>>,

    /// Sorted property names produced by `getAllPropertyNames`
    pub names: Option<Vec<String>>,

    /// Description produced by `inspect`
    pub inspection: Option<Inspection>,

    /// Present when the action failed
    pub error: Option<EngineError>,
}

impl EngineResponse {
    pub fn mime(mime: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            mime: Some(mime),
            ..Default::default()
        }
    }

    pub fn names(names: Vec<String>) -> Self {
        Self {
            names: Some(names),
            ..Default::default()
        }
    }

    pub fn inspection(inspection: Inspection) -> Self {
        Self {
            inspection: Some(inspection),
            ..Default::default()
        }
    }

    pub fn error(error: EngineError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

/// A description of a runtime value.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Inspection {
    /// A string representation of the value
    #[serde(default)]
    pub string: String,

    /// The value's type, e.g. `"function"` or `"object"`
    #[serde(rename = "type", default)]
    pub type_name: String,

    /// The names of the value's constructors, most derived first
    #[serde(rename = "constructorList")]
    pub constructor_list: Option<Vec<String>>,

    /// The value's length, for strings, arrays and functions
    pub length: Option<u64>,
}

/// An error raised while the engine performed an action.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EngineError {
    pub ename: String,
    pub evalue: String,
    #[serde(default)]
    pub traceback: Vec<String>,
}

impl EngineError {
    pub fn new(ename: impl Into<String>, evalue: impl Into<String>) -> Self {
        Self {
            ename: ename.into(),
            evalue: evalue.into(),
            traceback: vec![],
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.ename, self.evalue)
    }
}

impl std::error::Error for EngineError {}

/// The standard streams of the engine process.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}
