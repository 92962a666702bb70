//
// inspect.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use std::sync::Arc;

use ijshared::engine_message::{EngineAction, EngineError, EngineRequest, Inspection};
use ijshared::jupyter_message::JupyterChannel;
use ijshared::protocol_version::ProtocolVersion;
use serde_json::json;

use super::{settle, Continuation, HandlerContext, HandlerFlow};
use crate::builtin_docs::BuiltinDoc;
use crate::error::KernelError;
use crate::execution_session::task::PendingTask;
use crate::expression::{self, Expression};
use crate::jupyter_messages::InspectRequest;
use crate::wire_message::WireMessage;

/// What is known about an expression: its runtime description and its
/// builtin documentation, either of which may be missing.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub inspection: Option<Inspection>,
    pub doc: Option<BuiltinDoc>,
}

impl Report {
    /// A plain-text description: `<type>: <value>`, followed by the
    /// documented usage and description when there are any.
    pub fn description(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(inspection) = &self.inspection {
            parts.push(format!("{}: {}", inspection.type_name, inspection.string));
        }
        if let Some(doc) = &self.doc {
            if let Some(usage) = &doc.usage {
                parts.push(usage.clone());
            }
            parts.push(doc.description.clone());
        }
        parts.join("\n\n")
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// The engine work behind an inspection, queued up front.
struct Lookup {
    expression: Expression,

    /// Documentation found under the matched text itself
    doc: Option<BuiltinDoc>,

    /// The inspection of the scope, when its constructor chain is needed to
    /// find documentation, e.g. `Array.prototype.push` for `arr.push`
    scope: Option<PendingTask>,

    /// The inspection of the matched text
    target: PendingTask,
}

impl Lookup {
    fn queue(
        ctx: &HandlerContext,
        message: &Arc<WireMessage>,
        expression: Expression,
    ) -> Result<Self, KernelError> {
        let inspect = |code: &str| {
            ctx.session.enqueue(
                EngineRequest::new(EngineAction::Inspect, code),
                Some(message.clone()),
            )
        };
        let doc = ctx.docs.lookup(&expression.matched_text).cloned();
        let scope = if doc.is_none() && !expression.scope.is_empty() {
            Some(inspect(&expression.scope)?)
        } else {
            None
        };
        let target = inspect(&expression.matched_text)?;
        Ok(Self {
            expression,
            doc,
            scope,
            target,
        })
    }
}

/// Gather the report for an expression. Returns `Ok(None)` if a task was
/// abandoned along the way.
async fn gather(
    ctx: &HandlerContext,
    message: &Arc<WireMessage>,
    lookup: Lookup,
) -> Result<Option<Result<Report, EngineError>>, anyhow::Error> {
    let mut doc = lookup.doc;

    if let Some(scope) = lookup.scope {
        let outcome = match settle(scope.outcome().await, message)? {
            Some(outcome) => outcome,
            None => return Ok(None),
        };
        let scope = match outcome {
            Ok(response) => response.inspection.unwrap_or_default(),
            Err(error) => return Ok(Some(Err(error))),
        };
        doc = scope
            .constructor_list
            .unwrap_or_default()
            .iter()
            .find_map(|name| {
                ctx.docs
                    .lookup(&format!("{}.prototype.{}", name, lookup.expression.selector))
            })
            .cloned();
    }

    let outcome = match settle(lookup.target.outcome().await, message)? {
        Some(outcome) => outcome,
        None => return Ok(None),
    };
    match outcome {
        Ok(response) => Ok(Some(Ok(Report {
            inspection: response.inspection,
            doc,
        }))),
        // Documentation alone is still worth showing
        Err(_) if doc.is_some() => Ok(Some(Ok(Report {
            inspection: None,
            doc,
        }))),
        Err(error) => Ok(Some(Err(error))),
    }
}

fn found_content(protocol: ProtocolVersion, oname: &str, report: &Report) -> serde_json::Value {
    let description = report.description();
    match protocol {
        ProtocolVersion::V4 => {
            let mut content = serde_json::Map::new();
            content.insert("oname".into(), json!(oname));
            content.insert("found".into(), json!(true));
            content.insert("ismagic".into(), json!(false));
            content.insert("isalias".into(), json!(false));
            if let Some(doc) = &report.doc {
                content.insert("namespace".into(), json!("builtin"));
                if let Some(usage) = &doc.usage {
                    content.insert("definition".into(), json!(usage));
                }
            }
            if let Some(inspection) = &report.inspection {
                let constructors = inspection.constructor_list.clone().unwrap_or_default();
                content.insert("string_name".into(), json!(inspection.string));
                content.insert(
                    "type_name".into(),
                    json!(constructors.first().unwrap_or(&inspection.type_name)),
                );
                if let Some(base_name) = constructors.get(1) {
                    content.insert("base_name".into(), json!(base_name));
                }
                if let Some(length) = inspection.length {
                    content.insert("length".into(), json!(length));
                }
            }
            content.insert("docstring".into(), json!(description));
            serde_json::Value::Object(content)
        }
        ProtocolVersion::V5 => json!({
            "status": "ok",
            "found": true,
            "data": {
                "text/plain": description,
                "text/html": format!("<pre>{}</pre>", escape_html(&description)),
            },
            "metadata": {},
        }),
    }
}

fn not_found_content(protocol: ProtocolVersion, oname: &str) -> serde_json::Value {
    match protocol {
        ProtocolVersion::V4 => json!({ "oname": oname, "found": false }),
        ProtocolVersion::V5 => json!({
            "status": "ok",
            "found": false,
            "data": {},
            "metadata": {},
        }),
    }
}

/// Describe the expression at the cursor (`inspect_request` in 5.x,
/// `object_info_request` in 4.x). Queues the inspections it needs.
pub async fn begin(
    ctx: &HandlerContext,
    message: &Arc<WireMessage>,
    request: InspectRequest,
) -> Result<Continuation, anyhow::Error> {
    let lookup = match expression::resolve(&request.code, request.cursor_pos)
        .filter(|expression| !expression.is_empty())
    {
        Some(expression) => Some(Lookup::queue(ctx, message, expression)?),
        None => None,
    };

    let (ctx, message) = (ctx.clone(), message.clone());
    Ok(Box::pin(async move { finish(&ctx, &message, request, lookup).await }))
}

async fn finish(
    ctx: &HandlerContext,
    message: &Arc<WireMessage>,
    request: InspectRequest,
    lookup: Option<Lookup>,
) -> Result<HandlerFlow, anyhow::Error> {
    let protocol = ctx.outbox.protocol();
    let reply_type = match protocol {
        ProtocolVersion::V4 => "object_info_reply",
        ProtocolVersion::V5 => "inspect_reply",
    };

    let content = match lookup {
        None => not_found_content(protocol, &request.code),
        Some(lookup) => {
            let matched_text = lookup.expression.matched_text.clone();
            match gather(ctx, message, lookup).await? {
                None => return Ok(HandlerFlow::Continue),
                Some(Ok(report)) => found_content(protocol, &request.code, &report),
                Some(Err(error)) => {
                    log::debug!("Failed to inspect '{}': {}", matched_text, error);
                    match protocol {
                        ProtocolVersion::V4 => not_found_content(protocol, &request.code),
                        ProtocolVersion::V5 => {
                            let execution_count = ctx.state.read().await.execution_count;
                            json!({
                                "status": "error",
                                "execution_count": execution_count,
                                "ename": error.ename,
                                "evalue": error.evalue,
                                "traceback": error.traceback,
                            })
                        }
                    }
                }
            }
        }
    };

    ctx.outbox
        .reply(JupyterChannel::Shell, message, reply_type, content)
        .await?;
    Ok(HandlerFlow::Continue)
}
