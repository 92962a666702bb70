//
// complete.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use std::sync::Arc;

use ijshared::engine_message::{EngineAction, EngineRequest};
use ijshared::jupyter_message::JupyterChannel;
use ijshared::protocol_version::ProtocolVersion;
use serde_json::json;

use super::{settle, Continuation, HandlerContext, HandlerFlow};
use crate::execution_session::task::PendingTask;
use crate::expression::{self, Expression};
use crate::jupyter_messages::CompleteRequest;
use crate::wire_message::WireMessage;

/// The engine expression naming the global scope.
pub const GLOBAL_SCOPE: &str = "global";

/// ECMA-262 keywords, reserved words and literals.
pub const RESERVED_WORDS: &[&str] = &[
    "break", "case", "catch", "continue", "debugger", "default", "delete", "do", "else",
    "finally", "for", "function", "if", "in", "instanceof", "new", "return", "switch", "this",
    "throw", "try", "typeof", "var", "void", "while", "with", "class", "const", "enum",
    "export", "extends", "import", "super", "implements", "interface", "let", "package",
    "private", "protected", "public", "static", "yield", "null", "true", "false",
];

/// The completions for an expression, and the span of the code they replace
/// (in characters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub matches: Vec<String>,
    pub cursor_start: usize,
    pub cursor_end: usize,
}

/// Build the completion for an expression given the property names of its
/// scope.
///
/// Names not starting with the selector are dropped; in the global scope the
/// reserved words are candidates too. The span starts where the matched text
/// starts and covers as much of the code as agrees with the shortest
/// candidate.
pub fn complete(
    code: &str,
    cursor_pos: usize,
    expression: &Expression,
    names: Vec<String>,
) -> Completion {
    let mut candidates: Vec<String> = Vec::new();
    if expression.scope.is_empty() {
        candidates.extend(RESERVED_WORDS.iter().map(|word| word.to_string()));
    }
    candidates.extend(names);
    candidates.retain(|name| name.starts_with(&expression.selector));

    if !expression.scope.is_empty() || !expression.selector.is_empty() {
        candidates = candidates
            .into_iter()
            .map(|name| {
                format!(
                    "{}{}{}{}",
                    expression.scope, expression.left_op, name, expression.right_op
                )
            })
            .collect();
    }

    let cursor_start = cursor_pos.saturating_sub(expression.matched_text.chars().count());
    let cursor_end = match candidates.iter().min_by_key(|candidate| candidate.chars().count()) {
        Some(shortest) => {
            let common = shortest
                .chars()
                .zip(code.chars().skip(cursor_start))
                .take_while(|(a, b)| a == b)
                .count();
            cursor_start + common
        }
        None => {
            return Completion {
                matches: candidates,
                cursor_start: cursor_pos,
                cursor_end: cursor_pos,
            }
        }
    };

    Completion {
        matches: candidates,
        cursor_start,
        cursor_end,
    }
}

/// The engine expression whose properties complete `expression`.
fn listed_scope(expression: &Expression) -> &str {
    if expression.scope.is_empty() {
        GLOBAL_SCOPE
    } else {
        expression.scope.as_str()
    }
}

/// Resolve the expression at the cursor and queue the listing of its scope.
/// Completion failures are answered with an empty list, never an error.
pub async fn begin(
    ctx: &HandlerContext,
    message: &Arc<WireMessage>,
    request: CompleteRequest,
) -> Result<Continuation, anyhow::Error> {
    let listing = match expression::resolve(&request.code, request.cursor_pos) {
        Some(expression) => {
            let pending = ctx.session.enqueue(
                EngineRequest::new(EngineAction::ListProperties, listed_scope(&expression)),
                Some(message.clone()),
            )?;
            Some((expression, pending))
        }
        None => None,
    };

    let (ctx, message) = (ctx.clone(), message.clone());
    Ok(Box::pin(async move { finish(&ctx, &message, request, listing).await }))
}

async fn finish(
    ctx: &HandlerContext,
    message: &Arc<WireMessage>,
    request: CompleteRequest,
    listing: Option<(Expression, PendingTask)>,
) -> Result<HandlerFlow, anyhow::Error> {
    let protocol = ctx.outbox.protocol();
    let (expression, pending) = match listing {
        Some(listing) => listing,
        None => {
            reply_empty(ctx, message, &request, protocol).await?;
            return Ok(HandlerFlow::Continue);
        }
    };

    let scope = listed_scope(&expression);
    let outcome = match settle(pending.outcome().await, message)? {
        Some(outcome) => outcome,
        None => return Ok(HandlerFlow::Continue),
    };

    let names = match outcome {
        Ok(response) => response.names.unwrap_or_default(),
        Err(error) => {
            log::debug!("Failed to list properties of '{}': {}", scope, error);
            reply_empty(ctx, message, &request, protocol).await?;
            return Ok(HandlerFlow::Continue);
        }
    };

    let completion = complete(&request.code, request.cursor_pos, &expression, names);
    let content = match protocol {
        ProtocolVersion::V4 => json!({
            "matches": completion.matches,
            "matched_text": expression.matched_text,
            "status": "ok",
        }),
        ProtocolVersion::V5 => json!({
            "matches": completion.matches,
            "cursor_start": completion.cursor_start,
            "cursor_end": completion.cursor_end,
            "metadata": {},
            "status": "ok",
        }),
    };
    ctx.outbox
        .reply(JupyterChannel::Shell, message, "complete_reply", content)
        .await?;
    Ok(HandlerFlow::Continue)
}

async fn reply_empty(
    ctx: &HandlerContext,
    message: &WireMessage,
    request: &CompleteRequest,
    protocol: ProtocolVersion,
) -> Result<(), anyhow::Error> {
    let content = match protocol {
        ProtocolVersion::V4 => json!({
            "matches": [],
            "matched_text": request.text.clone().unwrap_or_default(),
            "status": "ok",
        }),
        ProtocolVersion::V5 => json!({
            "matches": [],
            "cursor_start": request.cursor_pos,
            "cursor_end": request.cursor_pos,
            "metadata": {},
            "status": "ok",
        }),
    };
    ctx.outbox
        .reply(JupyterChannel::Shell, message, "complete_reply", content)
        .await
}
