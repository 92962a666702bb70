//
// execute.rs
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
use crate::jupyter_messages::ExecuteRequest;
use crate::wire_message::WireMessage;

/// Message types for the input echo, the result and the error broadcasts.
fn broadcast_types(protocol: ProtocolVersion) -> (&'static str, &'static str, &'static str) {
    match protocol {
        ProtocolVersion::V4 => ("pyin", "pyout", "pyerr"),
        ProtocolVersion::V5 => ("execute_input", "execute_result", "error"),
    }
}

/// Whether a result should be broadcast. Empty results never are; a bare
/// `undefined` isn't when the kernel hides undefined results.
pub fn should_display(
    data: &serde_json::Map<String, serde_json::Value>,
    hide_undefined: bool,
) -> bool {
    if data.is_empty() {
        return false;
    }
    !(hide_undefined && data.get("text/plain").and_then(|text| text.as_str()) == Some("undefined"))
}

/// Count the execution, echo the code on iopub and queue it to run in the
/// engine.
pub async fn begin(
    ctx: &HandlerContext,
    message: &Arc<WireMessage>,
    request: ExecuteRequest,
) -> Result<Continuation, anyhow::Error> {
    let (execution_count, hide_undefined) = {
        let mut state = ctx.state.write().await;
        (state.next_execution_count(), state.hide_undefined)
    };
    let (input_type, _, _) = broadcast_types(ctx.outbox.protocol());

    ctx.outbox
        .publish(
            Some(message.as_ref()),
            input_type,
            json!({
                "code": &request.code,
                "execution_count": execution_count,
            }),
        )
        .await?;

    let pending = ctx.session.enqueue(
        EngineRequest::new(EngineAction::Run, request.code),
        Some(message.clone()),
    )?;

    let (ctx, message) = (ctx.clone(), message.clone());
    Ok(Box::pin(async move {
        finish(&ctx, &message, pending, execution_count, hide_undefined).await
    }))
}

/// Broadcast the result or error of an execution and reply to it.
async fn finish(
    ctx: &HandlerContext,
    message: &Arc<WireMessage>,
    pending: PendingTask,
    execution_count: u32,
    hide_undefined: bool,
) -> Result<HandlerFlow, anyhow::Error> {
    let protocol = ctx.outbox.protocol();
    let (_, result_type, error_type) = broadcast_types(protocol);

    let outcome = match settle(pending.outcome().await, message)? {
        Some(outcome) => outcome,
        None => return Ok(HandlerFlow::Continue),
    };

    match outcome {
        Ok(response) => {
            let data = response.mime.unwrap_or_default();
            if should_display(&data, hide_undefined) {
                ctx.outbox
                    .publish(
                        Some(message.as_ref()),
                        result_type,
                        json!({
                            "execution_count": execution_count,
                            "data": data,
                            "metadata": {},
                        }),
                    )
                    .await?;
            }

            let reply = match protocol {
                ProtocolVersion::V4 => json!({
                    "status": "ok",
                    "execution_count": execution_count,
                    "payload": [],
                    "user_variables": {},
                    "user_expressions": {},
                }),
                ProtocolVersion::V5 => json!({
                    "status": "ok",
                    "execution_count": execution_count,
                    "payload": [],
                    "user_expressions": {},
                }),
            };
            ctx.outbox
                .reply(JupyterChannel::Shell, message, "execute_reply", reply)
                .await?;
        }
        Err(error) => {
            log::debug!("Execution {} failed: {}", execution_count, error);
            let content = json!({
                "status": "error",
                "execution_count": execution_count,
                "ename": error.ename,
                "evalue": error.evalue,
                "traceback": error.traceback,
            });
            ctx.outbox
                .publish(Some(message.as_ref()), error_type, content.clone())
                .await?;
            ctx.outbox
                .reply(JupyterChannel::Shell, message, "execute_reply", content)
                .await?;
        }
    }

    Ok(HandlerFlow::Continue)
}
