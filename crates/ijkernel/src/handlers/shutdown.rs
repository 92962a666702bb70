//
// shutdown.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use std::sync::Arc;

use ijshared::jupyter_message::JupyterChannel;

use super::{HandlerContext, HandlerFlow};
use crate::jupyter_messages::ShutdownRequest;
use crate::wire_message::WireMessage;

/// Restart the engine, or stop it and tell the dispatcher to exit. The reply
/// echoes the request's content on the control channel.
pub async fn handle(
    ctx: &HandlerContext,
    message: &Arc<WireMessage>,
    request: ShutdownRequest,
) -> Result<HandlerFlow, anyhow::Error> {
    if request.restart {
        let restarted = ctx.session.restart().await;
        match &restarted {
            Ok(pid) => log::info!(
                "[session {}] Execution engine restarted (pid {})",
                ctx.outbox.connection().session_id,
                pid.map_or_else(|| String::from("unknown"), |pid| pid.to_string())
            ),
            Err(err) => log::error!(
                "[session {}] Execution engine failed to restart: {:#}",
                ctx.outbox.connection().session_id,
                err
            ),
        }
        ctx.outbox
            .reply(
                JupyterChannel::Control,
                message,
                "shutdown_reply",
                message.content.clone(),
            )
            .await?;
        restarted?;
        return Ok(HandlerFlow::Continue);
    }

    log::info!(
        "[session {}] Shutting down",
        ctx.outbox.connection().session_id
    );
    ctx.session.kill().await;
    ctx.outbox
        .reply(
            JupyterChannel::Control,
            message,
            "shutdown_reply",
            message.content.clone(),
        )
        .await?;
    Ok(HandlerFlow::Shutdown)
}
