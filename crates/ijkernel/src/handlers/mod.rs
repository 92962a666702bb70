//
// mod.rs
//
// Copyright (C) 2024-2025 Posit Software, PBC. All rights reserved.
// Licensed under the Elastic License 2.0. See LICENSE.txt for license information.
//
//

//! Request handlers, one module per request type. Each handler serves both
//! protocol families; they differ only in message names and content shapes.
//!
//! Handlers that need the engine come in two halves: `begin` queues the
//! engine work and returns a `Continuation` that waits for the outcomes and
//! replies.

pub mod complete;
pub mod execute;
pub mod inspect;
pub mod kernel_info;
pub mod shutdown;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ijshared::jupyter_message::ExecutionState;
use tokio::sync::RwLock;

use crate::builtin_docs::BuiltinDocs;
use crate::error::KernelError;
use crate::execution_session::task::TaskOutcome;
use crate::execution_session::ExecutionSession;
use crate::jupyter_messages::KernelRequest;
use crate::kernel_config::KernelConfig;
use crate::kernel_state::KernelState;
use crate::outbox::Outbox;
use crate::wire_message::WireMessage;

/// What the dispatcher should do once a handler is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerFlow {
    /// Keep serving requests
    Continue,

    /// Close the sockets and exit
    Shutdown,
}

/// The rest of a handler, run once the request's engine work is queued:
/// waiting for outcomes and replying.
pub type Continuation =
    Pin<Box<dyn Future<Output = Result<HandlerFlow, anyhow::Error>> + Send + 'static>>;

/// Everything a handler needs.
#[derive(Clone)]
pub struct HandlerContext {
    pub outbox: Outbox,
    pub state: Arc<RwLock<KernelState>>,
    pub session: ExecutionSession,
    pub docs: Arc<BuiltinDocs>,
    pub config: Arc<KernelConfig>,
}

/// Start handling a request: publish busy, count it, and queue its engine
/// work. Returns as soon as that is done, so requests reach the engine in
/// the order they arrive; the rest of the handler runs in the background.
///
/// The background part logs handler errors and panics, and publishes idle
/// however the handler ends.
pub async fn start(ctx: HandlerContext, request: KernelRequest, message: Arc<WireMessage>) {
    let msg_type = message.msg_type().to_string();
    ctx.state.write().await.request_started(&msg_type);
    if let Err(err) = ctx.outbox.status(&message, ExecutionState::Busy).await {
        log::error!("Failed to publish busy status: {:#}", err);
    }

    let begun: Result<Continuation, anyhow::Error> = match request {
        KernelRequest::KernelInfo => {
            let (ctx, message) = (ctx.clone(), message.clone());
            Ok(Box::pin(async move { kernel_info::handle(&ctx, &message).await }))
        }
        KernelRequest::Execute(request) => execute::begin(&ctx, &message, request).await,
        KernelRequest::Complete(request) => complete::begin(&ctx, &message, request).await,
        KernelRequest::Inspect(request) => inspect::begin(&ctx, &message, request).await,
        KernelRequest::Shutdown(request) => {
            let (ctx, message) = (ctx.clone(), message.clone());
            Ok(Box::pin(async move { shutdown::handle(&ctx, &message, request).await }))
        }
    };

    tokio::spawn(async move {
        let result = match begun {
            Ok(rest) => match tokio::spawn(rest).await {
                Ok(result) => result,
                Err(err) => Err(anyhow::anyhow!("handler failed to complete: {}", err)),
            },
            Err(err) => Err(err),
        };
        let flow = match result {
            Ok(flow) => flow,
            Err(err) => {
                log::error!("Exception in {} handler: {:#}", msg_type, err);
                HandlerFlow::Continue
            }
        };

        ctx.state.write().await.request_finished(&msg_type);
        if let Err(err) = ctx.outbox.status(&message, ExecutionState::Idle).await {
            log::error!("Failed to publish idle status: {:#}", err);
        }

        if flow == HandlerFlow::Shutdown {
            ctx.outbox.shutdown().await;
        }
    });
}

/// Unwrap the result of a task. Returns `Ok(None)` if the task was abandoned
/// (the engine was restarted under it), in which case the handler should
/// finish without replying.
pub(crate) fn settle(
    result: Result<TaskOutcome, KernelError>,
    message: &WireMessage,
) -> Result<Option<TaskOutcome>, anyhow::Error> {
    match result {
        Ok(outcome) => Ok(Some(outcome)),
        Err(KernelError::TaskAbandoned) => {
            log::info!(
                "Request {} ({}) was abandoned by an engine restart",
                message.header.msg_id,
                message.msg_type()
            );
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}
