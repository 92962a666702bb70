//
// task.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use std::sync::Arc;

use ijshared::engine_message::{EngineError, EngineRequest, EngineResponse};
use tokio::sync::oneshot;

use crate::error::KernelError;
use crate::wire_message::WireMessage;

/// The result of a task: the engine's response, or the error it reported.
pub type TaskOutcome = Result<EngineResponse, EngineError>;

/// A unit of work for the execution engine.
#[derive(Debug)]
pub struct Task {
    /// An ID for the task, used in log lines
    pub id: String,

    /// The action and code to send to the engine
    pub request: EngineRequest,

    /// The request that caused this task; engine output produced while the
    /// task runs is attributed to it
    pub parent: Option<Arc<WireMessage>>,

    /// Where to deliver the outcome
    reply_tx: oneshot::Sender<TaskOutcome>,
}

impl Task {
    /// Create a new task, returning it along with the receiver its outcome
    /// will be delivered to. If the task is discarded before it completes,
    /// the receiver sees the channel close.
    pub fn new(
        request: EngineRequest,
        parent: Option<Arc<WireMessage>>,
    ) -> (Self, oneshot::Receiver<TaskOutcome>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let task = Self {
            id: uuid::Uuid::new_v4().to_string(),
            request,
            parent,
            reply_tx,
        };
        (task, reply_rx)
    }

    /// Deliver the engine's response to whoever submitted the task.
    pub fn complete(self, response: EngineResponse) {
        let outcome = match response.error {
            Some(error) => Err(error),
            None => Ok(response),
        };
        self.finish(outcome);
    }

    /// Deliver an outcome to whoever submitted the task.
    pub fn finish(self, outcome: TaskOutcome) {
        if self.reply_tx.send(outcome).is_err() {
            log::trace!("Outcome of task {} was not awaited", self.id);
        }
    }
}

/// A task that has been queued in the session; its outcome arrives once the
/// engine gets to it.
#[derive(Debug)]
pub struct PendingTask {
    outcome_rx: oneshot::Receiver<TaskOutcome>,
}

impl PendingTask {
    pub(crate) fn new(outcome_rx: oneshot::Receiver<TaskOutcome>) -> Self {
        Self { outcome_rx }
    }

    /// Wait for the task's outcome. Fails with `KernelError::TaskAbandoned`
    /// if the session is restarted or killed before the task completes.
    pub async fn outcome(self) -> Result<TaskOutcome, KernelError> {
        self.outcome_rx.await.map_err(|_| KernelError::TaskAbandoned)
    }
}
