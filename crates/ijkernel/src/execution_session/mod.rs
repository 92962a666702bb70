//
// mod.rs
//
// Copyright (C) 2024-2025 Posit Software, PBC. All rights reserved.
// Licensed under the Elastic License 2.0. See LICENSE.txt for license information.
//
//

//! The execution session: owns the execution engine and feeds it one task
//! at a time.
//!
//! The session runs as a single task (an actor) that owns the engine and the
//! execution queue; everyone else talks to it through an `ExecutionSession`
//! handle. Because only the actor touches the queue, at most one task is
//! ever in flight, and a response from the engine always belongs to the
//! active task.

pub mod engine;
pub mod process;
pub mod startup;
pub mod task;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ijshared::engine_message::{EngineAction, EngineError, EngineRequest};
use tokio::sync::{mpsc, oneshot};

use crate::error::KernelError;
use crate::execution_queue::ExecutionQueue;
use crate::outbox::Outbox;
use crate::wire_message::WireMessage;

use engine::{Engine, EngineEvent, EngineLauncher};
use task::{PendingTask, Task, TaskOutcome};

/// How many times in a row the engine may exit on its own and be relaunched.
/// A response from the engine resets the count.
pub const MAX_RELAUNCHES: u32 = 3;

/// The wait before the first relaunch after a crash; doubled for each
/// further consecutive crash.
const RELAUNCH_BACKOFF: Duration = Duration::from_millis(100);

enum SessionCommand {
    /// Run a task once the engine is free
    Submit(Task),

    /// Kill the engine, start a new one and run the startup scripts again;
    /// replies with the new engine's process ID
    Restart(oneshot::Sender<Result<Option<u32>, anyhow::Error>>),

    /// Kill the engine for good
    Kill(oneshot::Sender<()>),

    /// Report the engine's process ID
    Pid(oneshot::Sender<Option<u32>>),
}

enum SessionEvent {
    Command(Option<SessionCommand>),
    Engine(EngineEvent),
}

/// A handle to a running execution session. Cheap to clone; the session
/// stops (and kills its engine) when the last handle is dropped.
#[derive(Clone)]
pub struct ExecutionSession {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl ExecutionSession {
    /// Launch an engine and start the session around it. The startup scripts
    /// are queued before anything else is run.
    pub async fn start(
        launcher: Arc<dyn EngineLauncher>,
        startup_scripts: Vec<PathBuf>,
        outbox: Outbox,
    ) -> Result<Self, KernelError> {
        let engine = launcher
            .launch()
            .await
            .map_err(KernelError::EngineLaunchFailed)?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let actor = SessionActor {
            session_id: outbox.connection().session_id.clone(),
            launcher,
            engine: Some(engine),
            queue: ExecutionQueue::new(),
            startup_scripts,
            outbox,
            output_parent: None,
            crashes: 0,
        };
        tokio::spawn(actor.run(commands_rx));
        Ok(Self {
            commands: commands_tx,
        })
    }

    fn command(&self, command: SessionCommand) -> Result<(), KernelError> {
        self.commands
            .send(command)
            .map_err(|_| KernelError::EngineUnavailable(String::from("the session has stopped")))
    }

    /// Queue a request for the engine without waiting for it. Tasks run in
    /// the order they are queued.
    pub fn enqueue(
        &self,
        request: EngineRequest,
        parent: Option<Arc<WireMessage>>,
    ) -> Result<PendingTask, KernelError> {
        let (task, outcome_rx) = Task::new(request, parent);
        self.command(SessionCommand::Submit(task))?;
        Ok(PendingTask::new(outcome_rx))
    }

    /// Submit a request to the engine and wait for its outcome. Fails with
    /// `KernelError::TaskAbandoned` if the session is restarted or killed
    /// before the request completes.
    pub async fn submit(
        &self,
        request: EngineRequest,
        parent: Option<Arc<WireMessage>>,
    ) -> Result<TaskOutcome, KernelError> {
        self.enqueue(request, parent)?.outcome().await
    }

    /// Run code on behalf of a request.
    pub async fn run(
        &self,
        code: &str,
        parent: Arc<WireMessage>,
    ) -> Result<TaskOutcome, KernelError> {
        self.submit(EngineRequest::new(EngineAction::Run, code), Some(parent))
            .await
    }

    /// List the property names of the value of `code`.
    pub async fn list_properties(
        &self,
        code: &str,
        parent: Arc<WireMessage>,
    ) -> Result<TaskOutcome, KernelError> {
        self.submit(
            EngineRequest::new(EngineAction::ListProperties, code),
            Some(parent),
        )
        .await
    }

    /// Describe the value of `code`.
    pub async fn inspect(
        &self,
        code: &str,
        parent: Arc<WireMessage>,
    ) -> Result<TaskOutcome, KernelError> {
        self.submit(EngineRequest::new(EngineAction::Inspect, code), Some(parent))
            .await
    }

    /// Replace the engine with a fresh one, abandoning all active and pending
    /// tasks. Returns the new engine's process ID.
    pub async fn restart(&self) -> Result<Option<u32>, anyhow::Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(SessionCommand::Restart(reply_tx))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("The session stopped while restarting"))?
    }

    /// Kill the engine, abandoning all active and pending tasks.
    pub async fn kill(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command(SessionCommand::Kill(reply_tx)).is_ok() {
            let _ = reply_rx.await;
        }
    }

    /// The process ID of the current engine, if it's running.
    pub async fn pid(&self) -> Option<u32> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(SessionCommand::Pid(reply_tx)).ok()?;
        reply_rx.await.ok().flatten()
    }
}

struct SessionActor {
    session_id: String,
    launcher: Arc<dyn EngineLauncher>,
    engine: Option<Box<dyn Engine>>,
    queue: ExecutionQueue,
    startup_scripts: Vec<PathBuf>,
    outbox: Outbox,

    /// The request behind the most recently started task; engine output is
    /// attributed to it
    output_parent: Option<Arc<WireMessage>>,

    /// Consecutive unexpected exits of the engine
    crashes: u32,
}

async fn next_engine_event(engine: &mut Option<Box<dyn Engine>>) -> EngineEvent {
    match engine {
        Some(engine) => engine.next_event().await,
        None => std::future::pending().await,
    }
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        if self.enqueue_startup_scripts() {
            self.start_active().await;
        }

        loop {
            let event = tokio::select! {
                command = commands.recv() => SessionEvent::Command(command),
                event = next_engine_event(&mut self.engine) => SessionEvent::Engine(event),
            };
            match event {
                SessionEvent::Command(Some(command)) => self.handle_command(command).await,
                SessionEvent::Command(None) => {
                    log::debug!(
                        "[session {}] All session handles dropped; stopping the engine",
                        self.session_id
                    );
                    self.stop_engine().await;
                    break;
                }
                SessionEvent::Engine(event) => self.handle_engine_event(event).await,
            }
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Submit(task) => {
                if self.engine.is_none() {
                    task.finish(Err(EngineError::new(
                        "EngineUnavailable",
                        "The execution engine is not running",
                    )));
                } else if self.queue.process_request(task) {
                    self.start_active().await;
                }
            }
            SessionCommand::Restart(reply_tx) => {
                let result = self.restart().await;
                if reply_tx.send(result).is_err() {
                    log::debug!("[session {}] Restart was not awaited", self.session_id);
                }
            }
            SessionCommand::Kill(reply_tx) => {
                self.stop_engine().await;
                let _ = reply_tx.send(());
            }
            SessionCommand::Pid(reply_tx) => {
                let _ = reply_tx.send(self.engine.as_ref().and_then(|engine| engine.pid()));
            }
        }
    }

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Response(response) => {
                self.crashes = 0;
                match self.queue.take_active() {
                    Some(task) => {
                        log::trace!("[session {}] Task {} completed", self.session_id, task.id);
                        task.complete(response);
                    }
                    None => {
                        log::warn!(
                            "[session {}] Discarding engine response with no task in flight",
                            self.session_id
                        );
                    }
                }
                if self.queue.next_request().is_some() {
                    self.start_active().await;
                }
            }
            EngineEvent::Output(stream, text) => {
                if let Err(err) = self
                    .outbox
                    .stream(self.output_parent.as_deref(), stream, &text)
                    .await
                {
                    log::error!(
                        "[session {}] Failed to forward engine {}: {}",
                        self.session_id,
                        stream,
                        err
                    );
                }
            }
            EngineEvent::Exited => self.recover().await,
        }
    }

    /// Send the active task to the engine. If that fails, fail the task and
    /// move on to the next one.
    async fn start_active(&mut self) {
        loop {
            let (request, parent) = match self.queue.active.as_ref() {
                Some(task) => (task.request.clone(), task.parent.clone()),
                None => return,
            };
            self.output_parent = parent;

            let sent = match self.engine.as_mut() {
                Some(engine) => engine.send(&request).await,
                None => Err(anyhow::anyhow!("The execution engine is not running")),
            };
            let err = match sent {
                Ok(()) => return,
                Err(err) => err,
            };

            log::error!(
                "[session {}] Failed to send {} request to the engine: {}",
                self.session_id,
                request.action,
                err
            );
            if let Some(task) = self.queue.take_active() {
                task.finish(Err(EngineError::new("EngineUnavailable", err.to_string())));
            }
            if self.queue.next_request().is_none() {
                return;
            }
        }
    }

    /// Queue the startup scripts. Their outcomes are only logged. Returns
    /// true if one of them became the active task.
    fn enqueue_startup_scripts(&mut self) -> bool {
        let mut started = false;
        for (path, code) in startup::read_scripts(&self.startup_scripts) {
            let (task, outcome_rx) = Task::new(EngineRequest::new(EngineAction::Run, code), None);
            let session_id = self.session_id.clone();
            tokio::spawn(async move {
                match outcome_rx.await {
                    Ok(Ok(_)) => log::info!(
                        "[session {}] Ran startup script {}",
                        session_id,
                        path.display()
                    ),
                    Ok(Err(err)) => log::warn!(
                        "[session {}] Startup script {} failed: {}",
                        session_id,
                        path.display(),
                        err
                    ),
                    Err(_) => log::debug!(
                        "[session {}] Startup script {} was abandoned",
                        session_id,
                        path.display()
                    ),
                }
            });
            started |= self.queue.process_request(task);
        }
        started
    }

    /// Kill the engine and abandon every task.
    async fn stop_engine(&mut self) {
        let discarded = self.queue.clear();
        if discarded > 0 {
            log::info!(
                "[session {}] Abandoned {} tasks",
                self.session_id,
                discarded
            );
        }
        self.output_parent = None;
        if let Some(mut engine) = self.engine.take() {
            if let Err(err) = engine.kill().await {
                log::warn!(
                    "[session {}] Failed to stop the execution engine: {}",
                    self.session_id,
                    err
                );
            }
        }
    }

    async fn launch(&mut self) -> Result<Option<u32>, anyhow::Error> {
        let engine = self.launcher.launch().await?;
        let pid = engine.pid();
        self.engine = Some(engine);
        Ok(pid)
    }

    async fn restart(&mut self) -> Result<Option<u32>, anyhow::Error> {
        log::info!("[session {}] Restarting the execution engine", self.session_id);
        self.stop_engine().await;
        self.crashes = 0;
        let pid = self.launch().await?;
        if self.enqueue_startup_scripts() {
            self.start_active().await;
        }
        Ok(pid)
    }

    /// The engine went away on its own: fail the task it was running, start
    /// a new engine, and carry on with the pending tasks after the startup
    /// scripts. An engine that keeps exiting without answering anything is
    /// given up on, and the pending tasks fail.
    async fn recover(&mut self) {
        log::error!(
            "[session {}] The execution engine exited unexpectedly",
            self.session_id
        );
        self.engine = None;
        self.output_parent = None;
        if let Some(task) = self.queue.take_active() {
            task.finish(Err(EngineError::new(
                "EngineExited",
                "The execution engine exited unexpectedly",
            )));
        }

        self.crashes += 1;
        if self.crashes > MAX_RELAUNCHES {
            log::error!(
                "[session {}] The execution engine exited {} times in a row; not relaunching it",
                self.session_id,
                self.crashes
            );
            self.fail_pending("The execution engine keeps exiting; restart the kernel");
            return;
        }

        let backoff = RELAUNCH_BACKOFF * 2u32.pow(self.crashes - 1);
        log::info!(
            "[session {}] Relaunching the execution engine in {}ms",
            self.session_id,
            backoff.as_millis()
        );
        tokio::time::sleep(backoff).await;

        if let Err(err) = self.launch().await {
            log::error!(
                "[session {}] Failed to relaunch the execution engine: {:#}",
                self.session_id,
                err
            );
            self.fail_pending("The execution engine could not be restarted");
            return;
        }

        let pending = std::mem::take(&mut self.queue.pending);
        self.enqueue_startup_scripts();
        for task in pending {
            self.queue.process_request(task);
        }
        self.start_active().await;
    }

    fn fail_pending(&mut self, reason: &str) {
        let pending = std::mem::take(&mut self.queue.pending);
        for task in pending {
            task.finish(Err(EngineError::new("EngineUnavailable", reason)));
        }
    }
}
