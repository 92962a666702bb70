//
// engine.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use async_trait::async_trait;
use ijshared::engine_message::{EngineRequest, EngineResponse, OutputStream};

/// Something the execution engine did.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The engine answered the request in flight
    Response(EngineResponse),

    /// The engine wrote a line to one of its standard streams
    Output(OutputStream, String),

    /// The engine went away
    Exited,
}

/// A running execution engine. The engine processes one request at a time
/// and answers each with exactly one response, in order.
#[async_trait]
pub trait Engine: Send {
    /// The process ID of the engine, if it runs in its own process
    fn pid(&self) -> Option<u32>;

    /// Send a request to the engine.
    async fn send(&mut self, request: &EngineRequest) -> Result<(), anyhow::Error>;

    /// Wait for the next event from the engine. Must be cancel safe; once the
    /// engine has exited this keeps returning `EngineEvent::Exited`.
    async fn next_event(&mut self) -> EngineEvent;

    /// Stop the engine.
    async fn kill(&mut self) -> Result<(), anyhow::Error>;
}

/// Starts execution engines; called once when the session starts and again
/// after every restart or crash.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Engine>, anyhow::Error>;
}
