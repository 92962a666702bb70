//
// process.rs
//
// Copyright (C) 2024-2025 Posit Software, PBC. All rights reserved.
// Licensed under the Elastic License 2.0. See LICENSE.txt for license information.
//
//

//! An execution engine running as a child process.
//!
//! The kernel listens on an ephemeral loopback port and passes its address to
//! the engine in the `IJKERNEL_ENGINE_ADDRESS` environment variable. The
//! engine connects back and exchanges newline-delimited JSON: one request
//! (`[action, code]`) per line from the kernel, one response object per line
//! from the engine. The engine's stdout and stderr are forwarded line by line.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use ijshared::engine_message::{EngineError, EngineRequest, EngineResponse, OutputStream};
use sysinfo::{Pid, Signal, System};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::engine::{Engine, EngineEvent, EngineLauncher};

/// The environment variable carrying the address the engine connects to.
pub const ENGINE_ADDRESS_ENV: &str = "IJKERNEL_ENGINE_ADDRESS";

/// Launches engines by running a command.
#[derive(Debug, Clone)]
pub struct ProcessEngineLauncher {
    /// The engine program
    pub program: String,

    /// Arguments to the engine program
    pub args: Vec<String>,

    /// The directory to start the engine in; the kernel's own if `None`
    pub working_dir: Option<PathBuf>,

    /// How long to wait for the engine to connect
    pub connect_timeout: Duration,
}

impl ProcessEngineLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_working_dir(mut self, working_dir: Option<PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    /// Wait for the engine to connect back, or fail if it exits first.
    async fn accept(
        &self,
        listener: &TcpListener,
        child: &mut tokio::process::Child,
    ) -> Result<TcpStream, anyhow::Error> {
        tokio::select! {
            accepted = timeout(self.connect_timeout, listener.accept()) => match accepted {
                Ok(Ok((stream, peer))) => {
                    log::debug!("Execution engine connected from {}", peer);
                    Ok(stream)
                }
                Ok(Err(err)) => Err(anyhow::Error::from(err)),
                Err(_) => Err(anyhow::anyhow!(
                    "Execution engine did not connect within {:?}",
                    self.connect_timeout
                )),
            },
            status = child.wait() => match status {
                Ok(status) => Err(anyhow::anyhow!(
                    "Execution engine exited during startup ({})",
                    status
                )),
                Err(err) => Err(anyhow::Error::from(err)),
            },
        }
    }
}

#[async_trait]
impl EngineLauncher for ProcessEngineLauncher {
    async fn launch(&self) -> Result<Box<dyn Engine>, anyhow::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .env(ENGINE_ADDRESS_ENV, address.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(working_dir) = &self.working_dir {
            command.current_dir(working_dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start execution engine '{}'", self.program))?;
        let pid = child.id();
        log::info!(
            "Started execution engine '{}' (pid {}); waiting for it to connect to {}",
            self.program,
            pid.map(|pid| pid.to_string()).unwrap_or_default(),
            address
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        capture_output_streams(&mut child, events_tx.clone());

        let stream = match self.accept(&listener, &mut child).await {
            Ok(stream) => stream,
            Err(err) => {
                if let Err(kill_err) = child.start_kill() {
                    log::debug!("Failed to kill execution engine: {}", kill_err);
                }
                return Err(err);
            }
        };

        let (reader, writer) = stream.into_split();
        read_responses(reader, events_tx);

        Ok(Box::new(ProcessEngine {
            child,
            pid,
            writer,
            events: events_rx,
        }))
    }
}

/// An engine in a child process, connected over loopback TCP.
pub struct ProcessEngine {
    child: tokio::process::Child,
    pid: Option<u32>,
    writer: OwnedWriteHalf,
    events: mpsc::UnboundedReceiver<EngineEvent>,
}

#[async_trait]
impl Engine for ProcessEngine {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn send(&mut self, request: &EngineRequest) -> Result<(), anyhow::Error> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn next_event(&mut self) -> EngineEvent {
        self.events.recv().await.unwrap_or(EngineEvent::Exited)
    }

    async fn kill(&mut self) -> Result<(), anyhow::Error> {
        // Ask politely first, with SIGTERM
        let signalled = match self.pid {
            Some(pid) => {
                let mut system = System::new();
                let pid = Pid::from_u32(pid);
                system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]));
                match system.process(pid) {
                    Some(process) => process.kill_with(Signal::Term).unwrap_or(false),
                    None => false,
                }
            }
            None => false,
        };
        if !signalled {
            self.child.start_kill()?;
        }

        match timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(status) => {
                log::debug!("Execution engine exited ({})", status?);
            }
            Err(_) => {
                log::warn!("Execution engine did not exit after SIGTERM; killing it");
                self.child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Read response lines from the engine until it disconnects.
fn read_responses<T: AsyncRead + Unpin + Send + 'static>(
    reader: T,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
) {
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let response = match serde_json::from_str::<EngineResponse>(&line) {
                        Ok(response) => response,
                        Err(err) => {
                            log::warn!("Malformed response from execution engine: {}", err);
                            EngineResponse::error(EngineError::new(
                                "MalformedResponse",
                                err.to_string(),
                            ))
                        }
                    };
                    if events_tx.send(EngineEvent::Response(response)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    log::debug!("Execution engine closed its connection");
                    break;
                }
                Err(err) => {
                    log::error!("Failed to read from execution engine: {}", err);
                    break;
                }
            }
        }
        let _ = events_tx.send(EngineEvent::Exited);
    });
}

/// Capture stdout and stderr from the engine process.
fn capture_output_streams(
    child: &mut tokio::process::Child,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
) {
    if let Some(stdout) = child.stdout.take() {
        stream_output(stdout, OutputStream::Stdout, events_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        stream_output(stderr, OutputStream::Stderr, events_tx);
    }
}

/// Forward lines from one of the engine's standard streams, keeping line
/// endings so the frontend can reassemble the output. Bytes that aren't
/// UTF-8 are replaced; the stream is read until the engine closes it, since
/// the engine dies of a broken pipe if nobody drains it.
fn stream_output<T: AsyncRead + Unpin + Send + 'static>(
    stream: T,
    kind: OutputStream,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
) {
    tokio::spawn(async move {
        let mut reader = tokio::io::BufReader::new(Box::pin(stream));
        let mut buffer: Vec<u8> = Vec::new();
        let mut forwarding = true;
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer).await {
                Ok(0) => {
                    log::debug!("End of engine output stream (kind: {})", kind);
                    break;
                }
                Ok(_) => {
                    if !forwarding {
                        continue;
                    }
                    let text = String::from_utf8_lossy(&buffer).into_owned();
                    log::trace!("Engine {}: {}", kind, text.trim_end());
                    if events_tx.send(EngineEvent::Output(kind, text)).is_err() {
                        // Nobody is listening any more; keep draining
                        forwarding = false;
                    }
                }
                Err(e) => {
                    log::error!("Failed to read from engine {}: {}", kind, e);
                    break;
                }
            }
        }
    });
}
