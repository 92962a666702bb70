//
// kernel.rs
//
// Copyright (C) 2024-2025 Posit Software, PBC. All rights reserved.
// Licensed under the Elastic License 2.0. See LICENSE.txt for license information.
//
//

//! The dispatcher: owns the Jupyter sockets, routes incoming requests to
//! their handlers and sends everything the handlers queue in the outbox.

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use ijshared::jupyter_message::JupyterChannel;
use tokio::select;
use tokio::sync::RwLock;
use zeromq::{PubSocket, RouterSocket, Socket, SocketRecv, SocketSend, ZmqError, ZmqMessage};

use crate::builtin_docs::BuiltinDocs;
use crate::connection_file::ConnectionFile;
use crate::execution_session::engine::EngineLauncher;
use crate::execution_session::startup::discover_scripts;
use crate::execution_session::ExecutionSession;
use crate::handlers::{self, HandlerContext};
use crate::heartbeat::Heartbeat;
use crate::jupyter_messages::KernelRequest;
use crate::kernel_config::{expand_path, KernelConfig};
use crate::kernel_connection::KernelConnection;
use crate::kernel_state::KernelState;
use crate::outbox::{Outbound, Outbox};
use crate::wire_message::WireMessage;

/// A request accepted by the dispatcher, waiting for its channel's worker.
type Work = (KernelRequest, Arc<WireMessage>);

enum DispatchEvent {
    Request(JupyterChannel, Result<ZmqMessage, ZmqError>),
    Outbound(Option<Outbound>),
}

pub struct Kernel {
    session_id: String,
    connection: Arc<KernelConnection>,
    ctx: HandlerContext,
    outbound_rx: Receiver<Outbound>,
    shell: RouterSocket,
    control: RouterSocket,
    iopub: PubSocket,
    heartbeat: Heartbeat,
}

impl Kernel {
    /// Bind the kernel's sockets and start its execution session. Requests
    /// are not read until `serve` is called.
    ///
    /// - `connection_file`: Names the sockets to bind and the signing key
    /// - `config`: The kernel's options
    /// - `launcher`: Starts (and restarts) the execution engine
    pub async fn new(
        connection_file: &ConnectionFile,
        config: KernelConfig,
        launcher: Arc<dyn EngineLauncher>,
    ) -> Result<Self, anyhow::Error> {
        let connection = Arc::new(KernelConnection::new(
            connection_file,
            &config.protocol_version,
        )?);
        let session_id = connection.session_id.clone();
        let (outbox, outbound_rx) = Outbox::new(connection.clone());
        let docs = BuiltinDocs::bundled()?;

        let mut shell = RouterSocket::new();
        let shell_address = connection_file.endpoint(connection_file.shell_port);
        shell.bind(&shell_address).await?;
        log::info!(
            "[session {}] Shell socket bound at {}",
            session_id,
            shell_address
        );

        let mut control = RouterSocket::new();
        let control_address = connection_file.endpoint(connection_file.control_port);
        control.bind(&control_address).await?;
        log::info!(
            "[session {}] Control socket bound at {}",
            session_id,
            control_address
        );

        let mut iopub = PubSocket::new();
        let iopub_address = connection_file.endpoint(connection_file.iopub_port);
        iopub.bind(&iopub_address).await?;
        log::info!(
            "[session {}] IOPub socket bound at {}",
            session_id,
            iopub_address
        );

        let startup_scripts = match &config.startup_script {
            Some(path) => {
                let path = expand_path(path);
                match discover_scripts(&path) {
                    Ok(scripts) => scripts,
                    Err(err) => {
                        log::warn!(
                            "[session {}] Ignoring startup script {}: {}",
                            session_id,
                            path.display(),
                            err
                        );
                        vec![]
                    }
                }
            }
            None => vec![],
        };
        let session = ExecutionSession::start(launcher, startup_scripts, outbox.clone()).await?;

        let heartbeat = Heartbeat::new(
            session_id.clone(),
            connection_file.endpoint(connection_file.hb_port),
        );
        heartbeat.start().await?;

        let state = KernelState::new(session_id.clone(), config.hide_undefined);
        let ctx = HandlerContext {
            outbox,
            state: Arc::new(RwLock::new(state)),
            session,
            docs: Arc::new(docs),
            config: Arc::new(config),
        };

        Ok(Self {
            session_id,
            connection,
            ctx,
            outbound_rx,
            shell,
            control,
            iopub,
            heartbeat,
        })
    }

    /// The ID of this kernel's session, used in its log lines and in the
    /// headers of the messages it sends.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// A handle to the kernel's execution session.
    pub fn session(&self) -> ExecutionSession {
        self.ctx.session.clone()
    }

    /// Serve requests until a shutdown request is handled.
    ///
    /// Requests on each channel are started one at a time, in the order they
    /// arrive, and then finish in the background, so a kernel_info request is
    /// answered while an execution is still running. The shell and control
    /// channels are served independently.
    pub async fn serve(mut self) -> Result<(), anyhow::Error> {
        let (shell_tx, shell_rx) = async_channel::unbounded::<Work>();
        let (control_tx, control_rx) = async_channel::unbounded::<Work>();
        tokio::spawn(serve_requests(
            JupyterChannel::Shell,
            self.ctx.clone(),
            shell_rx,
        ));
        tokio::spawn(serve_requests(
            JupyterChannel::Control,
            self.ctx.clone(),
            control_rx,
        ));
        log::info!("[session {}] Kernel ready", self.session_id);

        loop {
            let event = select! {
                message = self.shell.recv() => DispatchEvent::Request(JupyterChannel::Shell, message),
                message = self.control.recv() => DispatchEvent::Request(JupyterChannel::Control, message),
                outbound = self.outbound_rx.recv() => DispatchEvent::Outbound(outbound.ok()),
            };

            match event {
                DispatchEvent::Request(channel, Ok(message)) => {
                    let work = match self.accept(channel, message) {
                        Some(work) => work,
                        None => continue,
                    };
                    let queue: &Sender<Work> = match channel {
                        JupyterChannel::Control => &control_tx,
                        _ => &shell_tx,
                    };
                    if queue.send(work).await.is_err() {
                        log::error!(
                            "[session {}] The {} worker has stopped; dropping request",
                            self.session_id,
                            channel
                        );
                    }
                }
                DispatchEvent::Request(channel, Err(err)) => {
                    log::warn!(
                        "[session {}] Failed to receive message on {}: {}",
                        self.session_id,
                        channel,
                        err
                    );
                }
                DispatchEvent::Outbound(Some(Outbound::Message(channel, message))) => {
                    self.send(channel, message).await;
                }
                DispatchEvent::Outbound(Some(Outbound::Shutdown)) | DispatchEvent::Outbound(None) => {
                    log::info!("[session {}] Shutdown requested", self.session_id);
                    break;
                }
            }
        }

        shell_tx.close();
        control_tx.close();
        self.close().await;
        Ok(())
    }

    /// Verify and decode an incoming message. Messages that can't be
    /// processed are logged and dropped without a reply.
    fn accept(&self, channel: JupyterChannel, message: ZmqMessage) -> Option<Work> {
        let message = match WireMessage::from_zmq(message, &self.connection.signer) {
            Ok(message) => message,
            Err(err) => {
                log::warn!(
                    "[session {}] Dropping message received on {}: {}",
                    self.session_id,
                    channel,
                    err
                );
                return None;
            }
        };

        let request = match KernelRequest::parse(&message, self.connection.protocol) {
            Ok(Some(request)) => request,
            Ok(None) => {
                log::warn!(
                    "[session {}] Ignoring unsupported message type '{}' on {}",
                    self.session_id,
                    message.msg_type(),
                    channel
                );
                return None;
            }
            Err(err) => {
                log::warn!(
                    "[session {}] Dropping malformed '{}' request on {}: {}",
                    self.session_id,
                    message.msg_type(),
                    channel,
                    err
                );
                return None;
            }
        };

        if channel == JupyterChannel::Control && !request.allowed_on_control() {
            log::warn!(
                "[session {}] Ignoring '{}' request on control",
                self.session_id,
                message.msg_type()
            );
            return None;
        }

        log::debug!(
            "[session {}] Received '{}' ({}) on {}",
            self.session_id,
            message.msg_type(),
            message.header.msg_id,
            channel
        );
        Some((request, Arc::new(message)))
    }

    /// Sign and send a message on one of the kernel's sockets.
    async fn send(&mut self, channel: JupyterChannel, message: WireMessage) {
        let zmq_message = match message.to_zmq(&self.connection.signer) {
            Ok(zmq_message) => zmq_message,
            Err(err) => {
                log::error!(
                    "[session {}] Failed to serialize '{}': {}",
                    self.session_id,
                    message.msg_type(),
                    err
                );
                return;
            }
        };

        let result = match channel {
            JupyterChannel::Shell => self.shell.send(zmq_message).await,
            JupyterChannel::Control => self.control.send(zmq_message).await,
            JupyterChannel::IOPub => self.iopub.send(zmq_message).await,
            other => {
                log::warn!(
                    "[session {}] Not sending '{}': the kernel doesn't serve {}",
                    self.session_id,
                    message.msg_type(),
                    other
                );
                return;
            }
        };
        if let Err(err) = result {
            log::error!(
                "[session {}] Failed to send '{}' on {}: {}",
                self.session_id,
                message.msg_type(),
                channel,
                err
            );
        }
    }

    async fn close(self) {
        self.heartbeat.stop();
        for (channel, errors) in [
            (JupyterChannel::Shell, self.shell.close().await),
            (JupyterChannel::Control, self.control.close().await),
            (JupyterChannel::IOPub, self.iopub.close().await),
        ] {
            for err in errors {
                log::debug!(
                    "[session {}] Error closing {} socket: {}",
                    self.session_id,
                    channel,
                    err
                );
            }
        }
        log::info!("[session {}] Sockets closed", self.session_id);
    }
}

/// Start the requests accepted on one channel, one at a time.
async fn serve_requests(channel: JupyterChannel, ctx: HandlerContext, requests: Receiver<Work>) {
    while let Ok((request, message)) = requests.recv().await {
        let msg_type = message.msg_type().to_string();
        // Started in its own task so that a panic is contained
        if let Err(err) = tokio::spawn(handlers::start(ctx.clone(), request, message)).await {
            log::error!(
                "Handler for '{}' on {} failed to start: {}",
                msg_type,
                channel,
                err
            );
        }
    }
}
