//
// outbox.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

//! Outgoing messages. Handlers and the execution session queue messages
//! here; the dispatcher owns the sockets and is the only one that sends.

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use ijshared::engine_message::OutputStream;
use ijshared::jupyter_message::{ExecutionState, JupyterChannel, StatusContent};
use ijshared::protocol_version::ProtocolVersion;
use serde_json::json;

use crate::kernel_connection::KernelConnection;
use crate::wire_message::WireMessage;

/// An instruction for the dispatcher.
#[derive(Debug)]
pub enum Outbound {
    /// Sign and send a message on a channel
    Message(JupyterChannel, WireMessage),

    /// Close the sockets and stop serving
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct Outbox {
    tx: Sender<Outbound>,
    connection: Arc<KernelConnection>,
}

impl Outbox {
    pub fn new(connection: Arc<KernelConnection>) -> (Self, Receiver<Outbound>) {
        let (tx, rx) = async_channel::unbounded();
        (Self { tx, connection }, rx)
    }

    pub fn connection(&self) -> &KernelConnection {
        &self.connection
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.connection.protocol
    }

    /// Queue a message to be sent on the given channel.
    pub async fn send(
        &self,
        channel: JupyterChannel,
        message: WireMessage,
    ) -> Result<(), anyhow::Error> {
        log::trace!("Queueing '{}' on {}", message.msg_type(), channel);
        self.tx
            .send(Outbound::Message(channel, message))
            .await
            .map_err(|_| anyhow::anyhow!("The dispatcher is no longer running"))
    }

    /// Reply to a request on the given channel.
    pub async fn reply(
        &self,
        channel: JupyterChannel,
        parent: &WireMessage,
        msg_type: &str,
        content: serde_json::Value,
    ) -> Result<(), anyhow::Error> {
        let message = parent.reply(&self.connection, msg_type, content)?;
        self.send(channel, message).await
    }

    /// Broadcast a message on iopub, as caused by `parent` if given.
    pub async fn publish(
        &self,
        parent: Option<&WireMessage>,
        msg_type: &str,
        content: serde_json::Value,
    ) -> Result<(), anyhow::Error> {
        let message = match parent {
            Some(parent) => parent.reply(&self.connection, msg_type, content)?,
            None => WireMessage::unsolicited(&self.connection, msg_type, content),
        };
        self.send(JupyterChannel::IOPub, message).await
    }

    /// Broadcast the kernel's execution state.
    pub async fn status(
        &self,
        parent: &WireMessage,
        execution_state: ExecutionState,
    ) -> Result<(), anyhow::Error> {
        let content = serde_json::to_value(StatusContent { execution_state })?;
        self.publish(Some(parent), "status", content).await
    }

    /// Broadcast output the engine wrote to one of its standard streams.
    pub async fn stream(
        &self,
        parent: Option<&WireMessage>,
        stream: OutputStream,
        text: &str,
    ) -> Result<(), anyhow::Error> {
        let content = match self.protocol() {
            ProtocolVersion::V4 => json!({ "name": stream, "data": text }),
            ProtocolVersion::V5 => json!({ "name": stream, "text": text }),
        };
        self.publish(parent, "stream", content).await
    }

    /// Ask the dispatcher to close its sockets once everything queued before
    /// this has been sent.
    pub async fn shutdown(&self) {
        if self.tx.send(Outbound::Shutdown).await.is_err() {
            log::debug!("Dispatcher already stopped");
        }
    }
}
