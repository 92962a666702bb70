//
// test_client.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//

//! A minimal Jupyter frontend talking to a kernel over ZeroMQ.

#![allow(dead_code)]

use std::time::Duration;

use ijkernel::connection_file::ConnectionFile;
use ijkernel::kernel_connection::MessageSigner;
use ijkernel::wire_message::WireMessage;
use ijkernel::wire_message_header::WireMessageHeader;
use serde_json::json;
use tokio::time::timeout;
use zeromq::{DealerSocket, ReqSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

/// How long to wait for any single message before failing a test
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestClient {
    pub shell: DealerSocket,
    pub control: DealerSocket,
    pub iopub: SubSocket,
    pub heartbeat: ReqSocket,
    pub signer: MessageSigner,
    pub session: String,
    pub version: Option<String>,
}

impl TestClient {
    /// Connect to every socket named in the connection file and wait until
    /// the iopub subscription is live.
    pub async fn connect(connection_file: &ConnectionFile, version: Option<&str>) -> Self {
        let mut shell = DealerSocket::new();
        shell
            .connect(&connection_file.endpoint(connection_file.shell_port))
            .await
            .expect("Failed to connect to shell");
        let mut control = DealerSocket::new();
        control
            .connect(&connection_file.endpoint(connection_file.control_port))
            .await
            .expect("Failed to connect to control");
        let mut iopub = SubSocket::new();
        iopub
            .connect(&connection_file.endpoint(connection_file.iopub_port))
            .await
            .expect("Failed to connect to iopub");
        iopub.subscribe("").await.expect("Failed to subscribe");
        let mut heartbeat = ReqSocket::new();
        heartbeat
            .connect(&connection_file.endpoint(connection_file.hb_port))
            .await
            .expect("Failed to connect to heartbeat");

        let signer = MessageSigner::new(&connection_file.signature_scheme, &connection_file.key)
            .expect("Failed to create signer");
        let mut client = Self {
            shell,
            control,
            iopub,
            heartbeat,
            signer,
            session: uuid::Uuid::new_v4().to_string(),
            version: version.map(String::from),
        };
        client.sync().await;
        client
    }

    /// A subscriber misses everything published before its subscription
    /// reaches the publisher; ping the kernel until iopub traffic shows up,
    /// then drain whatever the pings produced.
    async fn sync(&mut self) {
        let mut pings = 0;
        loop {
            pings += 1;
            self.send_shell("kernel_info_request", json!({})).await;
            if timeout(Duration::from_millis(250), self.iopub.recv())
                .await
                .is_ok()
            {
                break;
            }
            assert!(pings < 40, "iopub never became live");
        }

        // One more request, fully observed, leaves both channels clean
        let request = self.send_shell("kernel_info_request", json!({})).await;
        self.iopub_until_idle(&request).await;
        loop {
            let reply = self.recv_shell().await;
            if parent_id(&reply) == request.header.msg_id {
                break;
            }
        }
    }

    pub fn message(&self, msg_type: &str, content: serde_json::Value) -> WireMessage {
        let header = WireMessageHeader::new(
            msg_type,
            "test",
            self.session.clone(),
            self.version.clone(),
        );
        WireMessage::new(header, content)
    }

    pub async fn send_shell(&mut self, msg_type: &str, content: serde_json::Value) -> WireMessage {
        let message = self.message(msg_type, content);
        let frames = message.to_zmq(&self.signer).expect("Failed to sign");
        self.shell.send(frames).await.expect("Failed to send on shell");
        message
    }

    pub async fn send_control(&mut self, msg_type: &str, content: serde_json::Value) -> WireMessage {
        let message = self.message(msg_type, content);
        let frames = message.to_zmq(&self.signer).expect("Failed to sign");
        self.control
            .send(frames)
            .await
            .expect("Failed to send on control");
        message
    }

    /// Send raw frames on the shell socket
    pub async fn send_raw(&mut self, frames: Vec<bytes::Bytes>) {
        let message = ZmqMessage::try_from(frames).expect("Empty message");
        self.shell.send(message).await.expect("Failed to send on shell");
    }

    pub async fn recv_shell(&mut self) -> WireMessage {
        let message = timeout(RECV_TIMEOUT, self.shell.recv())
            .await
            .expect("Timed out waiting for a shell reply")
            .expect("Failed to receive on shell");
        WireMessage::from_zmq(message, &self.signer).expect("Invalid shell reply")
    }

    pub async fn try_recv_shell(&mut self, wait: Duration) -> Option<WireMessage> {
        match timeout(wait, self.shell.recv()).await {
            Ok(message) => Some(
                WireMessage::from_zmq(message.expect("Failed to receive"), &self.signer)
                    .expect("Invalid shell reply"),
            ),
            Err(_) => None,
        }
    }

    pub async fn recv_control(&mut self) -> WireMessage {
        let message = timeout(RECV_TIMEOUT, self.control.recv())
            .await
            .expect("Timed out waiting for a control reply")
            .expect("Failed to receive on control");
        WireMessage::from_zmq(message, &self.signer).expect("Invalid control reply")
    }

    pub async fn recv_iopub(&mut self) -> WireMessage {
        let message = timeout(RECV_TIMEOUT, self.iopub.recv())
            .await
            .expect("Timed out waiting for an iopub message")
            .expect("Failed to receive on iopub");
        WireMessage::from_zmq(message, &self.signer).expect("Invalid iopub message")
    }

    pub async fn try_recv_iopub(&mut self, wait: Duration) -> Option<WireMessage> {
        match timeout(wait, self.iopub.recv()).await {
            Ok(message) => Some(
                WireMessage::from_zmq(message.expect("Failed to receive"), &self.signer)
                    .expect("Invalid iopub message"),
            ),
            Err(_) => None,
        }
    }

    /// Collect the iopub messages caused by a request, through its idle
    /// status. Messages caused by other requests are kept too.
    pub async fn iopub_until_idle(&mut self, request: &WireMessage) -> Vec<WireMessage> {
        let mut messages = Vec::new();
        loop {
            let message = self.recv_iopub().await;
            let done = parent_id(&message) == request.header.msg_id
                && message.msg_type() == "status"
                && message.content["execution_state"] == "idle";
            messages.push(message);
            if done {
                return messages;
            }
        }
    }

    /// Send a heartbeat ping and wait for the echo
    pub async fn ping(&mut self, payload: &str) -> Vec<u8> {
        self.heartbeat
            .send(ZmqMessage::from(payload.to_string()))
            .await
            .expect("Failed to send heartbeat");
        let echo = timeout(RECV_TIMEOUT, self.heartbeat.recv())
            .await
            .expect("Timed out waiting for heartbeat")
            .expect("Failed to receive heartbeat");
        echo.into_vec()
            .into_iter()
            .flat_map(|frame| frame.to_vec())
            .collect()
    }
}

/// The msg_id of a message's parent, or "" if it has none
pub fn parent_id(message: &WireMessage) -> String {
    message.parent_header["msg_id"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// The message types of the messages caused by a request, in order
pub fn types_for(messages: &[WireMessage], request: &WireMessage) -> Vec<String> {
    messages
        .iter()
        .filter(|message| parent_id(message) == request.header.msg_id)
        .map(|message| match message.msg_type() {
            "status" => format!(
                "status:{}",
                message.content["execution_state"].as_str().unwrap_or_default()
            ),
            other => other.to_string(),
        })
        .collect()
}
