//
// heartbeat.rs
//
// Copyright (C) 2024-2025 Posit Software, PBC. All rights reserved.
// Licensed under the Elastic License 2.0. See LICENSE.txt for license information.
//
//

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use event_listener::Event;
use zeromq::{RepSocket, Socket, SocketRecv, SocketSend};

/// Answers heartbeat pings from the frontend by echoing them back verbatim.
pub struct Heartbeat {
    session_id: String,
    address: String,
    exit_event: Arc<Event>,
    stopped: Arc<AtomicBool>,
}

impl Heartbeat {
    /// Create a new heartbeat responder.
    ///
    /// - `session_id`: The ID of the kernel session, for logging.
    /// - `address`: The address to bind the heartbeat socket to.
    pub fn new(session_id: String, address: String) -> Self {
        Self {
            session_id,
            address,
            exit_event: Arc::new(Event::new()),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind the heartbeat socket and start echoing in the background.
    pub async fn start(&self) -> Result<(), anyhow::Error> {
        let mut socket = RepSocket::new();
        socket.bind(&self.address).await?;
        log::info!(
            "[session {}] Heartbeat socket bound at {}.",
            self.session_id,
            self.address
        );

        let session_id = self.session_id.clone();
        let exit_event = self.exit_event.clone();
        let stopped = self.stopped.clone();
        tokio::spawn(async move {
            loop {
                let exit_listener = exit_event.listen();
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                let ping = tokio::select! {
                    _ = exit_listener => {
                        log::debug!("[session {}] Stopping heartbeat (exit event signaled).", session_id);
                        break;
                    }
                    ping = socket.recv() => ping,
                };
                match ping {
                    Ok(ping) => {
                        log::trace!("[session {}] Echoing heartbeat.", session_id);
                        if let Err(err) = socket.send(ping).await {
                            log::error!("[session {}] Failed to echo heartbeat: {}", session_id, err);
                            break;
                        }
                    }
                    Err(err) => {
                        log::error!("[session {}] Error receiving heartbeat: {}", session_id, err);
                        break;
                    }
                }
            }
            let _ = socket.close().await;
        });
        Ok(())
    }

    /// Stop echoing and close the heartbeat socket.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.exit_event.notify(usize::MAX);
    }
}
