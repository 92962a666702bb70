//
// jupyter_message.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use std::fmt;

use serde::{Deserialize, Serialize};

/// The set of all Jupyter sockets ("channels") over which messages are sent and
/// received.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JupyterChannel {
    /// The shell channel
    Shell,

    /// The control channel
    Control,

    /// The stdin channel
    Stdin,

    /// The iopub channel
    IOPub,

    /// The heartbeat channel
    Heartbeat,
}

impl fmt::Display for JupyterChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            JupyterChannel::Shell => "shell",
            JupyterChannel::Control => "control",
            JupyterChannel::Stdin => "stdin",
            JupyterChannel::IOPub => "iopub",
            JupyterChannel::Heartbeat => "heartbeat",
        };
        write!(f, "{}", name)
    }
}

/// The execution state broadcast in `status` messages on iopub.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    /// The kernel is processing a request
    Busy,

    /// The kernel has finished processing a request
    Idle,

    /// The kernel is starting up
    Starting,
}

/// Content of a `status` message.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StatusContent {
    pub execution_state: ExecutionState,
}
