//
// jupyter_messages.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use ijshared::protocol_version::ProtocolVersion;
use serde::Deserialize;

use crate::wire_message::WireMessage;

/// The requests this kernel knows how to handle.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelRequest {
    KernelInfo,
    Execute(ExecuteRequest),
    Complete(CompleteRequest),
    Inspect(InspectRequest),
    Shutdown(ShutdownRequest),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    pub code: String,
}

/// A completion request, normalized across protocol versions.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteRequest {
    /// The code to complete in; the current line for protocol 4.x
    pub code: String,

    /// The cursor position, in characters
    pub cursor_pos: usize,

    /// The text being completed, as sent by 4.x frontends
    pub text: Option<String>,
}

#[derive(Deserialize)]
struct CompleteRequestV5 {
    code: String,
    cursor_pos: usize,
}

#[derive(Deserialize)]
struct CompleteRequestV4 {
    #[serde(default)]
    text: String,
    line: String,
    cursor_pos: usize,
}

/// An inspection request, normalized across protocol versions.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectRequest {
    pub code: String,

    /// The cursor position, in characters
    pub cursor_pos: usize,
}

#[derive(Deserialize)]
struct InspectRequestV5 {
    code: String,
    cursor_pos: usize,
}

#[derive(Deserialize)]
struct ObjectInfoRequestV4 {
    oname: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ShutdownRequest {
    #[serde(default)]
    pub restart: bool,
}

impl KernelRequest {
    /// Decode a message into a request. Returns `Ok(None)` if the message
    /// type isn't one this kernel handles under the given protocol.
    pub fn parse(
        message: &WireMessage,
        protocol: ProtocolVersion,
    ) -> Result<Option<Self>, serde_json::Error> {
        let content = message.content.clone();
        let request = match (message.msg_type(), protocol) {
            ("kernel_info_request", _) => KernelRequest::KernelInfo,
            ("execute_request", _) => KernelRequest::Execute(serde_json::from_value(content)?),
            ("complete_request", ProtocolVersion::V5) => {
                let request: CompleteRequestV5 = serde_json::from_value(content)?;
                KernelRequest::Complete(CompleteRequest {
                    code: request.code,
                    cursor_pos: request.cursor_pos,
                    text: None,
                })
            }
            ("complete_request", ProtocolVersion::V4) => {
                let request: CompleteRequestV4 = serde_json::from_value(content)?;
                KernelRequest::Complete(CompleteRequest {
                    code: request.line,
                    cursor_pos: request.cursor_pos,
                    text: Some(request.text),
                })
            }
            ("inspect_request", ProtocolVersion::V5) => {
                let request: InspectRequestV5 = serde_json::from_value(content)?;
                KernelRequest::Inspect(InspectRequest {
                    code: request.code,
                    cursor_pos: request.cursor_pos,
                })
            }
            ("object_info_request", ProtocolVersion::V4) => {
                let request: ObjectInfoRequestV4 = serde_json::from_value(content)?;
                let cursor_pos = request.oname.chars().count();
                KernelRequest::Inspect(InspectRequest {
                    code: request.oname,
                    cursor_pos,
                })
            }
            ("shutdown_request", _) => KernelRequest::Shutdown(serde_json::from_value(content)?),
            _ => return Ok(None),
        };
        Ok(Some(request))
    }

    /// Whether the request may arrive on the control channel
    pub fn allowed_on_control(&self) -> bool {
        matches!(self, KernelRequest::Shutdown(_))
    }
}
