//
// wire_message_header.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

/// Represents the header of a Jupyter message as it appears on the wire.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireMessageHeader {
    /// The message ID
    pub msg_id: String,

    /// The user who sent the message
    #[serde(default)]
    pub username: String,

    /// The ID of the session the message belongs to
    #[serde(default)]
    pub session: String,

    /// The type of the message
    pub msg_type: String,

    /// The Jupyter protocol version, if given
    pub version: Option<String>,

    /// The date the message was created, as an ISO 8601 string
    pub date: Option<String>,

    /// Any further fields a frontend put in the header
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WireMessageHeader {
    /// Create a header for a new message.
    ///
    /// - `msg_type`: The type of the message
    /// - `username`: The user sending the message
    /// - `session`: The session the message belongs to
    /// - `version`: The protocol version to stamp on the header, if any
    pub fn new(
        msg_type: impl Into<String>,
        username: impl Into<String>,
        session: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            msg_id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            session: session.into(),
            msg_type: msg_type.into(),
            version,
            date: Some(chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            extra: serde_json::Map::new(),
        }
    }
}
